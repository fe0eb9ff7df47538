use std::net::{Ipv4Addr, SocketAddrV4};

use crate::net::{DropReason, FiveTuple, NodeId, Packet, Transport};
use crate::queue::{DropTailQueue, PacketQueue, QueueDisc, QueueMode, QueueSpec, RedConfig};
use crate::sim::SimTime;

fn pkt(id: u64, size_bytes: u32) -> Packet {
    let a = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 1);
    let b = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 2);
    Packet {
        id,
        conn_id: 0,
        size_bytes,
        src: NodeId(0),
        dst: NodeId(1),
        tuple: FiveTuple::tcp(a, b),
        transport: Transport::None,
        hops: 0,
    }
}

#[test]
fn droptail_packet_mode_enforces_limit_and_preserves_order() {
    let mut q = DropTailQueue::new(QueueMode::Packets, 2);
    assert_eq!(q.limit(), 2);
    assert!(q.is_empty());

    assert!(q.enqueue(pkt(1, 1000), SimTime::ZERO).is_ok());
    assert!(q.enqueue(pkt(2, 40), SimTime::ZERO).is_ok());
    let rej = q.enqueue(pkt(3, 40), SimTime::ZERO).expect_err("should drop");
    assert_eq!(rej.pkt.id, 3);
    assert_eq!(rej.reason, DropReason::QueueLimit);
    assert_eq!(q.len(), 2);
    assert_eq!(q.bytes(), 1040);
    assert_eq!(q.occupancy(), 2);

    assert_eq!(q.dequeue(SimTime::ZERO).expect("pkt").id, 1);
    assert_eq!(q.dequeue(SimTime::ZERO).expect("pkt").id, 2);
    assert!(q.dequeue(SimTime::ZERO).is_none());
    assert_eq!(q.bytes(), 0);
    assert_eq!(q.peak_occupancy(), 2);
}

#[test]
fn droptail_byte_mode_counts_bytes() {
    let mut q = DropTailQueue::new(QueueMode::Bytes, 1500);
    assert!(q.enqueue(pkt(1, 1000), SimTime::ZERO).is_ok());
    assert!(q.enqueue(pkt(2, 600), SimTime::ZERO).is_err());
    assert!(q.enqueue(pkt(3, 500), SimTime::ZERO).is_ok());
    assert_eq!(q.occupancy(), 1500);
    assert_eq!(q.mode(), QueueMode::Bytes);
}

#[test]
fn default_queue_spec_is_hundred_packet_droptail() {
    let mut q = QueueDisc::from_spec(&QueueSpec::default());
    assert!(q.as_red().is_none());
    for i in 0..100 {
        assert!(q.enqueue(pkt(i, 1000), SimTime::ZERO).is_ok());
    }
    assert!(q.enqueue(pkt(100, 40), SimTime::ZERO).is_err());
    assert_eq!(q.occupancy(), 100);
}

#[test]
fn queue_disc_dispatches_to_red() {
    let mut q = QueueDisc::from_spec(&QueueSpec::Red(RedConfig::default()));
    assert!(q.as_red().is_some());
    assert!(q.enqueue(pkt(1, 1000), SimTime::ZERO).is_ok());
    assert_eq!(q.occupancy(), 1);
    assert_eq!(q.mode(), QueueMode::Packets);
    assert!(q.as_red_mut().is_some());
}
