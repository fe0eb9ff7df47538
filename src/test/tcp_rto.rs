use std::net::{Ipv4Addr, SocketAddrV4};

use crate::app::PacketSink;
use crate::net::{AddressBlock, DropReason, LinkSpec, NetWorld, NodeId};
use crate::proto::tcp::{TcpConfig, TcpConn, TcpConnId};
use crate::queue::{QueueMode, QueueSpec};
use crate::sim::{SimTime, Simulator};

struct Pair {
    sim: Simulator,
    world: NetWorld,
    conn_id: TcpConnId,
}

/// a <-> b，一条 1 Mb/s 链路，尾丢弃队列 `queue_pkts` 个包；b:9 上有 sink
fn pair(queue_pkts: u64, sink_start: SimTime, cfg: TcpConfig) -> Pair {
    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let net = &mut world.net;
    let a = net.add_node("a").expect("a");
    let b = net.add_node("b").expect("b");
    let l = net.connect_p2p(
        a,
        b,
        &LinkSpec {
            bandwidth_bps: 1_000_000,
            latency: SimTime::from_millis(1),
            queue: QueueSpec::DropTail {
                mode: QueueMode::Packets,
                limit: queue_pkts,
            },
        },
    );
    let [ia, ib] = net
        .assign_block(&l, AddressBlock::new(Ipv4Addr::new(10, 9, 0, 0), 24))
        .expect("assign");
    net.populate_routing();
    net.set_tcp_config(cfg);

    let remote = SocketAddrV4::new(ib, 9);
    net.sinks.add(
        PacketSink::new(b, remote, sink_start, SimTime::from_secs(60)),
        &mut sim,
    );
    let conn_id = net.tcp.connect(a, ia, b, remote);
    sim.stop_at(SimTime::from_secs(60));
    Pair {
        sim,
        world,
        conn_id,
    }
}

fn write(p: &mut Pair, bytes: u64) {
    let mut tcp = std::mem::take(&mut p.world.net.tcp);
    tcp.app_write(p.conn_id, bytes, &mut p.sim, &mut p.world.net);
    p.world.net.tcp = tcp;
}

fn conn(p: &Pair) -> &TcpConn {
    p.world.net.tcp.get(p.conn_id).expect("tcp conn exists")
}

#[test]
fn tcp_recovers_from_queue_drops_and_delivers_everything() {
    let mut p = pair(2, SimTime::ZERO, TcpConfig::default());
    write(&mut p, 40_000);
    p.sim.run(&mut p.world);

    assert!(
        p.world.net.stats.drops(DropReason::QueueLimit) > 0,
        "expected at least one drop"
    );
    assert!(DropReason::QueueLimit.is_queue_drop());
    let c = conn(&p);
    assert!(c.retransmits > 0, "expected retransmission");
    assert_eq!(c.bytes_acked(), 40_000);
    assert_eq!(c.bytes_received(), 40_000);
    let sink = p.world.net.sinks.get(0).expect("sink");
    assert_eq!(sink.rx_bytes, 40_000);
    assert!(c.rto() >= SimTime::from_millis(200));
}

#[test]
fn data_to_closed_sink_is_dropped_without_ack_until_it_opens() {
    let mut p = pair(100, SimTime::from_secs(5), TcpConfig::default());
    write(&mut p, 958);
    p.sim.run(&mut p.world);

    assert!(p.world.net.stats.drops(DropReason::SinkClosed) > 0);
    assert!(!DropReason::SinkClosed.is_queue_drop());
    let queue_drops: u64 = p
        .world
        .net
        .stats
        .drops_by_reason
        .iter()
        .filter(|(r, _)| r.is_queue_drop())
        .map(|(_, n)| n)
        .sum();
    assert_eq!(queue_drops, 0, "closed sink losses are not queue drops");
    let c = conn(&p);
    assert!(c.timeouts > 0);
    assert_eq!(c.bytes_acked(), 958);
    assert_eq!(p.world.net.sinks.get(0).expect("sink").rx_bytes, 958);
}

#[test]
fn stop_and_wait_window_sends_without_loss() {
    let cfg = TcpConfig {
        fixed_window: 958,
        ..TcpConfig::default()
    };
    let mut p = pair(100, SimTime::ZERO, cfg);
    write(&mut p, 958 * 5 + 100);
    p.sim.run(&mut p.world);

    let c = conn(&p);
    assert_eq!(c.bytes_acked(), 958 * 5 + 100);
    assert_eq!(c.retransmits, 0);
    assert_eq!(p.world.net.stats.dropped_pkts, 0);
    // 6 个数据段 + 6 个 ACK，头部 42 字节
    assert_eq!(p.world.net.stats.delivered_pkts, 12);
    assert_eq!(
        p.world.net.stats.delivered_bytes,
        958 * 5 + 100 + 6 * 42 + 6 * 42
    );
}

#[test]
fn receiver_buffers_out_of_order_segments() {
    let t = crate::net::FiveTuple::tcp(
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 49153),
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 9),
    );
    let mut c = TcpConn::new(1, NodeId(0), NodeId(1), t, TcpConfig::default());
    assert_eq!(c.receive(100, 100), 0);
    assert_eq!(c.receive(300, 50), 0);
    assert_eq!(c.bytes_received(), 0);
    assert_eq!(c.receive(0, 100), 200);
    assert_eq!(c.bytes_received(), 200);
    // 重复数据不推进
    assert_eq!(c.receive(0, 100), 0);
    assert_eq!(c.receive(200, 100), 150);
    assert_eq!(c.bytes_received(), 350);
}
