use std::net::{Ipv4Addr, SocketAddrV4};

use crate::flowmon::FlowMonitor;
use crate::net::{DropReason, FiveTuple, NodeId, Packet, TcpSegment, Transport};
use crate::sim::SimTime;

fn tuple() -> FiveTuple {
    FiveTuple::tcp(
        SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 49153),
        SocketAddrV4::new(Ipv4Addr::new(10, 1, 4, 2), 50001),
    )
}

fn pkt(id: u64, tuple: FiveTuple, size_bytes: u32) -> Packet {
    Packet {
        id,
        conn_id: 1,
        size_bytes,
        src: NodeId(0),
        dst: NodeId(4),
        tuple,
        transport: Transport::Tcp(TcpSegment::Data { seq: 0, len: 958 }),
        hops: 0,
    }
}

fn ms(v: u64) -> SimTime {
    SimTime::from_millis(v)
}

#[test]
fn flows_are_classified_by_five_tuple_in_order_of_first_sight() {
    let mut fm = FlowMonitor::default();
    let data = tuple();
    let ack = data.reversed();
    fm.on_send(&pkt(1, data, 1000), ms(0));
    fm.on_send(&pkt(2, ack, 42), ms(1));
    fm.on_send(&pkt(3, data, 1000), ms(2));

    assert_eq!(fm.num_flows(), 2);
    assert_eq!(fm.flow_id(&data), Some(1));
    assert_eq!(fm.flow_id(&ack), Some(2));
    let st = fm.stats(1).expect("data flow");
    assert_eq!(st.tx_packets, 2);
    assert_eq!(st.tx_bytes, 2000);
    assert_eq!(st.time_first_tx_ns, Some(0));
    assert_eq!(st.time_last_tx_ns, Some(ms(2).0));
}

#[test]
fn receive_updates_delay_jitter_and_forward_counts() {
    let mut fm = FlowMonitor::default();
    let t = tuple();
    let p1 = pkt(1, t, 1000);
    let p2 = pkt(2, t, 1000);
    fm.on_send(&p1, ms(0));
    fm.on_send(&p2, ms(1));
    fm.on_forward(&p1, ms(5));
    fm.on_forward(&p1, ms(30));
    fm.on_receive(&p1, ms(40));
    fm.on_receive(&p2, ms(45));

    let st = fm.stats(1).expect("flow");
    assert_eq!(st.rx_packets, 2);
    assert_eq!(st.rx_bytes, 2000);
    assert_eq!(st.times_forwarded, 2);
    assert_eq!(st.delay_sum_ns, ms(40).0 + ms(44).0);
    assert_eq!(st.jitter_sum_ns, ms(4).0);
    assert_eq!(st.last_delay_ns, Some(ms(44).0));
    assert_eq!(st.time_first_rx_ns, Some(ms(40).0));
    assert_eq!(st.time_last_rx_ns, Some(ms(45).0));
}

#[test]
fn finish_counts_drops_and_stale_in_flight_as_lost() {
    let mut fm = FlowMonitor::new(SimTime::from_secs(10));
    let t = tuple();
    fm.on_send(&pkt(1, t, 1000), ms(0));
    fm.on_send(&pkt(2, t, 1000), ms(0));
    fm.on_send(&pkt(3, t, 1000), SimTime::from_secs(12));
    fm.on_drop(&pkt(1, t, 1000), DropReason::RedUnforced, ms(10));
    // 未登记的 packet 不影响统计
    fm.on_drop(&pkt(77, t, 1000), DropReason::QueueLimit, ms(10));

    let report = fm.finish(SimTime::from_secs(14));
    assert_eq!(report.finished_at_ns, SimTime::from_secs(14).0);
    let rec = report.flow(&t).expect("flow");
    assert_eq!(rec.flow_id, 1);
    assert_eq!(rec.stats.packets_dropped.get(&DropReason::RedUnforced), Some(&1));
    assert_eq!(rec.stats.bytes_dropped.get(&DropReason::RedUnforced), Some(&1000));
    assert!(rec.stats.packets_dropped.get(&DropReason::QueueLimit).is_none());
    // pkt 1 丢弃 + pkt 2 在途 14 s；pkt 3 只在途 2 s
    assert_eq!(rec.stats.lost_packets, 2);
}

#[test]
fn report_serializes_to_json_with_flow_records() {
    let mut fm = FlowMonitor::default();
    let t = tuple();
    fm.on_send(&pkt(1, t, 1000), ms(0));
    fm.on_receive(&pkt(1, t, 1000), ms(30));
    let report = fm.finish(ms(100));

    let v = serde_json::to_value(&report).expect("serialize");
    let flows = v["flows"].as_array().expect("flows array");
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0]["flow_id"], 1);
    assert_eq!(flows[0]["rx_packets"], 1);
    assert_eq!(flows[0]["tuple"]["dst"], "10.1.4.2:50001");
    assert_eq!(flows[0]["tuple"]["protocol"], 6);
}
