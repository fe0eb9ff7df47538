//! Protocol dispatch hooks for the network.

use crate::sim::Simulator;
use crate::trace::TraceEventKind;
use tracing::{debug, trace};

use super::{DropReason, Network, NodeId, Packet, Transport};

impl Network {
    /// 数据包送达目的节点时的处理
    pub(crate) fn on_delivered(&mut self, at: NodeId, pkt: Packet, sim: &mut Simulator) {
        let now = sim.now();

        // 目的端口没有在监听的 sink：属于接收端生命周期问题，不是队列丢包
        if pkt.transport.is_tcp_data() && !self.sinks.is_listening(at, &pkt.tuple.dst) {
            debug!(pkt_id = pkt.id, dst = %pkt.tuple.dst, "sink 未监听，丢弃数据段");
            self.drop_packet(at, pkt, DropReason::SinkClosed, now);
            return;
        }

        self.stats.delivered_pkts += 1;
        self.stats.delivered_bytes += pkt.size_bytes as u64;
        if let Some(fm) = self.flowmon.as_mut() {
            fm.on_receive(&pkt, now);
        }
        if let Some(t) = self.trace.as_mut() {
            t.record(now, pkt.id, pkt.size_bytes, TraceEventKind::Receive { node: at.0 });
        }
        trace!(
            pkt_id = pkt.id,
            delivered_pkts = self.stats.delivered_pkts,
            delivered_bytes = self.stats.delivered_bytes,
            "✅ 数据包送达目的地"
        );

        // 传输层处理（TCP：目的端产生 ACK、源端处理 ACK 驱动继续发送）
        if let Transport::Tcp(seg) = pkt.transport {
            let conn_id = pkt.conn_id;
            let mut tcp = std::mem::take(&mut self.tcp);
            tcp.on_tcp_segment(conn_id, at, seg, sim, self);
            self.tcp = tcp;
        }
    }
}

