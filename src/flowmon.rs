//! 流统计
//!
//! 按五元组把 packet 归入流（首次出现的顺序分配 `FlowId`，所以 ACK 方向是单独的流），
//! 在源节点发送、中间节点转发、任意位置丢弃、目的节点接收时更新计数。
//!
//! 仿真结束后由 `Network::take_flow_monitor` 取出，`finish` 消耗监控器生成一次性报告。

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::net::{DropReason, FiveTuple, Packet};
use crate::sim::SimTime;

pub type FlowId = u32;

/// 在途超过该时长仍未到达的 packet 计为丢失
pub const DEFAULT_MAX_PER_HOP_DELAY: SimTime = SimTime(10_000_000_000);

#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub time_first_tx_ns: Option<u64>,
    pub time_last_tx_ns: Option<u64>,
    pub time_first_rx_ns: Option<u64>,
    pub time_last_rx_ns: Option<u64>,
    /// 端到端时延总和（纳秒）
    pub delay_sum_ns: u64,
    /// 相邻两次接收的时延差绝对值之和（纳秒）
    pub jitter_sum_ns: u64,
    pub last_delay_ns: Option<u64>,
    pub times_forwarded: u64,
    pub lost_packets: u64,
    pub packets_dropped: BTreeMap<DropReason, u64>,
    pub bytes_dropped: BTreeMap<DropReason, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowRecord {
    pub flow_id: FlowId,
    pub tuple: FiveTuple,
    #[serde(flatten)]
    pub stats: FlowStats,
}

/// 结束时生成的报告
#[derive(Debug, Clone, Serialize)]
pub struct FlowMonReport {
    pub finished_at_ns: u64,
    pub flows: Vec<FlowRecord>,
}

impl FlowMonReport {
    pub fn flow(&self, tuple: &FiveTuple) -> Option<&FlowRecord> {
        self.flows.iter().find(|f| &f.tuple == tuple)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let w = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(w, self)?;
        info!(path = %path.display(), flows = self.flows.len(), "📝 写出流统计");
        Ok(())
    }
}

#[derive(Debug)]
pub struct FlowMonitor {
    max_delay: SimTime,
    ids: HashMap<FiveTuple, FlowId>,
    tuples: Vec<FiveTuple>,
    stats: BTreeMap<FlowId, FlowStats>,
    /// packet id -> (flow, 发送时间)
    in_flight: HashMap<u64, (FlowId, SimTime)>,
}

impl Default for FlowMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_HOP_DELAY)
    }
}

impl FlowMonitor {
    pub fn new(max_delay: SimTime) -> Self {
        Self {
            max_delay,
            ids: HashMap::new(),
            tuples: Vec::new(),
            stats: BTreeMap::new(),
            in_flight: HashMap::new(),
        }
    }

    fn classify(&mut self, tuple: &FiveTuple) -> FlowId {
        if let Some(&id) = self.ids.get(tuple) {
            return id;
        }
        let id = (self.tuples.len() + 1) as FlowId;
        self.ids.insert(*tuple, id);
        self.tuples.push(*tuple);
        self.stats.insert(id, FlowStats::default());
        id
    }

    pub fn flow_id(&self, tuple: &FiveTuple) -> Option<FlowId> {
        self.ids.get(tuple).copied()
    }

    pub fn stats(&self, id: FlowId) -> Option<&FlowStats> {
        self.stats.get(&id)
    }

    pub fn num_flows(&self) -> usize {
        self.tuples.len()
    }

    pub fn on_send(&mut self, pkt: &Packet, now: SimTime) {
        let id = self.classify(&pkt.tuple);
        let Some(st) = self.stats.get_mut(&id) else {
            return;
        };
        st.tx_packets += 1;
        st.tx_bytes += pkt.size_bytes as u64;
        st.time_first_tx_ns.get_or_insert(now.0);
        st.time_last_tx_ns = Some(now.0);
        self.in_flight.insert(pkt.id, (id, now));
    }

    pub fn on_forward(&mut self, pkt: &Packet, _now: SimTime) {
        let Some(&(id, _)) = self.in_flight.get(&pkt.id) else {
            return;
        };
        if let Some(st) = self.stats.get_mut(&id) {
            st.times_forwarded += 1;
        }
    }

    pub fn on_drop(&mut self, pkt: &Packet, reason: DropReason, _now: SimTime) {
        let Some((id, _)) = self.in_flight.remove(&pkt.id) else {
            return;
        };
        if let Some(st) = self.stats.get_mut(&id) {
            *st.packets_dropped.entry(reason).or_insert(0) += 1;
            *st.bytes_dropped.entry(reason).or_insert(0) += pkt.size_bytes as u64;
        }
    }

    pub fn on_receive(&mut self, pkt: &Packet, now: SimTime) {
        let Some((id, sent)) = self.in_flight.remove(&pkt.id) else {
            return;
        };
        let Some(st) = self.stats.get_mut(&id) else {
            return;
        };
        let delay = now.saturating_sub(sent).0;
        st.rx_packets += 1;
        st.rx_bytes += pkt.size_bytes as u64;
        st.time_first_rx_ns.get_or_insert(now.0);
        st.time_last_rx_ns = Some(now.0);
        st.delay_sum_ns += delay;
        if let Some(last) = st.last_delay_ns {
            st.jitter_sum_ns += delay.abs_diff(last);
        }
        st.last_delay_ns = Some(delay);
    }

    /// 结束统计：在途超过 `max_delay` 的 packet 计为丢失，消耗监控器
    pub fn finish(self, now: SimTime) -> FlowMonReport {
        let FlowMonitor {
            max_delay,
            tuples,
            mut stats,
            in_flight,
            ..
        } = self;

        let mut timed_out: BTreeMap<FlowId, u64> = BTreeMap::new();
        for (id, sent) in in_flight.into_values() {
            if now.saturating_sub(sent) > max_delay {
                *timed_out.entry(id).or_insert(0) += 1;
            }
        }

        let flows = tuples
            .into_iter()
            .enumerate()
            .map(|(i, tuple)| {
                let flow_id = (i + 1) as FlowId;
                let mut st = stats.remove(&flow_id).unwrap_or_default();
                let dropped: u64 = st.packets_dropped.values().sum();
                st.lost_packets = dropped + timed_out.get(&flow_id).copied().unwrap_or(0);
                FlowRecord {
                    flow_id,
                    tuple,
                    stats: st,
                }
            })
            .collect();

        FlowMonReport {
            finished_at_ns: now.0,
            flows,
        }
    }
}
