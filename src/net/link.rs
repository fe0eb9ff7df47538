//! 链路类型
//!
//! 一条点对点链路由两个方向的 `Link` 组成，每个方向对应一端设备的发送队列。

use crate::queue::{QueueDisc, QueueSpec};
use crate::sim::SimTime;

use super::id::{LinkId, NodeId};

/// 点对点链路参数
#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub bandwidth_bps: u64,
    pub latency: SimTime,
    pub queue: QueueSpec,
}

/// 点对点链路的两个方向：`fwd` 为 a->b（a 端设备），`rev` 为 b->a（b 端设备）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct P2pLink {
    pub a: NodeId,
    pub b: NodeId,
    pub fwd: LinkId,
    pub rev: LinkId,
}

impl P2pLink {
    /// 第 `i` 个设备（0 = a 端，1 = b 端）的发送方向
    pub fn device(&self, i: usize) -> LinkId {
        if i == 0 { self.fwd } else { self.rev }
    }
}

/// 单向链路（设备发送队列 + 信道）
#[derive(Debug)]
pub struct Link {
    pub from: NodeId,
    pub to: NodeId,
    pub latency: SimTime,
    pub bandwidth_bps: u64,
    /// 正在序列化发送一个 packet
    pub busy: bool,
    pub queue: QueueDisc,
    pub tx_pkts: u64,
    pub tx_bytes: u64,
}

impl Link {
    /// 创建新链路
    pub fn new(from: NodeId, to: NodeId, latency: SimTime, bandwidth_bps: u64, queue: QueueDisc) -> Self {
        Self {
            from,
            to,
            latency,
            bandwidth_bps,
            busy: false,
            queue,
            tx_pkts: 0,
            tx_bytes: 0,
        }
    }

    /// 计算传输指定字节数所需的时间
    pub(crate) fn tx_time(&self, bytes: u32) -> SimTime {
        // ceil(bytes*8 / bps) 秒 -> 纳秒
        if self.bandwidth_bps == 0 {
            return SimTime(u64::MAX / 4);
        }
        let bits = (bytes as u128).saturating_mul(8);
        let nanos = (bits.saturating_mul(1_000_000_000u128)
            + (self.bandwidth_bps as u128 - 1))
            / self.bandwidth_bps as u128;
        SimTime(nanos.min(u64::MAX as u128) as u64)
    }
}
