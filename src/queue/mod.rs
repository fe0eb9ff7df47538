//! 队列策略（Queue disciplines）
//!
//! 每条单向链路的发送队列是一个 `QueueDisc`：尾丢弃或 RED。拓扑构建时按链路选择，
//! 之后通过枚举分派，不做运行期类型探测。

use serde::Serialize;

use crate::net::{DropReason, Packet};
use crate::sim::SimTime;

mod drop_tail;
mod red;

pub use drop_tail::DropTailQueue;
pub use red::{RedConfig, RedOverride, RedQueue, RedStats, RedThresholds};

/// 点对点设备默认的尾丢弃队列长度（包）
pub const DEFAULT_DROPTAIL_PKTS: u64 = 100;

/// 队列占用的计量单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    Packets,
    Bytes,
}

impl QueueMode {
    /// 一个 packet 在该计量单位下占用多少
    pub fn units_of(self, pkt: &Packet) -> u64 {
        match self {
            QueueMode::Packets => 1,
            QueueMode::Bytes => pkt.size_bytes as u64,
        }
    }
}

/// 入队被拒：退回 packet 并说明原因
#[derive(Debug)]
pub struct Rejected {
    pub pkt: Packet,
    pub reason: DropReason,
}

/// Packet 队列抽象
pub trait PacketQueue: std::fmt::Debug {
    /// 入队：成功返回 Ok；若被丢弃则退回 packet
    fn enqueue(&mut self, pkt: Packet, now: SimTime) -> Result<(), Rejected>;
    /// 出队：按队列策略返回下一个 packet
    fn dequeue(&mut self, now: SimTime) -> Option<Packet>;

    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn bytes(&self) -> u64;
    /// 当前占用（单位由队列模式决定：包或字节）
    fn occupancy(&self) -> u64;
    /// 运行期间的最大占用
    fn peak_occupancy(&self) -> u64;
    fn mode(&self) -> QueueMode;
}

/// 链路队列的构建参数
#[derive(Debug, Clone)]
pub enum QueueSpec {
    DropTail { mode: QueueMode, limit: u64 },
    Red(RedConfig),
}

impl Default for QueueSpec {
    fn default() -> Self {
        QueueSpec::DropTail {
            mode: QueueMode::Packets,
            limit: DEFAULT_DROPTAIL_PKTS,
        }
    }
}

/// 已安装在链路上的队列
#[derive(Debug)]
pub enum QueueDisc {
    DropTail(DropTailQueue),
    Red(RedQueue),
}

impl QueueDisc {
    pub fn from_spec(spec: &QueueSpec) -> Self {
        match spec {
            QueueSpec::DropTail { mode, limit } => {
                QueueDisc::DropTail(DropTailQueue::new(*mode, *limit))
            }
            QueueSpec::Red(cfg) => QueueDisc::Red(RedQueue::new(cfg.clone())),
        }
    }

    pub fn as_red(&self) -> Option<&RedQueue> {
        match self {
            QueueDisc::Red(q) => Some(q),
            QueueDisc::DropTail(_) => None,
        }
    }

    pub fn as_red_mut(&mut self) -> Option<&mut RedQueue> {
        match self {
            QueueDisc::Red(q) => Some(q),
            QueueDisc::DropTail(_) => None,
        }
    }

    fn inner(&self) -> &dyn PacketQueue {
        match self {
            QueueDisc::DropTail(q) => q,
            QueueDisc::Red(q) => q,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn PacketQueue {
        match self {
            QueueDisc::DropTail(q) => q,
            QueueDisc::Red(q) => q,
        }
    }
}

impl PacketQueue for QueueDisc {
    fn enqueue(&mut self, pkt: Packet, now: SimTime) -> Result<(), Rejected> {
        self.inner_mut().enqueue(pkt, now)
    }

    fn dequeue(&mut self, now: SimTime) -> Option<Packet> {
        self.inner_mut().dequeue(now)
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn bytes(&self) -> u64 {
        self.inner().bytes()
    }

    fn occupancy(&self) -> u64 {
        self.inner().occupancy()
    }

    fn peak_occupancy(&self) -> u64 {
        self.inner().peak_occupancy()
    }

    fn mode(&self) -> QueueMode {
        self.inner().mode()
    }
}
