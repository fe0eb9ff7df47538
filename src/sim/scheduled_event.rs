//! 调度事件
//!
//! 事件按 (时间, 提交序号) 排序：同一时刻的事件严格按提交顺序（FIFO）执行。

use super::event::Event;
use super::time::SimTime;
use std::cmp::Ordering;

/// 事件排序键：先比较时间，再比较提交序号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey {
    pub at: SimTime,
    pub seq: u64,
}

/// 调度事件，包含排序键和事件对象。
pub struct ScheduledEvent {
    pub(crate) key: EventKey,
    pub(crate) ev: Box<dyn Event>,
}

// BinaryHeap 是 max-heap：反向比较键，得到“最早、最先提交”优先。
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key)
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ScheduledEvent {}
