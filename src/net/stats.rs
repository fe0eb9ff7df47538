//! 统计信息
//!
//! 定义网络仿真统计数据结构与丢包原因。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 丢包原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// RED 概率早丢
    RedUnforced,
    /// RED 平均队长超上限强制丢
    RedForced,
    /// 队列满（尾丢弃或 RED 容量）
    QueueLimit,
    /// 无路由
    NoRoute,
    /// 接收端未在监听（sink 未启动或已停止）
    SinkClosed,
}

impl DropReason {
    /// 是否由队列策略造成（与接收端配置问题区分）
    pub fn is_queue_drop(self) -> bool {
        matches!(
            self,
            DropReason::RedUnforced | DropReason::RedForced | DropReason::QueueLimit
        )
    }
}

/// 网络统计信息
#[derive(Debug, Default)]
pub struct Stats {
    pub delivered_pkts: u64,
    pub delivered_bytes: u64,
    pub dropped_pkts: u64,
    pub dropped_bytes: u64,
    pub drops_by_reason: BTreeMap<DropReason, u64>,
}

impl Stats {
    pub fn drops(&self, reason: DropReason) -> u64 {
        self.drops_by_reason.get(&reason).copied().unwrap_or(0)
    }
}
