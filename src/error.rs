//! 错误类型
//!
//! 配置错误在仿真开始前被检测并中止整个搭建过程；资源错误（找不到队列、
//! 队列不是 RED）在首次访问时立即报告，不会被静默忽略。

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::net::LinkId;
use crate::sim::SimTime;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("unsupported test number {0}: please, use arg --testnumber=4/5")]
    UnsupportedTest(u32),

    #[error("RED thresholds out of order: min_th {min_th} must be below max_th {max_th}")]
    ThresholdOrder { min_th: f64, max_th: f64 },

    #[error("invalid RED configuration: {0}")]
    InvalidRed(String),

    #[error("flow {flow}: need start {start:?} < stop {stop:?} <= sink stop {sink_stop:?}")]
    FlowTiming {
        flow: String,
        start: SimTime,
        stop: SimTime,
        sink_stop: SimTime,
    },

    #[error("sink on {node}:{port}: need start {start:?} < stop {stop:?} <= simulation stop {sim_stop:?}")]
    SinkTiming {
        node: String,
        port: u16,
        start: SimTime,
        stop: SimTime,
        sim_stop: SimTime,
    },

    #[error("flow {flow} targets {node}:{port} but no sink listens there")]
    MissingSink { flow: String, node: String, port: u16 },

    #[error("node name {0} registered twice")]
    DuplicateNode(String),

    #[error("unknown node {0}")]
    UnknownNode(String),

    #[error("address block {base}/{prefix_len} overlaps an already assigned block")]
    PrefixOverlap { base: Ipv4Addr, prefix_len: u8 },

    #[error("address block {base}/{prefix_len} has no room for another interface")]
    BlockExhausted { base: Ipv4Addr, prefix_len: u8 },

    #[error("no route to {0}")]
    NoRoute(Ipv4Addr),

    #[error("link {0:?} does not exist or has no queue installed")]
    QueueUnavailable(LinkId),

    #[error("queue on link {0:?} is not a RED queue")]
    NotRed(LinkId),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
