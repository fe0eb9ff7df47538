use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::net::DropReason;
use crate::sim::SimTime;

/// 事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    /// packet 进入某条单向链路的发送队列
    Enqueue {
        link_from: usize,
        link_to: usize,
        /// 入队后的队列长度
        q_pkts: usize,
        q_bytes: u64,
    },
    /// packet 出队并开始序列化
    Dequeue {
        link_from: usize,
        link_to: usize,
        depart_ns: u64,
        arrive_ns: u64,
    },
    /// 丢包（队列、路由或接收端）
    Drop { node: usize, reason: DropReason },
    /// 目的节点收到 packet
    Receive { node: usize },
}

/// 一条事件（JSON）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// 仿真时间（纳秒，和 `SimTime.0` 同口径）
    pub t_ns: u64,
    pub pkt_id: u64,
    pub pkt_bytes: u32,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

/// 一个简单的事件收集器（存内存，仿真结束写 JSON 文件）
#[derive(Debug, Default)]
pub struct TraceLogger {
    pub events: Vec<TraceEvent>,
}

impl TraceLogger {
    pub fn record(&mut self, now: SimTime, pkt_id: u64, pkt_bytes: u32, kind: TraceEventKind) {
        self.events.push(TraceEvent {
            t_ns: now.0,
            pkt_id,
            pkt_bytes,
            kind,
        });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let w = BufWriter::new(File::create(path)?);
        serde_json::to_writer(w, &self.events)?;
        info!(path = %path.display(), events = self.events.len(), "📝 写出 trace");
        Ok(())
    }
}
