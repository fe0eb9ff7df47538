//! 数据包级事件记录（入队 / 出队 / 丢包 / 接收）
//!
//! 设计目标：
//! - **结构化**：用 JSON 事件而不是解析文本日志
//! - **轻量**：全部存在内存里，仿真结束时一次性写出

mod types;

pub use types::{TraceEvent, TraceEventKind, TraceLogger};
