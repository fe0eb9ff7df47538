//! 应用层：on/off 流量源与 packet sink

mod onoff;
mod sink;

pub use onoff::{AppEvent, AppEventKind, AppState, OnOffApp};
pub use sink::{PacketSink, SinkClose, SinkOpen, SinkTable};
