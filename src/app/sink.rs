//! 接收端（packet sink）
//!
//! sink 在 `[start, stop)` 区间内监听某节点的端口；不在监听状态时到达的数据段
//! 由网络层按 `DropReason::SinkClosed` 丢弃，不产生 ACK。

use std::net::SocketAddrV4;

use tracing::debug;

use crate::net::{NetWorld, NodeId};
use crate::sim::{Event, SimTime, Simulator, World};

#[derive(Debug, Clone)]
pub struct PacketSink {
    pub node: NodeId,
    /// 监听地址；IP 为 `0.0.0.0` 时匹配该节点的任意地址
    pub local: SocketAddrV4,
    pub start: SimTime,
    pub stop: SimTime,
    listening: bool,
    /// 按序交付给应用的字节数
    pub rx_bytes: u64,
    /// 交付次数（每次有新的按序字节算一次）
    pub rx_deliveries: u64,
}

impl PacketSink {
    pub fn new(node: NodeId, local: SocketAddrV4, start: SimTime, stop: SimTime) -> Self {
        Self {
            node,
            local,
            start,
            stop,
            listening: false,
            rx_bytes: 0,
            rx_deliveries: 0,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    fn matches(&self, node: NodeId, addr: &SocketAddrV4) -> bool {
        self.node == node
            && self.local.port() == addr.port()
            && (self.local.ip().is_unspecified() || self.local.ip() == addr.ip())
    }
}

#[derive(Debug, Default)]
pub struct SinkTable {
    sinks: Vec<PacketSink>,
}

impl SinkTable {
    /// 登记一个 sink，并安排它的开启/关闭事件
    pub fn add(&mut self, sink: PacketSink, sim: &mut Simulator) -> usize {
        let idx = self.sinks.len();
        sim.schedule(sink.start, SinkOpen { idx });
        sim.schedule(sink.stop, SinkClose { idx });
        self.sinks.push(sink);
        idx
    }

    pub fn get(&self, idx: usize) -> Option<&PacketSink> {
        self.sinks.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PacketSink> {
        self.sinks.iter()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// 是否存在覆盖 `node` 上 `addr` 的 sink（不论是否已开启）
    pub fn has_sink(&self, node: NodeId, addr: &SocketAddrV4) -> bool {
        self.sinks.iter().any(|s| s.matches(node, addr))
    }

    pub fn is_listening(&self, node: NodeId, addr: &SocketAddrV4) -> bool {
        self.sinks
            .iter()
            .any(|s| s.listening && s.matches(node, addr))
    }

    pub fn on_data(&mut self, node: NodeId, addr: &SocketAddrV4, bytes: u64) {
        if let Some(s) = self
            .sinks
            .iter_mut()
            .find(|s| s.listening && s.matches(node, addr))
        {
            s.rx_bytes += bytes;
            s.rx_deliveries += 1;
        }
    }

    fn set_listening(&mut self, idx: usize, on: bool) {
        if let Some(s) = self.sinks.get_mut(idx) {
            s.listening = on;
            debug!(node = ?s.node, local = %s.local, listening = on, "sink 状态变化");
        }
    }
}

fn sinks(world: &mut dyn World) -> &mut SinkTable {
    let w = world
        .as_any_mut()
        .downcast_mut::<NetWorld>()
        .expect("world must be NetWorld");
    &mut w.net.sinks
}

#[derive(Debug)]
pub struct SinkOpen {
    pub idx: usize,
}

impl Event for SinkOpen {
    fn execute(self: Box<Self>, _sim: &mut Simulator, world: &mut dyn World) {
        sinks(world).set_listening(self.idx, true);
    }
}

#[derive(Debug)]
pub struct SinkClose {
    pub idx: usize,
}

impl Event for SinkClose {
    fn execute(self: Box<Self>, _sim: &mut Simulator, world: &mut dyn World) {
        sinks(world).set_listening(self.idx, false);
    }
}
