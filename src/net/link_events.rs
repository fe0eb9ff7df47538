//! 链路上的两类事件
//!
//! 一个 packet 开始发送后会产生两个事件：序列化结束（depart）时链路空出来，
//! 再过一个传播时延（arrive）后 packet 到达对端节点。

use tracing::trace;

use super::id::{LinkId, NodeId};
use super::net_world::NetWorld;
use super::packet::Packet;
use crate::sim::{Event, Simulator, World};

fn net_world(world: &mut dyn World) -> &mut NetWorld {
    world
        .as_any_mut()
        .downcast_mut::<NetWorld>()
        .expect("world must be NetWorld")
}

/// 链路发完 `pkt_id`，可以从队列取下一个
#[derive(Debug)]
pub struct LinkReady {
    pub link_id: LinkId,
    pub pkt_id: u64,
}

impl Event for LinkReady {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        trace!(link = ?self.link_id, pkt_id = self.pkt_id, now = ?sim.now(), "链路空闲");
        net_world(world).net.on_link_ready(self.link_id, sim);
    }
}

/// packet 经 `via` 到达节点 `to`
#[derive(Debug)]
pub struct DeliverPacket {
    pub to: NodeId,
    pub via: LinkId,
    pub pkt: Packet,
}

impl Event for DeliverPacket {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverPacket { to, via, pkt } = *self;
        trace!(pkt_id = pkt.id, ?to, ?via, now = ?sim.now(), "📨 到达节点");
        net_world(world).net.deliver(to, pkt, sim);
    }
}
