//! 网络拓扑管理
//!
//! 定义网络拓扑结构，包含节点、链路、地址、路由、数据包转发和统计信息。

use std::collections::HashMap;
use std::net::Ipv4Addr;

use super::addr::{AddressAllocator, AddressBlock, Iface};
use super::link_events::{DeliverPacket, LinkReady};
use super::id::{LinkId, NodeId};
use super::link::{Link, LinkSpec, P2pLink};
use super::node::{Node, NodeNames};
use super::packet::{FiveTuple, Packet};
use super::routing::RoutingTable;
use super::stats::{DropReason, Stats};
use super::transport::Transport;
use crate::app::SinkTable;
use crate::error::{HarnessError, Result};
use crate::flowmon::FlowMonitor;
use crate::proto::tcp::{TcpConfig, TcpStack};
use crate::queue::{PacketQueue, QueueDisc, RedOverride, RedQueue};
use crate::sim::{SimTime, Simulator};
use crate::trace::{TraceEventKind, TraceLogger};
use tracing::{debug, info, trace, warn};

/// 网络拓扑
#[derive(Default)]
pub struct Network {
    nodes: Vec<Node>,
    names: NodeNames,
    links: Vec<Link>,
    edges: HashMap<(NodeId, NodeId), LinkId>,
    addrs: AddressAllocator,
    addr_owner: HashMap<Ipv4Addr, NodeId>,
    routing: RoutingTable,
    next_pkt_id: u64,
    pub stats: Stats,
    pub tcp: TcpStack,
    pub sinks: SinkTable,
    pub(crate) flowmon: Option<FlowMonitor>,
    pub trace: Option<TraceLogger>,
}

impl Network {
    /// 添加节点；名称必须唯一
    pub fn add_node(&mut self, name: &str) -> Result<NodeId> {
        let id = NodeId(self.nodes.len());
        self.names.insert(name, id)?;
        self.nodes.push(Node::new(id, name));
        debug!(node = %name, ?id, "添加节点");
        Ok(id)
    }

    pub fn node_id(&self, name: &str) -> Result<NodeId> {
        self.names.get(name)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// 连接两个节点（创建单向链路，带指定队列）
    pub fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        latency: SimTime,
        bandwidth_bps: u64,
        queue: QueueDisc,
    ) -> LinkId {
        let id = LinkId(self.links.len());
        self.links
            .push(Link::new(from, to, latency, bandwidth_bps, queue));
        self.edges.insert((from, to), id);
        self.routing = RoutingTable::default();
        id
    }

    /// 创建点对点链路：两个方向各自安装一份 `spec.queue` 描述的队列
    pub fn connect_p2p(&mut self, a: NodeId, b: NodeId, spec: &LinkSpec) -> P2pLink {
        let fwd = self.connect(
            a,
            b,
            spec.latency,
            spec.bandwidth_bps,
            QueueDisc::from_spec(&spec.queue),
        );
        let rev = self.connect(
            b,
            a,
            spec.latency,
            spec.bandwidth_bps,
            QueueDisc::from_spec(&spec.queue),
        );
        debug!(
            a = %self.node(a).name(),
            b = %self.node(b).name(),
            bandwidth_bps = spec.bandwidth_bps,
            latency = ?spec.latency,
            "创建点对点链路"
        );
        P2pLink { a, b, fwd, rev }
    }

    /// 为点对点链路分配地址块：a 端取 `.1`，b 端取 `.2`
    pub fn assign_block(&mut self, link: &P2pLink, block: AddressBlock) -> Result<[Ipv4Addr; 2]> {
        let block = self.addrs.claim(block)?;
        let exhausted = || HarnessError::BlockExhausted {
            base: block.base,
            prefix_len: block.prefix_len,
        };
        let addr_a = block.host(1).ok_or_else(exhausted)?;
        let addr_b = block.host(2).ok_or_else(exhausted)?;

        self.nodes[link.a.0].add_iface(Iface {
            addr: addr_a,
            block,
            egress: link.fwd,
        });
        self.nodes[link.b.0].add_iface(Iface {
            addr: addr_b,
            block,
            egress: link.rev,
        });
        self.addr_owner.insert(addr_a, link.a);
        self.addr_owner.insert(addr_b, link.b);
        debug!(%addr_a, %addr_b, "分配地址");
        Ok([addr_a, addr_b])
    }

    /// 在全部链路和地址就绪后计算路由（只需调用一次）
    pub fn populate_routing(&mut self) {
        let n = self.nodes.len();
        let mut adj = vec![Vec::new(); n];
        let mut rev_adj = vec![Vec::new(); n];
        for l in &self.links {
            adj[l.from.0].push(l.to);
            rev_adj[l.to.0].push(l.from);
        }
        self.routing.build(&adj, &rev_adj);
        info!(nodes = n, links = self.links.len(), "🧭 路由表已生成");
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    /// 地址 -> 节点
    pub fn resolve(&self, addr: Ipv4Addr) -> Result<NodeId> {
        self.addr_owner
            .get(&addr)
            .copied()
            .ok_or(HarnessError::NoRoute(addr))
    }

    /// `node` 发往 `dst` 时使用的源地址（出接口地址）
    pub fn source_addr(&self, node: NodeId, dst: NodeId) -> Option<Ipv4Addr> {
        let ifaces = self.nodes[node.0].ifaces();
        let via = self
            .routing
            .next_hop(node, dst)
            .and_then(|nh| self.edges.get(&(node, nh)).copied());
        via.and_then(|l| ifaces.iter().find(|i| i.egress == l))
            .or_else(|| ifaces.first())
            .map(|i| i.addr)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0)
    }

    pub fn link_between(&self, from: NodeId, to: NodeId) -> Option<LinkId> {
        self.edges.get(&(from, to)).copied()
    }

    /// 获取链路上的 RED 队列
    pub fn red_queue(&self, id: LinkId) -> Result<&RedQueue> {
        let link = self
            .links
            .get(id.0)
            .ok_or(HarnessError::QueueUnavailable(id))?;
        link.queue.as_red().ok_or(HarnessError::NotRed(id))
    }

    /// 构建后覆盖某条链路上已安装的 RED 队列参数（只影响该链路）
    pub fn override_red(&mut self, id: LinkId, ov: RedOverride) -> Result<()> {
        let link = self
            .links
            .get_mut(id.0)
            .ok_or(HarnessError::QueueUnavailable(id))?;
        let red = link.queue.as_red_mut().ok_or(HarnessError::NotRed(id))?;
        red.apply(ov)?;
        info!(link = ?id, ?ov, "🔧 覆盖 RED 队列参数");
        Ok(())
    }

    /// 设置全局 TCP 默认参数（须在任何流启动之前）
    pub fn set_tcp_config(&mut self, cfg: TcpConfig) {
        self.tcp.set_config(cfg);
    }

    pub fn install_flow_monitor(&mut self, fm: FlowMonitor) {
        self.flowmon = Some(fm);
    }

    /// 取出流监控器；之后的 packet 事件不再被记录
    pub fn take_flow_monitor(&mut self) -> Option<FlowMonitor> {
        self.flowmon.take()
    }

    /// 创建数据包
    pub fn make_packet(
        &mut self,
        conn_id: u64,
        size_bytes: u32,
        src: NodeId,
        dst: NodeId,
        tuple: FiveTuple,
        transport: Transport,
    ) -> Packet {
        let id = self.next_pkt_id;
        self.next_pkt_id = self.next_pkt_id.wrapping_add(1);
        Packet {
            id,
            conn_id,
            size_bytes,
            src,
            dst,
            tuple,
            transport,
            hops: 0,
        }
    }

    /// 源节点发出数据包（流监控在此记录发送）
    pub fn send(&mut self, pkt: Packet, sim: &mut Simulator) {
        if let Some(fm) = self.flowmon.as_mut() {
            fm.on_send(&pkt, sim.now());
        }
        let src = pkt.src;
        self.forward_from(src, pkt, sim);
    }

    /// 从指定节点转发数据包：查路由，进入对应链路的发送队列
    #[tracing::instrument(level = "trace", skip(self, sim, pkt), fields(pkt_id = pkt.id, from = ?from))]
    pub fn forward_from(&mut self, from: NodeId, pkt: Packet, sim: &mut Simulator) {
        let Some(to) = self.routing.next_hop(from, pkt.dst) else {
            warn!(from = ?from, dst = ?pkt.dst, "无路由，丢弃");
            self.drop_packet(from, pkt, DropReason::NoRoute, sim.now());
            return;
        };
        let Some(link_id) = self.edges.get(&(from, to)).copied() else {
            warn!(from = ?from, to = ?to, "路由指向不存在的链路，丢弃");
            self.drop_packet(from, pkt, DropReason::NoRoute, sim.now());
            return;
        };
        self.enqueue(link_id, pkt, sim);
    }

    /// packet 进入链路发送队列；链路空闲则立即开始发送
    fn enqueue(&mut self, link_id: LinkId, pkt: Packet, sim: &mut Simulator) {
        let now = sim.now();
        let link = &mut self.links[link_id.0];
        let (from, to) = (link.from, link.to);
        let (pkt_id, size) = (pkt.id, pkt.size_bytes);
        match link.queue.enqueue(pkt, now) {
            Ok(()) => {
                let (q_len, q_bytes) = (link.queue.len(), link.queue.bytes());
                let busy = link.busy;
                trace!(link = ?link_id, pkt_id, q_len, q_bytes, "入队");
                if let Some(t) = self.trace.as_mut() {
                    t.record(
                        now,
                        pkt_id,
                        size,
                        TraceEventKind::Enqueue {
                            link_from: from.0,
                            link_to: to.0,
                            q_pkts: q_len,
                            q_bytes,
                        },
                    );
                }
                if !busy {
                    self.start_tx(link_id, sim);
                }
            }
            Err(rej) => {
                debug!(link = ?link_id, pkt_id, reason = ?rej.reason, "队列丢包");
                self.drop_packet(from, rej.pkt, rej.reason, now);
            }
        }
    }

    /// 从队列取出下一个 packet 开始序列化；队列空则链路转为空闲
    fn start_tx(&mut self, link_id: LinkId, sim: &mut Simulator) {
        let now = sim.now();
        let link = &mut self.links[link_id.0];
        let Some(pkt) = link.queue.dequeue(now) else {
            link.busy = false;
            return;
        };
        link.busy = true;
        let depart = now.saturating_add(link.tx_time(pkt.size_bytes));
        let arrive = depart.saturating_add(link.latency);
        link.tx_pkts += 1;
        link.tx_bytes += pkt.size_bytes as u64;
        let (from, to) = (link.from, link.to);

        trace!(link = ?link_id, pkt_id = pkt.id, ?depart, ?arrive, "开始发送");
        if let Some(t) = self.trace.as_mut() {
            t.record(
                now,
                pkt.id,
                pkt.size_bytes,
                TraceEventKind::Dequeue {
                    link_from: from.0,
                    link_to: to.0,
                    depart_ns: depart.0,
                    arrive_ns: arrive.0,
                },
            );
        }

        sim.schedule(
            depart,
            LinkReady {
                link_id,
                pkt_id: pkt.id,
            },
        );
        sim.schedule(
            arrive,
            DeliverPacket {
                to,
                via: link_id,
                pkt,
            },
        );
    }

    /// 链路完成一次发送
    pub(crate) fn on_link_ready(&mut self, link_id: LinkId, sim: &mut Simulator) {
        self.links[link_id.0].busy = false;
        self.start_tx(link_id, sim);
    }

    /// 将数据包交付给节点处理：到达目的地则上交，否则继续转发
    #[tracing::instrument(level = "trace", skip(self, sim, pkt), fields(pkt_id = pkt.id, to = ?to))]
    pub fn deliver(&mut self, to: NodeId, mut pkt: Packet, sim: &mut Simulator) {
        pkt.hops = pkt.hops.saturating_add(1);
        if to == pkt.dst {
            self.on_delivered(to, pkt, sim);
        } else {
            if let Some(fm) = self.flowmon.as_mut() {
                fm.on_forward(&pkt, sim.now());
            }
            self.forward_from(to, pkt, sim);
        }
    }

    /// 丢弃数据包并记账
    pub(crate) fn drop_packet(&mut self, at: NodeId, pkt: Packet, reason: DropReason, now: SimTime) {
        self.stats.dropped_pkts += 1;
        self.stats.dropped_bytes += pkt.size_bytes as u64;
        *self.stats.drops_by_reason.entry(reason).or_insert(0) += 1;
        if let Some(fm) = self.flowmon.as_mut() {
            fm.on_drop(&pkt, reason, now);
        }
        if let Some(t) = self.trace.as_mut() {
            t.record(now, pkt.id, pkt.size_bytes, TraceEventKind::Drop { node: at.0, reason });
        }
    }
}
