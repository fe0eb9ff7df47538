//! Dumbbell 拓扑构建
//!
//! ```text
//!  n0 ---+                 +--- n4
//!        |                 |
//!        n2 ---(RED)--- n3
//!        |                 |
//!  n1 ---+                 +--- n5
//! ```
//!
//! 接入链路使用尾丢弃队列，n2-n3 瓶颈链路两个方向都安装 RED 队列。

use std::net::{Ipv4Addr, SocketAddrV4};

use tracing::info;

use crate::error::Result;
use crate::net::{AddressBlock, LinkId, LinkSpec, NetWorld, NodeId, P2pLink};
use crate::queue::{DEFAULT_DROPTAIL_PKTS, QueueMode, QueueSpec, RedConfig};
use crate::sim::SimTime;

/// Dumbbell 拓扑配置选项
#[derive(Debug, Clone)]
pub struct DumbbellOpts {
    pub access_bps: u64,
    /// n0-n2、n1-n2、n3-n4、n3-n5 的传播时延
    pub access_delays: [SimTime; 4],
    pub backbone_bps: u64,
    pub backbone_delay: SimTime,
    pub droptail_limit: u64,
    /// 每条链路一个 /24，依次为 n0n2、n1n2、n2n3、n3n4、n3n5
    pub blocks: [Ipv4Addr; 5],
}

impl Default for DumbbellOpts {
    fn default() -> Self {
        Self {
            access_bps: 10_000_000,
            access_delays: [
                SimTime::from_millis(2),
                SimTime::from_millis(3),
                SimTime::from_millis(4),
                SimTime::from_millis(5),
            ],
            backbone_bps: 1_500_000,
            backbone_delay: SimTime::from_millis(20),
            droptail_limit: DEFAULT_DROPTAIL_PKTS,
            blocks: [
                Ipv4Addr::new(10, 1, 1, 0),
                Ipv4Addr::new(10, 1, 2, 0),
                Ipv4Addr::new(10, 1, 3, 0),
                Ipv4Addr::new(10, 1, 4, 0),
                Ipv4Addr::new(10, 1, 5, 0),
            ],
        }
    }
}

/// 构建结果：节点、链路与各接口地址
#[derive(Debug, Clone)]
pub struct Dumbbell {
    pub nodes: [NodeId; 6],
    pub n0n2: P2pLink,
    pub n1n2: P2pLink,
    pub n2n3: P2pLink,
    pub n3n4: P2pLink,
    pub n3n5: P2pLink,
    /// 每条链路两端地址（a 端 `.1`，b 端 `.2`），顺序同 `DumbbellOpts::blocks`
    pub addrs: [[Ipv4Addr; 2]; 5],
}

impl Dumbbell {
    pub fn node(&self, i: usize) -> NodeId {
        self.nodes[i]
    }

    /// 被监控的瓶颈队列：n2 -> n3
    pub fn monitored_queue(&self) -> LinkId {
        self.n2n3.device(0)
    }

    /// 瓶颈反方向队列：n3 -> n2
    pub fn reverse_backbone_queue(&self) -> LinkId {
        self.n2n3.device(1)
    }

    /// `(节点序号, 端口)` 对应的套接字地址；节点没有接口时返回 None
    pub fn socket_of(&self, world: &NetWorld, node: usize, port: u16) -> Option<SocketAddrV4> {
        world
            .net
            .node(self.nodes[node])
            .ifaces()
            .first()
            .map(|i| SocketAddrV4::new(i.addr, port))
    }
}

/// 构建 dumbbell 拓扑并计算路由
pub fn build_dumbbell(world: &mut NetWorld, opts: &DumbbellOpts, red: &RedConfig) -> Result<Dumbbell> {
    red.validate()?;
    let net = &mut world.net;

    let mut nodes = [NodeId(0); 6];
    for (i, n) in nodes.iter_mut().enumerate() {
        *n = net.add_node(&format!("n{i}"))?;
    }

    let access = |delay: SimTime| LinkSpec {
        bandwidth_bps: opts.access_bps,
        latency: delay,
        queue: QueueSpec::DropTail {
            mode: QueueMode::Packets,
            limit: opts.droptail_limit,
        },
    };
    let backbone = LinkSpec {
        bandwidth_bps: opts.backbone_bps,
        latency: opts.backbone_delay,
        queue: QueueSpec::Red(red.clone()),
    };

    let n0n2 = net.connect_p2p(nodes[0], nodes[2], &access(opts.access_delays[0]));
    let n1n2 = net.connect_p2p(nodes[1], nodes[2], &access(opts.access_delays[1]));
    let n2n3 = net.connect_p2p(nodes[2], nodes[3], &backbone);
    let n3n4 = net.connect_p2p(nodes[3], nodes[4], &access(opts.access_delays[2]));
    let n3n5 = net.connect_p2p(nodes[3], nodes[5], &access(opts.access_delays[3]));

    let mut addrs = [[Ipv4Addr::UNSPECIFIED; 2]; 5];
    for (i, link) in [n0n2, n1n2, n2n3, n3n4, n3n5].iter().enumerate() {
        addrs[i] = net.assign_block(link, AddressBlock::new(opts.blocks[i], 24))?;
    }

    net.populate_routing();
    info!(mode = ?red.mode, min_th = red.min_th, max_th = red.max_th, limit = red.queue_limit, "🏗️ dumbbell 拓扑就绪");

    Ok(Dumbbell {
        nodes,
        n0n2,
        n1n2,
        n2n3,
        n3n4,
        n3n5,
        addrs,
    })
}
