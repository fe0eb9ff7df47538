//! 全局路由计算
//!
//! 拓扑（节点、链路、地址）全部建好之后调用一次：对每个目的节点在反向图上做 BFS，
//! 得到按跳数最短的下一跳。存在多个等价下一跳时取链路创建顺序最靠前的一个，
//! 保证同一拓扑每次得到相同的转发表。

use std::collections::{HashMap, VecDeque};

use super::id::NodeId;

#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    built: bool,
    /// (from, dst) -> 下一跳
    next_hop: HashMap<(NodeId, NodeId), NodeId>,
}

impl RoutingTable {
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// 基于当前拓扑重建路由表。
    ///
    /// `adj[from]` 为从 `from` 出发的所有出边邻居（按链路创建顺序）；
    /// `rev_adj[to]` 为所有能到达 `to` 的前驱节点集合。
    pub fn build(&mut self, adj: &[Vec<NodeId>], rev_adj: &[Vec<NodeId>]) {
        let n = adj.len();
        self.next_hop.clear();

        let mut dist: Vec<u32> = vec![u32::MAX; n];
        let mut q: VecDeque<NodeId> = VecDeque::new();

        for dst_idx in 0..n {
            dist.fill(u32::MAX);
            q.clear();

            let dst = NodeId(dst_idx);
            dist[dst_idx] = 0;
            q.push_back(dst);

            while let Some(v) = q.pop_front() {
                let dv = dist[v.0];
                for &pred in &rev_adj[v.0] {
                    if dist[pred.0] == u32::MAX {
                        dist[pred.0] = dv.saturating_add(1);
                        q.push_back(pred);
                    }
                }
            }

            for (from_idx, nbrs) in adj.iter().enumerate() {
                let df = dist[from_idx];
                if from_idx == dst_idx || df == u32::MAX {
                    continue;
                }
                if let Some(&nh) = nbrs.iter().find(|nh| dist[nh.0] == df - 1) {
                    self.next_hop.insert((NodeId(from_idx), dst), nh);
                }
            }
        }

        self.built = true;
    }

    /// 获取 (from, dst) 的下一跳
    pub fn next_hop(&self, from: NodeId, dst: NodeId) -> Option<NodeId> {
        self.next_hop.get(&(from, dst)).copied()
    }

    /// 按下一跳逐跳展开完整路径（含两端）；不可达时返回 None
    pub fn path(&self, src: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
        let mut path = vec![src];
        let mut cur = src;
        while cur != dst {
            cur = self.next_hop(cur, dst)?;
            if path.contains(&cur) {
                return None;
            }
            path.push(cur);
        }
        Some(path)
    }
}
