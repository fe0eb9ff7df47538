//! 节点与名称表
//!
//! 节点只是可寻址的端点（主机与路由器统一建模），转发逻辑在 `Network` 中。
//! 名称 → 节点的映射由拓扑持有，而不是进程级全局注册表。

use std::collections::HashMap;

use crate::error::{HarnessError, Result};

use super::addr::Iface;
use super::id::NodeId;

/// 网络节点
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    name: String,
    ifaces: Vec<Iface>,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ifaces: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ifaces(&self) -> &[Iface] {
        &self.ifaces
    }

    pub(crate) fn add_iface(&mut self, iface: Iface) {
        self.ifaces.push(iface);
    }
}

/// 节点名称表
#[derive(Debug, Default)]
pub struct NodeNames {
    by_name: HashMap<String, NodeId>,
}

impl NodeNames {
    pub fn insert(&mut self, name: &str, id: NodeId) -> Result<()> {
        if self.by_name.contains_key(name) {
            return Err(HarnessError::DuplicateNode(name.to_string()));
        }
        self.by_name.insert(name.to_string(), id);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<NodeId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| HarnessError::UnknownNode(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
