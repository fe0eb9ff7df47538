//! 数据包类型
//!
//! 定义网络数据包及其五元组。路由按目的节点逐跳查表，packet 不携带完整路径。

use std::net::SocketAddrV4;

use serde::Serialize;

use super::id::NodeId;
use super::transport::Transport;

/// IP 协议号：TCP
pub const PROTO_TCP: u8 = 6;

/// 流分类用的五元组
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FiveTuple {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub protocol: u8,
}

impl FiveTuple {
    pub fn tcp(src: SocketAddrV4, dst: SocketAddrV4) -> Self {
        Self {
            src,
            dst,
            protocol: PROTO_TCP,
        }
    }

    /// 反方向（ACK 流）
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
            protocol: self.protocol,
        }
    }
}

/// 网络数据包
#[derive(Debug, Clone)]
pub struct Packet {
    pub id: u64,
    /// 所属传输层连接
    pub conn_id: u64,
    /// 线上大小（含头部）
    pub size_bytes: u32,
    pub src: NodeId,
    pub dst: NodeId,
    pub tuple: FiveTuple,
    pub transport: Transport,
    /// 已经过的跳数
    pub hops: u32,
}
