//! 网络模拟模块
//!
//! 此模块包含网络模拟的核心组件，如节点、链路、地址、路由、数据包和网络拓扑。

// 子模块声明
mod addr;
mod id;
mod link;
mod link_events;
mod net_world;
mod network;
mod network_proto;
mod node;
mod packet;
mod routing;
mod stats;
mod transport;

// 重新导出公共接口
pub use addr::{AddressAllocator, AddressBlock, Iface};
pub use id::{LinkId, NodeId};
pub use link::{Link, LinkSpec, P2pLink};
pub use link_events::{DeliverPacket, LinkReady};
pub use net_world::NetWorld;
pub use network::Network;
pub use node::{Node, NodeNames};
pub use packet::{FiveTuple, PROTO_TCP, Packet};
pub use routing::RoutingTable;
pub use stats::{DropReason, Stats};
pub use transport::{TcpSegment, Transport};
