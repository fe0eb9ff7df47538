//! 网络世界实现
//!
//! 定义网络仿真的世界（World）实现：网络拓扑 + 流量应用 + 队列监控。

use super::network::Network;
use crate::app::OnOffApp;
use crate::monitor::QueueMonitor;
use crate::sim::{Simulator, World};
use std::any::Any;

/// 网络世界：持有 Network、on/off 应用与队列监控器。
#[derive(Default)]
pub struct NetWorld {
    pub net: Network,
    pub apps: Vec<OnOffApp>,
    pub monitor: Option<QueueMonitor>,
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_stop(&mut self, sim: &mut Simulator) {
        if let Some(m) = self.monitor.as_mut() {
            m.stop(sim.now());
        }
    }
}
