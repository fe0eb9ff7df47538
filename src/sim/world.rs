//! 仿真世界
//!
//! 事件通过 `as_any_mut` 向下转型拿到具体的世界类型（例如 `NetWorld`）。

use super::simulator::Simulator;
use std::any::Any;

pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// 每个事件执行完之后调用
    fn after_event(&mut self, _sim: &mut Simulator) {}

    /// 仿真结束时调用且只调用一次；之后不会再执行任何事件
    fn on_stop(&mut self, _sim: &mut Simulator) {}
}
