//! 一次性事件

use super::simulator::Simulator;
use super::world::World;

/// 调度后在指定时刻执行一次；`self: Box<Self>` 让事件把自己携带的数据移交出去。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);

    /// 写入事件日志的名字，默认是类型名
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
