//! 周期定时器
//!
//! `Simulator::every` 注册一个按固定间隔重复触发的任务。定时器由调度器管理：
//! 显式 `cancel`，或在到达停止时间时被统一取消。

use super::event::Event;
use super::simulator::Simulator;
use super::time::SimTime;
use super::world::World;

/// 定时器标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

/// 周期任务：每次到期时调用 `fire`。
pub trait Timer: Send + 'static {
    fn fire(&mut self, sim: &mut Simulator, world: &mut dyn World);
}

/// 定时器到期事件：执行任务，若仍处于活动状态则按间隔重新入队。
pub(crate) struct TimerFire {
    pub(crate) id: TimerId,
    pub(crate) interval: SimTime,
    pub(crate) timer: Box<dyn Timer>,
}

impl Event for TimerFire {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let mut me = *self;
        if !sim.timer_active(me.id) {
            return;
        }
        me.timer.fire(sim, world);

        if sim.timer_active(me.id) && !sim.is_halted() {
            let next = sim.now().saturating_add(me.interval);
            sim.schedule(next, me);
        }
    }
}
