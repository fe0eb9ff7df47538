//! 仿真器
//!
//! 定义事件驱动仿真器，维护当前时间、事件队列、停止时间与周期定时器。

use super::event::Event;
use super::scheduled_event::{EventKey, ScheduledEvent};
use super::time::SimTime;
use super::timer::{Timer, TimerFire, TimerId};
use super::world::World;
use std::collections::{BTreeSet, BinaryHeap};
use tracing::{debug, info, trace, warn};

/// 已执行事件的记录（开启 `record_events` 时保存）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub at: SimTime,
    pub seq: u64,
    pub name: &'static str,
}

/// 事件驱动仿真器：维护当前时间与事件队列。
#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    q: BinaryHeap<ScheduledEvent>,
    stop_at: Option<SimTime>,
    halted: bool,
    finished: bool,
    executed: u64,
    next_timer: u64,
    timers: BTreeSet<TimerId>,
    log: Option<Vec<EventRecord>>,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 已执行的事件数
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// 待执行事件数
    pub fn pending(&self) -> usize {
        self.q.len()
    }

    /// 调度事件在指定时间执行。
    ///
    /// 调度到过去（`at < now`）是编程错误，直接 panic。
    #[tracing::instrument(level = "trace", skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule<E: Event>(&mut self, at: SimTime, ev: E) {
        assert!(
            at >= self.now,
            "cannot schedule {} at {:?}, now is {:?}",
            std::any::type_name::<E>(),
            at,
            self.now
        );
        let seq = self.next_seq;
        trace!(now = ?self.now, seq, "调度事件");

        self.next_seq = self.next_seq.wrapping_add(1);
        self.q.push(ScheduledEvent {
            key: EventKey { at, seq },
            ev: Box::new(ev),
        });
    }

    /// 在 `now + delay` 执行事件
    pub fn schedule_in<E: Event>(&mut self, delay: SimTime, ev: E) {
        let at = self.now.saturating_add(delay);
        self.schedule(at, ev);
    }

    /// 在当前时刻执行事件（排在所有已提交的同一时刻事件之后）
    pub fn schedule_now<E: Event>(&mut self, ev: E) {
        self.schedule_in(SimTime::ZERO, ev);
    }

    /// 设置停止时间：`at >= t` 的事件永远不会被执行。
    pub fn stop_at(&mut self, t: SimTime) {
        debug!(stop_at = ?t, "设置停止时间");
        self.stop_at = Some(t);
    }

    pub fn stop_time(&self) -> Option<SimTime> {
        self.stop_at
    }

    /// 立即中止运行（当前事件执行完毕后生效）
    pub fn halt(&mut self) {
        warn!(now = ?self.now, "⛔ 仿真被中止");
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// 开启事件日志（用于确定性检查）
    pub fn record_events(&mut self, on: bool) {
        self.log = if on { Some(Vec::new()) } else { None };
    }

    pub fn event_log(&self) -> &[EventRecord] {
        self.log.as_deref().unwrap_or(&[])
    }

    /// 注册周期定时器：首次在 `first` 触发，之后每隔 `interval` 触发一次。
    pub fn every<T: Timer>(&mut self, first: SimTime, interval: SimTime, timer: T) -> TimerId {
        assert!(interval > SimTime::ZERO, "timer interval must be positive");
        let id = TimerId(self.next_timer);
        self.next_timer = self.next_timer.wrapping_add(1);
        self.timers.insert(id);
        debug!(timer = ?id, first = ?first, interval = ?interval, "注册周期定时器");
        self.schedule(
            first,
            TimerFire {
                id,
                interval,
                timer: Box::new(timer),
            },
        );
        id
    }

    /// 取消定时器；已入队的到期事件会被忽略。
    pub fn cancel(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }

    pub fn timer_active(&self, id: TimerId) -> bool {
        self.timers.contains(&id)
    }

    /// 运行直到事件队列为空、到达停止时间或被中止。
    ///
    /// 结束时取消所有定时器、丢弃剩余事件，并调用一次 `World::on_stop`。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        if self.finished {
            warn!("仿真已结束，忽略重复 run");
            return;
        }
        info!(stop_at = ?self.stop_at, "▶️  开始运行仿真");
        debug!(now = ?self.now, queue_size = self.q.len(), "初始状态");

        let mut reached_stop = false;
        while let Some(top) = self.q.peek() {
            if self.halted {
                break;
            }
            if let Some(stop) = self.stop_at {
                if top.key.at >= stop {
                    reached_stop = true;
                    break;
                }
            }
            let Some(item) = self.q.pop() else {
                break;
            };
            self.now = item.key.at;
            self.executed += 1;

            trace!(
                event_num = self.executed,
                now = ?self.now,
                seq = item.key.seq,
                remaining_queue = self.q.len(),
                "执行事件"
            );
            if let Some(log) = self.log.as_mut() {
                log.push(EventRecord {
                    at: item.key.at,
                    seq: item.key.seq,
                    name: item.ev.name(),
                });
            }

            item.ev.execute(self, world);
            world.after_event(self);
        }

        if !self.halted {
            if let Some(stop) = self.stop_at {
                self.now = self.now.max(stop);
            }
        }
        let dropped = self.q.len();
        self.q.clear();
        self.timers.clear();
        self.finished = true;

        world.on_stop(self);

        info!(
            total_events = self.executed,
            final_time = ?self.now,
            discarded_events = dropped,
            reached_stop,
            halted = self.halted,
            "✅ 仿真完成"
        );
    }
}
