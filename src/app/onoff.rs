//! On/Off 恒定速率流量源
//!
//! 在 on 期间按 `rate_bps` 的节奏每次向 TCP 连接写入 `pkt_size` 字节；off 期间暂停。
//! 一个 on 期间结束时未凑够一个 packet 的比特数会累积到下一个 on 期间（residual bits），
//! 因此长期平均速率等于 `rate_bps × on / (on + off)`。
//!
//! 所有定时事件都带 epoch：停止或切换状态时 epoch 自增，旧事件到期后直接忽略。

use std::net::SocketAddrV4;

use tracing::{debug, info};

use crate::net::{NetWorld, NodeId};
use crate::proto::tcp::TcpConnId;
use crate::sim::{Event, SimTime, Simulator, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// 尚未启动
    Idle,
    On,
    Off,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct OnOffApp {
    pub name: String,
    pub node: NodeId,
    pub remote: SocketAddrV4,
    pub remote_node: NodeId,
    pub rate_bps: u64,
    pub pkt_size: u32,
    pub on_time: SimTime,
    pub off_time: SimTime,
    pub start: SimTime,
    pub stop: SimTime,

    state: AppState,
    conn: Option<TcpConnId>,
    epoch: u64,
    residual_bits: u64,
    last_start: SimTime,
    /// 已写入 socket 的 packet 数 / 字节数
    pub tx_pkts: u64,
    pub tx_bytes: u64,
}

impl OnOffApp {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        node: NodeId,
        remote: SocketAddrV4,
        remote_node: NodeId,
        rate_bps: u64,
        pkt_size: u32,
        on_time: SimTime,
        off_time: SimTime,
        start: SimTime,
        stop: SimTime,
    ) -> Self {
        Self {
            name: name.into(),
            node,
            remote,
            remote_node,
            rate_bps,
            pkt_size,
            on_time,
            off_time,
            start,
            stop,
            state: AppState::Idle,
            conn: None,
            epoch: 0,
            residual_bits: 0,
            last_start: SimTime::ZERO,
            tx_pkts: 0,
            tx_bytes: 0,
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn conn(&self) -> Option<TcpConnId> {
        self.conn
    }

    /// 发送 `bits` 比特所需时间（向上取整到纳秒）
    fn time_for_bits(&self, bits: u64) -> SimTime {
        let rate = self.rate_bps.max(1) as u128;
        let ns = (bits as u128 * 1_000_000_000).div_ceil(rate);
        SimTime(ns.min(u64::MAX as u128) as u64)
    }

    /// 作废所有在途事件；若正处于 on 期间，把已经“走过”的比特记入 residual
    fn cancel_events(&mut self, now: SimTime) {
        if self.state == AppState::On {
            let elapsed = now.saturating_sub(self.last_start).0 as u128;
            let bits = (elapsed * self.rate_bps as u128 / 1_000_000_000) as u64;
            let pkt_bits = self.pkt_size as u64 * 8;
            self.residual_bits = (self.residual_bits + bits).min(pkt_bits);
        }
        self.epoch += 1;
    }

    fn schedule_next_tx(&mut self, idx: usize, sim: &mut Simulator) {
        let pkt_bits = self.pkt_size as u64 * 8;
        let bits = pkt_bits.saturating_sub(self.residual_bits);
        sim.schedule_in(
            self.time_for_bits(bits),
            AppEvent {
                idx,
                epoch: self.epoch,
                kind: AppEventKind::Send,
            },
        );
    }

    fn start_sending(&mut self, idx: usize, sim: &mut Simulator) {
        self.state = AppState::On;
        self.last_start = sim.now();
        self.schedule_next_tx(idx, sim);
        sim.schedule_in(
            self.on_time,
            AppEvent {
                idx,
                epoch: self.epoch,
                kind: AppEventKind::OnEnd,
            },
        );
    }

    fn schedule_start(&mut self, idx: usize, sim: &mut Simulator) {
        sim.schedule_in(
            self.off_time,
            AppEvent {
                idx,
                epoch: self.epoch,
                kind: AppEventKind::OffEnd,
            },
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEventKind {
    /// 应用启动（打开连接）
    Start,
    /// off 期间结束，进入 on
    OffEnd,
    /// on 期间写出一个 packet
    Send,
    /// on 期间结束，进入 off
    OnEnd,
    /// 应用停止
    Stop,
}

/// 应用事件；`Start` / `Stop` 不受 epoch 约束
#[derive(Debug)]
pub struct AppEvent {
    pub idx: usize,
    pub epoch: u64,
    pub kind: AppEventKind,
}

impl AppEvent {
    /// 安排应用的启动和停止事件
    pub fn schedule_lifetime(app: &OnOffApp, idx: usize, sim: &mut Simulator) {
        sim.schedule(
            app.start,
            AppEvent {
                idx,
                epoch: 0,
                kind: AppEventKind::Start,
            },
        );
        sim.schedule(
            app.stop,
            AppEvent {
                idx,
                epoch: 0,
                kind: AppEventKind::Stop,
            },
        );
    }
}

impl Event for AppEvent {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        let NetWorld { net, apps, .. } = w;
        let Some(app) = apps.get_mut(self.idx) else {
            return;
        };
        if app.state == AppState::Stopped {
            return;
        }
        let now = sim.now();

        match self.kind {
            AppEventKind::Start => {
                if app.state != AppState::Idle {
                    return;
                }
                let local_ip = net
                    .source_addr(app.node, app.remote_node)
                    .unwrap_or(std::net::Ipv4Addr::UNSPECIFIED);
                let conn = net.tcp.connect(app.node, local_ip, app.remote_node, app.remote);
                app.conn = Some(conn);
                app.state = AppState::Off;
                info!(app = %app.name, conn_id = conn, remote = %app.remote, "▶️ 应用启动");
                app.cancel_events(now);
                app.schedule_start(self.idx, sim);
            }
            AppEventKind::Stop => {
                app.cancel_events(now);
                app.state = AppState::Stopped;
                info!(app = %app.name, tx_pkts = app.tx_pkts, tx_bytes = app.tx_bytes, "⏹️ 应用停止");
            }
            _ if self.epoch != app.epoch => {}
            AppEventKind::OffEnd => app.start_sending(self.idx, sim),
            AppEventKind::OnEnd => {
                app.cancel_events(now);
                app.state = AppState::Off;
                app.schedule_start(self.idx, sim);
            }
            AppEventKind::Send => {
                let Some(conn) = app.conn else {
                    return;
                };
                let bytes = app.pkt_size as u64;
                app.tx_pkts += 1;
                app.tx_bytes += bytes;
                app.residual_bits = 0;
                app.last_start = now;
                debug!(app = %app.name, tx_pkts = app.tx_pkts, "写入 socket");
                let mut tcp = std::mem::take(&mut net.tcp);
                tcp.app_write(conn, bytes, sim, net);
                net.tcp = tcp;
                app.schedule_next_tx(self.idx, sim);
            }
        }
    }
}
