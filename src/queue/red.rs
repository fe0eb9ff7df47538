//! RED（Random Early Detection）队列
//!
//! 行为对齐经典 RED（Floyd & Jacobson）以及 ns-2 的实现细节：
//! - 每次入队用 EWMA 更新平均队长；队列空闲过的时间按 `ptc` 折算成“虚拟出队包数”衰减平均值
//! - `avg < min_th` 不丢；`min_th <= avg < max_th` 按概率早丢；
//!   `avg >= max_th`（gentle 模式为 `2 * max_th`）强制丢
//! - gentle 模式下 `max_th..2*max_th` 之间丢包概率从 `max_p` 线性升到 1
//! - wait 模式下两次丢包之间至少间隔约 `1/p` 个包
//! - 字节模式下概率再按包大小 / 平均包大小缩放
//!
//! 随机数来自按配置种子初始化的 `StdRng`，同一配置的两次运行完全一致。

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{HarnessError, Result};
use crate::net::{DropReason, Packet};
use crate::sim::SimTime;

use super::{PacketQueue, QueueMode, Rejected};

/// 以“包”为单位的阈值组；字节模式下全部乘以平均包大小。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedThresholds {
    pub min_th: f64,
    pub max_th: f64,
    pub queue_limit: u64,
}

impl RedThresholds {
    pub fn scaled(self, mode: QueueMode, mean_pkt_size: u32) -> RedThresholds {
        match mode {
            QueueMode::Packets => self,
            QueueMode::Bytes => {
                let mean = mean_pkt_size as f64;
                RedThresholds {
                    min_th: self.min_th * mean,
                    max_th: self.max_th * mean,
                    queue_limit: self.queue_limit.saturating_mul(mean_pkt_size as u64),
                }
            }
        }
    }
}

/// RED 参数集
#[derive(Debug, Clone, PartialEq)]
pub struct RedConfig {
    pub mode: QueueMode,
    pub min_th: f64,
    pub max_th: f64,
    /// EWMA 权重
    pub q_w: f64,
    /// 队列容量（单位同 `mode`）
    pub queue_limit: u64,
    pub mean_pkt_size: u32,
    pub gentle: bool,
    /// 强制丢包时清零丢包间隔计数（ns-1 兼容）
    pub ns1_compat: bool,
    pub wait: bool,
    pub link_bandwidth_bps: u64,
    pub link_delay: SimTime,
    /// `1 / max_p`
    pub l_interm: f64,
    pub seed: u64,
}

impl Default for RedConfig {
    fn default() -> Self {
        Self {
            mode: QueueMode::Packets,
            min_th: 5.0,
            max_th: 15.0,
            q_w: 0.002,
            queue_limit: 25,
            mean_pkt_size: 500,
            gentle: true,
            ns1_compat: false,
            wait: true,
            link_bandwidth_bps: 1_500_000,
            link_delay: SimTime::from_millis(20),
            l_interm: 50.0,
            seed: 1,
        }
    }
}

impl RedConfig {
    /// 按模式设置阈值；`th` 以包为单位给出。
    pub fn with_thresholds(mut self, mode: QueueMode, th: RedThresholds) -> Self {
        let th = th.scaled(mode, self.mean_pkt_size);
        self.mode = mode;
        self.min_th = th.min_th;
        self.max_th = th.max_th;
        self.queue_limit = th.queue_limit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_th < self.max_th) {
            return Err(HarnessError::ThresholdOrder {
                min_th: self.min_th,
                max_th: self.max_th,
            });
        }
        if self.min_th < 0.0 {
            return Err(HarnessError::InvalidRed(format!(
                "min_th {} is negative",
                self.min_th
            )));
        }
        if self.queue_limit == 0 {
            return Err(HarnessError::InvalidRed("queue limit must be positive".into()));
        }
        if !(self.q_w > 0.0 && self.q_w <= 1.0) {
            return Err(HarnessError::InvalidRed(format!(
                "q_w {} outside (0, 1]",
                self.q_w
            )));
        }
        if self.mean_pkt_size == 0 {
            return Err(HarnessError::InvalidRed("mean packet size must be positive".into()));
        }
        if !(self.l_interm > 0.0) {
            return Err(HarnessError::InvalidRed(format!(
                "l_interm {} must be positive",
                self.l_interm
            )));
        }
        if self.link_bandwidth_bps == 0 {
            return Err(HarnessError::InvalidRed("link bandwidth must be positive".into()));
        }
        Ok(())
    }
}

/// 构建后对已安装 RED 队列的覆盖（模式 + 阈值 + 容量）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedOverride {
    pub mode: QueueMode,
    pub min_th: f64,
    pub max_th: f64,
    pub queue_limit: u64,
}

impl RedOverride {
    /// ns-2 参考脚本中反向瓶颈队列使用的包模式参数
    pub const NS2_PACKET_MODE: RedOverride = RedOverride {
        mode: QueueMode::Packets,
        min_th: 5.0,
        max_th: 15.0,
        queue_limit: 25,
    };

    /// 与 `RedConfig::validate` 相同的阈值与容量检查
    pub fn validate(&self) -> Result<()> {
        if !(self.min_th < self.max_th) {
            return Err(HarnessError::ThresholdOrder {
                min_th: self.min_th,
                max_th: self.max_th,
            });
        }
        if self.min_th < 0.0 {
            return Err(HarnessError::InvalidRed(format!(
                "override min_th {} is negative",
                self.min_th
            )));
        }
        if self.queue_limit == 0 {
            return Err(HarnessError::InvalidRed(
                "override queue limit must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RedStats {
    /// 概率早丢
    pub unforced_drops: u64,
    /// 平均队长超过上限的强制丢
    pub forced_drops: u64,
    /// 队列满丢
    pub qlim_drops: u64,
}

#[derive(Debug)]
pub struct RedQueue {
    cfg: RedConfig,
    q: VecDeque<Packet>,
    cur_bytes: u64,
    peak: u64,
    started: bool,

    // 由配置推导
    ptc: f64,
    v_a: f64,
    v_b: f64,
    v_c: f64,
    v_d: f64,
    cur_max_p: f64,

    // 运行状态
    q_avg: f64,
    count: u64,
    count_bytes: u64,
    old: bool,
    idle: bool,
    idle_time: SimTime,
    v_prob: f64,

    rng: StdRng,
    stats: RedStats,
}

impl RedQueue {
    pub fn new(cfg: RedConfig) -> Self {
        let rng = StdRng::seed_from_u64(cfg.seed);
        let mut q = Self {
            cfg,
            q: VecDeque::new(),
            cur_bytes: 0,
            peak: 0,
            started: false,
            ptc: 0.0,
            v_a: 0.0,
            v_b: 0.0,
            v_c: 0.0,
            v_d: 0.0,
            cur_max_p: 0.0,
            q_avg: 0.0,
            count: 0,
            count_bytes: 0,
            old: false,
            idle: true,
            idle_time: SimTime::ZERO,
            v_prob: 0.0,
            rng,
            stats: RedStats::default(),
        };
        q.derive_params();
        q
    }

    pub fn config(&self) -> &RedConfig {
        &self.cfg
    }

    pub fn stats(&self) -> RedStats {
        self.stats
    }

    /// 当前平均队长估计
    pub fn average(&self) -> f64 {
        self.q_avg
    }

    pub fn set_mode(&mut self, mode: QueueMode) {
        debug!(?mode, "RED 设置模式");
        self.cfg.mode = mode;
    }

    pub fn set_th(&mut self, min_th: f64, max_th: f64) -> Result<()> {
        if !(min_th < max_th) {
            return Err(HarnessError::ThresholdOrder { min_th, max_th });
        }
        debug!(min_th, max_th, "RED 设置阈值");
        self.cfg.min_th = min_th;
        self.cfg.max_th = max_th;
        self.derive_params();
        Ok(())
    }

    pub fn set_queue_limit(&mut self, limit: u64) {
        debug!(limit, "RED 设置队列容量");
        self.cfg.queue_limit = limit;
    }

    pub fn apply(&mut self, ov: RedOverride) -> Result<()> {
        ov.validate()?;
        self.set_th(ov.min_th, ov.max_th)?;
        self.set_mode(ov.mode);
        self.set_queue_limit(ov.queue_limit);
        Ok(())
    }

    fn derive_params(&mut self) {
        let c = &self.cfg;
        self.ptc = c.link_bandwidth_bps as f64 / (8.0 * c.mean_pkt_size.max(1) as f64);
        let mut th_diff = c.max_th - c.min_th;
        if th_diff == 0.0 {
            th_diff = 1.0;
        }
        self.v_a = 1.0 / th_diff;
        self.cur_max_p = 1.0 / c.l_interm;
        self.v_b = -c.min_th / th_diff;
        if c.gentle {
            self.v_c = (1.0 - self.cur_max_p) / c.max_th;
            self.v_d = 2.0 * self.cur_max_p - 1.0;
        }
    }

    fn reset_state(&mut self) {
        self.q_avg = 0.0;
        self.count = 0;
        self.count_bytes = 0;
        self.old = false;
        self.idle = true;
        self.idle_time = SimTime::ZERO;
        self.v_prob = 0.0;
    }

    /// avg' = avg * (1 - w)^m + w * n
    fn estimate(n_queued: f64, m: f64, q_avg: f64, q_w: f64) -> f64 {
        q_avg * (1.0 - q_w).powf(m) + q_w * n_queued
    }

    /// 基础丢包概率（线性段 / gentle 段）
    fn calculate_p_new(&self) -> f64 {
        let c = &self.cfg;
        let p = if c.gentle && self.q_avg >= c.max_th {
            self.v_c * self.q_avg + self.v_d
        } else if !c.gentle && self.q_avg >= c.max_th {
            1.0
        } else {
            (self.v_a * self.q_avg + self.v_b) * self.cur_max_p
        };
        p.min(1.0)
    }

    /// 按自上次丢包以来的计数修正概率
    fn modify_p(&self, p: f64, size: u32) -> f64 {
        let c = &self.cfg;
        let count1 = match c.mode {
            QueueMode::Bytes => (self.count_bytes / c.mean_pkt_size.max(1) as u64) as f64,
            QueueMode::Packets => self.count as f64,
        };
        let cp = count1 * p;
        let mut p = if c.wait {
            if cp < 1.0 {
                0.0
            } else if cp < 2.0 {
                p / (2.0 - cp)
            } else {
                1.0
            }
        } else if cp < 1.0 {
            p / (1.0 - cp)
        } else {
            1.0
        };
        if c.mode == QueueMode::Bytes && p < 1.0 {
            p = p * size as f64 / c.mean_pkt_size.max(1) as f64;
        }
        p.min(1.0)
    }

    fn drop_early(&mut self, size: u32) -> bool {
        let p1 = self.calculate_p_new();
        self.v_prob = self.modify_p(p1, size);
        let u: f64 = self.rng.r#gen();
        if u < self.v_prob {
            self.count = 0;
            self.count_bytes = 0;
            return true;
        }
        false
    }
}

impl PacketQueue for RedQueue {
    fn enqueue(&mut self, pkt: Packet, now: SimTime) -> std::result::Result<(), Rejected> {
        if !self.started {
            self.derive_params();
            self.reset_state();
            self.started = true;
        }

        let n_queued = self.occupancy() as f64;
        let mut m = 0.0;
        if self.idle {
            m = (self.ptc * now.saturating_sub(self.idle_time).as_secs_f64()).floor();
            self.idle = false;
        }
        self.q_avg = Self::estimate(n_queued, m + 1.0, self.q_avg, self.cfg.q_w);
        self.count += 1;
        self.count_bytes += pkt.size_bytes as u64;

        let mut reason = None;
        if self.q_avg >= self.cfg.min_th && n_queued > 1.0 {
            let limit = if self.cfg.gentle {
                2.0 * self.cfg.max_th
            } else {
                self.cfg.max_th
            };
            if self.q_avg >= limit {
                reason = Some(DropReason::RedForced);
            } else if !self.old {
                // 刚越过 min_th：重新开始计数
                self.count = 1;
                self.count_bytes = pkt.size_bytes as u64;
                self.old = true;
            } else if self.drop_early(pkt.size_bytes) {
                reason = Some(DropReason::RedUnforced);
            }
        } else {
            self.v_prob = 0.0;
            self.old = false;
        }

        let units = self.cfg.mode.units_of(&pkt);
        if self.occupancy().saturating_add(units) > self.cfg.queue_limit {
            reason = Some(DropReason::QueueLimit);
        }

        trace!(
            pkt_id = pkt.id,
            n_queued,
            q_avg = self.q_avg,
            v_prob = self.v_prob,
            ?reason,
            "RED 入队判定"
        );

        match reason {
            None => {
                self.cur_bytes = self.cur_bytes.saturating_add(pkt.size_bytes as u64);
                self.q.push_back(pkt);
                self.peak = self.peak.max(self.occupancy());
                Ok(())
            }
            Some(reason) => {
                match reason {
                    DropReason::RedUnforced => self.stats.unforced_drops += 1,
                    DropReason::RedForced => self.stats.forced_drops += 1,
                    _ => self.stats.qlim_drops += 1,
                }
                if reason != DropReason::RedUnforced && self.cfg.ns1_compat {
                    self.count = 0;
                    self.count_bytes = 0;
                }
                Err(Rejected { pkt, reason })
            }
        }
    }

    fn dequeue(&mut self, now: SimTime) -> Option<Packet> {
        match self.q.pop_front() {
            None => {
                self.idle = true;
                self.idle_time = now;
                None
            }
            Some(pkt) => {
                self.idle = false;
                self.cur_bytes = self.cur_bytes.saturating_sub(pkt.size_bytes as u64);
                Some(pkt)
            }
        }
    }

    fn len(&self) -> usize {
        self.q.len()
    }

    fn bytes(&self) -> u64 {
        self.cur_bytes
    }

    fn occupancy(&self) -> u64 {
        match self.cfg.mode {
            QueueMode::Packets => self.q.len() as u64,
            QueueMode::Bytes => self.cur_bytes,
        }
    }

    fn peak_occupancy(&self) -> u64 {
        self.peak
    }

    fn mode(&self) -> QueueMode {
        self.cfg.mode
    }
}
