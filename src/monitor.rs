//! 周期性队列监控
//!
//! 按固定间隔读取一条链路上 RED 队列的当前占用，维护运行平均值，并把两条时间序列
//! （瞬时值、平均值）追加写入文本文件，每行 `<秒> <值>`。
//!
//! 状态：`Idle -> Sampling -> Stopped`。只有到达停止时间（`World::on_stop`）才进入 Stopped。
//! 采样失败（队列不存在、不是 RED、写文件出错）视为故障：记录错误并中止仿真。

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{HarnessError, Result};
use crate::net::{LinkId, NetWorld, Network};
use crate::queue::PacketQueue;
use crate::sim::{SimTime, Simulator, Timer, TimerId, World};

/// 默认采样间隔
pub const DEFAULT_SAMPLE_INTERVAL: SimTime = SimTime(10_000_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Sampling,
    Stopped,
}

/// 运行平均：第 n 次之后等于前 n 个样本的算术平均
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunningAverage {
    sum: f64,
    count: u64,
}

impl RunningAverage {
    /// 加入一个样本，返回新的平均值
    pub fn push(&mut self, value: f64) -> f64 {
        self.sum += value;
        self.count += 1;
        self.mean()
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueSample {
    pub time: SimTime,
    pub occupancy: f64,
    pub average: f64,
}

#[derive(Debug)]
struct SeriesFiles {
    inst: BufWriter<File>,
    avg: BufWriter<File>,
}

impl SeriesFiles {
    /// 开始采样时截断一次，之后只追加
    fn create(inst: &Path, avg: &Path) -> Result<Self> {
        let open = |p: &Path| -> Result<BufWriter<File>> {
            let f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(p)?;
            Ok(BufWriter::new(f))
        };
        Ok(Self {
            inst: open(inst)?,
            avg: open(avg)?,
        })
    }

    fn append(&mut self, s: &QueueSample) -> Result<()> {
        let t = s.time.as_secs_f64();
        writeln!(self.inst, "{} {}", t, s.occupancy)?;
        writeln!(self.avg, "{} {}", t, s.average)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inst.flush()?;
        self.avg.flush()?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct QueueMonitor {
    link: LinkId,
    interval: SimTime,
    state: MonitorState,
    avg: RunningAverage,
    samples: Vec<QueueSample>,
    paths: Option<(PathBuf, PathBuf)>,
    files: Option<SeriesFiles>,
    timer: Option<TimerId>,
    fault: Option<HarnessError>,
}

impl QueueMonitor {
    /// 监控 `link` 上的 RED 队列；样本只保存在内存中
    pub fn new(link: LinkId, interval: SimTime) -> Self {
        Self {
            link,
            interval,
            state: MonitorState::Idle,
            avg: RunningAverage::default(),
            samples: Vec::new(),
            paths: None,
            files: None,
            timer: None,
            fault: None,
        }
    }

    /// 额外把两条序列写入文件
    pub fn with_files(mut self, inst: impl Into<PathBuf>, avg: impl Into<PathBuf>) -> Self {
        self.paths = Some((inst.into(), avg.into()));
        self
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn samples(&self) -> &[QueueSample] {
        &self.samples
    }

    pub fn running_average(&self) -> RunningAverage {
        self.avg
    }

    /// 取出采样期间发生的故障
    pub fn take_fault(&mut self) -> Option<HarnessError> {
        self.fault.take()
    }

    /// 进入采样状态：截断输出文件，在当前时刻注册周期定时器
    pub fn start(&mut self, sim: &mut Simulator) -> Result<()> {
        if self.state != MonitorState::Idle {
            return Ok(());
        }
        if let Some((inst, avg)) = &self.paths {
            self.files = Some(SeriesFiles::create(inst, avg)?);
        }
        self.state = MonitorState::Sampling;
        self.timer = Some(sim.every(sim.now(), self.interval, MonitorTick));
        info!(link = ?self.link, interval = ?self.interval, "📈 队列监控开始");
        Ok(())
    }

    /// 采一个样本
    fn sample(&mut self, now: SimTime, net: &Network) -> Result<()> {
        let occupancy = net.red_queue(self.link)?.occupancy() as f64;
        let average = self.avg.push(occupancy);
        let s = QueueSample {
            time: now,
            occupancy,
            average,
        };
        if let Some(files) = self.files.as_mut() {
            files.append(&s)?;
        }
        self.samples.push(s);
        debug!(?now, occupancy, average, "队列采样");
        Ok(())
    }

    fn on_tick(&mut self, sim: &mut Simulator, net: &Network) {
        if self.state != MonitorState::Sampling {
            return;
        }
        if let Err(e) = self.sample(sim.now(), net) {
            warn!(error = %e, "❌ 队列监控故障，中止仿真");
            if let Some(id) = self.timer.take() {
                sim.cancel(id);
            }
            self.fault = Some(e);
            sim.halt();
        }
    }

    /// 到达停止时间：不再采样，刷新输出文件
    pub fn stop(&mut self, now: SimTime) {
        if self.state == MonitorState::Stopped {
            return;
        }
        self.state = MonitorState::Stopped;
        self.timer = None;
        if let Some(mut files) = self.files.take() {
            if let Err(e) = files.flush() {
                warn!(error = %e, "刷新监控输出失败");
                self.fault.get_or_insert(e);
            }
        }
        info!(?now, samples = self.samples.len(), "📉 队列监控停止");
    }
}

/// 监控定时器
#[derive(Debug)]
struct MonitorTick;

impl Timer for MonitorTick {
    fn fire(&mut self, sim: &mut Simulator, world: &mut dyn World) {
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        let NetWorld { net, monitor, .. } = w;
        if let Some(m) = monitor.as_mut() {
            m.on_tick(sim, net);
        }
    }
}
