//! 实验配置
//!
//! 所有常量（时间、流、sink、RED 参数、TCP 默认值、采样间隔、输出位置）集中在
//! `ExperimentConfig`。`for_test` 给出标准配置，`validate` 是配置错误的唯一检查点，
//! 在搭建任何拓扑之前调用。

use std::path::PathBuf;

use crate::error::{HarnessError, Result};
use crate::flowmon::DEFAULT_MAX_PER_HOP_DELAY;
use crate::monitor::DEFAULT_SAMPLE_INTERVAL;
use crate::proto::tcp::TcpConfig;
use crate::queue::{QueueMode, RedConfig, RedOverride, RedThresholds};
use crate::sim::SimTime;
use crate::topo::DumbbellOpts;

/// 瞬时队列占用序列
pub const QUEUE_SERIES_FILE: &str = "red-queue.plotme";
/// 运行平均序列
pub const QUEUE_AVG_SERIES_FILE: &str = "red-queue_avg.plotme";
pub const FLOWMON_FILE: &str = "red-flowmon.json";
pub const TRACE_FILE: &str = "red-trace.json";

/// dumbbell 拓扑中的节点数
const NUM_NODES: usize = 6;

/// 实验变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedTest {
    /// 包模式 RED
    Packets,
    /// 字节模式 RED，反向瓶颈队列覆盖为包模式
    Bytes,
}

impl RedTest {
    pub fn number(self) -> u32 {
        match self {
            RedTest::Packets => 4,
            RedTest::Bytes => 5,
        }
    }

    pub fn mode(self) -> QueueMode {
        match self {
            RedTest::Packets => QueueMode::Packets,
            RedTest::Bytes => QueueMode::Bytes,
        }
    }
}

impl TryFrom<u32> for RedTest {
    type Error = HarnessError;

    fn try_from(n: u32) -> Result<Self> {
        match n {
            4 => Ok(RedTest::Packets),
            5 => Ok(RedTest::Bytes),
            other => Err(HarnessError::UnsupportedTest(other)),
        }
    }
}

impl RedConfig {
    /// 变体对应的 RED 参数：包模式 (5, 15, 25)，字节模式再乘平均包大小
    pub fn for_test(test: RedTest) -> RedConfig {
        let base = RedConfig {
            ns1_compat: test == RedTest::Bytes,
            ..RedConfig::default()
        };
        base.with_thresholds(
            test.mode(),
            RedThresholds {
                min_th: 5.0,
                max_th: 15.0,
                queue_limit: 25,
            },
        )
    }
}

/// 一条 on/off 流
#[derive(Debug, Clone)]
pub struct FlowSpec {
    pub name: String,
    /// 源节点序号
    pub src: usize,
    /// 目的节点序号（地址取该节点唯一接口）
    pub dst: usize,
    pub port: u16,
    pub on_time: SimTime,
    pub off_time: SimTime,
    pub rate_bps: u64,
    pub pkt_size: u32,
    pub start: SimTime,
    pub stop: SimTime,
}

#[derive(Debug, Clone)]
pub struct SinkSpec {
    pub node: usize,
    pub port: u16,
    pub start: SimTime,
    pub stop: SimTime,
}

#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub test: RedTest,
    pub red: RedConfig,
    /// 构建后对 n3 -> n2 队列的覆盖
    pub reverse_override: Option<RedOverride>,
    pub topo: DumbbellOpts,
    pub tcp: TcpConfig,
    pub flows: Vec<FlowSpec>,
    pub sinks: Vec<SinkSpec>,
    pub global_start: SimTime,
    pub global_stop: SimTime,
    /// 仿真停止时间（= sink 停止时间）
    pub sim_stop: SimTime,
    pub sample_interval: SimTime,
    pub flowmon_max_delay: SimTime,
    /// 输出目录；None 时结果只保存在内存中
    pub out_dir: Option<PathBuf>,
    pub write_results: bool,
    pub flow_monitor: bool,
    /// 记录事件日志（用于确定性检查）
    pub record_events: bool,
}

impl ExperimentConfig {
    pub fn for_test(test: RedTest) -> Self {
        let global_start = SimTime::ZERO;
        let global_stop = SimTime::from_secs(11);
        let sink_stop = global_stop.saturating_add(SimTime::from_secs(3));
        let flow_stop = SimTime::from_secs(9);
        let flow = |n: u16, src, dst, rate_bps, pkt_size, start| FlowSpec {
            name: format!("flow{n}"),
            src,
            dst,
            port: 50000 + n,
            on_time: SimTime::from_secs(1),
            off_time: SimTime::ZERO,
            rate_bps,
            pkt_size,
            start,
            stop: flow_stop,
        };
        let flows = vec![
            flow(1, 0, 4, 10_000_000, 1000, SimTime::from_millis(200)),
            flow(2, 1, 5, 10_000_000, 1000, SimTime::from_secs(2)),
            flow(3, 4, 0, 10_000_000, 1000, SimTime::from_millis(3500)),
            flow(4, 5, 1, 40, 40, SimTime::from_secs(1)),
        ];
        let sinks = flows
            .iter()
            .map(|f| SinkSpec {
                node: f.dst,
                port: f.port,
                start: global_start,
                stop: sink_stop,
            })
            .collect();

        Self {
            test,
            red: RedConfig::for_test(test),
            reverse_override: match test {
                RedTest::Packets => None,
                RedTest::Bytes => Some(RedOverride::NS2_PACKET_MODE),
            },
            topo: DumbbellOpts::default(),
            tcp: TcpConfig::default(),
            flows,
            sinks,
            global_start,
            global_stop,
            sim_stop: sink_stop,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            flowmon_max_delay: DEFAULT_MAX_PER_HOP_DELAY,
            out_dir: Some(PathBuf::from(".")),
            write_results: true,
            flow_monitor: true,
            record_events: false,
        }
    }

    /// 不写任何文件
    pub fn in_memory(mut self) -> Self {
        self.out_dir = None;
        self
    }

    pub fn out_path(&self, file: &str) -> Option<PathBuf> {
        self.out_dir.as_ref().map(|d| d.join(file))
    }

    fn check_node(&self, idx: usize) -> Result<()> {
        if idx < NUM_NODES {
            Ok(())
        } else {
            Err(HarnessError::UnknownNode(format!("n{idx}")))
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.red.validate()?;
        if let Some(ov) = &self.reverse_override {
            ov.validate()?;
        }

        for s in &self.sinks {
            self.check_node(s.node)?;
            if !(s.start < s.stop && s.stop <= self.sim_stop) {
                return Err(HarnessError::SinkTiming {
                    node: format!("n{}", s.node),
                    port: s.port,
                    start: s.start,
                    stop: s.stop,
                    sim_stop: self.sim_stop,
                });
            }
        }

        for f in &self.flows {
            self.check_node(f.src)?;
            self.check_node(f.dst)?;
            let sink = self
                .sinks
                .iter()
                .find(|s| s.node == f.dst && s.port == f.port)
                .ok_or_else(|| HarnessError::MissingSink {
                    flow: f.name.clone(),
                    node: format!("n{}", f.dst),
                    port: f.port,
                })?;
            if !(f.start < f.stop && f.stop <= sink.stop) {
                return Err(HarnessError::FlowTiming {
                    flow: f.name.clone(),
                    start: f.start,
                    stop: f.stop,
                    sink_stop: sink.stop,
                });
            }
        }
        Ok(())
    }
}
