//! RED 验证实验的搭建与运行
//!
//! 顺序：校验配置 -> 构建拓扑并安装 RED -> （变体 5）覆盖反向瓶颈队列 -> 设置 TCP 默认值
//! -> 安装流监控 / trace -> 登记 sink 与 on/off 应用 -> 启动队列监控 -> 运行到停止时间
//! -> 输出流统计与 trace。

use std::net::SocketAddrV4;

use tracing::{info, warn};

use crate::app::{AppEvent, OnOffApp, PacketSink};
use crate::config::{
    ExperimentConfig, FLOWMON_FILE, QUEUE_AVG_SERIES_FILE, QUEUE_SERIES_FILE, TRACE_FILE,
};
use crate::error::{HarnessError, Result};
use crate::flowmon::{FlowMonReport, FlowMonitor};
use crate::monitor::{QueueMonitor, QueueSample};
use crate::net::NetWorld;
use crate::queue::{PacketQueue, QueueMode, RedStats};
use crate::sim::{EventRecord, Simulator};
use crate::topo::{Dumbbell, build_dumbbell};
use crate::trace::TraceLogger;

/// 单条流的发送/接收汇总
#[derive(Debug, Clone)]
pub struct FlowSummary {
    pub name: String,
    pub remote: SocketAddrV4,
    /// 应用写入的字节数
    pub app_tx_bytes: u64,
    /// 被确认的字节数
    pub acked_bytes: u64,
    /// sink 按序收到的字节数
    pub sink_rx_bytes: u64,
    pub retransmits: u64,
    pub timeouts: u64,
}

/// 一条 RED 队列运行结束时的状态
#[derive(Debug, Clone, Copy)]
pub struct RedQueueSummary {
    pub mode: QueueMode,
    pub min_th: f64,
    pub max_th: f64,
    pub queue_limit: u64,
    pub peak_occupancy: u64,
    pub stats: RedStats,
}

#[derive(Debug)]
pub struct ExperimentOutcome {
    pub samples: Vec<QueueSample>,
    pub flowmon: Option<FlowMonReport>,
    pub flows: Vec<FlowSummary>,
    /// n2 -> n3（被监控）
    pub monitored: RedQueueSummary,
    /// n3 -> n2
    pub reverse: RedQueueSummary,
    pub event_log: Vec<EventRecord>,
    pub trace_events: usize,
    pub executed_events: u64,
}

pub struct Experiment {
    cfg: ExperimentConfig,
    sim: Simulator,
    world: NetWorld,
    topo: Dumbbell,
}

impl Experiment {
    /// 校验配置并搭建完整实验（尚未运行）
    pub fn new(cfg: ExperimentConfig) -> Result<Self> {
        cfg.validate()?;
        let mut sim = Simulator::default();
        let mut world = NetWorld::default();

        if cfg.write_results {
            world.net.trace = Some(TraceLogger::default());
        }

        let topo = build_dumbbell(&mut world, &cfg.topo, &cfg.red)?;
        if let Some(ov) = cfg.reverse_override {
            world.net.override_red(topo.reverse_backbone_queue(), ov)?;
        }
        world.net.set_tcp_config(cfg.tcp.clone());

        if cfg.flow_monitor {
            world
                .net
                .install_flow_monitor(FlowMonitor::new(cfg.flowmon_max_delay));
        }

        for s in &cfg.sinks {
            let local = topo
                .socket_of(&world, s.node, s.port)
                .ok_or_else(|| HarnessError::UnknownNode(format!("n{}", s.node)))?;
            let sink = PacketSink::new(topo.node(s.node), local, s.start, s.stop);
            world.net.sinks.add(sink, &mut sim);
        }

        for f in &cfg.flows {
            let remote = topo
                .socket_of(&world, f.dst, f.port)
                .ok_or_else(|| HarnessError::UnknownNode(format!("n{}", f.dst)))?;
            let remote_node = world.net.resolve(*remote.ip())?;
            let app = OnOffApp::new(
                f.name.clone(),
                topo.node(f.src),
                remote,
                remote_node,
                f.rate_bps,
                f.pkt_size,
                f.on_time,
                f.off_time,
                f.start,
                f.stop,
            );
            AppEvent::schedule_lifetime(&app, world.apps.len(), &mut sim);
            info!(flow = %f.name, %remote, rate_bps = f.rate_bps, start = %f.start, stop = %f.stop, "登记流");
            world.apps.push(app);
        }

        let mut monitor = QueueMonitor::new(topo.monitored_queue(), cfg.sample_interval);
        if let (Some(inst), Some(avg)) = (
            cfg.out_path(QUEUE_SERIES_FILE),
            cfg.out_path(QUEUE_AVG_SERIES_FILE),
        ) {
            monitor = monitor.with_files(inst, avg);
        }
        world.monitor = Some(monitor);

        sim.stop_at(cfg.sim_stop);
        sim.record_events(cfg.record_events);

        Ok(Self {
            cfg,
            sim,
            world,
            topo,
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.cfg
    }

    pub fn topology(&self) -> &Dumbbell {
        &self.topo
    }

    pub fn world(&self) -> &NetWorld {
        &self.world
    }

    fn red_summary(&self, link: crate::net::LinkId) -> Result<RedQueueSummary> {
        let red = self.world.net.red_queue(link)?;
        let c = red.config();
        Ok(RedQueueSummary {
            mode: c.mode,
            min_th: c.min_th,
            max_th: c.max_th,
            queue_limit: c.queue_limit,
            peak_occupancy: red.peak_occupancy(),
            stats: red.stats(),
        })
    }

    /// 运行到停止时间并收集结果
    pub fn run(mut self) -> Result<ExperimentOutcome> {
        info!(test = self.cfg.test.number(), stop = %self.cfg.sim_stop, "🚀 开始 RED 实验");
        if let Some(m) = self.world.monitor.as_mut() {
            m.start(&mut self.sim)?;
        }

        self.sim.run(&mut self.world);

        if let Some(fault) = self.world.monitor.as_mut().and_then(|m| m.take_fault()) {
            warn!(error = %fault, "实验因监控故障中止");
            return Err(fault);
        }

        let now = self.sim.now();
        let flowmon = self.world.net.take_flow_monitor().map(|fm| fm.finish(now));
        if let (Some(report), Some(path)) = (flowmon.as_ref(), self.cfg.out_path(FLOWMON_FILE)) {
            report.write_json(&path)?;
        }
        let trace_events = match self.world.net.trace.as_ref() {
            Some(t) => {
                if let Some(path) = self.cfg.out_path(TRACE_FILE) {
                    t.write_json(&path)?;
                }
                t.len()
            }
            None => 0,
        };

        let flows = self
            .world
            .apps
            .iter()
            .map(|app| {
                let conn = app.conn().and_then(|id| self.world.net.tcp.get(id));
                let sink_rx_bytes = self
                    .world
                    .net
                    .sinks
                    .iter()
                    .find(|s| s.node == app.remote_node && s.local.port() == app.remote.port())
                    .map(|s| s.rx_bytes)
                    .unwrap_or(0);
                FlowSummary {
                    name: app.name.clone(),
                    remote: app.remote,
                    app_tx_bytes: app.tx_bytes,
                    acked_bytes: conn.map(|c| c.bytes_acked()).unwrap_or(0),
                    sink_rx_bytes,
                    retransmits: conn.map(|c| c.retransmits).unwrap_or(0),
                    timeouts: conn.map(|c| c.timeouts).unwrap_or(0),
                }
            })
            .collect();

        let monitored = self.red_summary(self.topo.monitored_queue())?;
        let reverse = self.red_summary(self.topo.reverse_backbone_queue())?;
        let samples = self
            .world
            .monitor
            .as_ref()
            .map(|m| m.samples().to_vec())
            .unwrap_or_default();

        info!(
            samples = samples.len(),
            delivered_pkts = self.world.net.stats.delivered_pkts,
            dropped_pkts = self.world.net.stats.dropped_pkts,
            unforced = monitored.stats.unforced_drops,
            forced = monitored.stats.forced_drops,
            "🏁 实验结束"
        );

        Ok(ExperimentOutcome {
            samples,
            flowmon,
            flows,
            monitored,
            reverse,
            event_log: self.sim.event_log().to_vec(),
            trace_events,
            executed_events: self.sim.executed(),
        })
    }
}
