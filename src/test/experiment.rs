use crate::config::{ExperimentConfig, RedTest};
use crate::experiment::{Experiment, ExperimentOutcome};
use crate::queue::QueueMode;
use crate::sim::SimTime;

fn run(test: RedTest, tweak: impl FnOnce(&mut ExperimentConfig)) -> ExperimentOutcome {
    let mut cfg = ExperimentConfig::for_test(test).in_memory();
    tweak(&mut cfg);
    Experiment::new(cfg).expect("build").run().expect("run")
}

fn assert_series_shape(out: &ExperimentOutcome, max_value: f64) {
    let s = &out.samples;
    assert_eq!(s.len(), 1400, "one sample every 10 ms in [0, 14)");
    assert!(s.windows(2).all(|w| w[0].time < w[1].time));
    assert!(s.iter().all(|x| x.time < SimTime::from_secs(14)));
    assert!(s.iter().all(|x| x.occupancy >= 0.0 && x.occupancy <= max_value));

    // 第 n 个平均值等于前 n 个样本的均值
    let mut sum = 0.0;
    for (i, x) in s.iter().enumerate() {
        sum += x.occupancy;
        let mean = sum / (i + 1) as f64;
        assert!((x.average - mean).abs() < 1e-9 * mean.max(1.0));
    }
}

#[test]
fn packet_variant_series_stays_within_queue_limit() {
    let out = run(RedTest::Packets, |_| {});
    assert_series_shape(&out, 25.0);
    assert_eq!(out.monitored.mode, QueueMode::Packets);
    assert!(out.monitored.peak_occupancy <= 25);
    assert!(out.samples.iter().any(|s| s.occupancy > 0.0));
    assert!(out.trace_events > 0);

    let fm = out.flowmon.as_ref().expect("flow monitor enabled");
    // flow1..flow3 的数据与 ACK；flow4 在停止前凑不够一个包
    assert_eq!(fm.flows.len(), 6);
}

#[test]
fn byte_variant_series_in_bytes_and_reverse_queue_in_packets() {
    let out = run(RedTest::Bytes, |_| {});
    assert_series_shape(&out, 25.0 * 500.0);
    assert_eq!(out.monitored.mode, QueueMode::Bytes);
    assert_eq!(out.monitored.queue_limit, 12_500);
    assert!(out.samples.iter().any(|s| s.occupancy > 25.0), "occupancy is in bytes");

    assert_eq!(out.reverse.mode, QueueMode::Packets);
    assert_eq!(
        (out.reverse.min_th, out.reverse.max_th, out.reverse.queue_limit),
        (5.0, 15.0, 25)
    );
    assert!(out.reverse.peak_occupancy <= 25);
}

#[test]
fn overlapping_flows_congest_the_bottleneck() {
    let out = run(RedTest::Packets, |cfg| {
        cfg.write_results = false;
    });
    let f1 = &out.flows[0];
    let f2 = &out.flows[1];
    assert!(f1.app_tx_bytes > 0 && f2.app_tx_bytes > 0);
    assert!(f1.sink_rx_bytes > 0 && f2.sink_rx_bytes > 0);
    // 两条 10 Mb/s 的流远超 1.5 Mb/s 瓶颈
    let cfg = ExperimentConfig::for_test(RedTest::Packets);
    assert!(cfg.flows[0].rate_bps + cfg.flows[1].rate_bps > cfg.topo.backbone_bps);
    assert!(out.samples.iter().any(|s| s.occupancy > cfg.red.min_th));
    assert!(
        out.monitored.stats.unforced_drops
            + out.monitored.stats.forced_drops
            + out.monitored.stats.qlim_drops
            > 0
    );
    assert_eq!(out.trace_events, 0);
}

#[test]
fn runs_are_deterministic() {
    let once = || {
        run(RedTest::Bytes, |cfg| {
            cfg.record_events = true;
            cfg.write_results = false;
        })
    };
    let a = once();
    let b = once();
    assert!(!a.event_log.is_empty());
    assert_eq!(a.event_log, b.event_log);
    assert_eq!(a.samples, b.samples);
    let json = |o: &ExperimentOutcome| serde_json::to_string(&o.flowmon).expect("json");
    assert_eq!(json(&a), json(&b));
}

#[test]
fn flow_monitor_can_be_disabled() {
    let out = run(RedTest::Packets, |cfg| {
        cfg.flow_monitor = false;
        cfg.write_results = false;
    });
    assert!(out.flowmon.is_none());
    assert_eq!(out.samples.len(), 1400);
}
