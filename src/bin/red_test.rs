//! RED 验证实验（变体 4 / 5）
//!
//! 在 n0,n1 -> n2 -> n3 -> n4,n5 的 dumbbell 上运行四条 on/off TCP 流，
//! 采样 n2 -> n3 的 RED 队列占用，输出时间序列、流统计和（可选）packet trace。

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use redsim_rs::config::{ExperimentConfig, RedTest};
use redsim_rs::experiment::Experiment;

#[derive(Debug, Parser)]
#[command(name = "red-test", about = "RED 队列验证实验：--testnumber=4（包模式）或 5（字节模式）")]
struct Args {
    /// 实验变体：4 或 5（其他取值一律打印用法并退出）
    #[arg(long, allow_hyphen_values = true)]
    testnumber: Option<String>,

    /// 输出目录
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// 输出 packet trace（red-trace.json）
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    write_results: bool,

    /// 启用流统计（red-flowmon.json）
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    flow_monitor: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();

    let test = args
        .testnumber
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .and_then(|n| RedTest::try_from(n).ok());
    let Some(test) = test else {
        println!("Please, use arg --testnumber=4/5");
        return ExitCode::from(1);
    };

    if let Err(e) = fs::create_dir_all(&args.out_dir) {
        eprintln!("cannot create {}: {e}", args.out_dir.display());
        return ExitCode::from(1);
    }

    let mut cfg = ExperimentConfig::for_test(test);
    cfg.out_dir = Some(args.out_dir);
    cfg.write_results = args.write_results;
    cfg.flow_monitor = args.flow_monitor;

    let outcome = match Experiment::new(cfg).and_then(Experiment::run) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("red-test failed: {e}");
            return ExitCode::from(1);
        }
    };

    let m = &outcome.monitored;
    println!(
        "done: test={} samples={} events={}\n  red n2->n3: mode={:?} peak={} unforced={} forced={} qlim={}\n  red n3->n2: mode={:?} peak={} limit={}",
        test.number(),
        outcome.samples.len(),
        outcome.executed_events,
        m.mode,
        m.peak_occupancy,
        m.stats.unforced_drops,
        m.stats.forced_drops,
        m.stats.qlim_drops,
        outcome.reverse.mode,
        outcome.reverse.peak_occupancy,
        outcome.reverse.queue_limit,
    );
    for f in &outcome.flows {
        println!(
            "  {}: -> {} app_tx={} acked={} sink_rx={} retx={} rto={}",
            f.name, f.remote, f.app_tx_bytes, f.acked_bytes, f.sink_rx_bytes, f.retransmits, f.timeouts
        );
    }
    ExitCode::SUCCESS
}
