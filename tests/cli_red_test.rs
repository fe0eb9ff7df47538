use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "redsim-rs-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn parse_series(raw: &str) -> Vec<(f64, f64)> {
    raw.lines()
        .map(|line| {
            let mut it = line.split_whitespace();
            let t: f64 = it.next().expect("time").parse().expect("time is a number");
            let v: f64 = it.next().expect("value").parse().expect("value is a number");
            assert!(it.next().is_none(), "two columns per line: {line}");
            (t, v)
        })
        .collect()
}

#[test]
fn unsupported_test_number_exits_non_zero_without_artifacts() {
    let dir = unique_temp_dir("red-test-bad");

    for arg in [
        vec!["--testnumber", "3"],
        vec![],
        vec!["--testnumber=abc"],
        vec!["--testnumber=-1"],
        vec!["--testnumber", "-1"],
        vec!["--testnumber=4.0"],
    ] {
        let output = Command::new(env!("CARGO_BIN_EXE_red_test"))
            .args(&arg)
            .arg("--out-dir")
            .arg(&dir)
            .output()
            .expect("run red_test");
        assert_eq!(output.status.code(), Some(1), "args={arg:?}");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(
            stdout.contains("Please, use arg --testnumber=4/5"),
            "args={arg:?} stdout={stdout}"
        );
    }

    let entries = fs::read_dir(&dir).expect("read dir").count();
    assert_eq!(entries, 0, "no artifacts for an unsupported test number");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_four_writes_series_flowmon_and_trace() {
    let dir = unique_temp_dir("red-test-4");
    let output = Command::new(env!("CARGO_BIN_EXE_red_test"))
        .args(["--testnumber", "4", "--out-dir"])
        .arg(&dir)
        .output()
        .expect("run red_test");
    assert!(
        output.status.success(),
        "red_test failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let inst = parse_series(&fs::read_to_string(dir.join("red-queue.plotme")).expect("series"));
    let avg = parse_series(&fs::read_to_string(dir.join("red-queue_avg.plotme")).expect("avg"));
    assert!(!inst.is_empty());
    assert_eq!(inst.len(), avg.len());
    assert!(inst.windows(2).all(|w| w[0].0 < w[1].0));
    assert!(inst.iter().all(|&(t, v)| t < 14.0 && (0.0..=25.0).contains(&v)));

    let raw = fs::read_to_string(dir.join("red-flowmon.json")).expect("flowmon");
    let v: Value = serde_json::from_str(&raw).expect("parse flowmon");
    let flows = v["flows"].as_array().expect("flows");
    assert!(!flows.is_empty());
    assert!(flows.iter().all(|f| f["tx_packets"].as_u64().is_some()));

    let raw = fs::read_to_string(dir.join("red-trace.json")).expect("trace");
    let v: Value = serde_json::from_str(&raw).expect("parse trace");
    assert!(!v.as_array().expect("trace array").is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_five_without_trace_or_flowmon() {
    let dir = unique_temp_dir("red-test-5");
    let output = Command::new(env!("CARGO_BIN_EXE_red_test"))
        .args([
            "--testnumber",
            "5",
            "--write-results",
            "false",
            "--flow-monitor",
            "false",
            "--out-dir",
        ])
        .arg(&dir)
        .output()
        .expect("run red_test");
    assert!(
        output.status.success(),
        "red_test failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let inst = parse_series(&fs::read_to_string(dir.join("red-queue.plotme")).expect("series"));
    assert!(inst.iter().all(|&(_, v)| v <= 25.0 * 500.0));
    assert!(!dir.join("red-trace.json").exists());
    assert!(!dir.join("red-flowmon.json").exists());

    let _ = fs::remove_dir_all(&dir);
}
