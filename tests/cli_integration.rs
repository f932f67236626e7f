// CLI integration tests for bench and completion flows.
use std::process::Command;

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_pooled-cache");
    Command::new(exe)
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn parse_json_line(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().next().expect("json line");
    parse_json(line)
}

fn results_for<'a>(output: &'a Value, bench: &str) -> Vec<&'a Value> {
    output
        .get("results")
        .and_then(|value| value.as_array())
        .expect("results array")
        .iter()
        .filter(|item| item.get("bench").and_then(|v| v.as_str()) == Some(bench))
        .collect()
}

#[test]
fn bench_emits_json_results() {
    let output = cmd()
        .args([
            "bench",
            "--messages",
            "500",
            "--streams",
            "4",
            "--payload-bytes",
            "32,256",
            "--format",
            "json",
        ])
        .output()
        .expect("bench");
    assert!(output.status.success());

    let json = parse_json(std::str::from_utf8(&output.stdout).expect("utf8"));
    assert_eq!(json.get("name").unwrap().as_str().unwrap(), "pooled-cache");
    assert_eq!(json["params"]["messages"], 500);
    assert_eq!(json["params"]["payload_sizes"][1], 256);
    assert!(json["system"]["cpus"].as_u64().unwrap() >= 1);

    let results = json.get("results").unwrap().as_array().unwrap();
    assert_eq!(results.len(), 6);

    for replay in results_for(&json, "replay") {
        assert_eq!(replay["delivered"], 500);
    }
    for follow in results_for(&json, "follow") {
        assert_eq!(follow["delivered"], 500);
    }
}

#[test]
fn bench_config_caps_arenas() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("cache.json");
    std::fs::write(
        &config,
        r#"{
  "cache": {"block_capacity": 32, "arena_capacity": 1024, "max_arenas": 4},
  "eviction": {"min_time_in_cache_ms": 600000, "max_relative_age_ms": 600000}
}"#,
    )
    .expect("write config");

    let output = cmd()
        .args([
            "bench",
            "--config",
            config.to_str().unwrap(),
            "--messages",
            "400",
            "--streams",
            "8",
            "--batch",
            "8",
            "--payload-bytes",
            "128",
            "--format",
            "json",
        ])
        .output()
        .expect("bench");
    assert!(output.status.success());

    let json = parse_json(std::str::from_utf8(&output.stdout).expect("utf8"));
    assert_eq!(json["params"]["cache"]["max_arenas"], 4);
    assert_eq!(json["params"]["eviction"]["min_time_in_cache_ms"], 600000);

    let ingest = results_for(&json, "ingest");
    assert!(ingest[0]["purged"].as_u64().unwrap() > 0);
    assert!(ingest[0]["bytes_in_use"].as_u64().unwrap() <= 4 * 1024);

    let follow = results_for(&json, "follow");
    assert_eq!(follow[0]["delivered"], 400);
    assert!(follow[0]["arenas_released"].as_u64().unwrap() > 0);
}

#[test]
fn bench_flags_override_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("cache.json");
    std::fs::write(&config, r#"{"cache": {"block_capacity": 8}}"#).expect("write config");

    let output = cmd()
        .args([
            "bench",
            "--config",
            config.to_str().unwrap(),
            "--block-capacity",
            "64",
            "--max-relative-age-ms",
            "250",
            "--messages",
            "100",
            "--payload-bytes",
            "16",
            "--format",
            "json",
        ])
        .output()
        .expect("bench");
    assert!(output.status.success());

    let json = parse_json(std::str::from_utf8(&output.stdout).expect("utf8"));
    assert_eq!(json["params"]["cache"]["block_capacity"], 64);
    assert_eq!(json["params"]["eviction"]["max_relative_age_ms"], 250);
    assert_eq!(json["params"]["eviction"]["min_time_in_cache_ms"], 1000);
}

#[test]
fn pool_stats_can_be_logged() {
    let output = cmd()
        .env("RUST_LOG", "info")
        .args([
            "bench",
            "--messages",
            "50",
            "--payload-bytes",
            "16",
            "--format",
            "json",
            "--log-pool-stats",
        ])
        .output()
        .expect("bench");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pool statistics"));
    parse_json(std::str::from_utf8(&output.stdout).expect("utf8"));
}

#[test]
fn invalid_format_is_a_usage_error() {
    let output = cmd()
        .args(["bench", "--messages", "10", "--format", "xml"])
        .output()
        .expect("bench");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(
        err["error"]["message"]
            .as_str()
            .unwrap()
            .contains("--format")
    );
}

#[test]
fn zero_block_capacity_is_rejected() {
    let output = cmd()
        .args(["bench", "--block-capacity", "0"])
        .output()
        .expect("bench");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(err["error"]["hint"].is_string());
}

#[test]
fn missing_config_is_an_io_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("nope.json");
    let output = cmd()
        .args(["bench", "--config", missing.to_str().unwrap()])
        .output()
        .expect("bench");
    assert_eq!(output.status.code(), Some(9));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "Io");
    assert!(err["error"]["causes"].as_array().is_some());
}

#[test]
fn unknown_config_field_is_a_usage_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("cache.json");
    std::fs::write(&config, r#"{"caches": {}}"#).expect("write config");
    let output = cmd()
        .args(["bench", "--config", config.to_str().unwrap()])
        .output()
        .expect("bench");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let output = cmd().args(["bench", "--bogus"]).output().expect("bench");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(err["error"]["hint"].as_str().unwrap().contains("--help"));
}

#[test]
fn no_arguments_prints_help() {
    let output = cmd().output().expect("run");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn completion_generates_bash_script() {
    let output = cmd().args(["completion", "bash"]).output().expect("completion");
    assert!(output.status.success());
    let script = String::from_utf8_lossy(&output.stdout);
    assert!(script.contains("pooled-cache"));
    assert!(script.contains("bench"));
}
