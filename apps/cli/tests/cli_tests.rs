//! 命令行端到端测试（模拟舵机，不访问串口）

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;

fn sample_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/robot.toml")
}

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("servo-cli").unwrap();
    cmd.env_remove("SERVO_CONFIG");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("teleop"))
        .stdout(predicate::str::contains("replay"))
        .stdout(predicate::str::contains("scan"));
}

#[test]
fn test_config_check_prints_summary() {
    cli()
        .arg("--config")
        .arg(sample_config())
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shoulder_pan"))
        .stdout(predicate::str::contains("q/a"))
        .stdout(predicate::str::contains("Configuration OK"));
}

#[test]
fn test_config_from_environment() {
    cli()
        .env("SERVO_CONFIG", sample_config())
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"));
}

#[test]
fn test_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .args(["config", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("robot.toml");
    fs::write(
        &path,
        "[robot]\nport = \"p\"\nbaudrate = 57600\nprotocol_version = 3.0\n[control]\nhz = 50\nstep_units = 10\n[limits]\nfollower_limits_json = \"l.json\"\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("l.json"),
        r#"{"motors": [{"id": 1, "range_min": 0, "range_max": 4095}]}"#,
    )
    .unwrap();

    cli()
        .arg("--config")
        .arg(&path)
        .args(["config", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("protocol_version"));
}

#[test]
fn test_scan_sim_finds_configured_ids() {
    cli()
        .arg("--config")
        .arg(sample_config())
        .args(["scan", "--sim", "--from", "1", "--to", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found ID 1 present="))
        .stdout(predicate::str::contains("Found ID 6 present="))
        .stdout(predicate::str::contains("Found ID 7").not());
}

#[test]
fn test_scan_sim_empty_range_hint() {
    cli()
        .arg("--config")
        .arg(sample_config())
        .args(["scan", "--sim", "--from", "100", "--to", "102"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No devices found"));
}

#[test]
fn test_scan_rejects_reversed_range() {
    cli()
        .arg("--config")
        .arg(sample_config())
        .args(["scan", "--sim", "--from", "9", "--to", "3"])
        .assert()
        .failure();
}

#[test]
fn test_replay_rejects_bad_speed() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.csv");
    fs::write(&log, "unix_ms,estop,torque_on,j1,marker\n").unwrap();

    for speed in ["0", "-1", "6"] {
        cli()
            .args(["replay", "--sim", "--confirm", "--speed", speed, "--input"])
            .arg(&log)
            .assert()
            .failure()
            .stderr(predicate::str::contains("速度倍数"));
    }
}

#[test]
fn test_replay_missing_log_fails() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .arg("--config")
        .arg(sample_config())
        .args(["replay", "--sim", "--confirm", "--input"])
        .arg(dir.path().join("absent.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("会话日志不存在"));
}

#[test]
fn test_replay_sim_session() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.csv");
    fs::write(
        &log,
        "unix_ms,estop,torque_on,j1,j2,j3,j4,j5,j6,marker\n\
         1700000000000,0,1,2048,2000,2000,2000,2048,2200,\n\
         1700000000010,1,1,2058,2000,2000,2000,2048,2200,\n\
         1700000000020,0,0,2068,2000,2000,2000,2048,2200,MARK\n\
         1700000000030,0,1,2078,2010,2000,2000,2048,2200,\n",
    )
    .unwrap();

    cli()
        .arg("--config")
        .arg(sample_config())
        .args(["replay", "--sim", "--confirm", "--speed", "2.0", "--input"])
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("回放完成"))
        .stdout(predicate::str::contains("4 行, 下发 2 行, 跳过 2 行"));
}

#[test]
fn test_replay_rejects_log_without_joint_columns() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.csv");
    fs::write(&log, "unix_ms,estop,torque_on,j1,marker\n1700000000000,0,1,2048,\n").unwrap();

    cli()
        .arg("--config")
        .arg(sample_config())
        .args(["replay", "--sim", "--confirm", "--input"])
        .arg(&log)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no column for joint 2"));
}

#[test]
fn test_teleop_configuration_failure_leaves_no_log() {
    let dir = tempfile::tempdir().unwrap();
    let sample = sample_config();
    // 模式寄存器超出控制表，舵机拒绝写入
    let text = fs::read_to_string(&sample)
        .unwrap()
        .replace("operating_mode = { addr = 11, len = 1 }", "operating_mode = { addr = 300, len = 1 }");
    assert!(text.contains("addr = 300"));
    let config = dir.path().join("robot.toml");
    fs::write(&config, text).unwrap();
    fs::copy(
        sample.with_file_name("Group_Follower.json"),
        dir.path().join("Group_Follower.json"),
    )
    .unwrap();
    let log_dir = dir.path().join("logs");

    cli()
        .arg("--config")
        .arg(&config)
        .args(["teleop", "--sim", "--log-dir"])
        .arg(&log_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("舵机配置失败"))
        .stdout(predicate::str::contains("📝 日志").not());

    let leftover = fs::read_dir(&log_dir).map(|entries| entries.count()).unwrap_or(0);
    assert_eq!(leftover, 0);
}
