//! 端到端：遥操作写日志，再把日志回放到另一组模拟舵机上

use servo_client::{
    JointKeys, KeyMap, ManualClock, ScriptedKeys, TeleopConfig, TeleopLoop, run_replay,
};
use servo_driver::{ActuatorBus, BusConfig, BusGuard, DynamixelBus};
use servo_link::SimLink;
use servo_protocol::ProtocolVersion;
use servo_tools::{Joint, SessionLogReader, SessionLogger};
use std::time::Duration;

fn joints() -> Vec<Joint> {
    vec![
        Joint::new(1, "base", 1000, 3000, 0).unwrap(),
        Joint::new(2, "shoulder", 1500, 2500, 0).unwrap(),
    ]
}

fn sim_bus(positions: &[(u8, u32)]) -> DynamixelBus<SimLink> {
    let link = SimLink::new(ProtocolVersion::V2).with_servos(positions);
    DynamixelBus::new(link, BusConfig::default())
}

#[test]
fn test_teleop_session_replays_to_same_goals() {
    let dir = tempfile::tempdir().unwrap();
    let ids = [1u8, 2];

    // 录制
    let mut bus = sim_bus(&[(1, 2000), (2, 2000)]);
    let log_path = {
        let mut guard = BusGuard::acquire(&mut bus).unwrap();
        let mut logger = SessionLogger::new(dir.path(), &ids);
        let path = logger.start().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let keys = ScriptedKeys::new(vec![
            vec!["a"],
            vec!["a", "s"],
            vec!["space", "a"],
            vec!["t"],
            vec!["a"],
            vec!["t", "m"],
            vec!["w"],
            vec!["esc"],
        ]);
        let config = TeleopConfig {
            hz: 50.0,
            step_units: 25,
            use_present_position_as_start: true,
            ..TeleopConfig::default()
        };
        let keymap = KeyMap::from([(1, JointKeys::new("q", "a")), (2, JointKeys::new("w", "s"))]);
        let mut teleop = TeleopLoop::new(config, joints(), &mut *guard, keys, &clock, &mut logger)
            .unwrap()
            .with_keymap(keymap);
        let summary = teleop.run().unwrap();
        assert_eq!(summary.ticks, 7);
        assert_eq!(summary.torque_toggles, 2);
        // 活动周期：1、2、6、7（第 6 周期扭矩重新开启）
        assert_eq!(summary.writes, 4);
        assert_eq!(summary.final_state.goals[&1], 2050);
        assert_eq!(summary.final_state.goals[&2], 2000);
        assert!(summary.final_state.torque_on);
        path
    };
    assert!(!bus.is_open());
    assert_eq!(bus.link().goal(1), Some(2050));
    assert_eq!(bus.link().goal(2), Some(2000));

    let records: Vec<_> = SessionLogReader::open(&log_path)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 7);
    assert!(records[2].estop);
    assert!(!records[3].torque_on && !records[4].torque_on);
    assert_eq!(records[5].marker, "MARK");

    // 回放到另一组从零位开始的舵机
    let mut replay_bus = sim_bus(&[(1, 1000), (2, 1500)]);
    let clock = ManualClock::new(0);
    let stats = run_replay(&mut replay_bus, &clock, joints(), &log_path, 2.0, None).unwrap();
    assert_eq!(stats.rows, 7);
    assert_eq!(stats.written, 4);
    assert_eq!(stats.skipped, 3);
    assert!(!replay_bus.is_open());
    assert_eq!(replay_bus.link().goal(1), Some(2050));
    assert_eq!(replay_bus.link().goal(2), Some(2000));
    assert_eq!(replay_bus.link().torque_enabled(1), Some(true));

    // 录制时间戳（毫秒，相对起点）：0, 20, 40, 210, 210, 380, 380
    // 扭矩切换周期含 150ms 消抖；非活动行推进计时参考但不等待
    let stamps: Vec<u64> = records.iter().map(|r| r.timestamp_ms - records[0].timestamp_ms).collect();
    assert_eq!(stamps, vec![0, 20, 40, 210, 210, 380, 380]);
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(10), Duration::from_millis(85)]);
}
