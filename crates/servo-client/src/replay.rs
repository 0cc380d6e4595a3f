//! 会话回放
//!
//! 按文件顺序读取日志记录，以（缩放后的）原始节奏重新下发目标位置。开环回放，
//! 不读取反馈。
//!
//! - 非活动行（急停或扭矩关闭）不下发，但其时间戳成为新的计时参考
//! - 活动行：等待 `(本行时间戳 - 上一行时间戳) / speed`（不低于 0），然后一次同步写
//! - 第一行没有参考时间戳，立即下发

use crate::ClientError;
use crate::clock::Clock;
use servo_driver::{ActuatorBus, BusGuard};
use servo_tools::{Joint, LogRecord, SessionLogError, SessionLogReader};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// 最小速度倍数；更小的正数按此值处理
pub const MIN_SPEED: f64 = 1e-6;

/// 校验速度倍数：必须为有限正数，过小的值提升到 [`MIN_SPEED`]
pub fn effective_speed(speed: f64) -> Result<f64, ClientError> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(ClientError::InvalidSpeed(speed));
    }
    Ok(speed.max(MIN_SPEED))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// 读取的数据行
    pub rows: u64,
    /// 下发的同步写次数
    pub written: u64,
    /// 跳过的非活动行
    pub skipped: u64,
    /// 是否被中途取消
    pub cancelled: bool,
}

pub struct Replayer<B, C> {
    bus: B,
    clock: C,
    joints: Vec<Joint>,
    speed: f64,
    cancel: Option<Arc<AtomicBool>>,
}

impl<B: ActuatorBus, C: Clock> Replayer<B, C> {
    pub fn new(bus: B, clock: C, joints: Vec<Joint>, speed: f64) -> Result<Self, ClientError> {
        if joints.is_empty() {
            return Err(ClientError::NoJoints);
        }
        Ok(Self {
            bus,
            clock,
            joints,
            speed: effective_speed(speed)?,
            cancel: None,
        })
    }

    /// 取消标志：置位后在下一行之前停止
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.load(Ordering::SeqCst))
    }

    fn delay(&self, from_ms: u64, to_ms: u64) -> Duration {
        // 时间戳倒退时不等待
        let elapsed_ms = to_ms.saturating_sub(from_ms) as f64;
        Duration::from_nanos((elapsed_ms * 1e6 / self.speed).round() as u64)
    }

    fn row_goals(&self, record: &LogRecord) -> Result<BTreeMap<u8, u32>, ClientError> {
        self.joints
            .iter()
            .map(|joint| {
                let goal = record
                    .goal(joint.id)
                    .ok_or(SessionLogError::MissingColumn(joint.id))?;
                // 合法日志中的目标已在范围内，这里只防止越界日志驱动舵机
                Ok::<_, ClientError>((joint.id, joint.wire_position(goal)))
            })
            .collect()
    }

    /// 流式回放记录
    pub fn replay<I>(&mut self, records: I) -> Result<ReplayStats, ClientError>
    where
        I: IntoIterator<Item = Result<LogRecord, SessionLogError>>,
    {
        let mut stats = ReplayStats::default();
        let mut prev_ms: Option<u64> = None;

        for record in records {
            if self.cancelled() {
                stats.cancelled = true;
                break;
            }
            let record = record?;
            stats.rows += 1;

            if !record.is_active() {
                prev_ms = Some(record.timestamp_ms);
                stats.skipped += 1;
                continue;
            }

            if let Some(prev) = prev_ms {
                let delay = self.delay(prev, record.timestamp_ms);
                if !delay.is_zero() {
                    self.clock.sleep(delay);
                }
                // 睡眠期间可能收到取消
                if self.cancelled() {
                    stats.cancelled = true;
                    break;
                }
            }

            let goals = self.row_goals(&record)?;
            self.bus.write_positions(&goals)?;
            stats.written += 1;
            prev_ms = Some(record.timestamp_ms);

            if !record.marker.is_empty() {
                debug!("Marker at {} ms: {}", record.timestamp_ms, record.marker);
            }
        }

        if stats.cancelled {
            info!("Replay cancelled after {} rows", stats.rows);
        }
        Ok(stats)
    }
}

/// 完整回放流程：校验日志列、独占总线、配置位置模式并使能扭矩、逐行回放
///
/// 日志缺少任何配置关节的列时，在打开总线之前返回错误。总线在所有退出路径上关闭。
pub fn run_replay<B, C>(
    bus: B,
    clock: C,
    joints: Vec<Joint>,
    path: impl AsRef<Path>,
    speed: f64,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<ReplayStats, ClientError>
where
    B: ActuatorBus,
    C: Clock,
{
    let speed = effective_speed(speed)?;
    if joints.is_empty() {
        return Err(ClientError::NoJoints);
    }
    let path = path.as_ref();
    let ids: Vec<u8> = joints.iter().map(|j| j.id).collect();

    let reader = SessionLogReader::open(path)?;
    reader.require_joints(&ids)?;

    let mut guard = BusGuard::acquire(bus)?;
    guard.configure_position_mode_and_enable(&ids)?;
    info!("Replaying {} at {}x", path.display(), speed);

    let mut replayer = Replayer::new(&mut *guard, clock, joints, speed)?;
    if let Some(cancel) = cancel {
        replayer = replayer.with_cancel(cancel);
    }
    let stats = replayer.replay(reader)?;
    info!(
        "Replay finished: {} rows, {} written, {} skipped",
        stats.rows, stats.written, stats.skipped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use servo_driver::{BusCall, BusOp, DriverError, FakeBus};
    use servo_tools::{RecordSink, SessionLogger};

    const MS: Duration = Duration::from_millis(1);

    fn joints() -> Vec<Joint> {
        vec![Joint::new(1, "base", 0, 1000, 0).unwrap()]
    }

    fn row(ts: u64, active: bool, goal: i64) -> Result<LogRecord, SessionLogError> {
        Ok(LogRecord {
            timestamp_ms: ts,
            estop: false,
            torque_on: active,
            goals: vec![(1, goal)],
            marker: String::new(),
        })
    }

    fn open_bus() -> FakeBus {
        let mut bus = FakeBus::new(&[(1, 0)]);
        bus.open().unwrap();
        bus.clear_calls();
        bus
    }

    fn replay_rows(speed: f64, rows: Vec<Result<LogRecord, SessionLogError>>) -> (FakeBus, ManualClock, ReplayStats) {
        let mut bus = open_bus();
        let clock = ManualClock::new(0);
        let stats = Replayer::new(&mut bus, &clock, joints(), speed)
            .unwrap()
            .replay(rows)
            .unwrap();
        (bus, clock, stats)
    }

    #[test]
    fn test_timing_at_normal_speed() {
        let (bus, clock, stats) = replay_rows(1.0, vec![row(0, true, 100), row(500, true, 200)]);
        assert_eq!(clock.sleeps(), vec![500 * MS]);
        assert_eq!(
            bus.writes(),
            vec![&BTreeMap::from([(1, 100)]), &BTreeMap::from([(1, 200)])]
        );
        assert_eq!(stats.written, 2);
    }

    #[test]
    fn test_timing_at_double_speed() {
        let (_, clock, _) = replay_rows(2.0, vec![row(0, true, 100), row(500, true, 200)]);
        assert_eq!(clock.sleeps(), vec![250 * MS]);
    }

    #[test]
    fn test_first_row_written_without_delay() {
        let (bus, clock, _) = replay_rows(1.0, vec![row(10_000, true, 300)]);
        assert!(clock.sleeps().is_empty());
        assert_eq!(bus.writes().len(), 1);
    }

    #[test]
    fn test_inactive_rows_advance_timing_reference() {
        let mut rows = vec![row(0, true, 100), row(200, false, 150), row(500, true, 200)];
        if let Ok(r) = &mut rows[1] {
            r.torque_on = true;
            r.estop = true;
        }
        let (bus, clock, stats) = replay_rows(1.0, rows);
        assert_eq!(clock.sleeps(), vec![300 * MS]);
        assert_eq!(bus.writes().len(), 2);
        assert_eq!(
            stats,
            ReplayStats {
                rows: 3,
                written: 2,
                skipped: 1,
                cancelled: false
            }
        );
    }

    #[test]
    fn test_estop_row_reference_scaled_by_speed() {
        let mut rows = vec![row(0, true, 100), row(200, true, 150), row(500, true, 200)];
        if let Ok(r) = &mut rows[1] {
            r.estop = true;
        }
        let (bus, clock, stats) = replay_rows(2.0, rows);
        // (500 - 200) / 2
        assert_eq!(clock.sleeps(), vec![150 * MS]);
        assert_eq!(
            bus.writes(),
            vec![&BTreeMap::from([(1, 100)]), &BTreeMap::from([(1, 200)])]
        );
        assert_eq!((stats.written, stats.skipped), (2, 1));
    }

    #[test]
    fn test_leading_inactive_row_sets_reference() {
        let (_, clock, _) = replay_rows(1.0, vec![row(0, false, 100), row(40, true, 200)]);
        assert_eq!(clock.sleeps(), vec![40 * MS]);
    }

    #[test]
    fn test_backwards_timestamp_does_not_sleep() {
        let (bus, clock, _) = replay_rows(1.0, vec![row(500, true, 100), row(100, true, 200)]);
        assert!(clock.sleeps().is_empty());
        assert_eq!(bus.writes().len(), 2);
    }

    #[test]
    fn test_speed_validation() {
        assert!(matches!(effective_speed(0.0), Err(ClientError::InvalidSpeed(_))));
        assert!(matches!(effective_speed(-1.0), Err(ClientError::InvalidSpeed(_))));
        assert!(effective_speed(f64::NAN).is_err());
        assert!(effective_speed(f64::INFINITY).is_err());
        assert_eq!(effective_speed(1e-9).unwrap(), MIN_SPEED);
        assert_eq!(effective_speed(1.5).unwrap(), 1.5);

        let mut bus = open_bus();
        let clock = ManualClock::new(0);
        assert!(Replayer::new(&mut bus, &clock, joints(), 0.0).is_err());
    }

    #[test]
    fn test_out_of_range_goal_is_clamped() {
        let (bus, _, _) = replay_rows(1.0, vec![row(0, true, 5_000)]);
        assert_eq!(bus.writes(), vec![&BTreeMap::from([(1, 1000)])]);
    }

    #[test]
    fn test_cancel_stops_before_next_row() {
        let mut bus = open_bus();
        let clock = ManualClock::new(0);
        let cancel = Arc::new(AtomicBool::new(true));
        let stats = Replayer::new(&mut bus, &clock, joints(), 1.0)
            .unwrap()
            .with_cancel(cancel)
            .replay(vec![row(0, true, 100), row(10, true, 200)])
            .unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.rows, 0);
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn test_write_failure_propagates() {
        let mut bus = open_bus();
        bus.fail_next(BusOp::WritePositions, DriverError::comm(None, "port gone"));
        let clock = ManualClock::new(0);
        let result = Replayer::new(&mut bus, &clock, joints(), 1.0)
            .unwrap()
            .replay(vec![row(0, true, 100)]);
        assert_eq!(result.unwrap_err().bus_kind(), Some(servo_driver::ErrorKind::Comm));
    }

    #[test]
    fn test_parse_error_propagates() {
        let mut bus = open_bus();
        let clock = ManualClock::new(0);
        let rows = vec![
            row(0, true, 100),
            Err(SessionLogError::Parse {
                line: 3,
                message: "bad".to_string(),
            }),
        ];
        let result = Replayer::new(&mut bus, &clock, joints(), 1.0).unwrap().replay(rows);
        assert!(matches!(result, Err(ClientError::Log(SessionLogError::Parse { line: 3, .. }))));
        assert_eq!(bus.writes().len(), 1);
    }

    fn write_log(dir: &Path, ids: &[u8], records: &[LogRecord]) -> std::path::PathBuf {
        let mut logger = SessionLogger::new(dir, ids);
        let path = logger.start().unwrap();
        for record in records {
            logger.write(record).unwrap();
        }
        logger.stop();
        path
    }

    #[test]
    fn test_run_replay_configures_streams_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<LogRecord> = vec![row(1_000, true, 100), row(1_020, true, 110)]
            .into_iter()
            .map(Result::unwrap)
            .collect();
        let path = write_log(dir.path(), &[1], &records);

        let mut bus = FakeBus::new(&[(1, 0)]);
        let clock = ManualClock::new(0);
        let stats = run_replay(&mut bus, &clock, joints(), &path, 1.0, None).unwrap();
        assert_eq!(stats.written, 2);
        assert_eq!(clock.sleeps(), vec![20 * MS]);
        assert_eq!(
            bus.calls(),
            &[
                BusCall::Open,
                BusCall::Configure(vec![1]),
                BusCall::WritePositions(BTreeMap::from([(1, 100)])),
                BusCall::WritePositions(BTreeMap::from([(1, 110)])),
                BusCall::Close,
            ]
        );
    }

    #[test]
    fn test_run_replay_missing_column_fails_before_bus_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), &[1], &[row(0, true, 100).unwrap()]);

        let mut bus = FakeBus::new(&[(1, 0), (2, 0)]);
        let clock = ManualClock::new(0);
        let joints = vec![
            Joint::new(1, "base", 0, 1000, 0).unwrap(),
            Joint::new(2, "elbow", 0, 1000, 0).unwrap(),
        ];
        let err = run_replay(&mut bus, &clock, joints, &path, 1.0, None).unwrap_err();
        assert!(matches!(err, ClientError::Log(SessionLogError::MissingColumn(2))));
        assert!(bus.calls().is_empty());
    }

    #[test]
    fn test_run_replay_closes_bus_on_configure_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), &[1], &[row(0, true, 100).unwrap()]);

        let mut bus = FakeBus::new(&[]);
        let clock = ManualClock::new(0);
        let err = run_replay(&mut bus, &clock, joints(), &path, 1.0, None).unwrap_err();
        assert_eq!(err.bus_kind(), Some(servo_driver::ErrorKind::Configuration));
        assert_eq!(bus.calls().last(), Some(&BusCall::Close));
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn test_run_replay_rejects_speed_before_io() {
        let mut bus = FakeBus::new(&[(1, 0)]);
        let clock = ManualClock::new(0);
        let err = run_replay(&mut bus, &clock, joints(), "/nonexistent/log.csv", -2.0, None).unwrap_err();
        assert!(matches!(err, ClientError::InvalidSpeed(_)));
    }
}
