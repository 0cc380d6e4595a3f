//! 会话状态
//!
//! 控制循环独占，每个周期显式传入、传出。

use servo_tools::{Joint, LogRecord};
use std::collections::BTreeMap;

/// 循环所处的状态（由 `torque_on` / `estop` 推导）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// 扭矩开启且未急停：应用增量并下发
    Active,
    /// 急停按住：不应用增量、不下发，继续记录
    Held,
    /// 扭矩关闭：不应用增量、不下发
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub goals: BTreeMap<u8, i64>,
    pub torque_on: bool,
    pub estop: bool,
}

impl SessionState {
    pub fn new(goals: BTreeMap<u8, i64>, torque_on: bool) -> Self {
        Self {
            goals,
            torque_on,
            estop: false,
        }
    }

    pub fn mode(&self) -> LoopMode {
        if self.estop {
            LoopMode::Held
        } else if !self.torque_on {
            LoopMode::Idle
        } else {
            LoopMode::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.mode() == LoopMode::Active
    }

    /// 把每个关节的目标裁剪到范围内；缺失的关节用中点补齐
    pub fn clamp_to(&mut self, joints: &[Joint]) {
        for joint in joints {
            let goal = self.goals.entry(joint.id).or_insert_with(|| joint.midpoint());
            *goal = joint.clamp(*goal);
        }
    }

    /// 下发用的线上位置（按关节裁剪）
    pub fn wire_goals(&self, joints: &[Joint]) -> BTreeMap<u8, u32> {
        joints
            .iter()
            .filter_map(|j| self.goals.get(&j.id).map(|&g| (j.id, j.wire_position(g))))
            .collect()
    }

    /// 生成日志记录（关节按配置顺序）
    pub fn to_record(&self, timestamp_ms: u64, joints: &[Joint], marker: &str) -> LogRecord {
        LogRecord {
            timestamp_ms,
            estop: self.estop,
            torque_on: self.torque_on,
            goals: joints
                .iter()
                .map(|j| (j.id, self.goals.get(&j.id).copied().unwrap_or_else(|| j.midpoint())))
                .collect(),
            marker: marker.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn joints() -> Vec<Joint> {
        vec![
            Joint::new(2, "b", 0, 100, 0).unwrap(),
            Joint::new(1, "a", 10, 20, 0).unwrap(),
        ]
    }

    #[test]
    fn test_modes() {
        let mut state = SessionState::new(BTreeMap::new(), true);
        assert_eq!(state.mode(), LoopMode::Active);
        state.estop = true;
        assert_eq!(state.mode(), LoopMode::Held);
        state.torque_on = false;
        assert_eq!(state.mode(), LoopMode::Held);
        state.estop = false;
        assert_eq!(state.mode(), LoopMode::Idle);
    }

    #[test]
    fn test_clamp_to_fills_and_clamps() {
        let mut state = SessionState::new(BTreeMap::from([(1, 500)]), true);
        state.clamp_to(&joints());
        assert_eq!(state.goals, BTreeMap::from([(1, 20), (2, 50)]));
    }

    #[test]
    fn test_record_uses_joint_order() {
        let state = SessionState::new(BTreeMap::from([(1, 15), (2, 60)]), true);
        let record = state.to_record(42, &joints(), "MARK");
        assert_eq!(record.goals, vec![(2, 60), (1, 15)]);
        assert_eq!(record.timestamp_ms, 42);
        assert!(record.torque_on && !record.estop);
    }

    proptest! {
        /// 任意初始目标经裁剪后都落在关节范围内，线上值与裁剪值一致
        #[test]
        fn clamped_goals_stay_in_range(
            lo in 0i64..4096,
            width in 0i64..4096,
            goal in -100_000i64..100_000,
        ) {
            let joint = Joint::new(1, "j", lo, lo + width, 0).unwrap();
            let mut state = SessionState::new(BTreeMap::from([(1, goal)]), true);
            state.clamp_to(std::slice::from_ref(&joint));

            let clamped = state.goals[&1];
            prop_assert!(clamped >= joint.range_min && clamped <= joint.range_max);
            let wire = state.wire_goals(std::slice::from_ref(&joint));
            prop_assert_eq!(i64::from(wire[&1]), clamped);
        }
    }
}
