//! 回零策略

use servo_tools::Joint;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HomeStrategy {
    /// 中点 + homing_offset，再裁剪到范围内
    FromJsonOffset,
    /// 范围中点
    #[default]
    Midpoint,
}

impl HomeStrategy {
    /// 按配置名解析；未知名称一律视为中点策略
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "from_json_offset" => HomeStrategy::FromJsonOffset,
            _ => HomeStrategy::Midpoint,
        }
    }

    pub fn home_goal(self, joint: &Joint) -> i64 {
        match self {
            HomeStrategy::FromJsonOffset => joint.clamp(joint.midpoint() + joint.homing_offset),
            HomeStrategy::Midpoint => joint.midpoint(),
        }
    }
}

impl fmt::Display for HomeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HomeStrategy::FromJsonOffset => write!(f, "from_json_offset"),
            HomeStrategy::Midpoint => write!(f, "midpoint"),
        }
    }
}

pub fn home_goals(joints: &[Joint], strategy: HomeStrategy) -> BTreeMap<u8, i64> {
    joints.iter().map(|j| (j.id, strategy.home_goal(j))).collect()
}
