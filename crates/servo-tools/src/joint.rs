//! # 关节定义
//!
//! 配置加载后不可变。位置为舵机原始单位（32 位无符号），
//! 中间计算使用 `i64` 以便增量可以暂时越界，随后再裁剪。

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JointError {
    #[error("joint {id}: range_min {min} > range_max {max}")]
    InvertedRange { id: u8, min: i64, max: i64 },

    #[error("joint {id}: range [{min}, {max}] outside 0..={}", u32::MAX)]
    OutOfBounds { id: u8, min: i64, max: i64 },
}

/// 单个关节（一个舵机）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joint {
    pub id: u8,
    pub name: String,
    pub range_min: i64,
    pub range_max: i64,
    #[serde(default)]
    pub homing_offset: i64,
}

impl Joint {
    pub fn new(
        id: u8,
        name: impl Into<String>,
        range_min: i64,
        range_max: i64,
        homing_offset: i64,
    ) -> Result<Self, JointError> {
        let joint = Self {
            id,
            name: name.into(),
            range_min,
            range_max,
            homing_offset,
        };
        joint.validate()?;
        Ok(joint)
    }

    /// `0 <= range_min <= range_max <= u32::MAX`
    pub fn validate(&self) -> Result<(), JointError> {
        if self.range_min > self.range_max {
            return Err(JointError::InvertedRange {
                id: self.id,
                min: self.range_min,
                max: self.range_max,
            });
        }
        if self.range_min < 0 || self.range_max > i64::from(u32::MAX) {
            return Err(JointError::OutOfBounds {
                id: self.id,
                min: self.range_min,
                max: self.range_max,
            });
        }
        Ok(())
    }

    pub fn clamp(&self, value: i64) -> i64 {
        clamp(value, self.range_min, self.range_max)
    }

    /// `floor((range_min + range_max) / 2)`
    pub fn midpoint(&self) -> i64 {
        (self.range_min + self.range_max).div_euclid(2)
    }

    /// 裁剪后转换为线上位置值
    pub fn wire_position(&self, value: i64) -> u32 {
        let clamped = self.clamp(value);
        u32::try_from(clamped).unwrap_or(if clamped < 0 { 0 } else { u32::MAX })
    }
}

/// 裁剪到 `[lo, hi]`（要求 `lo <= hi`）
pub fn clamp(value: i64, lo: i64, hi: i64) -> i64 {
    value.max(lo).min(hi)
}
