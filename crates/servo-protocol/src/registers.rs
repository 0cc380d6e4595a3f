//! 寄存器表
//!
//! 各型号舵机的控制表地址不同，这里只描述本项目需要的四个寄存器。
//! 默认值对应 X 系列（Protocol 2.0）控制表。

use crate::{POSITION_WIDTH, ProtocolError};

/// 单个寄存器的地址与宽度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterSpec {
    pub addr: u16,
    /// 宽度（字节）
    pub len: u16,
}

impl RegisterSpec {
    pub const fn new(addr: u16, len: u16) -> Self {
        Self { addr, len }
    }
}

/// 控制所需的寄存器集合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterMap {
    pub torque_enable: RegisterSpec,
    pub goal_position: RegisterSpec,
    pub present_position: RegisterSpec,
    pub operating_mode: RegisterSpec,
    /// 写入 operating_mode 表示“位置控制模式”的数值
    pub position_mode_value: u32,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            torque_enable: RegisterSpec::new(64, 1),
            goal_position: RegisterSpec::new(116, 4),
            present_position: RegisterSpec::new(132, 4),
            operating_mode: RegisterSpec::new(11, 1),
            position_mode_value: 3,
        }
    }
}

impl RegisterMap {
    /// 检查寄存器宽度
    ///
    /// 位置寄存器必须为 4 字节；其余寄存器宽度为 1~4 字节，
    /// 且 position_mode_value 能放进 operating_mode 寄存器。
    pub fn validate(&self) -> Result<(), ProtocolError> {
        for (field, spec) in [
            ("goal_position.len", self.goal_position),
            ("present_position.len", self.present_position),
        ] {
            if spec.len as usize != POSITION_WIDTH {
                return Err(ProtocolError::InvalidValue {
                    field: field.to_string(),
                    value: spec.len as u64,
                });
            }
        }
        for (field, spec) in [
            ("torque_enable.len", self.torque_enable),
            ("operating_mode.len", self.operating_mode),
        ] {
            if !(1..=4).contains(&spec.len) {
                return Err(ProtocolError::InvalidValue {
                    field: field.to_string(),
                    value: spec.len as u64,
                });
            }
        }
        crate::encode_register(self.position_mode_value, self.operating_mode.len).map(|_| ())
    }
}
