//! 指令码与协议版本定义

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// 广播 ID（同步读写使用）
pub const BROADCAST_ID: u8 = 0xFE;

/// 可寻址的最大舵机 ID
pub const MAX_ID: u8 = 0xFC;

/// 指令码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    /// 状态包（仅 Protocol 2.0 的状态包使用此码）
    Status = 0x55,
    SyncRead = 0x82,
    SyncWrite = 0x83,
}

impl Instruction {
    /// 从原始字节解析指令码
    pub fn from_byte(value: u8) -> Result<Self, ProtocolError> {
        Self::try_from(value).map_err(|_| ProtocolError::UnknownInstruction(value))
    }
}

/// 协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolVersion {
    /// Protocol 1.0：2 字节包头 + 8 位校验和，无同步读
    V1,
    /// Protocol 2.0：4 字节包头 + CRC-16 + 字节填充
    V2,
}

impl ProtocolVersion {
    /// 包头字节
    pub fn header(self) -> &'static [u8] {
        match self {
            ProtocolVersion::V1 => &[0xFF, 0xFF],
            ProtocolVersion::V2 => &[0xFF, 0xFF, 0xFD, 0x00],
        }
    }

    /// 包头之后、长度字段结束之前的字节数（ID + 长度）
    pub fn prefix_len(self) -> usize {
        match self {
            ProtocolVersion::V1 => 2,
            ProtocolVersion::V2 => 3,
        }
    }

    /// 该版本是否支持指定指令
    pub fn supports(self, instruction: Instruction) -> bool {
        !matches!(
            (self, instruction),
            (ProtocolVersion::V1, Instruction::SyncRead) | (ProtocolVersion::V1, Instruction::Status)
        )
    }

    pub fn ensure_supports(self, instruction: Instruction) -> Result<(), ProtocolError> {
        if self.supports(instruction) {
            Ok(())
        } else {
            Err(ProtocolError::UnsupportedInstruction {
                instruction,
                version: self,
            })
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => write!(f, "1.0"),
            ProtocolVersion::V2 => write!(f, "2.0"),
        }
    }
}

/// 配置文件中以浮点数书写版本号（`1.0` / `2.0`）
impl TryFrom<f64> for ProtocolVersion {
    type Error = ProtocolError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if (value - 1.0).abs() < f64::EPSILON {
            Ok(ProtocolVersion::V1)
        } else if (value - 2.0).abs() < f64::EPSILON {
            Ok(ProtocolVersion::V2)
        } else {
            Err(ProtocolError::InvalidValue {
                field: "protocol_version".to_string(),
                value: value.to_bits(),
            })
        }
    }
}
