//! # Servo Protocol
//!
//! 串行总线舵机（Dynamixel 风格）协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `instruction`: 指令码与协议版本
//! - `packet`: 指令包/状态包的编码与解析（Protocol 1.0 / 2.0）
//! - `status`: 状态包错误字节解析
//! - `registers`: 寄存器地址/宽度表
//!
//! ## 字节序
//!
//! 协议使用小端字节序（LSB 在前）。位置值为 32 位无符号数：
//! `byte0 = value & 0xFF … byte3 = (value >> 24) & 0xFF`。

pub mod instruction;
pub mod packet;
pub mod registers;
pub mod status;

// 重新导出常用类型
pub use instruction::{BROADCAST_ID, Instruction, MAX_ID, ProtocolVersion};
pub use packet::{InstructionPacket, StatusPacket, checksum_v1, crc16};
pub use registers::{RegisterMap, RegisterSpec};
pub use status::StatusError;

use thiserror::Error;

/// 位置寄存器宽度（字节）
pub const POSITION_WIDTH: usize = 4;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid packet header")]
    InvalidHeader,

    #[error("Invalid packet length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Unknown instruction: 0x{0:02X}")]
    UnknownInstruction(u8),

    #[error("Instruction {instruction:?} is not supported by protocol {version}")]
    UnsupportedInstruction {
        instruction: Instruction,
        version: ProtocolVersion,
    },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u64 },
}

/// 位置值转小端 4 字节
pub fn encode_position(value: u32) -> [u8; POSITION_WIDTH] {
    [
        (value & 0xFF) as u8,
        ((value >> 8) & 0xFF) as u8,
        ((value >> 16) & 0xFF) as u8,
        ((value >> 24) & 0xFF) as u8,
    ]
}

/// 小端 4 字节转位置值
pub fn decode_position(bytes: [u8; POSITION_WIDTH]) -> u32 {
    (bytes[0] as u32) | ((bytes[1] as u32) << 8) | ((bytes[2] as u32) << 16) | ((bytes[3] as u32) << 24)
}

/// 按寄存器宽度（1~4 字节）编码为小端字节
///
/// 值超出宽度可表示范围时返回错误，而不是静默截断。
pub fn encode_register(value: u32, width: u16) -> Result<Vec<u8>, ProtocolError> {
    if !(1..=4).contains(&width) {
        return Err(ProtocolError::InvalidValue {
            field: "register width".to_string(),
            value: width as u64,
        });
    }
    let width = width as usize;
    if width < 4 && (value as u64) >= (1u64 << (8 * width)) {
        return Err(ProtocolError::InvalidValue {
            field: format!("{}-byte register value", width),
            value: value as u64,
        });
    }
    Ok(encode_position(value)[..width].to_vec())
}

/// 解码 1~4 字节小端寄存器值
pub fn decode_register(bytes: &[u8]) -> Result<u32, ProtocolError> {
    if bytes.is_empty() || bytes.len() > 4 {
        return Err(ProtocolError::InvalidLength {
            expected: POSITION_WIDTH,
            actual: bytes.len(),
        });
    }
    Ok(bytes.iter().enumerate().fold(0u32, |acc, (i, &b)| acc | ((b as u32) << (8 * i))))
}
