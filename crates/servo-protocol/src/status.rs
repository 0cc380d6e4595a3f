//! 状态包错误字节解析
//!
//! - Protocol 2.0: bit7 为硬件告警（Alert），低 7 位为错误号
//! - Protocol 1.0: 每一位代表一种故障

use crate::instruction::ProtocolVersion;
use std::fmt;

const ALERT_BIT: u8 = 0x80;

const V1_FLAGS: [(u8, &str); 7] = [
    (0x01, "Input Voltage Error"),
    (0x02, "Angle Limit Error"),
    (0x04, "Overheating Error"),
    (0x08, "Range Error"),
    (0x10, "Checksum Error"),
    (0x20, "Overload Error"),
    (0x40, "Instruction Error"),
];

/// 设备报告的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusError {
    pub version: ProtocolVersion,
    pub raw: u8,
}

impl StatusError {
    pub fn new(version: ProtocolVersion, raw: u8) -> Self {
        Self { version, raw }
    }

    /// 错误字节是否非零
    pub fn is_error(&self) -> bool {
        self.raw != 0
    }

    /// 硬件告警位（仅 Protocol 2.0）
    pub fn alert(&self) -> bool {
        self.version == ProtocolVersion::V2 && self.raw & ALERT_BIT != 0
    }

    /// 人类可读描述
    pub fn describe(&self) -> String {
        match self.version {
            ProtocolVersion::V2 => {
                let code = self.raw & !ALERT_BIT;
                let mut text = match code {
                    0 => String::new(),
                    1 => "Result Fail".to_string(),
                    2 => "Instruction Error".to_string(),
                    3 => "CRC Error".to_string(),
                    4 => "Data Range Error".to_string(),
                    5 => "Data Length Error".to_string(),
                    6 => "Data Limit Error".to_string(),
                    7 => "Access Error".to_string(),
                    other => format!("Unknown Error {}", other),
                };
                if self.alert() {
                    if !text.is_empty() {
                        text.push_str(", ");
                    }
                    text.push_str("Hardware Alert");
                }
                if text.is_empty() { "No Error".to_string() } else { text }
            },
            ProtocolVersion::V1 => {
                let names: Vec<&str> = V1_FLAGS
                    .iter()
                    .filter(|(bit, _)| self.raw & bit != 0)
                    .map(|(_, name)| *name)
                    .collect();
                if names.is_empty() { "No Error".to_string() } else { names.join(", ") }
            },
        }
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.describe(), self.raw)
    }
}
