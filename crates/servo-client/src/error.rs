//! 客户端错误类型

use servo_driver::{DriverError, ErrorKind};
use servo_tools::SessionLogError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Bus error: {0}")]
    Bus(#[from] DriverError),

    #[error("Session log error: {0}")]
    Log(#[from] SessionLogError),

    #[error("Replay speed must be a positive finite number, got {0}")]
    InvalidSpeed(f64),

    #[error("Loop frequency must be a positive finite number, got {0}")]
    InvalidFrequency(f64),

    #[error("No joints configured")]
    NoJoints,
}

impl ClientError {
    /// 总线错误的分类（非总线错误返回 None）
    pub fn bus_kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Bus(e) => Some(e.kind()),
            _ => None,
        }
    }
}
