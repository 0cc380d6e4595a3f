//! 驱动层错误类型定义

use servo_link::LinkError;
use servo_protocol::{ProtocolError, StatusError};
use std::fmt;
use thiserror::Error;

/// 配置阶段（两阶段配置中失败的位置）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPhase {
    /// 阶段 1：写入运行模式
    OperatingMode,
    /// 阶段 2：使能扭矩
    TorqueEnable,
}

impl fmt::Display for ConfigPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigPhase::OperatingMode => write!(f, "operating-mode write"),
            ConfigPhase::TorqueEnable => write!(f, "torque-enable write"),
        }
    }
}

/// 错误分类，供控制循环决定处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Link,
    Comm,
    Device,
    Configuration,
    Protocol,
    NotOpen,
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 链路打开/底层 IO 失败
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// 等待应答超时
    #[error("No response from id {id}")]
    NoResponse { id: u8 },

    /// 事务级通信错误（包损坏、ID 不符、长度不符等）
    #[error("Communication error{}: {message}", id_suffix(.id))]
    Comm { id: Option<u8>, message: String },

    /// 舵机在状态包中报告了错误
    #[error("Device error from id {id}: {status}")]
    Device { id: u8, status: StatusError },

    /// 两阶段配置失败（不回滚已配置的舵机）
    #[error("Configuration failed at id {id} during {phase}: {source}")]
    Configuration {
        id: u8,
        phase: ConfigPhase,
        #[source]
        source: Box<DriverError>,
    },

    /// 指令无法编码（版本不支持、地址越界等）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Bus not open")]
    NotOpen,
}

fn id_suffix(id: &Option<u8>) -> String {
    id.map(|i| format!(" (id {})", i)).unwrap_or_default()
}

impl DriverError {
    pub fn comm(id: Option<u8>, message: impl Into<String>) -> Self {
        DriverError::Comm {
            id,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::Link(LinkError::NotOpen) => ErrorKind::NotOpen,
            DriverError::Link(_) => ErrorKind::Link,
            DriverError::NoResponse { .. } | DriverError::Comm { .. } => ErrorKind::Comm,
            DriverError::Device { .. } => ErrorKind::Device,
            DriverError::Configuration { .. } => ErrorKind::Configuration,
            DriverError::Protocol(_) => ErrorKind::Protocol,
            DriverError::NotOpen => ErrorKind::NotOpen,
        }
    }

    /// 是否为应答超时（扫描时表示“该 ID 不存在”）
    pub fn is_no_response(&self) -> bool {
        matches!(self, DriverError::NoResponse { .. })
    }

    /// 仅事务级通信错误可以重试；设备错误、链路错误重试也无意义
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Comm
    }
}
