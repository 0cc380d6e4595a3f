//! # Servo Link Layer
//!
//! 半双工串口链路抽象。舵机总线上同一时刻只能有一个事务在传输，
//! 链路本身只负责字节收发，包的组帧/解析由上层（`servo-driver`）完成。
//!
//! ## 后端
//!
//! - [`SerialLink`]: 基于 `serialport` 的真实串口（USB 转 TTL/RS485 适配器）
//! - `SimLink`（feature `mock`）: 内存中的多舵机模拟器，按线协议应答

use std::time::Duration;
use thiserror::Error;

pub mod serial;

#[cfg(any(test, feature = "mock"))]
pub mod sim;

pub use serial::SerialLink;

#[cfg(any(test, feature = "mock"))]
pub use sim::{SimLink, SimServo};

/// 链路层统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] LinkDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Link not open")]
    NotOpen,
}

/// 设备错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    UnsupportedConfig,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct LinkDeviceError {
    pub kind: LinkDeviceErrorKind,
    pub message: String,
}

impl LinkDeviceError {
    pub fn new(kind: LinkDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 重试也无法恢复的错误（端口不存在、无权限等）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            LinkDeviceErrorKind::NoDevice
                | LinkDeviceErrorKind::AccessDenied
                | LinkDeviceErrorKind::NotFound
                | LinkDeviceErrorKind::UnsupportedConfig
        )
    }
}

impl From<String> for LinkDeviceError {
    fn from(message: String) -> Self {
        Self::new(LinkDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for LinkDeviceError {
    fn from(message: &str) -> Self {
        Self::new(LinkDeviceErrorKind::Unknown, message)
    }
}

/// 半双工字节链路
///
/// 实现者独占底层连接；`open` 之前或 `close` 之后的收发返回 [`LinkError::NotOpen`]。
pub trait BusLink {
    fn open(&mut self) -> Result<(), LinkError>;

    /// 关闭链路（幂等，尽力而为，不返回错误）
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// 发送完整的字节序列
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// 在 `timeout` 内读满 `buf`，否则返回 [`LinkError::Timeout`]
    fn receive_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), LinkError>;

    /// 丢弃接收缓冲区中的残留字节（上一个事务的迟到应答等）
    fn clear_input(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    /// 人类可读的链路描述（日志用）
    fn describe(&self) -> String;
}

impl<L: BusLink + ?Sized> BusLink for Box<L> {
    fn open(&mut self) -> Result<(), LinkError> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        (**self).send(bytes)
    }

    fn receive_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), LinkError> {
        (**self).receive_exact(buf, timeout)
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        (**self).clear_input()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
