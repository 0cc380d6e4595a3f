//! 串口链路
//!
//! 通过 USB 转 TTL/RS485 适配器访问舵机总线。
//!
//! ## 特性
//!
//! - 延迟打开：构造时只记录参数，`open()` 才真正占用端口
//! - 读超时按剩余时间逐次设置，保证 `receive_exact` 的总超时
//! - 每个事务前清空接收缓冲区，避免迟到应答串包
//!
//! ## 限制
//!
//! - 仅支持 8N1、无流控（舵机总线的通用配置）
//! - 半双工方向切换由适配器硬件负责

use crate::{BusLink, LinkDeviceError, LinkDeviceErrorKind, LinkError};
use serialport::{ClearBuffer, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 打开端口时的默认读超时
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(50);

pub struct SerialLink {
    port_name: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            port: None,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, LinkError> {
        self.port.as_mut().ok_or(LinkError::NotOpen)
    }
}

impl From<serialport::Error> for LinkError {
    fn from(err: serialport::Error) -> Self {
        let kind = match err.kind {
            serialport::ErrorKind::NoDevice => LinkDeviceErrorKind::NoDevice,
            serialport::ErrorKind::InvalidInput => LinkDeviceErrorKind::UnsupportedConfig,
            serialport::ErrorKind::Io(ErrorKind::NotFound) => LinkDeviceErrorKind::NotFound,
            serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => LinkDeviceErrorKind::AccessDenied,
            serialport::ErrorKind::Io(ErrorKind::WouldBlock)
            | serialport::ErrorKind::Io(ErrorKind::AddrInUse) => LinkDeviceErrorKind::Busy,
            _ => LinkDeviceErrorKind::Unknown,
        };
        LinkError::Device(LinkDeviceError::new(kind, err.description))
    }
}

impl BusLink for SerialLink {
    fn open(&mut self) -> Result<(), LinkError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(DEFAULT_TIMEOUT)
            .open()
            .map_err(|e| {
                warn!("Failed to open {} @ {} baud: {}", self.port_name, self.baud_rate, e);
                LinkError::from(e)
            })?;
        self.port = Some(port);
        info!("Serial link opened: {} @ {} baud", self.port_name, self.baud_rate);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            // 关闭前尽量清掉残留数据，失败也不影响释放
            if let Err(e) = port.clear(ClearBuffer::All) {
                debug!("Ignoring clear error on close: {}", e);
            }
            drop(port);
            info!("Serial link closed: {}", self.port_name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        trace!("TX {} bytes: {:02X?}", bytes.len(), bytes);
        Ok(())
    }

    fn receive_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), LinkError> {
        let port = self.port_mut()?;
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout);
            }
            port.set_timeout(remaining)?;
            match port.read(&mut buf[filled..]) {
                Ok(0) => continue,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => return Err(LinkError::Timeout),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(LinkError::Io(e)),
            }
        }

        trace!("RX {} bytes: {:02X?}", buf.len(), buf);
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        let port = self.port_mut()?;
        port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port_name, self.baud_rate)
    }
}

impl Drop for SerialLink {
    /// 自动清理：离开作用域时关闭端口
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_does_not_open() {
        let link = SerialLink::new("/dev/does-not-exist", 57600);
        assert!(!link.is_open());
        assert_eq!(link.describe(), "/dev/does-not-exist @ 57600 baud");
    }

    #[test]
    fn test_io_before_open_is_not_open() {
        let mut link = SerialLink::new("/dev/does-not-exist", 57600);
        assert!(matches!(link.send(&[0xFF]), Err(LinkError::NotOpen)));
        let mut buf = [0u8; 1];
        assert!(matches!(
            link.receive_exact(&mut buf, Duration::from_millis(1)),
            Err(LinkError::NotOpen)
        ));
    }

    #[test]
    fn test_open_missing_port_fails() {
        let mut link = SerialLink::new("/dev/servo-link-test-missing-port", 57600);
        assert!(matches!(link.open(), Err(LinkError::Device(_))));
        assert!(!link.is_open());
        // close 在未打开时也是安全的
        link.close();
        link.close();
    }

    #[test]
    fn test_serialport_error_mapping() {
        let err = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone");
        match LinkError::from(err) {
            LinkError::Device(dev) => {
                assert_eq!(dev.kind, LinkDeviceErrorKind::NoDevice);
                assert!(dev.is_fatal());
            },
            other => panic!("unexpected: {:?}", other),
        }
    }
}
