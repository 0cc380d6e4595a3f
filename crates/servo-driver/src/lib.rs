//! 驱动层模块
//!
//! 本模块提供串行总线舵机的事务层，包括：
//! - [`ActuatorBus`] 抽象（配置、扭矩、同步读写）
//! - [`DynamixelBus`]：基于 [`servo_link::BusLink`] 的 Protocol 1.0/2.0 实现
//! - [`BusGuard`]：作用域内独占总线，退出时自动关闭
//! - 错误分类（[`ErrorKind`]）与可选的事务重试（[`RetryPolicy`]）
//! - ID 扫描
//!
//! # 使用场景
//!
//! 控制循环与回放只依赖 [`ActuatorBus`]；测试可使用 `FakeBus`（feature `mock`）。

mod bus;
mod dynamixel;
mod error;
mod retry;
pub mod scan;

#[cfg(any(test, feature = "mock"))]
pub mod fake;

pub use bus::{ActuatorBus, BusGuard};
pub use dynamixel::{BusConfig, DynamixelBus};
pub use error::{ConfigPhase, DriverError, ErrorKind};
pub use retry::RetryPolicy;
pub use scan::{DEFAULT_SCAN_RANGE, Probe, ScanReport, scan_ids};

#[cfg(any(test, feature = "mock"))]
pub use fake::{BusCall, BusOp, FakeBus};
