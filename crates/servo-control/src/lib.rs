//! # Servo Control - 应用配置
//!
//! 读取机器人配置（TOML）与关节限位（JSON），校验后生成：
//! - 总线参数 [`servo_driver::BusConfig`]
//! - 控制循环参数 [`servo_client::TeleopConfig`]
//! - 关节列表、按键映射、功能键
//!
//! ```no_run
//! use servo_control::{AppConfig, resolve_config_path};
//!
//! # fn main() -> Result<(), servo_control::ConfigError> {
//! let path = resolve_config_path(None)?;
//! let config = AppConfig::load(&path)?;
//! println!("{} joints on {}", config.joints.len(), config.robot.port);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
pub mod file;
mod paths;

pub use config::{AppConfig, ControlSettings, RobotSettings};
pub use error::ConfigError;
pub use paths::{CONFIG_ENV, default_config_path, resolve_config_path};
