//! 配置文件的原始结构（与磁盘格式一一对应）
//!
//! # TOML 示例
//!
//! ```toml
//! [robot]
//! port = "/dev/ttyUSB0"
//! baudrate = 1000000
//! protocol_version = 2.0
//!
//! [control]
//! hz = 50
//! step_units = 10
//! use_present_position_as_start = true
//! home_strategy = "midpoint"
//!
//! [limits]
//! follower_limits_json = "Group_Follower.json"
//!
//! [joint_names]
//! 1 = "base"
//!
//! [keymap]
//! j1 = ["q", "a"]
//!
//! [special_keys]
//! home = "h"
//! torque_toggle = "t"
//! estop_hold = "space"
//! marker = "m"
//! quit = "esc"
//! ```

use serde::Deserialize;
use servo_protocol::RegisterSpec;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub robot: RobotTable,
    pub control: ControlTable,
    #[serde(default)]
    pub registers: RegistersTable,
    #[serde(default)]
    pub retry: RetryTable,
    pub limits: LimitsTable,
    /// 关节 id（字符串键）→ 名称
    #[serde(default)]
    pub joint_names: BTreeMap<String, String>,
    /// `j<id>` → [减, 增]
    #[serde(default)]
    pub keymap: BTreeMap<String, (String, String)>,
    #[serde(default)]
    pub special_keys: SpecialKeysTable,
    #[serde(default)]
    pub logging: LoggingTable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RobotTable {
    pub port: String,
    pub baudrate: u32,
    pub protocol_version: f64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_response_timeout_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlTable {
    pub hz: f64,
    pub step_units: i64,
    #[serde(default)]
    pub use_present_position_as_start: bool,
    #[serde(default = "default_home_strategy")]
    pub home_strategy: String,
    #[serde(default = "default_pacing")]
    pub pacing: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_marker_text")]
    pub marker_text: String,
}

fn default_home_strategy() -> String {
    "midpoint".to_string()
}

fn default_pacing() -> String {
    "remainder".to_string()
}

fn default_debounce_ms() -> u64 {
    150
}

fn default_marker_text() -> String {
    "MARK".to_string()
}

/// 寄存器覆盖项；缺省使用 X 系列控制表
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistersTable {
    pub torque_enable: Option<RegisterSpec>,
    pub goal_position: Option<RegisterSpec>,
    pub present_position: Option<RegisterSpec>,
    pub operating_mode: Option<RegisterSpec>,
    pub position_mode_value: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryTable {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryTable {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsTable {
    /// 相对于 TOML 文件所在目录
    pub follower_limits_json: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpecialKeysTable {
    pub home: Option<String>,
    pub torque_toggle: Option<String>,
    pub estop_hold: Option<String>,
    pub marker: Option<String>,
    pub quit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingTable {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LoggingTable {
    fn default() -> Self {
        Self { dir: default_log_dir() }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// 关节限位 JSON：`{"motors": [{"id", "range_min", "range_max", "homing_offset"?}]}`
///
/// 其余字段（型号、驱动模式等）被忽略。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsFile {
    #[serde(default)]
    pub motors: Vec<MotorLimits>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotorLimits {
    pub id: i64,
    pub range_min: i64,
    pub range_max: i64,
    #[serde(default)]
    pub homing_offset: i64,
}
