//! 应用配置
//!
//! 加载 TOML 配置与关节限位 JSON，校验后得到类型化的 [`AppConfig`]。

use crate::ConfigError;
use crate::file::{ConfigFile, LimitsFile, RegistersTable, SpecialKeysTable};
use servo_client::{HomeStrategy, JointKeys, KeyMap, PacingMode, SpecialKeys, TeleopConfig};
use servo_driver::{BusConfig, RetryPolicy};
use servo_protocol::{MAX_ID, ProtocolVersion, RegisterMap};
use servo_tools::Joint;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// 串口链路参数
#[derive(Debug, Clone, PartialEq)]
pub struct RobotSettings {
    pub port: String,
    pub baud_rate: u32,
    pub protocol: ProtocolVersion,
    pub response_timeout: Duration,
}

/// 控制循环参数
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSettings {
    pub hz: f64,
    pub step_units: i64,
    pub use_present_position_as_start: bool,
    pub home_strategy: HomeStrategy,
    pub pacing: PacingMode,
    pub debounce: Duration,
    pub marker_text: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub robot: RobotSettings,
    pub control: ControlSettings,
    pub registers: RegisterMap,
    pub retry: RetryPolicy,
    /// 按 id 升序
    pub joints: Vec<Joint>,
    pub keymap: KeyMap,
    pub special_keys: SpecialKeys,
    pub log_dir: PathBuf,
    /// 关节限位 JSON 的实际路径
    pub limits_path: PathBuf,
}

impl AppConfig {
    /// 从 TOML 文件加载；限位 JSON 路径相对于 TOML 文件所在目录
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read_file(path)?;
        let file: ConfigFile = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let config = Self::from_file(file, base_dir)?;
        debug!(
            "Loaded {} ({} joints, limits {})",
            path.display(),
            config.joints.len(),
            config.limits_path.display()
        );
        Ok(config)
    }

    /// 从已解析的 TOML 结构构建（读取限位 JSON）
    pub fn from_file(file: ConfigFile, base_dir: &Path) -> Result<Self, ConfigError> {
        let limits_path = base_dir.join(&file.limits.follower_limits_json);
        let limits_text = read_file(&limits_path)?;
        let limits: LimitsFile = serde_json::from_str(&limits_text).map_err(|source| ConfigError::Json {
            path: limits_path.clone(),
            source,
        })?;
        Self::from_parts(file, limits, limits_path)
    }

    pub fn from_parts(file: ConfigFile, limits: LimitsFile, limits_path: PathBuf) -> Result<Self, ConfigError> {
        let protocol = ProtocolVersion::try_from(file.robot.protocol_version).map_err(|_| {
            ConfigError::validation(format!(
                "robot.protocol_version must be 1.0 or 2.0, got {}",
                file.robot.protocol_version
            ))
        })?;
        let robot = RobotSettings {
            port: file.robot.port,
            baud_rate: file.robot.baudrate,
            protocol,
            response_timeout: Duration::from_millis(file.robot.response_timeout_ms),
        };

        let pacing = PacingMode::from_name(&file.control.pacing).ok_or_else(|| {
            ConfigError::validation(format!(
                "control.pacing must be \"remainder\" or \"deadline\", got {:?}",
                file.control.pacing
            ))
        })?;
        let control = ControlSettings {
            hz: file.control.hz,
            step_units: file.control.step_units,
            use_present_position_as_start: file.control.use_present_position_as_start,
            home_strategy: HomeStrategy::from_name(&file.control.home_strategy),
            pacing,
            debounce: Duration::from_millis(file.control.debounce_ms),
            marker_text: file.control.marker_text,
        };

        let joint_names = parse_joint_names(&file.joint_names)?;
        let joints = build_joints(&limits, &joint_names)?;
        let keymap = build_keymap(&file.keymap, &joints)?;

        let config = Self {
            robot,
            control,
            registers: build_registers(&file.registers),
            retry: RetryPolicy::new(file.retry.max_attempts, Duration::from_millis(file.retry.backoff_ms)),
            joints,
            keymap,
            special_keys: build_special_keys(file.special_keys),
            log_dir: file.logging.dir,
            limits_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// 语义校验
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.control.hz.is_finite() || self.control.hz <= 0.0 {
            return Err(ConfigError::validation(format!(
                "control.hz must be > 0, got {}",
                self.control.hz
            )));
        }
        if self.control.step_units <= 0 {
            return Err(ConfigError::validation(format!(
                "control.step_units must be > 0, got {}",
                self.control.step_units
            )));
        }
        if self.robot.port.trim().is_empty() {
            return Err(ConfigError::validation("robot.port is empty"));
        }
        if self.robot.baud_rate == 0 {
            return Err(ConfigError::validation("robot.baudrate must be > 0"));
        }
        if self.joints.is_empty() {
            return Err(ConfigError::validation("joint limits file defines no motors"));
        }
        let mut seen = BTreeSet::new();
        for joint in &self.joints {
            if joint.id == 0 || joint.id > MAX_ID {
                return Err(ConfigError::validation(format!(
                    "joint id {} outside 1..={}",
                    joint.id, MAX_ID
                )));
            }
            if !seen.insert(joint.id) {
                return Err(ConfigError::validation(format!("duplicate joint id {}", joint.id)));
            }
            joint.validate()?;
        }
        self.registers.validate()?;
        for (name, key) in self.special_key_entries() {
            if key.trim().is_empty() {
                return Err(ConfigError::validation(format!("special_keys.{} is empty", name)));
            }
        }
        Ok(())
    }

    fn special_key_entries(&self) -> [(&'static str, &str); 5] {
        let keys = &self.special_keys;
        [
            ("home", keys.home.as_str()),
            ("torque_toggle", keys.torque_toggle.as_str()),
            ("estop_hold", keys.estop_hold.as_str()),
            ("marker", keys.marker.as_str()),
            ("quit", keys.quit.as_str()),
        ]
    }

    pub fn joint_ids(&self) -> Vec<u8> {
        self.joints.iter().map(|j| j.id).collect()
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            port: self.robot.port.clone(),
            baud_rate: self.robot.baud_rate,
            protocol: self.robot.protocol,
            registers: self.registers,
            response_timeout: self.robot.response_timeout,
            retry: self.retry,
        }
    }

    pub fn teleop_config(&self) -> TeleopConfig {
        TeleopConfig {
            hz: self.control.hz,
            step_units: self.control.step_units,
            use_present_position_as_start: self.control.use_present_position_as_start,
            home_strategy: self.control.home_strategy,
            pacing: self.control.pacing,
            debounce: self.control.debounce,
            marker_text: self.control.marker_text.clone(),
        }
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::FileNotFound(path.to_path_buf())
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn parse_joint_names(
    raw: &BTreeMap<String, String>,
) -> Result<BTreeMap<u8, String>, ConfigError> {
    raw.iter()
        .map(|(key, name)| -> Result<(u8, String), ConfigError> {
            let id = key
                .trim()
                .parse::<u8>()
                .map_err(|_| ConfigError::validation(format!("joint_names key {:?} is not a joint id", key)))?;
            Ok((id, name.clone()))
        })
        .collect()
}

fn build_joints(
    limits: &LimitsFile,
    names: &BTreeMap<u8, String>,
) -> Result<Vec<Joint>, ConfigError> {
    let mut joints = limits
        .motors
        .iter()
        .map(|motor| -> Result<Joint, ConfigError> {
            let id = u8::try_from(motor.id)
                .map_err(|_| ConfigError::validation(format!("motor id {} out of range", motor.id)))?;
            let name = names.get(&id).cloned().unwrap_or_else(|| format!("joint_{}", id));
            Ok(Joint::new(id, name, motor.range_min, motor.range_max, motor.homing_offset)?)
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;
    joints.sort_by_key(|j| j.id);
    Ok(joints)
}

fn build_keymap(
    raw: &BTreeMap<String, (String, String)>,
    joints: &[Joint],
) -> Result<KeyMap, ConfigError> {
    let mut keymap = KeyMap::new();
    for (key, (dec, inc)) in raw {
        let id = key
            .strip_prefix('j')
            .and_then(|s| s.parse::<u8>().ok())
            .ok_or_else(|| ConfigError::validation(format!("keymap key {:?} must look like j<id>", key)))?;
        if !joints.iter().any(|j| j.id == id) {
            warn!("keymap.{} refers to an unconfigured joint, ignoring", key);
            continue;
        }
        if dec.trim().is_empty() || inc.trim().is_empty() {
            return Err(ConfigError::validation(format!("keymap.{} has an empty key", key)));
        }
        keymap.insert(id, JointKeys::new(dec.clone(), inc.clone()));
    }
    Ok(keymap)
}

fn build_registers(raw: &RegistersTable) -> RegisterMap {
    let defaults = RegisterMap::default();
    RegisterMap {
        torque_enable: raw.torque_enable.unwrap_or(defaults.torque_enable),
        goal_position: raw.goal_position.unwrap_or(defaults.goal_position),
        present_position: raw.present_position.unwrap_or(defaults.present_position),
        operating_mode: raw.operating_mode.unwrap_or(defaults.operating_mode),
        position_mode_value: raw.position_mode_value.unwrap_or(defaults.position_mode_value),
    }
}

fn build_special_keys(raw: SpecialKeysTable) -> SpecialKeys {
    let defaults = SpecialKeys::default();
    SpecialKeys {
        home: raw.home.unwrap_or(defaults.home),
        torque_toggle: raw.torque_toggle.unwrap_or(defaults.torque_toggle),
        estop_hold: raw.estop_hold.unwrap_or(defaults.estop_hold),
        marker: raw.marker.unwrap_or(defaults.marker),
        quit: raw.quit.unwrap_or(defaults.quit),
    }
}
