//! 配置文件路径解析
//!
//! 优先级：命令行 `--config` → 环境变量 `SERVO_CONFIG` → 平台配置目录
//! （Linux: `~/.config/servo-teleop/robot.toml`，Windows: `%APPDATA%\servo-teleop\robot.toml`）。

use crate::ConfigError;
use std::ffi::OsString;
use std::path::PathBuf;

pub const CONFIG_ENV: &str = "SERVO_CONFIG";
pub const CONFIG_DIR_NAME: &str = "servo-teleop";
pub const CONFIG_FILE_NAME: &str = "robot.toml";

/// 平台默认配置文件路径
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// 按优先级解析配置文件路径
pub fn resolve_config_path(cli: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    resolve_with(cli, std::env::var_os(CONFIG_ENV), default_config_path())
}

fn resolve_with(
    cli: Option<PathBuf>,
    env: Option<OsString>,
    default: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    cli.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .or(default)
        .ok_or(ConfigError::NoConfigPath)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_path_wins() {
        let path = resolve_with(
            Some(PathBuf::from("a.toml")),
            Some(OsString::from("b.toml")),
            Some(PathBuf::from("c.toml")),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("a.toml"));
    }

    #[test]
    fn test_env_then_default() {
        let path = resolve_with(None, Some(OsString::from("b.toml")), Some(PathBuf::from("c.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("b.toml"));

        let path = resolve_with(None, Some(OsString::new()), Some(PathBuf::from("c.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("c.toml"));
    }

    #[test]
    fn test_no_path() {
        assert!(matches!(resolve_with(None, None, None), Err(ConfigError::NoConfigPath)));
    }

    #[test]
    fn test_default_path_layout() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("servo-teleop/robot.toml"));
        }
    }
}
