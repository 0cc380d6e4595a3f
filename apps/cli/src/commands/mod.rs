//! 命令定义和实现

pub mod config;
pub mod replay;
pub mod scan;
pub mod teleop;

pub use config::ConfigCommand;
pub use replay::ReplayCommand;
pub use scan::ScanCommand;
pub use teleop::TeleopCommand;

use anyhow::{Context, Result};
use servo_control::{AppConfig, resolve_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// 命令共享的运行环境
pub struct CommandContext {
    config_path: Option<PathBuf>,
    interrupt: Arc<AtomicBool>,
}

impl CommandContext {
    pub fn new(config_path: Option<PathBuf>, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            config_path,
            interrupt,
        }
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        Ok(resolve_config_path(self.config_path.clone())?)
    }

    /// 解析并加载配置
    pub fn load_config(&self) -> Result<AppConfig> {
        let path = self.config_path()?;
        AppConfig::load(&path).with_context(|| format!("❌ 配置加载失败: {}", path.display()))
    }

    /// Ctrl-C 标志（true 表示请求停止）
    pub fn interrupt(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }
}
