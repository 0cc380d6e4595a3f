//! teleop 命令
//!
//! 键盘遥操作：独占总线 → 配置舵机 → 开始会话日志 → 终端 raw 模式 → 控制循环 → 收尾

use super::CommandContext;
use super::config::print_summary;
use crate::bus::build_bus;
use crate::keyboard::TerminalKeys;
use anyhow::{Context, Result};
use clap::Args;
use servo_client::{SystemClock, TeleopLoop};
use servo_driver::BusGuard;
use servo_tools::SessionLogger;
use std::path::PathBuf;

/// 遥操作命令参数
#[derive(Args, Debug)]
pub struct TeleopCommand {
    /// 使用模拟舵机（不访问串口）
    #[arg(long)]
    pub sim: bool,

    /// 会话日志目录（覆盖配置）
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl TeleopCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let config = ctx.load_config()?;

        println!("════════════════════════════════════════");
        println!("           遥操作模式{}", if self.sim { "（模拟）" } else { "" });
        println!("════════════════════════════════════════");
        println!();
        print_summary(&config);
        println!();

        // === 1. 独占总线（所有退出路径上由 BusGuard 关闭） ===

        let mut guard = BusGuard::acquire(build_bus(&config, self.sim))
            .with_context(|| format!("❌ 无法打开总线: {}", config.robot.port))?;

        let log_dir = self.log_dir.clone().unwrap_or_else(|| config.log_dir.clone());
        let mut logger = SessionLogger::new(&log_dir, &config.joint_ids());
        let mut log_path = None;

        // === 2. 配置舵机 → 会话日志 → 终端 raw 模式 → 控制循环（终端在 keys 释放时恢复） ===

        let result = (|| -> Result<_> {
            let mut teleop = TeleopLoop::new(
                config.teleop_config(),
                config.joints.clone(),
                &mut *guard,
                TerminalKeys::new(ctx.interrupt()),
                SystemClock::default(),
                &mut logger,
            )?
            .with_keymap(config.keymap.clone())
            .with_special_keys(config.special_keys.clone());

            // 配置失败时不留下只有表头的日志
            let state = teleop.prepare().context("❌ 舵机配置失败")?;

            let path = teleop.sink_mut().start().context("❌ 无法创建会话日志")?;
            println!("📝 日志: {}", path.display());
            println!(
                "💡 提示: 按 {} 退出，按住 {} 急停",
                config.special_keys.quit, config.special_keys.estop_hold
            );
            println!();
            log_path = Some(path);

            teleop.keys_mut().enable()?;
            if !teleop.keys().precise() {
                tracing::debug!("Terminal reports no key releases, using hold window");
            }
            teleop.run_from(state).context("❌ 遥操作异常终止")
        })();

        logger.stop();
        drop(guard);

        if let Some(path) = &log_path {
            println!();
            println!("Log saved: {}", path.display());
        }

        let summary = result?;
        let state = &summary.final_state;
        println!(
            "✅ 遥操作结束: {} 个周期, {} 次下发, 扭矩切换 {} 次",
            summary.ticks, summary.writes, summary.torque_toggles
        );
        for (id, goal) in &state.goals {
            println!("  ID {:>3} → {}", id, goal);
        }
        Ok(())
    }
}
