//! replay 命令
//!
//! 按原始时间间隔（可加速/减速）回放会话日志

use super::CommandContext;
use crate::bus::build_bus;
use anyhow::Result;
use clap::Args;
use servo_client::{SystemClock, run_replay};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

/// 最大速度倍数
const MAX_SPEED_FACTOR: f64 = 5.0;
/// 超过该倍数时提示风险
const RECOMMENDED_SPEED_FACTOR: f64 = 2.0;

/// 回放命令参数
#[derive(Args, Debug)]
pub struct ReplayCommand {
    /// 会话日志路径（CSV）
    #[arg(short, long)]
    pub input: PathBuf,

    /// 回放速度倍数（1.0 = 原始速度）
    ///
    /// # 安全说明
    ///
    /// - 1.0x: 原始速度（推荐）
    /// - 0.1x ~ 2.0x: 安全范围
    /// - > 2.0x: 需要特别小心
    /// - 最大值: 5.0x
    #[arg(short, long, default_value_t = 1.0, allow_negative_numbers = true)]
    pub speed: f64,

    /// 跳过回放前的确认
    #[arg(long)]
    pub confirm: bool,

    /// 使用模拟舵机（不访问串口）
    #[arg(long)]
    pub sim: bool,
}

impl ReplayCommand {
    /// 速度倍数检查
    fn validate_speed(&self) -> Result<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            anyhow::bail!("❌ 速度倍数必须为正数，当前: {:.2}", self.speed);
        }
        if self.speed > MAX_SPEED_FACTOR {
            anyhow::bail!(
                "❌ 速度倍数超出最大值: {:.2} > {}\n   最大速度倍数限制为安全考虑",
                self.speed,
                MAX_SPEED_FACTOR
            );
        }
        Ok(())
    }

    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        // === 1. 参数检查（不需要配置） ===

        self.validate_speed()?;
        if !self.input.exists() {
            anyhow::bail!("❌ 会话日志不存在: {}", self.input.display());
        }

        let config = ctx.load_config()?;

        // === 2. 显示回放信息 ===

        println!("════════════════════════════════════════");
        println!("           回放模式{}", if self.sim { "（模拟）" } else { "" });
        println!("════════════════════════════════════════");
        println!();
        println!("📁 文件: {}", self.input.display());
        println!("⚡ 速度: {:.2}x", self.speed);
        println!("🔌 串口: {} @ {} baud", config.robot.port, config.robot.baud_rate);

        if self.speed > RECOMMENDED_SPEED_FACTOR {
            println!(
                "⚠️  警告: 速度超过推荐值 ({:.1}x)",
                RECOMMENDED_SPEED_FACTOR
            );
            println!("   请确保:");
            println!("   • 回放环境安全，无人员/障碍物");
            println!("   • 有急停准备");
            println!("   • 舵机状态正常");
        }

        println!();

        // === 3. 安全确认 ===

        if !self.confirm {
            let confirmed = inquire::Confirm::new("即将开始回放，确定要继续吗？")
                .with_default(false)
                .prompt()?;
            if !confirmed {
                println!("❌ 操作已取消");
                return Ok(());
            }
            println!("✅ 已确认");
            println!();
        }

        // === 4. 回放（Ctrl-C 在下一行之前生效） ===

        println!("💡 提示: 按 Ctrl-C 可随时停止回放");
        println!();

        let interrupt = ctx.interrupt();
        let stats = run_replay(
            build_bus(&config, self.sim),
            SystemClock::default(),
            config.joints.clone(),
            &self.input,
            self.speed,
            Some(interrupt.clone()),
        )?;

        println!();
        if stats.cancelled || interrupt.load(Ordering::SeqCst) {
            println!("🛑 回放已停止");
        } else {
            println!("✅ 回放完成");
        }
        println!(
            "   {} 行, 下发 {} 行, 跳过 {} 行（急停/扭矩关闭）",
            stats.rows, stats.written, stats.skipped
        );
        Ok(())
    }
}
