//! scan 命令
//!
//! 逐个 ID 读取当前位置，列出总线上应答的舵机

use super::CommandContext;
use crate::bus::build_bus;
use anyhow::{Context, Result};
use clap::Args;
use servo_driver::{BusGuard, DEFAULT_SCAN_RANGE, scan_ids};
use servo_protocol::MAX_ID;

/// 扫描命令参数
#[derive(Args, Debug)]
pub struct ScanCommand {
    /// 起始 ID
    #[arg(long, default_value_t = *DEFAULT_SCAN_RANGE.start())]
    pub from: u8,

    /// 结束 ID（包含）
    #[arg(long, default_value_t = *DEFAULT_SCAN_RANGE.end())]
    pub to: u8,

    /// 使用模拟舵机（配置中的每个关节一个）
    #[arg(long)]
    pub sim: bool,
}

impl ScanCommand {
    fn validate_range(&self) -> Result<()> {
        if self.from == 0 || self.to > MAX_ID {
            anyhow::bail!("❌ ID 范围必须在 1..={} 之内，当前: {}..={}", MAX_ID, self.from, self.to);
        }
        if self.from > self.to {
            anyhow::bail!("❌ 起始 ID 大于结束 ID: {} > {}", self.from, self.to);
        }
        Ok(())
    }

    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        self.validate_range()?;
        let config = ctx.load_config()?;

        println!(
            "🔍 扫描 ID {}..={} ({} @ {} baud, protocol {})",
            self.from, self.to, config.robot.port, config.robot.baud_rate, config.robot.protocol
        );

        let mut guard = BusGuard::acquire(build_bus(&config, self.sim))
            .with_context(|| format!("❌ 无法打开总线: {}", config.robot.port))?;
        let report = scan_ids(&mut *guard, self.from..=self.to).context("❌ 扫描中止")?;

        for (id, error) in report.failures() {
            println!("⚠️  ID {} 应答异常: {}", id, error);
        }

        let found = report.found();
        if found.is_empty() {
            println!("No devices found. Check baudrate/protocol/power/wiring.");
            return Ok(());
        }
        for (id, position) in &found {
            println!("Found ID {} present={}", id, position);
        }
        println!("✅ 共 {} 个舵机", found.len());
        Ok(())
    }
}
