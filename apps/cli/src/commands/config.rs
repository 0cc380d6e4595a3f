//! 配置管理命令

use super::CommandContext;
use anyhow::Result;
use clap::Subcommand;
use servo_control::AppConfig;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 加载并校验配置，打印摘要
    Check,

    /// 显示实际使用的配置文件路径
    Path,
}

impl ConfigCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            ConfigCommand::Check => {
                let path = ctx.config_path()?;
                let config = ctx.load_config()?;
                println!("📁 配置: {}", path.display());
                print_summary(&config);
                println!();
                println!("✅ Configuration OK");
                Ok(())
            },
            ConfigCommand::Path => {
                let path = ctx.config_path()?;
                println!("{}", path.display());
                if !path.exists() {
                    println!("⚠️  文件不存在");
                }
                Ok(())
            },
        }
    }
}

/// 配置摘要（teleop 启动时也会打印）
pub fn print_summary(config: &AppConfig) {
    let robot = &config.robot;
    let control = &config.control;
    println!(
        "🔌 串口: {} @ {} baud, protocol {}",
        robot.port, robot.baud_rate, robot.protocol
    );
    println!(
        "⏱️  控制: {} Hz, step {}, pacing {:?}, home {}",
        control.hz, control.step_units, control.pacing, control.home_strategy
    );
    println!("📏 限位: {}", config.limits_path.display());
    println!();
    println!("关节:");
    for joint in &config.joints {
        let keys = config
            .keymap
            .get(&joint.id)
            .map(|k| format!("{}/{}", k.dec, k.inc))
            .unwrap_or_else(|| "-/-".to_string());
        println!(
            "  ID {:>3} {:<16} {:<8} range [{}, {}] offset {}",
            joint.id, joint.name, keys, joint.range_min, joint.range_max, joint.homing_offset
        );
    }
    let special = &config.special_keys;
    println!();
    println!(
        "功能键: home={} torque={} estop(hold)={} marker={} quit={}",
        special.home, special.torque_toggle, special.estop_hold, special.marker, special.quit
    );
}
