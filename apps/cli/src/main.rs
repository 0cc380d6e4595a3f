//! # Servo CLI
//!
//! 串行总线舵机的键盘遥操作、会话回放与总线扫描。
//!
//! ```bash
//! # 检查配置（关节、按键、寄存器）
//! servo-cli --config config/robot.toml config check
//!
//! # 键盘遥操作，每个周期写入会话日志
//! servo-cli --config config/robot.toml teleop
//!
//! # 以 0.5 倍速回放
//! servo-cli --config config/robot.toml replay --input logs/session_20250101_120000.csv --speed 0.5
//!
//! # 扫描 1~20 号舵机
//! servo-cli scan --from 1 --to 20
//! ```
//!
//! 配置文件查找顺序：`--config` → 环境变量 `SERVO_CONFIG` → 平台配置目录。
//! 所有子命令都支持 `--sim`，使用内存中的模拟舵机代替串口。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod bus;
mod commands;
mod keyboard;

use commands::{CommandContext, ConfigCommand, ReplayCommand, ScanCommand, TeleopCommand};

/// Servo CLI - 串行总线舵机命令行工具
#[derive(Parser, Debug)]
#[command(name = "servo-cli")]
#[command(about = "Keyboard teleoperation, replay and bus scanning for serial bus servos", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认读取 SERVO_CONFIG 或平台配置目录）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 键盘遥操作（记录会话日志）
    Teleop {
        #[command(flatten)]
        args: TeleopCommand,
    },

    /// 回放会话日志
    Replay {
        #[command(flatten)]
        args: ReplayCommand,
    },

    /// 扫描总线上的舵机 ID
    Scan {
        #[command(flatten)]
        args: ScanCommand,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    // 日志输出到 stderr，stdout 留给命令结果
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("servo_cli=info".parse()?)
                .add_directive("servo_client=info".parse()?)
                .add_directive("servo_driver=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // 🚨 Ctrl-C：控制循环/回放在下一个周期检查并退出，总线由 BusGuard 关闭
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("无法注册 Ctrl-C 处理器")?;

    let ctx = CommandContext::new(cli.config, interrupt);

    match cli.command {
        Commands::Teleop { args } => args.execute(&ctx),
        Commands::Replay { args } => args.execute(&ctx),
        Commands::Scan { args } => args.execute(&ctx),
        Commands::Config(cmd) => cmd.execute(&ctx),
    }
}
