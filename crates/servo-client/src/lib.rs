//! 客户端接口模块
//!
//! 本模块在 [`servo_driver::ActuatorBus`] 之上提供：
//! - 键盘遥操作控制循环（[`TeleopLoop`]）：固定频率、裁剪增量、急停/扭矩/回零
//! - 会话状态（[`SessionState`]），每个周期显式传入、传出
//! - 会话回放（[`Replayer`]、[`run_replay`]）
//! - 时钟与周期调度（[`Clock`]、[`Pacer`]），测试中可替换为 [`ManualClock`]
//!
//! # 使用场景
//!
//! ```no_run
//! use servo_client::{SystemClock, TeleopConfig, TeleopLoop, ScriptedKeys};
//! use servo_driver::{BusConfig, BusGuard, DynamixelBus};
//! use servo_tools::{Joint, SessionLogger};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let joints = vec![Joint::new(1, "base", 1024, 3072, 0)?];
//! let mut guard = BusGuard::acquire(DynamixelBus::serial(BusConfig::default()))?;
//! let mut logger = SessionLogger::new("logs", &[1]);
//! logger.start()?;
//!
//! let keys = ScriptedKeys::new([vec!["a"], vec!["esc"]]);
//! let mut teleop = TeleopLoop::new(
//!     TeleopConfig::default(),
//!     joints,
//!     &mut *guard,
//!     keys,
//!     SystemClock::default(),
//!     &mut logger,
//! )?;
//! let summary = teleop.run()?;
//! println!("{} ticks", summary.ticks);
//! # Ok(())
//! # }
//! ```

pub mod clock;
mod error;
pub mod homing;
pub mod input;
pub mod replay;
mod state;
pub mod teleop;

pub use clock::{Clock, ManualClock, Pacer, PacingMode, SystemClock};
pub use error::ClientError;
pub use homing::{HomeStrategy, home_goals};
pub use input::{InputSample, JointKeys, KeyMap, KeySource, ScriptedKeys, SpecialKeys};
pub use replay::{MIN_SPEED, ReplayStats, Replayer, effective_speed, run_replay};
pub use state::{LoopMode, SessionState};
pub use teleop::{SessionSummary, TORQUE_DEBOUNCE, TeleopConfig, TeleopLoop, TickOutcome};
