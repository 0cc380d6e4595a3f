//! # Servo Tools - 共享数据结构
//!
//! **依赖原则**: 不依赖 `servo-driver`，避免引入硬件依赖
//!
//! ## 包含模块
//!
//! - `joint` - 关节定义与范围裁剪（纯数据结构）
//! - `session_log` - 会话日志格式（写入、读取）
//! - `timestamp` - 时间戳与日志文件命名（纯函数）

pub mod joint;
pub mod session_log;
pub mod timestamp;

// 重新导出常用类型
pub use joint::{Joint, JointError, clamp};
pub use session_log::{LogRecord, RecordSink, SessionLogError, SessionLogReader, SessionLogger, joint_column};
pub use timestamp::{log_file_name, unix_ms_now};
