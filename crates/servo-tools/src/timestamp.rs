//! # 时间戳处理
//!
//! 日志记录使用 Unix 毫秒时间戳；日志文件名使用本地时间。

use chrono::{DateTime, Local, TimeZone};
use std::time::{SystemTime, UNIX_EPOCH};

/// 日志文件名前缀
pub const LOG_FILE_PREFIX: &str = "teleop_";

/// 当前 Unix 时间（毫秒）
///
/// 系统时钟早于 1970 年时返回 0。
pub fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `teleop_%Y%m%d_%H%M%S.csv`，`suffix > 0` 时附加 `_<suffix>` 避免同秒冲突
pub fn log_file_name<Tz: TimeZone>(time: &DateTime<Tz>, suffix: u32) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = time.format("%Y%m%d_%H%M%S");
    if suffix == 0 {
        format!("{}{}.csv", LOG_FILE_PREFIX, stamp)
    } else {
        format!("{}{}_{}.csv", LOG_FILE_PREFIX, stamp, suffix)
    }
}

/// 以当前本地时间生成日志文件名
pub fn local_log_file_name(suffix: u32) -> String {
    log_file_name(&Local::now(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_log_file_name_format() {
        let time = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(log_file_name(&time, 0), "teleop_20240309_070501.csv");
        assert_eq!(log_file_name(&time, 2), "teleop_20240309_070501_2.csv");
    }

    #[test]
    fn test_unix_ms_is_recent() {
        // 2020-01-01 之后
        assert!(unix_ms_now() > 1_577_836_800_000);
    }
}
