//! # 会话日志格式
//!
//! 每个控制周期一行 CSV：
//!
//! ```text
//! unix_ms,estop,torque_on,j1,j2,...,jN,marker
//! 1700000000123,0,1,2048,1024,...,3000,
//! ```
//!
//! - `estop` / `torque_on` 为 `0` / `1`
//! - 关节列按配置顺序，每列一个整数目标位置
//! - `marker` 为空或任意字符串（含逗号、引号或换行时按 CSV 规则加引号）
//!
//! [`SessionLogger::write`] 返回前保证该行已落盘。

use crate::timestamp::local_log_file_name;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const COL_TIMESTAMP: &str = "unix_ms";
const COL_ESTOP: &str = "estop";
const COL_TORQUE: &str = "torque_on";
const COL_MARKER: &str = "marker";

/// 同一秒内创建多个日志时的最大后缀
const MAX_NAME_SUFFIX: u32 = 99;

#[derive(Error, Debug)]
pub enum SessionLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Logger not started")]
    NotStarted,

    #[error("Logger already started: {0}")]
    AlreadyStarted(PathBuf),

    #[error("Record joints {actual:?} do not match log columns {expected:?}")]
    JointMismatch { expected: Vec<u8>, actual: Vec<u8> },

    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Log has no column for joint {0}")]
    MissingColumn(u8),
}

/// 一个控制周期的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp_ms: u64,
    pub estop: bool,
    pub torque_on: bool,
    /// 按配置顺序的 (关节 id, 目标位置)
    pub goals: Vec<(u8, i64)>,
    pub marker: String,
}

impl LogRecord {
    /// estop 未按下且扭矩开启
    pub fn is_active(&self) -> bool {
        !self.estop && self.torque_on
    }

    pub fn goal(&self, id: u8) -> Option<i64> {
        self.goals.iter().find(|(jid, _)| *jid == id).map(|(_, g)| *g)
    }
}

/// 记录去向
pub trait RecordSink {
    fn write(&mut self, record: &LogRecord) -> Result<(), SessionLogError>;
}

/// 内存记录（测试、预演）
impl RecordSink for Vec<LogRecord> {
    fn write(&mut self, record: &LogRecord) -> Result<(), SessionLogError> {
        self.push(record.clone());
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write(&mut self, record: &LogRecord) -> Result<(), SessionLogError> {
        (**self).write(record)
    }
}

/// 关节列名 `j<id>`
pub fn joint_column(id: u8) -> String {
    format!("j{}", id)
}

fn header_line(joint_ids: &[u8]) -> String {
    let mut cols = vec![COL_TIMESTAMP.to_string(), COL_ESTOP.to_string(), COL_TORQUE.to_string()];
    cols.extend(joint_ids.iter().map(|&id| joint_column(id)));
    cols.push(COL_MARKER.to_string());
    cols.join(",")
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn record_line(record: &LogRecord) -> String {
    let mut line = format!(
        "{},{},{}",
        record.timestamp_ms,
        u8::from(record.estop),
        u8::from(record.torque_on)
    );
    for (_, goal) in &record.goals {
        line.push(',');
        line.push_str(&goal.to_string());
    }
    line.push(',');
    line.push_str(&escape_field(&record.marker));
    line.push('\n');
    line
}

/// 会话日志写入器
///
/// 生命周期：`start()` → 多次 `write()` → `stop()`（幂等，Drop 时自动调用）。
pub struct SessionLogger {
    dir: PathBuf,
    joint_ids: Vec<u8>,
    file: Option<File>,
    path: Option<PathBuf>,
    rows: u64,
}

impl SessionLogger {
    pub fn new(dir: impl Into<PathBuf>, joint_ids: &[u8]) -> Self {
        Self {
            dir: dir.into(),
            joint_ids: joint_ids.to_vec(),
            file: None,
            path: None,
            rows: 0,
        }
    }

    /// 创建以时间命名的新日志并写入表头，返回文件路径
    pub fn start(&mut self) -> Result<PathBuf, SessionLogError> {
        if let Some(path) = &self.path
            && self.file.is_some()
        {
            return Err(SessionLogError::AlreadyStarted(path.clone()));
        }
        fs::create_dir_all(&self.dir)?;

        let (mut file, path) = self.create_unique()?;
        file.write_all(header_line(&self.joint_ids).as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_data()?;

        info!("Session log started: {}", path.display());
        self.file = Some(file);
        self.path = Some(path.clone());
        self.rows = 0;
        Ok(path)
    }

    fn create_unique(&self) -> Result<(File, PathBuf), SessionLogError> {
        for suffix in 0..=MAX_NAME_SUFFIX {
            let path = self.dir.join(local_log_file_name(suffix));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("Log name taken, trying next suffix: {}", path.display());
                },
                Err(e) => return Err(e.into()),
            }
        }
        Err(io::Error::new(io::ErrorKind::AlreadyExists, "no free log file name").into())
    }

    /// 关闭日志（幂等）
    pub fn stop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_all() {
                warn!("Failed to sync session log on stop: {}", e);
            }
            if let Some(path) = &self.path {
                info!("Session log closed: {} ({} rows)", path.display(), self.rows);
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.file.is_some()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl RecordSink for SessionLogger {
    fn write(&mut self, record: &LogRecord) -> Result<(), SessionLogError> {
        let file = self.file.as_mut().ok_or(SessionLogError::NotStarted)?;
        let ids: Vec<u8> = record.goals.iter().map(|(id, _)| *id).collect();
        if ids != self.joint_ids {
            return Err(SessionLogError::JointMismatch {
                expected: self.joint_ids.clone(),
                actual: ids,
            });
        }
        file.write_all(record_line(record).as_bytes())?;
        file.sync_data()?;
        self.rows += 1;
        Ok(())
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 拆分一行 CSV（支持双引号转义）
fn split_fields(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            },
            (true, '"') => quoted = false,
            (true, c) => current.push(c),
            (false, '"') if current.is_empty() => quoted = true,
            (false, ',') => fields.push(std::mem::take(&mut current)),
            (false, c) => current.push(c),
        }
    }
    if quoted {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(current);
    Ok(fields)
}

/// 会话日志读取器（逐行流式解析）
pub struct SessionLogReader<R: BufRead = BufReader<File>> {
    joint_columns: Vec<(u8, usize)>,
    marker_column: Option<usize>,
    column_count: usize,
    reader: R,
    /// 已读取的物理行数
    line_no: usize,
    /// 当前记录的起始行号（错误信息用）
    record_line: usize,
}

/// 读取一条完整的 CSV 记录
///
/// 引号内的换行属于字段内容：引号未闭合时继续读下一物理行。
/// 返回的记录去掉末尾的 `\n` / `\r\n`；文件结束返回 `None`。
fn read_record<R: BufRead>(reader: &mut R, line_no: &mut usize) -> io::Result<Option<String>> {
    let mut record = String::new();
    loop {
        if reader.read_line(&mut record)? == 0 {
            break;
        }
        *line_no += 1;
        // `""` 转义成对出现，奇数个引号表示仍在引号内
        if record.matches('"').count() % 2 == 0 {
            break;
        }
    }
    if record.is_empty() {
        return Ok(None);
    }
    if record.ends_with('\n') {
        record.pop();
        if record.ends_with('\r') {
            record.pop();
        }
    }
    Ok(Some(record))
}

impl SessionLogReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionLogError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: BufRead> SessionLogReader<R> {
    /// 解析表头
    pub fn from_reader(mut reader: R) -> Result<Self, SessionLogError> {
        let mut line_no = 0;
        let header = read_record(&mut reader, &mut line_no)?.ok_or(SessionLogError::Parse {
            line: 1,
            message: "empty log".to_string(),
        })?;
        let columns = split_fields(&header)
            .map_err(|message| SessionLogError::Parse { line: 1, message })?;

        let expect = |index: usize, name: &str| -> Result<(), SessionLogError> {
            match columns.get(index) {
                Some(col) if col == name => Ok(()),
                other => Err(SessionLogError::Parse {
                    line: 1,
                    message: format!("expected column {:?} at {}, found {:?}", name, index, other),
                }),
            }
        };
        expect(0, COL_TIMESTAMP)?;
        expect(1, COL_ESTOP)?;
        expect(2, COL_TORQUE)?;

        let mut joint_columns = Vec::new();
        let mut marker_column = None;
        for (index, col) in columns.iter().enumerate().skip(3) {
            if col == COL_MARKER {
                marker_column = Some(index);
            } else if let Some(id) = col.strip_prefix('j').and_then(|s| s.parse::<u8>().ok()) {
                joint_columns.push((id, index));
            } else {
                return Err(SessionLogError::Parse {
                    line: 1,
                    message: format!("unknown column {:?}", col),
                });
            }
        }

        Ok(Self {
            joint_columns,
            marker_column,
            column_count: columns.len(),
            reader,
            line_no,
            record_line: line_no,
        })
    }

    /// 日志中记录的关节 id（列顺序）
    pub fn joint_ids(&self) -> Vec<u8> {
        self.joint_columns.iter().map(|(id, _)| *id).collect()
    }

    /// 确认日志包含所有指定关节列
    pub fn require_joints(&self, ids: &[u8]) -> Result<(), SessionLogError> {
        for &id in ids {
            if !self.joint_columns.iter().any(|(jid, _)| *jid == id) {
                return Err(SessionLogError::MissingColumn(id));
            }
        }
        Ok(())
    }

    fn parse_record(&self, line: &str) -> Result<LogRecord, SessionLogError> {
        let err = |message: String| SessionLogError::Parse {
            line: self.record_line,
            message,
        };
        let fields = split_fields(line).map_err(err)?;
        if fields.len() != self.column_count {
            return Err(err(format!(
                "expected {} fields, found {}",
                self.column_count,
                fields.len()
            )));
        }
        let flag = |index: usize| -> Result<bool, SessionLogError> {
            match fields[index].trim() {
                "0" => Ok(false),
                "1" => Ok(true),
                other => Err(err(format!("invalid flag {:?}", other))),
            }
        };
        let timestamp_ms = fields[0]
            .trim()
            .parse::<u64>()
            .map_err(|e| err(format!("invalid timestamp {:?}: {}", fields[0], e)))?;
        let estop = flag(1)?;
        let torque_on = flag(2)?;
        let goals = self
            .joint_columns
            .iter()
            .map(|&(id, index)| {
                fields[index]
                    .trim()
                    .parse::<i64>()
                    .map(|g| (id, g))
                    .map_err(|e| err(format!("invalid goal for j{} {:?}: {}", id, fields[index], e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let marker = self
            .marker_column
            .map(|index| fields[index].clone())
            .unwrap_or_default();

        Ok(LogRecord {
            timestamp_ms,
            estop,
            torque_on,
            goals,
            marker,
        })
    }
}

impl<R: BufRead> Iterator for SessionLogReader<R> {
    type Item = Result<LogRecord, SessionLogError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.record_line = self.line_no + 1;
            let line = match read_record(&mut self.reader, &mut self.line_no) {
                Ok(line) => line?,
                Err(e) => return Some(Err(e.into())),
            };
            // 跳过空行（例如文件末尾）
            if line.is_empty() {
                continue;
            }
            return Some(self.parse_record(&line));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record(ts: u64, estop: bool, torque_on: bool, goals: &[(u8, i64)], marker: &str) -> LogRecord {
        LogRecord {
            timestamp_ms: ts,
            estop,
            torque_on,
            goals: goals.to_vec(),
            marker: marker.to_string(),
        }
    }

    #[test]
    fn test_header_line() {
        assert_eq!(header_line(&[1, 2, 10]), "unix_ms,estop,torque_on,j1,j2,j10,marker");
    }

    #[test]
    fn test_record_line() {
        let rec = record(1700000000123, false, true, &[(1, 2048), (2, 100)], "");
        assert_eq!(record_line(&rec), "1700000000123,0,1,2048,100,\n");

        let rec = record(5, true, false, &[(1, 7)], "MARK");
        assert_eq!(record_line(&rec), "5,1,0,7,MARK\n");
    }

    #[test]
    fn test_marker_escaping() {
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(
            split_fields("1,\"a,b\",\"say \"\"hi\"\"\"").unwrap(),
            vec!["1", "a,b", "say \"hi\""]
        );
        assert!(split_fields("1,\"open").is_err());
    }

    #[test]
    fn test_reader_parses_rows() {
        let text = "unix_ms,estop,torque_on,j1,j3,marker\n\
                    0,0,1,100,300,\n\
                    500,1,1,110,310,MARK\n\
                    \n";
        let reader = SessionLogReader::from_reader(Cursor::new(text)).unwrap();
        assert_eq!(reader.joint_ids(), vec![1, 3]);
        let records: Vec<LogRecord> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], record(0, false, true, &[(1, 100), (3, 300)], ""));
        assert!(records[0].is_active());
        assert!(!records[1].is_active());
        assert_eq!(records[1].marker, "MARK");
        assert_eq!(records[1].goal(3), Some(310));
    }

    #[test]
    fn test_reader_joins_quoted_line_breaks() {
        let text = "unix_ms,estop,torque_on,j1,marker\r\n\
                    0,0,1,100,\"grasp\r\nstart\"\r\n\
                    20,0,1,110,\n\
                    40,0,1,120,\"open\n";
        let mut reader = SessionLogReader::from_reader(Cursor::new(text)).unwrap();
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.marker, "grasp\r\nstart");
        assert_eq!(reader.next().unwrap().unwrap().goal(1), Some(110));
        // 引号未闭合直到文件结束；错误指向记录起始行
        assert!(matches!(
            reader.next(),
            Some(Err(SessionLogError::Parse { line: 5, .. }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_reader_rejects_bad_rows() {
        let text = "unix_ms,estop,torque_on,j1,marker\n0,2,1,100,\n";
        let mut reader = SessionLogReader::from_reader(Cursor::new(text)).unwrap();
        assert!(matches!(
            reader.next(),
            Some(Err(SessionLogError::Parse { line: 2, .. }))
        ));

        let text = "unix_ms,estop,torque_on,j1,marker\n0,0,1,\n";
        let mut reader = SessionLogReader::from_reader(Cursor::new(text)).unwrap();
        assert!(matches!(reader.next(), Some(Err(SessionLogError::Parse { .. }))));
    }

    #[test]
    fn test_reader_rejects_bad_header() {
        assert!(SessionLogReader::from_reader(Cursor::new("")).is_err());
        assert!(SessionLogReader::from_reader(Cursor::new("time,estop,torque_on,marker\n")).is_err());
        assert!(SessionLogReader::from_reader(Cursor::new("unix_ms,estop,torque_on,x1,marker\n")).is_err());
    }

    #[test]
    fn test_require_joints() {
        let reader =
            SessionLogReader::from_reader(Cursor::new("unix_ms,estop,torque_on,j1,j2,marker\n")).unwrap();
        assert!(reader.require_joints(&[2, 1]).is_ok());
        assert!(matches!(
            reader.require_joints(&[1, 4]),
            Err(SessionLogError::MissingColumn(4))
        ));
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<LogRecord> = Vec::new();
        sink.write(&record(1, false, true, &[(1, 1)], "")).unwrap();
        assert_eq!(sink.len(), 1);
    }
}
