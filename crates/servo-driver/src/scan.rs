//! 总线 ID 扫描
//!
//! 逐个 ID 读取当前位置：无应答表示该 ID 不存在（正常结果），
//! 其他事务错误按 ID 记录后继续扫描。链路级错误（未打开、端口失效）会中止扫描。

use crate::{ActuatorBus, DriverError, ErrorKind};
use std::ops::RangeInclusive;
use tracing::debug;

/// 默认扫描范围
pub const DEFAULT_SCAN_RANGE: RangeInclusive<u8> = 1..=20;

/// 单个 ID 的探测结果
#[derive(Debug)]
pub enum Probe {
    Found { id: u8, position: u32 },
    Absent { id: u8 },
    Failed { id: u8, error: DriverError },
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub probes: Vec<Probe>,
}

impl ScanReport {
    /// 找到的 (id, 当前位置)
    pub fn found(&self) -> Vec<(u8, u32)> {
        self.probes
            .iter()
            .filter_map(|p| match p {
                Probe::Found { id, position } => Some((*id, *position)),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (u8, &DriverError)> {
        self.probes.iter().filter_map(|p| match p {
            Probe::Failed { id, error } => Some((*id, error)),
            _ => None,
        })
    }
}

pub fn scan_ids<B: ActuatorBus + ?Sized>(
    bus: &mut B,
    ids: RangeInclusive<u8>,
) -> Result<ScanReport, DriverError> {
    let mut report = ScanReport::default();
    for id in ids {
        let probe = match bus.read_positions(&[id]) {
            Ok(positions) => match positions.get(&id) {
                Some(&position) => Probe::Found { id, position },
                None => Probe::Absent { id },
            },
            Err(e) if e.is_no_response() => Probe::Absent { id },
            Err(e) if matches!(e.kind(), ErrorKind::Link | ErrorKind::NotOpen) => return Err(e),
            Err(error) => Probe::Failed { id, error },
        };
        debug!("Probe id {}: {:?}", id, probe);
        report.probes.push(probe);
    }
    Ok(report)
}
