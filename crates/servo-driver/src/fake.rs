//! 确定性的内存总线（测试替身）
//!
//! 记录每次调用，可按操作注入一次性错误；写目标位置后当前位置立即跟随。

use crate::{ActuatorBus, ConfigPhase, DriverError};
use std::collections::{BTreeMap, BTreeSet};

/// 可注入失败的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Open,
    Configure,
    SetTorque,
    ReadPositions,
    WritePositions,
}

/// 调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCall {
    Open,
    Close,
    Configure(Vec<u8>),
    SetTorque(Vec<u8>, bool),
    ReadPositions(Vec<u8>),
    WritePositions(BTreeMap<u8, u32>),
}

#[derive(Debug, Default)]
pub struct FakeBus {
    open: bool,
    present: BTreeMap<u8, u32>,
    torque: BTreeMap<u8, bool>,
    position_mode: BTreeSet<u8>,
    calls: Vec<BusCall>,
    failures: Vec<(BusOp, DriverError)>,
}

impl FakeBus {
    /// 按 (id, 当前位置) 创建
    pub fn new(servos: &[(u8, u32)]) -> Self {
        Self {
            present: servos.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// 下一次 `op` 调用返回 `error`
    pub fn fail_next(&mut self, op: BusOp, error: DriverError) {
        self.failures.push((op, error));
    }

    pub fn calls(&self) -> &[BusCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// 所有写目标位置调用
    pub fn writes(&self) -> Vec<&BTreeMap<u8, u32>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                BusCall::WritePositions(goals) => Some(goals),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, id: u8) -> Option<u32> {
        self.present.get(&id).copied()
    }

    pub fn set_position(&mut self, id: u8, position: u32) {
        self.present.insert(id, position);
    }

    pub fn torque(&self, id: u8) -> bool {
        self.torque.get(&id).copied().unwrap_or(false)
    }

    pub fn in_position_mode(&self, id: u8) -> bool {
        self.position_mode.contains(&id)
    }

    fn take_failure(&mut self, op: BusOp) -> Result<(), DriverError> {
        match self.failures.iter().position(|(o, _)| *o == op) {
            Some(index) => Err(self.failures.remove(index).1),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.open { Ok(()) } else { Err(DriverError::NotOpen) }
    }

    fn ensure_present(&self, id: u8) -> Result<(), DriverError> {
        if self.present.contains_key(&id) {
            Ok(())
        } else {
            Err(DriverError::NoResponse { id })
        }
    }
}

impl ActuatorBus for FakeBus {
    fn open(&mut self) -> Result<(), DriverError> {
        self.calls.push(BusCall::Open);
        self.take_failure(BusOp::Open)?;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.calls.push(BusCall::Close);
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn configure_position_mode_and_enable(&mut self, ids: &[u8]) -> Result<(), DriverError> {
        self.calls.push(BusCall::Configure(ids.to_vec()));
        self.ensure_open()?;
        self.take_failure(BusOp::Configure)?;
        for &id in ids {
            self.ensure_present(id).map_err(|e| DriverError::Configuration {
                id,
                phase: ConfigPhase::OperatingMode,
                source: Box::new(e),
            })?;
            self.position_mode.insert(id);
        }
        for &id in ids {
            self.torque.insert(id, true);
        }
        Ok(())
    }

    fn set_torque(&mut self, ids: &[u8], on: bool) -> Result<(), DriverError> {
        self.calls.push(BusCall::SetTorque(ids.to_vec(), on));
        self.ensure_open()?;
        self.take_failure(BusOp::SetTorque)?;
        for &id in ids {
            self.ensure_present(id)?;
            self.torque.insert(id, on);
        }
        Ok(())
    }

    fn read_positions(&mut self, ids: &[u8]) -> Result<BTreeMap<u8, u32>, DriverError> {
        self.calls.push(BusCall::ReadPositions(ids.to_vec()));
        self.ensure_open()?;
        self.take_failure(BusOp::ReadPositions)?;
        ids.iter()
            .map(|&id| {
                self.ensure_present(id)?;
                Ok::<_, DriverError>((id, self.present[&id]))
            })
            .collect()
    }

    fn write_positions(&mut self, goals: &BTreeMap<u8, u32>) -> Result<(), DriverError> {
        self.calls.push(BusCall::WritePositions(goals.clone()));
        self.ensure_open()?;
        self.take_failure(BusOp::WritePositions)?;
        // 同步写无应答：不存在的 ID 被静默忽略
        for (&id, &goal) in goals {
            if let Some(present) = self.present.get_mut(&id) {
                *present = goal;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BusGuard;

    #[test]
    fn test_guard_closes_on_drop() {
        let mut bus = FakeBus::new(&[(1, 0)]);
        {
            let mut guard = BusGuard::acquire(&mut bus).unwrap();
            guard.set_torque(&[1], true).unwrap();
        }
        assert!(!bus.is_open());
        assert_eq!(bus.calls().last(), Some(&BusCall::Close));
        assert!(bus.torque(1));
    }

    #[test]
    fn test_guard_closes_after_failed_open() {
        let mut bus = FakeBus::new(&[]);
        bus.fail_next(BusOp::Open, DriverError::NotOpen);
        assert!(BusGuard::acquire(&mut bus).is_err());
        assert_eq!(bus.calls(), &[BusCall::Open, BusCall::Close]);
    }

    #[test]
    fn test_configure_identifies_missing_id() {
        let mut bus = FakeBus::new(&[(1, 0), (3, 0)]);
        bus.open().unwrap();
        let err = bus.configure_position_mode_and_enable(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Configuration {
                id: 2,
                phase: ConfigPhase::OperatingMode,
                ..
            }
        ));
        // 不回滚已配置的舵机
        assert!(bus.in_position_mode(1));
        assert!(!bus.torque(1));
    }

    #[test]
    fn test_read_is_all_or_nothing() {
        let mut bus = FakeBus::new(&[(1, 5)]);
        bus.open().unwrap();
        assert!(bus.read_positions(&[1, 2]).is_err());
        assert_eq!(bus.read_positions(&[1]).unwrap()[&1], 5);
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let mut bus = FakeBus::new(&[(1, 5)]);
        bus.open().unwrap();
        bus.fail_next(BusOp::WritePositions, DriverError::comm(None, "bus glitch"));
        let goals = BTreeMap::from([(1, 9)]);
        assert!(bus.write_positions(&goals).is_err());
        assert!(bus.write_positions(&goals).is_ok());
        assert_eq!(bus.position(1), Some(9));
    }
}
