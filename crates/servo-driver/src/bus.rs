//! 执行器总线抽象
//!
//! [`ActuatorBus`] 是控制循环与回放唯一依赖的硬件接口；[`BusGuard`] 保证
//! 在任何退出路径上关闭总线。

use crate::DriverError;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// 舵机总线操作
///
/// 所有操作同步阻塞，同一时刻只有一个事务在总线上。
pub trait ActuatorBus {
    fn open(&mut self) -> Result<(), DriverError>;

    /// 关闭总线（幂等，尽力而为）
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// 两阶段配置：先对所有 ID 写入位置模式，再逐个使能扭矩
    ///
    /// 遇到第一个失败即返回 [`DriverError::Configuration`]，不回滚已写入的舵机。
    fn configure_position_mode_and_enable(&mut self, ids: &[u8]) -> Result<(), DriverError>;

    /// 逐个写扭矩使能寄存器，遇错即停
    fn set_torque(&mut self, ids: &[u8], on: bool) -> Result<(), DriverError>;

    /// 一次同步读事务读取所有 ID 的当前位置
    ///
    /// 任何一个 ID 的数据不可用时整个调用失败，不返回部分结果。
    fn read_positions(&mut self, ids: &[u8]) -> Result<BTreeMap<u8, u32>, DriverError>;

    /// 一次同步写事务下发所有目标位置
    fn write_positions(&mut self, goals: &BTreeMap<u8, u32>) -> Result<(), DriverError>;
}

impl<B: ActuatorBus + ?Sized> ActuatorBus for &mut B {
    fn open(&mut self) -> Result<(), DriverError> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn configure_position_mode_and_enable(&mut self, ids: &[u8]) -> Result<(), DriverError> {
        (**self).configure_position_mode_and_enable(ids)
    }

    fn set_torque(&mut self, ids: &[u8], on: bool) -> Result<(), DriverError> {
        (**self).set_torque(ids, on)
    }

    fn read_positions(&mut self, ids: &[u8]) -> Result<BTreeMap<u8, u32>, DriverError> {
        (**self).read_positions(ids)
    }

    fn write_positions(&mut self, goals: &BTreeMap<u8, u32>) -> Result<(), DriverError> {
        (**self).write_positions(goals)
    }
}

/// 作用域内独占总线；离开作用域时自动关闭
pub struct BusGuard<B: ActuatorBus> {
    bus: B,
}

impl<B: ActuatorBus> BusGuard<B> {
    /// 打开总线；打开失败时也会调用一次 `close` 清理
    pub fn acquire(mut bus: B) -> Result<Self, DriverError> {
        if let Err(e) = bus.open() {
            bus.close();
            return Err(e);
        }
        Ok(Self { bus })
    }
}

impl<B: ActuatorBus> Deref for BusGuard<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.bus
    }
}

impl<B: ActuatorBus> DerefMut for BusGuard<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}

impl<B: ActuatorBus> Drop for BusGuard<B> {
    fn drop(&mut self) {
        debug!("[Auto-Drop] releasing actuator bus");
        self.bus.close();
    }
}
