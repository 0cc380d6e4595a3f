//! Dynamixel 风格总线实现
//!
//! 每个事务：清空接收缓冲 → 发送指令包 → （如有）按 ID 顺序接收状态包。
//! 状态包接收时跳过包头前的噪声字节，按长度字段读满整包后再校验。

use crate::{ActuatorBus, ConfigPhase, DriverError, RetryPolicy};
use servo_link::{BusLink, LinkError, SerialLink};
use servo_protocol::packet::total_len;
use servo_protocol::{
    InstructionPacket, ProtocolVersion, RegisterMap, RegisterSpec, StatusError, StatusPacket,
    decode_register, encode_position, encode_register,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, trace};

/// 包头前允许丢弃的最大噪声字节数
const MAX_NOISE_BYTES: usize = 64;

/// 状态包长度上限（本项目读取的数据不超过 4 字节/ID）
const MAX_STATUS_LEN: usize = 256;

/// 总线配置（进程生命周期内不变）
#[derive(Debug, Clone, PartialEq)]
pub struct BusConfig {
    pub port: String,
    pub baud_rate: u32,
    pub protocol: ProtocolVersion,
    pub registers: RegisterMap,
    /// 单个状态包的接收超时
    pub response_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 57_600,
            protocol: ProtocolVersion::V2,
            registers: RegisterMap::default(),
            response_timeout: Duration::from_millis(50),
            retry: RetryPolicy::default(),
        }
    }
}

/// 通过 [`BusLink`] 访问的舵机总线
pub struct DynamixelBus<L: BusLink> {
    link: L,
    config: BusConfig,
}

impl DynamixelBus<SerialLink> {
    /// 使用配置中的端口和波特率创建串口总线（不打开）
    pub fn serial(config: BusConfig) -> Self {
        let link = SerialLink::new(config.port.clone(), config.baud_rate);
        Self::new(link, config)
    }
}

impl<L: BusLink> DynamixelBus<L> {
    pub fn new(link: L, config: BusConfig) -> Self {
        Self { link, config }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.link.is_open() {
            Ok(())
        } else {
            Err(DriverError::NotOpen)
        }
    }

    /// 写单个寄存器（按配置宽度编码）
    pub fn write_register(&mut self, id: u8, spec: RegisterSpec, value: u32) -> Result<(), DriverError> {
        let data = encode_register(value, spec.len)?;
        let packet = InstructionPacket::write(self.config.protocol, id, spec.addr, &data)?;
        self.transact(&packet)?;
        Ok(())
    }

    /// 读单个寄存器
    pub fn read_register(&mut self, id: u8, spec: RegisterSpec) -> Result<u32, DriverError> {
        let packet = InstructionPacket::read(self.config.protocol, id, spec.addr, spec.len)?;
        let status = self
            .transact(&packet)?
            .ok_or_else(|| DriverError::comm(Some(id), "read returned no status"))?;
        decode_data(id, &status, spec.len)
    }

    /// 发送指令包，需要时接收对应状态包（受重试策略约束）
    fn transact(&mut self, packet: &InstructionPacket) -> Result<Option<StatusPacket>, DriverError> {
        self.ensure_open()?;
        let retry = self.config.retry;
        retry.run(|| {
            self.send_packet(packet)?;
            if packet.expects_status() {
                self.receive_status(packet.id).map(Some)
            } else {
                Ok(None)
            }
        })
    }

    fn send_packet(&mut self, packet: &InstructionPacket) -> Result<(), DriverError> {
        let bytes = packet.encode(self.config.protocol);
        self.link.clear_input().map_err(|e| map_link(packet.id, e))?;
        trace!("{:?} -> id {}: {:02X?}", packet.instruction, packet.id, bytes);
        self.link.send(&bytes).map_err(|e| map_link(packet.id, e))
    }

    fn receive_status(&mut self, expected: u8) -> Result<StatusPacket, DriverError> {
        let version = self.config.protocol;
        let timeout = self.config.response_timeout;
        let header = version.header();
        let prefix = header.len() + version.prefix_len();

        let mut packet = vec![0u8; prefix];
        self.link
            .receive_exact(&mut packet, timeout)
            .map_err(|e| map_link(expected, e))?;

        let mut skipped = 0;
        while !packet.starts_with(header) {
            if skipped >= MAX_NOISE_BYTES {
                return Err(DriverError::comm(Some(expected), "no status header found"));
            }
            packet.remove(0);
            let mut byte = [0u8; 1];
            self.link
                .receive_exact(&mut byte, timeout)
                .map_err(|e| map_link(expected, e))?;
            packet.push(byte[0]);
            skipped += 1;
        }
        if skipped > 0 {
            debug!("Skipped {} noise bytes before status from id {}", skipped, expected);
        }

        let total = total_len(version, &packet)
            .map_err(|e| DriverError::comm(Some(expected), e.to_string()))?;
        if total > MAX_STATUS_LEN {
            return Err(DriverError::comm(
                Some(expected),
                format!("status length {} exceeds limit", total),
            ));
        }
        packet.resize(total, 0);
        self.link
            .receive_exact(&mut packet[prefix..], timeout)
            .map_err(|e| map_link(expected, e))?;

        let status = StatusPacket::decode(version, &packet)
            .map_err(|e| DriverError::comm(Some(expected), format!("corrupt status packet: {}", e)))?;
        if status.id != expected {
            return Err(DriverError::comm(
                Some(expected),
                format!("unexpected status from id {}", status.id),
            ));
        }
        let error = StatusError::new(version, status.error);
        if error.is_error() {
            return Err(DriverError::Device {
                id: status.id,
                status: error,
            });
        }
        Ok(status)
    }

    fn sync_read_positions(&mut self, ids: &[u8]) -> Result<BTreeMap<u8, u32>, DriverError> {
        let spec = self.config.registers.present_position;
        let packet = InstructionPacket::sync_read(self.config.protocol, spec.addr, spec.len, ids)?;
        let retry = self.config.retry;
        retry.run(|| {
            self.send_packet(&packet)?;
            let mut positions = BTreeMap::new();
            for &id in ids {
                let status = self.receive_status(id)?;
                positions.insert(id, decode_data(id, &status, spec.len)?);
            }
            Ok(positions)
        })
    }
}

/// 链路错误 → 事务错误：超时视为该 ID 无应答
fn map_link(id: u8, err: LinkError) -> DriverError {
    match err {
        LinkError::Timeout => DriverError::NoResponse { id },
        LinkError::NotOpen => DriverError::NotOpen,
        other => DriverError::Link(other),
    }
}

fn decode_data(id: u8, status: &StatusPacket, len: u16) -> Result<u32, DriverError> {
    if status.params.len() != len as usize {
        return Err(DriverError::comm(
            Some(id),
            format!("expected {} data bytes, got {}", len, status.params.len()),
        ));
    }
    Ok(decode_register(&status.params)?)
}

impl<L: BusLink> ActuatorBus for DynamixelBus<L> {
    fn open(&mut self) -> Result<(), DriverError> {
        self.link.open()?;
        info!(
            "Bus open: {} (protocol {})",
            self.link.describe(),
            self.config.protocol
        );
        Ok(())
    }

    fn close(&mut self) {
        if self.link.is_open() {
            info!("Bus closed: {}", self.link.describe());
        }
        self.link.close();
    }

    fn is_open(&self) -> bool {
        self.link.is_open()
    }

    fn configure_position_mode_and_enable(&mut self, ids: &[u8]) -> Result<(), DriverError> {
        let registers = self.config.registers;

        // 部分舵机在扭矩开启时拒绝修改模式，因此先写完所有模式再使能
        for &id in ids {
            self.write_register(id, registers.operating_mode, registers.position_mode_value)
                .map_err(|e| DriverError::Configuration {
                    id,
                    phase: ConfigPhase::OperatingMode,
                    source: Box::new(e),
                })?;
        }
        for &id in ids {
            self.write_register(id, registers.torque_enable, 1)
                .map_err(|e| DriverError::Configuration {
                    id,
                    phase: ConfigPhase::TorqueEnable,
                    source: Box::new(e),
                })?;
        }
        info!("Position mode configured, torque enabled for ids {:?}", ids);
        Ok(())
    }

    fn set_torque(&mut self, ids: &[u8], on: bool) -> Result<(), DriverError> {
        let spec = self.config.registers.torque_enable;
        for &id in ids {
            self.write_register(id, spec, u32::from(on))?;
        }
        info!("Torque {} for ids {:?}", if on { "ON" } else { "OFF" }, ids);
        Ok(())
    }

    fn read_positions(&mut self, ids: &[u8]) -> Result<BTreeMap<u8, u32>, DriverError> {
        self.ensure_open()?;
        match ids {
            [] => Ok(BTreeMap::new()),
            // 单个 ID 用普通读指令，Protocol 1.0 也可用
            [id] => {
                let spec = self.config.registers.present_position;
                let position = self.read_register(*id, spec)?;
                Ok(BTreeMap::from([(*id, position)]))
            },
            _ => self.sync_read_positions(ids),
        }
    }

    fn write_positions(&mut self, goals: &BTreeMap<u8, u32>) -> Result<(), DriverError> {
        self.ensure_open()?;
        if goals.is_empty() {
            return Ok(());
        }
        let spec = self.config.registers.goal_position;
        let entries: Vec<(u8, Vec<u8>)> = goals
            .iter()
            .map(|(&id, &position)| (id, encode_position(position).to_vec()))
            .collect();
        let packet = InstructionPacket::sync_write(self.config.protocol, spec.addr, spec.len, &entries)?;
        self.transact(&packet)?;
        debug!("Sync write {} goals", goals.len());
        Ok(())
    }
}
