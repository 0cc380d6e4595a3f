//! 内存舵机模拟器
//!
//! 解析发出的指令包，按线协议把状态包放进接收队列。用于无硬件测试和
//! CLI 的 `--sim` 模式。
//!
//! 模拟的行为：
//!
//! - 每个舵机有 256 字节控制表
//! - 写 goal_position 时 present_position 立即跟随（理想伺服）
//! - Protocol 2.0 下扭矩开启时写 operating_mode 返回 Access Error
//! - 越界读写返回 Range 错误
//! - 不响应的舵机（`set_responsive(id, false)`）不回包，读方将超时

use crate::{BusLink, LinkDeviceError, LinkDeviceErrorKind, LinkError};
use servo_protocol::{
    BROADCAST_ID, Instruction, InstructionPacket, ProtocolVersion, RegisterMap, StatusPacket,
    decode_register, encode_position,
};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tracing::trace;

const TABLE_SIZE: usize = 256;

/// V2 错误号 / V1 错误位
const V2_RANGE_ERROR: u8 = 0x04;
const V2_ACCESS_ERROR: u8 = 0x07;
const V1_RANGE_ERROR: u8 = 0x08;

/// 单个模拟舵机
#[derive(Debug, Clone)]
pub struct SimServo {
    pub model: u16,
    pub firmware: u8,
    /// 为 false 时不回任何状态包
    pub responsive: bool,
    /// 附加到每个状态包的错误字节（故障注入）
    pub error: u8,
    table: Vec<u8>,
}

impl Default for SimServo {
    fn default() -> Self {
        Self {
            // XL430-W250
            model: 1060,
            firmware: 46,
            responsive: true,
            error: 0,
            table: vec![0; TABLE_SIZE],
        }
    }
}

impl SimServo {
    pub fn read(&self, addr: usize, len: usize) -> Option<&[u8]> {
        self.table.get(addr..addr.checked_add(len)?)
    }

    pub fn write(&mut self, addr: usize, data: &[u8]) -> bool {
        match addr.checked_add(data.len()) {
            Some(end) if end <= TABLE_SIZE => {
                self.table[addr..end].copy_from_slice(data);
                true
            },
            _ => false,
        }
    }
}

/// 内存链路 + 舵机集合
#[derive(Debug)]
pub struct SimLink {
    version: ProtocolVersion,
    registers: RegisterMap,
    servos: BTreeMap<u8, SimServo>,
    rx: VecDeque<u8>,
    open: bool,
    sent: Vec<InstructionPacket>,
    corrupt_next: bool,
    open_error: Option<LinkDeviceErrorKind>,
}

impl SimLink {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            registers: RegisterMap::default(),
            servos: BTreeMap::new(),
            rx: VecDeque::new(),
            open: false,
            sent: Vec::new(),
            corrupt_next: false,
            open_error: None,
        }
    }

    pub fn with_register_map(mut self, registers: RegisterMap) -> Self {
        self.registers = registers;
        self
    }

    /// 按 (id, 当前位置) 创建舵机
    pub fn with_servos(mut self, servos: &[(u8, u32)]) -> Self {
        for &(id, position) in servos {
            self.add_servo(id, SimServo::default());
            self.set_position(id, position);
        }
        self
    }

    pub fn add_servo(&mut self, id: u8, servo: SimServo) {
        self.servos.insert(id, servo);
    }

    pub fn servo(&self, id: u8) -> Option<&SimServo> {
        self.servos.get(&id)
    }

    pub fn servo_mut(&mut self, id: u8) -> Option<&mut SimServo> {
        self.servos.get_mut(&id)
    }

    pub fn set_responsive(&mut self, id: u8, responsive: bool) {
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.responsive = responsive;
        }
    }

    pub fn set_error(&mut self, id: u8, error: u8) {
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.error = error;
        }
    }

    /// 下一个状态包的最后一个字节被翻转（校验失败）
    pub fn corrupt_next_response(&mut self) {
        self.corrupt_next = true;
    }

    /// `open()` 将以指定错误失败
    pub fn fail_open(&mut self, kind: LinkDeviceErrorKind) {
        self.open_error = Some(kind);
    }

    /// 直接设置 present_position（模拟外力移动舵机）
    pub fn set_position(&mut self, id: u8, position: u32) {
        let addr = self.registers.present_position.addr as usize;
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.write(addr, &encode_position(position));
        }
    }

    pub fn position(&self, id: u8) -> Option<u32> {
        self.register_value(id, self.registers.present_position.addr, self.registers.present_position.len)
    }

    pub fn goal(&self, id: u8) -> Option<u32> {
        self.register_value(id, self.registers.goal_position.addr, self.registers.goal_position.len)
    }

    pub fn torque_enabled(&self, id: u8) -> Option<bool> {
        self.register_value(id, self.registers.torque_enable.addr, self.registers.torque_enable.len)
            .map(|v| v != 0)
    }

    pub fn operating_mode(&self, id: u8) -> Option<u32> {
        self.register_value(id, self.registers.operating_mode.addr, self.registers.operating_mode.len)
    }

    pub fn register_value(&self, id: u8, addr: u16, len: u16) -> Option<u32> {
        let bytes = self.servos.get(&id)?.read(addr as usize, len as usize)?;
        decode_register(bytes).ok()
    }

    /// 已发送的指令包（按发送顺序）
    pub fn sent(&self) -> &[InstructionPacket] {
        &self.sent
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    fn address_width(&self) -> usize {
        match self.version {
            ProtocolVersion::V1 => 1,
            ProtocolVersion::V2 => 2,
        }
    }

    /// 拆出 (地址, 长度/数据起点)
    fn split_field<'a>(&self, params: &'a [u8]) -> Option<(usize, &'a [u8])> {
        let width = self.address_width();
        if params.len() < width {
            return None;
        }
        let (field, rest) = params.split_at(width);
        let value = field.iter().enumerate().fold(0usize, |acc, (i, &b)| acc | ((b as usize) << (8 * i)));
        Some((value, rest))
    }

    fn range_error(&self) -> u8 {
        match self.version {
            ProtocolVersion::V1 => V1_RANGE_ERROR,
            ProtocolVersion::V2 => V2_RANGE_ERROR,
        }
    }

    fn respond(&mut self, id: u8, error: u8, params: Vec<u8>) {
        let Some(servo) = self.servos.get(&id) else {
            return;
        };
        if !servo.responsive {
            return;
        }
        let mut bytes = StatusPacket::new(id, error | servo.error, params).encode(self.version);
        if self.corrupt_next {
            self.corrupt_next = false;
            if let Some(last) = bytes.last_mut() {
                *last ^= 0xFF;
            }
        }
        trace!("SIM status from id {}: {:02X?}", id, bytes);
        self.rx.extend(bytes);
    }

    /// 写寄存器，返回状态错误字节
    fn apply_write(&mut self, id: u8, addr: usize, data: &[u8]) -> u8 {
        let range_error = self.range_error();
        let registers = self.registers;
        let version = self.version;
        let Some(servo) = self.servos.get_mut(&id) else {
            return 0;
        };

        let torque_on = servo
            .read(registers.torque_enable.addr as usize, registers.torque_enable.len as usize)
            .is_some_and(|b| b.iter().any(|&x| x != 0));
        if version == ProtocolVersion::V2 && torque_on && addr == registers.operating_mode.addr as usize {
            return V2_ACCESS_ERROR;
        }
        if !servo.write(addr, data) {
            return range_error;
        }
        if addr == registers.goal_position.addr as usize {
            servo.write(registers.present_position.addr as usize, data);
        }
        0
    }

    fn handle(&mut self, packet: &InstructionPacket) {
        match packet.instruction {
            Instruction::Ping => {
                if packet.id == BROADCAST_ID {
                    let ids: Vec<u8> = self.servos.keys().copied().collect();
                    for id in ids {
                        self.respond_ping(id);
                    }
                } else {
                    self.respond_ping(packet.id);
                }
            },
            Instruction::Read => {
                let Some((addr, rest)) = self.split_field(&packet.params) else {
                    return;
                };
                let Some((len, _)) = self.split_field(rest) else {
                    return;
                };
                let data = self
                    .servos
                    .get(&packet.id)
                    .and_then(|s| s.read(addr, len))
                    .map(|b| b.to_vec());
                match data {
                    Some(data) => self.respond(packet.id, 0, data),
                    None => {
                        let err = self.range_error();
                        self.respond(packet.id, err, Vec::new());
                    },
                }
            },
            Instruction::Write => {
                let Some((addr, data)) = self.split_field(&packet.params) else {
                    return;
                };
                let data = data.to_vec();
                let error = self.apply_write(packet.id, addr, &data);
                if packet.id != BROADCAST_ID {
                    self.respond(packet.id, error, Vec::new());
                }
            },
            Instruction::SyncRead => {
                let Some((addr, rest)) = self.split_field(&packet.params) else {
                    return;
                };
                let Some((len, ids)) = self.split_field(rest) else {
                    return;
                };
                for &id in ids {
                    let data = self.servos.get(&id).and_then(|s| s.read(addr, len)).map(|b| b.to_vec());
                    match data {
                        Some(data) => self.respond(id, 0, data),
                        None => {
                            let err = self.range_error();
                            self.respond(id, err, Vec::new());
                        },
                    }
                }
            },
            Instruction::SyncWrite => {
                let Some((addr, rest)) = self.split_field(&packet.params) else {
                    return;
                };
                let Some((len, entries)) = self.split_field(rest) else {
                    return;
                };
                for chunk in entries.chunks(len + 1) {
                    if chunk.len() != len + 1 {
                        break;
                    }
                    self.apply_write(chunk[0], addr, &chunk[1..]);
                }
            },
            Instruction::Status => {},
        }
    }

    fn respond_ping(&mut self, id: u8) {
        let Some(servo) = self.servos.get(&id) else {
            return;
        };
        let params = match self.version {
            ProtocolVersion::V1 => Vec::new(),
            ProtocolVersion::V2 => {
                let mut p = servo.model.to_le_bytes().to_vec();
                p.push(servo.firmware);
                p
            },
        };
        self.respond(id, 0, params);
    }
}

impl BusLink for SimLink {
    fn open(&mut self) -> Result<(), LinkError> {
        if let Some(kind) = self.open_error {
            return Err(LinkDeviceError::new(kind, "simulated open failure").into());
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.rx.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        // 无法解析的包被舵机静默丢弃
        match InstructionPacket::decode(self.version, bytes) {
            Ok(packet) => {
                self.handle(&packet);
                self.sent.push(packet);
            },
            Err(e) => trace!("SIM dropped malformed packet: {}", e),
        }
        Ok(())
    }

    fn receive_exact(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        if self.rx.len() < buf.len() {
            // 与真实串口一致：超时前到达的字节已被消费
            self.rx.clear();
            return Err(LinkError::Timeout);
        }
        for slot in buf.iter_mut() {
            // 长度已检查
            *slot = self.rx.pop_front().unwrap_or_default();
        }
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        self.rx.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sim ({} servos, protocol {})", self.servos.len(), self.version)
    }
}
