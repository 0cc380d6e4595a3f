//! 指令包 / 状态包的编码与解析
//!
//! ```text
//! Protocol 2.0 指令包: FF FF FD 00 | ID | LEN_L LEN_H | INST | PARAMS.. | CRC_L CRC_H
//! Protocol 2.0 状态包: FF FF FD 00 | ID | LEN_L LEN_H | 0x55 | ERR | PARAMS.. | CRC_L CRC_H
//! Protocol 1.0 指令包: FF FF | ID | LEN | INST | PARAMS.. | CHK
//! Protocol 1.0 状态包: FF FF | ID | LEN | ERR  | PARAMS.. | CHK
//! ```
//!
//! Protocol 2.0 的 LEN 从 INST 起计数（含 CRC），INST 之后出现的 `FF FF FD`
//! 会被填充为 `FF FF FD FD`。

use crate::instruction::{BROADCAST_ID, Instruction, ProtocolVersion};
use crate::ProtocolError;

/// 填充触发序列
const STUFF_PATTERN: [u8; 3] = [0xFF, 0xFF, 0xFD];
const STUFF_BYTE: u8 = 0xFD;

/// CRC-16（多项式 0x8005，初值 0，不反射），Protocol 2.0 使用
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Protocol 1.0 校验和：`!(ID + LEN + INST/ERR + Σparams)`
pub fn checksum_v1(data: &[u8]) -> u8 {
    !data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

fn stuff(region: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(region.len() + 4);
    for &byte in region {
        out.push(byte);
        if out.ends_with(&STUFF_PATTERN) {
            out.push(STUFF_BYTE);
        }
    }
    out
}

fn unstuff(region: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(region.len());
    let mut i = 0;
    while i < region.len() {
        out.push(region[i]);
        if out.ends_with(&STUFF_PATTERN) && region.get(i + 1) == Some(&STUFF_BYTE) {
            i += 1;
        }
        i += 1;
    }
    out
}

/// 根据包头 + ID + 长度字段计算整包长度
///
/// `head` 至少需要 `header().len() + prefix_len()` 字节。
pub fn total_len(version: ProtocolVersion, head: &[u8]) -> Result<usize, ProtocolError> {
    let header = version.header();
    let needed = header.len() + version.prefix_len();
    if head.len() < needed {
        return Err(ProtocolError::InvalidLength {
            expected: needed,
            actual: head.len(),
        });
    }
    if &head[..header.len()] != header {
        return Err(ProtocolError::InvalidHeader);
    }
    Ok(match version {
        ProtocolVersion::V1 => needed + head[3] as usize,
        ProtocolVersion::V2 => needed + u16::from_le_bytes([head[5], head[6]]) as usize,
    })
}

fn encode_frame(version: ProtocolVersion, id: u8, region: &[u8]) -> Vec<u8> {
    match version {
        ProtocolVersion::V1 => {
            // LEN = 区域长度 + 校验和
            let length = (region.len() + 1) as u8;
            let mut pkt = Vec::with_capacity(region.len() + 5);
            pkt.extend_from_slice(version.header());
            pkt.push(id);
            pkt.push(length);
            pkt.extend_from_slice(region);
            let chk = checksum_v1(&pkt[2..]);
            pkt.push(chk);
            pkt
        },
        ProtocolVersion::V2 => {
            let body = stuff(region);
            // LEN = 填充后区域长度 + CRC
            let length = (body.len() + 2) as u16;
            let mut pkt = Vec::with_capacity(body.len() + 9);
            pkt.extend_from_slice(version.header());
            pkt.push(id);
            pkt.extend_from_slice(&length.to_le_bytes());
            pkt.extend_from_slice(&body);
            let crc = crc16(&pkt);
            pkt.extend_from_slice(&crc.to_le_bytes());
            pkt
        },
    }
}

/// 校验并拆出 (ID, 去填充后的 INST/ERR 区域)
fn decode_frame(version: ProtocolVersion, bytes: &[u8]) -> Result<(u8, Vec<u8>), ProtocolError> {
    let expected = total_len(version, bytes)?;
    if bytes.len() != expected {
        return Err(ProtocolError::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }

    match version {
        ProtocolVersion::V1 => {
            // 至少包含 INST/ERR + CHK
            if bytes.len() < 6 {
                return Err(ProtocolError::InvalidLength {
                    expected: 6,
                    actual: bytes.len(),
                });
            }
            let (body, chk) = bytes.split_at(bytes.len() - 1);
            let computed = checksum_v1(&body[2..]);
            if computed != chk[0] {
                return Err(ProtocolError::ChecksumMismatch {
                    expected: computed,
                    actual: chk[0],
                });
            }
            Ok((bytes[2], body[4..].to_vec()))
        },
        ProtocolVersion::V2 => {
            if bytes.len() < 10 {
                return Err(ProtocolError::InvalidLength {
                    expected: 10,
                    actual: bytes.len(),
                });
            }
            let (body, crc_bytes) = bytes.split_at(bytes.len() - 2);
            let computed = crc16(body);
            let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
            if computed != received {
                return Err(ProtocolError::CrcMismatch {
                    expected: computed,
                    actual: received,
                });
            }
            Ok((bytes[4], unstuff(&body[7..])))
        },
    }
}

fn address_bytes(version: ProtocolVersion, field: &str, value: u16) -> Result<Vec<u8>, ProtocolError> {
    match version {
        ProtocolVersion::V1 => u8::try_from(value).map(|v| vec![v]).map_err(|_| {
            ProtocolError::InvalidValue {
                field: field.to_string(),
                value: value as u64,
            }
        }),
        ProtocolVersion::V2 => Ok(value.to_le_bytes().to_vec()),
    }
}

/// 指令包
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPacket {
    pub id: u8,
    pub instruction: Instruction,
    pub params: Vec<u8>,
}

impl InstructionPacket {
    pub fn new(id: u8, instruction: Instruction, params: Vec<u8>) -> Self {
        Self {
            id,
            instruction,
            params,
        }
    }

    /// PING
    pub fn ping(id: u8) -> Self {
        Self::new(id, Instruction::Ping, Vec::new())
    }

    /// 单设备读寄存器
    pub fn read(version: ProtocolVersion, id: u8, addr: u16, len: u16) -> Result<Self, ProtocolError> {
        let mut params = address_bytes(version, "address", addr)?;
        params.extend(address_bytes(version, "length", len)?);
        Ok(Self::new(id, Instruction::Read, params))
    }

    /// 单设备写寄存器
    pub fn write(version: ProtocolVersion, id: u8, addr: u16, data: &[u8]) -> Result<Self, ProtocolError> {
        let mut params = address_bytes(version, "address", addr)?;
        params.extend_from_slice(data);
        Ok(Self::new(id, Instruction::Write, params))
    }

    /// 同步读：一次事务读取多个 ID 的同一寄存器区间
    pub fn sync_read(
        version: ProtocolVersion,
        addr: u16,
        len: u16,
        ids: &[u8],
    ) -> Result<Self, ProtocolError> {
        version.ensure_supports(Instruction::SyncRead)?;
        let mut params = address_bytes(version, "address", addr)?;
        params.extend(address_bytes(version, "length", len)?);
        params.extend_from_slice(ids);
        Ok(Self::new(BROADCAST_ID, Instruction::SyncRead, params))
    }

    /// 同步写：一次事务写入多个 ID 的同一寄存器区间
    ///
    /// 每个条目的数据长度必须等于 `len`。
    pub fn sync_write(
        version: ProtocolVersion,
        addr: u16,
        len: u16,
        entries: &[(u8, Vec<u8>)],
    ) -> Result<Self, ProtocolError> {
        let mut params = address_bytes(version, "address", addr)?;
        params.extend(address_bytes(version, "length", len)?);
        for (id, data) in entries {
            if data.len() != len as usize {
                return Err(ProtocolError::InvalidLength {
                    expected: len as usize,
                    actual: data.len(),
                });
            }
            params.push(*id);
            params.extend_from_slice(data);
        }
        Ok(Self::new(BROADCAST_ID, Instruction::SyncWrite, params))
    }

    /// 该指令是否会收到状态包
    ///
    /// 同步写和广播（除同步读外）均无应答。
    pub fn expects_status(&self) -> bool {
        match self.instruction {
            Instruction::SyncWrite => false,
            Instruction::SyncRead => true,
            _ => self.id != BROADCAST_ID,
        }
    }

    pub fn encode(&self, version: ProtocolVersion) -> Vec<u8> {
        let mut region = Vec::with_capacity(self.params.len() + 1);
        region.push(u8::from(self.instruction));
        region.extend_from_slice(&self.params);
        encode_frame(version, self.id, &region)
    }

    pub fn decode(version: ProtocolVersion, bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (id, region) = decode_frame(version, bytes)?;
        let (&inst, params) = region.split_first().ok_or(ProtocolError::InvalidLength {
            expected: 1,
            actual: 0,
        })?;
        let instruction = Instruction::from_byte(inst)?;
        version.ensure_supports(instruction)?;
        Ok(Self::new(id, instruction, params.to_vec()))
    }
}

/// 状态包（设备应答）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    pub id: u8,
    /// 原始错误字节，0 表示无错误
    pub error: u8,
    pub params: Vec<u8>,
}

impl StatusPacket {
    pub fn new(id: u8, error: u8, params: Vec<u8>) -> Self {
        Self { id, error, params }
    }

    pub fn encode(&self, version: ProtocolVersion) -> Vec<u8> {
        let mut region = Vec::with_capacity(self.params.len() + 2);
        if version == ProtocolVersion::V2 {
            region.push(u8::from(Instruction::Status));
        }
        region.push(self.error);
        region.extend_from_slice(&self.params);
        encode_frame(version, self.id, &region)
    }

    pub fn decode(version: ProtocolVersion, bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (id, region) = decode_frame(version, bytes)?;
        let rest = match version {
            ProtocolVersion::V1 => &region[..],
            ProtocolVersion::V2 => match region.split_first() {
                Some((&inst, rest)) if inst == u8::from(Instruction::Status) => rest,
                Some((&inst, _)) => return Err(ProtocolError::UnknownInstruction(inst)),
                None => {
                    return Err(ProtocolError::InvalidLength {
                        expected: 2,
                        actual: 0,
                    });
                },
            },
        };
        let (&error, params) = rest.split_first().ok_or(ProtocolError::InvalidLength {
            expected: 1,
            actual: 0,
        })?;
        Ok(Self::new(id, error, params.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_position;
    use proptest::prelude::*;

    #[test]
    fn test_crc16_reference_vectors() {
        // 标准校验值（CRC-16/BUYPASS）
        assert_eq!(crc16(b"123456789"), 0xFEE8);
        // 手册中 ID 1 的 PING 指令包
        assert_eq!(crc16(&[0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x03, 0x00, 0x01]), 0x4E19);
    }

    #[test]
    fn test_ping_v2_encoding() {
        let bytes = InstructionPacket::ping(1).encode(ProtocolVersion::V2);
        assert_eq!(bytes, vec![0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x03, 0x00, 0x01, 0x19, 0x4E]);
    }

    #[test]
    fn test_ping_v1_encoding() {
        let bytes = InstructionPacket::ping(1).encode(ProtocolVersion::V1);
        assert_eq!(bytes, vec![0xFF, 0xFF, 0x01, 0x02, 0x01, 0xFB]);
    }

    #[test]
    fn test_status_v2_reference_packet() {
        // 手册中 ID 1 对 PING 的应答：型号 0x0406，固件 0x26
        let bytes = [
            0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x07, 0x00, 0x55, 0x00, 0x06, 0x04, 0x26, 0x65, 0x5D,
        ];
        let status = StatusPacket::decode(ProtocolVersion::V2, &bytes).unwrap();
        assert_eq!(status.id, 1);
        assert_eq!(status.error, 0);
        assert_eq!(status.params, vec![0x06, 0x04, 0x26]);
        assert_eq!(status.encode(ProtocolVersion::V2), bytes.to_vec());
    }

    #[test]
    fn test_sync_write_layout_v2() {
        let entries = vec![
            (1u8, encode_position(150).to_vec()),
            (2u8, encode_position(0x01020304).to_vec()),
        ];
        let pkt = InstructionPacket::sync_write(ProtocolVersion::V2, 116, 4, &entries).unwrap();
        assert_eq!(pkt.id, BROADCAST_ID);
        assert_eq!(
            pkt.params,
            vec![116, 0, 4, 0, 1, 150, 0, 0, 0, 2, 0x04, 0x03, 0x02, 0x01]
        );
        assert!(!pkt.expects_status());
    }

    #[test]
    fn test_sync_write_rejects_wrong_data_len() {
        let entries = vec![(1u8, vec![0u8; 2])];
        assert!(matches!(
            InstructionPacket::sync_write(ProtocolVersion::V2, 116, 4, &entries),
            Err(ProtocolError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_sync_read_unsupported_v1() {
        assert!(InstructionPacket::sync_read(ProtocolVersion::V1, 36, 2, &[1, 2]).is_err());
        let pkt = InstructionPacket::sync_read(ProtocolVersion::V2, 132, 4, &[1, 2]).unwrap();
        assert_eq!(pkt.params, vec![132, 0, 4, 0, 1, 2]);
        assert!(pkt.expects_status());
    }

    #[test]
    fn test_v1_address_must_fit_in_byte() {
        assert!(InstructionPacket::write(ProtocolVersion::V1, 1, 300, &[1]).is_err());
        assert!(InstructionPacket::write(ProtocolVersion::V1, 1, 24, &[1]).is_ok());
    }

    #[test]
    fn test_byte_stuffing() {
        let pkt = InstructionPacket::write(ProtocolVersion::V2, 1, 116, &[0xFF, 0xFF, 0xFD, 0x00]).unwrap();
        let bytes = pkt.encode(ProtocolVersion::V2);
        // 区域: 03 74 00 FF FF FD [FD] 00
        assert_eq!(&bytes[7..15], &[0x03, 0x74, 0x00, 0xFF, 0xFF, 0xFD, 0xFD, 0x00]);
        assert_eq!(u16::from_le_bytes([bytes[5], bytes[6]]), 10);
        let decoded = InstructionPacket::decode(ProtocolVersion::V2, &bytes).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn test_stuffing_of_existing_fd() {
        assert_eq!(stuff(&[0xFF, 0xFF, 0xFD, 0xFD]), vec![0xFF, 0xFF, 0xFD, 0xFD, 0xFD]);
        assert_eq!(unstuff(&[0xFF, 0xFF, 0xFD, 0xFD, 0xFD]), vec![0xFF, 0xFF, 0xFD, 0xFD]);
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let mut bytes = InstructionPacket::ping(3).encode(ProtocolVersion::V2);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            InstructionPacket::decode(ProtocolVersion::V2, &bytes),
            Err(ProtocolError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut bytes = StatusPacket::new(2, 0, vec![0x10, 0x00]).encode(ProtocolVersion::V1);
        let last = bytes.len() - 1;
        bytes[last] = bytes[last].wrapping_add(1);
        assert!(matches!(
            StatusPacket::decode(ProtocolVersion::V1, &bytes),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_total_len() {
        let bytes = InstructionPacket::ping(1).encode(ProtocolVersion::V2);
        assert_eq!(total_len(ProtocolVersion::V2, &bytes[..7]).unwrap(), bytes.len());
        let bytes = InstructionPacket::ping(1).encode(ProtocolVersion::V1);
        assert_eq!(total_len(ProtocolVersion::V1, &bytes[..4]).unwrap(), bytes.len());
        assert_eq!(
            total_len(ProtocolVersion::V2, &[0xFF, 0x00, 0xFD, 0x00, 1, 3, 0]),
            Err(ProtocolError::InvalidHeader)
        );
    }

    #[test]
    fn test_status_v2_rejects_non_status_instruction() {
        let bytes = InstructionPacket::ping(1).encode(ProtocolVersion::V2);
        assert_eq!(
            StatusPacket::decode(ProtocolVersion::V2, &bytes),
            Err(ProtocolError::UnknownInstruction(0x01))
        );
    }

    proptest! {
        /// 任意参数（含需要填充的序列）都能无损解码
        #[test]
        fn instruction_packet_survives_framing(
            id in 0u8..=0xFD,
            params in proptest::collection::vec(prop_oneof![Just(0xFFu8), Just(0xFDu8), any::<u8>()], 0..64),
        ) {
            let pkt = InstructionPacket::new(id, Instruction::Write, params);
            for version in [ProtocolVersion::V1, ProtocolVersion::V2] {
                let decoded = InstructionPacket::decode(version, &pkt.encode(version)).unwrap();
                prop_assert_eq!(&decoded, &pkt);
            }
        }
    }
}
