//! Binary streaming protocol: packet framing, per-pulse assembly, the
//! status document and the single-client TCP server.

pub mod assembler;
pub mod packet;
pub mod server;
pub mod status;

use crate::ingest::PulseTime;
use crate::prelude::{DrxError, DrxResult};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

pub use assembler::{AngleSimulator, AntennaAngles, PacketAssembler};
pub use packet::{
    BurstRecord, Calibration, Packet, PulseRecord, RadarInfo, TsProcessing, XmitPower,
    PULSE_FLAG_COHERED, PULSE_FLAG_GATES_COMBINED, PULSE_FLAG_SIMULATED_ANGLES,
};
pub use server::{PacketSink, SendOutcome, StreamServer, VecSink};
pub use status::StatusAggregator;

pub const HEADER_LEN: usize = 32;
pub const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketId {
    RadarInfo = 0x7777_0001,
    TsProcessing = 0x7777_0004,
    XmitPower = 0x7777_0005,
    Calibration = 0x7777_0007,
    Pulse = 0x7777_000b,
    Burst = 0x7777_0010,
    StatusXml = 0x7777_0011,
}

impl PacketId {
    pub fn from_u32(raw: u32) -> Option<Self> {
        let id = match raw {
            0x7777_0001 => PacketId::RadarInfo,
            0x7777_0004 => PacketId::TsProcessing,
            0x7777_0005 => PacketId::XmitPower,
            0x7777_0007 => PacketId::Calibration,
            0x7777_000b => PacketId::Pulse,
            0x7777_0010 => PacketId::Burst,
            0x7777_0011 => PacketId::StatusXml,
            _ => return None,
        };
        Some(id)
    }

    pub fn is_metadata(self) -> bool {
        matches!(
            self,
            PacketId::RadarInfo | PacketId::TsProcessing | PacketId::Calibration
        )
    }
}

/// Common 32-byte prefix of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub id: PacketId,
    pub len: u32,
    pub seq_num: u64,
    pub time: PulseTime,
    pub version: u16,
}

impl PacketHeader {
    pub fn decode(bytes: &[u8]) -> DrxResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(DrxError::Wire(format!(
                "{} bytes is too short for a packet header",
                bytes.len()
            )));
        }
        let mut cursor = Cursor::new(bytes);
        let raw_id = cursor.read_u32::<LittleEndian>()?;
        let id = PacketId::from_u32(raw_id)
            .ok_or_else(|| DrxError::Wire(format!("unknown packet id {raw_id:#010x}")))?;
        let len = cursor.read_u32::<LittleEndian>()?;
        let seq_num = cursor.read_u64::<LittleEndian>()?;
        let secs = cursor.read_i64::<LittleEndian>()?;
        let nanos = cursor.read_u32::<LittleEndian>()?;
        let version = cursor.read_u16::<LittleEndian>()?;
        Ok(Self {
            id,
            len,
            seq_num,
            time: PulseTime::new(secs, nanos),
            version,
        })
    }

    /// Splits a byte stream into packets using the header length field.
    pub fn split_stream(mut bytes: &[u8]) -> DrxResult<Vec<(PacketHeader, &[u8])>> {
        let mut packets = Vec::new();
        while !bytes.is_empty() {
            let header = Self::decode(bytes)?;
            let len = header.len as usize;
            if len < HEADER_LEN || len > bytes.len() {
                return Err(DrxError::Wire(format!(
                    "packet length {} invalid with {} bytes remaining",
                    len,
                    bytes.len()
                )));
            }
            packets.push((header, &bytes[..len]));
            bytes = &bytes[len..];
        }
        Ok(packets)
    }
}
