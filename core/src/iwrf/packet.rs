use crate::ingest::PulseTime;
use crate::iwrf::{PacketId, FORMAT_VERSION, HEADER_LEN};
use crate::prelude::{DrxError, DrxResult};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Write;

pub const PULSE_FLAG_COHERED: u32 = 1;
pub const PULSE_FLAG_GATES_COMBINED: u32 = 1 << 1;
pub const PULSE_FLAG_SIMULATED_ANGLES: u32 = 1 << 2;

const NAME_LEN: usize = 32;
const PULSE_CHANNELS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RadarInfo {
    pub latitude: f32,
    pub longitude: f32,
    pub altitude: f32,
    pub platform_type: i32,
    pub beamwidth_h: f32,
    pub beamwidth_v: f32,
    pub wavelength_cm: f32,
    pub radar_name: String,
    pub site_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TsProcessing {
    /// 0 simultaneous H/V, 1 LDR (transmit H)
    pub pol_mode: i32,
    /// 0 fixed, 1 staggered
    pub prt_mode: i32,
    pub prt1: f32,
    pub prt2: f32,
    pub pulse_width_us: f32,
    pub start_range_m: f32,
    pub gate_spacing_m: f32,
    pub n_gates: u32,
    pub cohered: bool,
    pub gates_combined: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub wavelength_cm: f32,
    pub beamwidth_h: f32,
    pub beamwidth_v: f32,
    pub gain_h: f32,
    pub gain_v: f32,
    pub pulse_width_us: f32,
    pub xmit_power_h_dbm: f32,
    pub xmit_power_v_dbm: f32,
    pub two_way_waveguide_loss_h: f32,
    pub two_way_waveguide_loss_v: f32,
    pub receiver_mismatch_loss: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XmitPower {
    pub h_dbm: f32,
    pub v_dbm: f32,
}

/// Per-pulse header plus borrowed H, V and burst samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseRecord<'a> {
    pub seq_num: i64,
    pub n_gates: u32,
    pub flags: u32,
    pub elevation: f32,
    pub azimuth: f32,
    pub prt: f32,
    pub prt_next: f32,
    pub pulse_width_us: f32,
    pub start_range_m: f32,
    pub gate_spacing_m: f32,
    pub burst_power_h: f32,
    pub burst_power_v: f32,
    pub burst_phase_h: f32,
    pub burst_phase_v: f32,
    /// Counts corresponding to 1 mW.
    pub iq_scale: f32,
    pub volume: i32,
    pub sweep: i32,
    pub h: &'a [i16],
    pub v: &'a [i16],
    pub burst: &'a [i16],
}

#[derive(Debug, Clone, PartialEq)]
pub struct BurstRecord<'a> {
    pub seq_num: i64,
    pub channel_id: u32,
    pub power_dbm: f32,
    pub phase_deg: f32,
    pub freq_hz: f32,
    pub freq_corr_hz: f32,
    pub sampling_freq_hz: f32,
    pub iq: &'a [i16],
}

/// Every packet kind on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet<'a> {
    RadarInfo(RadarInfo),
    TsProcessing(TsProcessing),
    Calibration(Calibration),
    XmitPower(XmitPower),
    Pulse(PulseRecord<'a>),
    Burst(BurstRecord<'a>),
    StatusXml(&'a str),
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    let bytes = name.as_bytes();
    let used = bytes.len().min(NAME_LEN - 1);
    out.extend_from_slice(&bytes[..used]);
    out.resize(out.len() + NAME_LEN - used, 0);
}

fn write_iq(out: &mut Vec<u8>, iq: &[i16], values: usize) -> DrxResult<()> {
    let used = iq.len().min(values);
    for &value in &iq[..used] {
        out.write_i16::<LittleEndian>(value)?;
    }
    out.resize(out.len() + (values - used) * 2, 0);
    Ok(())
}

impl Packet<'_> {
    pub fn id(&self) -> PacketId {
        match self {
            Packet::RadarInfo(_) => PacketId::RadarInfo,
            Packet::TsProcessing(_) => PacketId::TsProcessing,
            Packet::Calibration(_) => PacketId::Calibration,
            Packet::XmitPower(_) => PacketId::XmitPower,
            Packet::Pulse(_) => PacketId::Pulse,
            Packet::Burst(_) => PacketId::Burst,
            Packet::StatusXml(_) => PacketId::StatusXml,
        }
    }

    /// Writes header and body into `out` (cleared first).
    pub fn encode(&self, seq_num: u64, time: PulseTime, out: &mut Vec<u8>) -> DrxResult<()> {
        out.clear();
        out.write_u32::<LittleEndian>(self.id() as u32)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u64::<LittleEndian>(seq_num)?;
        out.write_i64::<LittleEndian>(time.secs)?;
        out.write_u32::<LittleEndian>(time.nanos)?;
        out.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        out.write_u16::<LittleEndian>(0)?;
        debug_assert_eq!(out.len(), HEADER_LEN);

        self.encode_body(out)?;

        let len = u32::try_from(out.len())
            .map_err(|_| DrxError::Wire(format!("packet of {} bytes is too large", out.len())))?;
        LittleEndian::write_u32(&mut out[4..8], len);
        Ok(())
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> DrxResult<()> {
        match self {
            Packet::RadarInfo(info) => {
                out.write_f32::<LittleEndian>(info.latitude)?;
                out.write_f32::<LittleEndian>(info.longitude)?;
                out.write_f32::<LittleEndian>(info.altitude)?;
                out.write_i32::<LittleEndian>(info.platform_type)?;
                out.write_f32::<LittleEndian>(info.beamwidth_h)?;
                out.write_f32::<LittleEndian>(info.beamwidth_v)?;
                out.write_f32::<LittleEndian>(info.wavelength_cm)?;
                write_name(out, &info.radar_name);
                write_name(out, &info.site_name);
            }
            Packet::TsProcessing(ts) => {
                out.write_i32::<LittleEndian>(ts.pol_mode)?;
                out.write_i32::<LittleEndian>(ts.prt_mode)?;
                for value in [
                    ts.prt1,
                    ts.prt2,
                    ts.pulse_width_us,
                    ts.start_range_m,
                    ts.gate_spacing_m,
                ] {
                    out.write_f32::<LittleEndian>(value)?;
                }
                out.write_u32::<LittleEndian>(ts.n_gates)?;
                out.write_u8(ts.cohered as u8)?;
                out.write_u8(ts.gates_combined as u8)?;
                out.write_all(&[0, 0])?;
            }
            Packet::Calibration(cal) => {
                for value in [
                    cal.wavelength_cm,
                    cal.beamwidth_h,
                    cal.beamwidth_v,
                    cal.gain_h,
                    cal.gain_v,
                    cal.pulse_width_us,
                    cal.xmit_power_h_dbm,
                    cal.xmit_power_v_dbm,
                    cal.two_way_waveguide_loss_h,
                    cal.two_way_waveguide_loss_v,
                    cal.receiver_mismatch_loss,
                ] {
                    out.write_f32::<LittleEndian>(value)?;
                }
            }
            Packet::XmitPower(power) => {
                out.write_f32::<LittleEndian>(power.h_dbm)?;
                out.write_f32::<LittleEndian>(power.v_dbm)?;
            }
            Packet::Pulse(pulse) => {
                let burst_samples = (pulse.burst.len() / 2) as u32;
                out.write_i64::<LittleEndian>(pulse.seq_num)?;
                out.write_u32::<LittleEndian>(pulse.n_gates)?;
                out.write_u32::<LittleEndian>(burst_samples)?;
                out.write_u32::<LittleEndian>(PULSE_CHANNELS)?;
                out.write_u32::<LittleEndian>(pulse.flags)?;
                for value in [
                    pulse.elevation,
                    pulse.azimuth,
                    pulse.prt,
                    pulse.prt_next,
                    pulse.pulse_width_us,
                    pulse.start_range_m,
                    pulse.gate_spacing_m,
                    pulse.burst_power_h,
                    pulse.burst_power_v,
                    pulse.burst_phase_h,
                    pulse.burst_phase_v,
                    pulse.iq_scale,
                ] {
                    out.write_f32::<LittleEndian>(value)?;
                }
                out.write_i32::<LittleEndian>(pulse.volume)?;
                out.write_i32::<LittleEndian>(pulse.sweep)?;
                let gate_values = pulse.n_gates as usize * 2;
                write_iq(out, pulse.h, gate_values)?;
                write_iq(out, pulse.v, gate_values)?;
                write_iq(out, pulse.burst, burst_samples as usize * 2)?;
            }
            Packet::Burst(burst) => {
                let samples = (burst.iq.len() / 2) as u32;
                out.write_i64::<LittleEndian>(burst.seq_num)?;
                out.write_u32::<LittleEndian>(samples)?;
                out.write_u32::<LittleEndian>(burst.channel_id)?;
                for value in [
                    burst.power_dbm,
                    burst.phase_deg,
                    burst.freq_hz,
                    burst.freq_corr_hz,
                    burst.sampling_freq_hz,
                ] {
                    out.write_f32::<LittleEndian>(value)?;
                }
                out.write_u32::<LittleEndian>(0)?;
                write_iq(out, burst.iq, samples as usize * 2)?;
            }
            Packet::StatusXml(xml) => {
                let xml_len = u32::try_from(xml.len() + 1)
                    .map_err(|_| DrxError::Wire("status document too large".into()))?;
                out.write_u32::<LittleEndian>(xml_len)?;
                out.write_u32::<LittleEndian>(0)?;
                out.write_all(xml.as_bytes())?;
                out.write_u8(0)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iwrf::PacketHeader;
    use byteorder::ReadBytesExt;
    use std::io::Cursor;

    fn pulse<'a>(h: &'a [i16], v: &'a [i16], burst: &'a [i16], n_gates: u32) -> Packet<'a> {
        Packet::Pulse(PulseRecord {
            seq_num: 42,
            n_gates,
            flags: PULSE_FLAG_COHERED,
            elevation: 0.5,
            azimuth: 90.0,
            prt: 1.0e-4,
            prt_next: 1.0e-4,
            pulse_width_us: 0.25,
            start_range_m: 0.0,
            gate_spacing_m: 37.5,
            burst_power_h: -10.0,
            burst_power_v: -10.0,
            burst_phase_h: 45.0,
            burst_phase_v: 45.0,
            iq_scale: 9900.0,
            volume: 1,
            sweep: 2,
            h,
            v,
            burst,
        })
    }

    #[test]
    fn header_fields_are_little_endian() {
        let mut out = Vec::new();
        Packet::XmitPower(XmitPower {
            h_dbm: 60.0,
            v_dbm: 59.0,
        })
        .encode(7, PulseTime::new(1_300_000_000, 500), &mut out)
        .unwrap();

        assert_eq!(out.len(), HEADER_LEN + 8);
        assert_eq!(&out[0..4], &[0x05, 0x00, 0x77, 0x77]);
        let header = PacketHeader::decode(&out).unwrap();
        assert_eq!(header.id, PacketId::XmitPower);
        assert_eq!(header.len as usize, out.len());
        assert_eq!(header.seq_num, 7);
        assert_eq!(header.time, PulseTime::new(1_300_000_000, 500));
        assert_eq!(header.version, FORMAT_VERSION);
    }

    #[test]
    fn pulse_layout_pads_short_channel() {
        let h = [1, 2, 3, 4];
        let v = [5, 6];
        let burst = [9, 10];
        let mut out = Vec::new();
        pulse(&h, &v, &burst, 2)
            .encode(0, PulseTime::default(), &mut out)
            .unwrap();

        let body = 8 + 4 * 4 + 12 * 4 + 2 * 4;
        assert_eq!(out.len(), HEADER_LEN + body + (4 + 4 + 2) * 2);

        let mut cursor = Cursor::new(&out[HEADER_LEN..]);
        assert_eq!(cursor.read_i64::<LittleEndian>().unwrap(), 42);
        assert_eq!(cursor.read_u32::<LittleEndian>().unwrap(), 2);
        assert_eq!(cursor.read_u32::<LittleEndian>().unwrap(), 1);
        assert_eq!(cursor.read_u32::<LittleEndian>().unwrap(), 3);
        assert_eq!(cursor.read_u32::<LittleEndian>().unwrap(), PULSE_FLAG_COHERED);

        let mut cursor = Cursor::new(&out[HEADER_LEN + body..]);
        let samples: Vec<i16> = (0..10)
            .map(|_| cursor.read_i16::<LittleEndian>().unwrap())
            .collect();
        assert_eq!(samples, vec![1, 2, 3, 4, 5, 6, 0, 0, 9, 10]);
    }

    #[test]
    fn names_are_truncated_and_nul_padded() {
        let mut out = Vec::new();
        Packet::RadarInfo(RadarInfo {
            latitude: 40.0,
            longitude: -105.0,
            altitude: 1600.0,
            platform_type: 1,
            beamwidth_h: 0.3,
            beamwidth_v: 0.3,
            wavelength_cm: 0.86,
            radar_name: "x".repeat(40),
            site_name: "mesa".into(),
        })
        .encode(0, PulseTime::default(), &mut out)
        .unwrap();

        assert_eq!(out.len(), HEADER_LEN + 28 + 64);
        let radar_name = &out[HEADER_LEN + 28..HEADER_LEN + 60];
        assert_eq!(radar_name[30], b'x');
        assert_eq!(radar_name[31], 0);
        let site_name = &out[HEADER_LEN + 60..];
        assert_eq!(&site_name[..5], b"mesa\0");
    }

    #[test]
    fn status_xml_is_length_prefixed_and_terminated() {
        let mut out = Vec::new();
        Packet::StatusXml("<KaStatus/>")
            .encode(3, PulseTime::default(), &mut out)
            .unwrap();
        let body = &out[HEADER_LEN..];
        assert_eq!(LittleEndian::read_u32(&body[0..4]), 12);
        assert_eq!(&body[8..19], b"<KaStatus/>");
        assert_eq!(body[19], 0);
        assert_eq!(out.len(), HEADER_LEN + 8 + 12);
    }

    #[test]
    fn burst_layout() {
        let iq = [1, -1, 2, -2, 3, -3];
        let mut out = Vec::new();
        Packet::Burst(BurstRecord {
            seq_num: 9,
            channel_id: 2,
            power_dbm: -3.0,
            phase_deg: 10.0,
            freq_hz: 1.0e5,
            freq_corr_hz: 0.0,
            sampling_freq_hz: 125.0e6,
            iq: &iq,
        })
        .encode(0, PulseTime::default(), &mut out)
        .unwrap();
        assert_eq!(out.len(), HEADER_LEN + 40 + 12);
        assert_eq!(LittleEndian::read_u32(&out[HEADER_LEN + 8..]), 3);
    }
}
