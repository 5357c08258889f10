use byteorder::{ByteOrder, LittleEndian};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Close = 1,
    Init = 2,
    SwitchRes = 3,
    Audio = 4,
    GetStatus = 5,
    Blit = 7,
    GetVersion = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RgbMode {
    Bgr888 = 0,
    Bgra8888 = 1,
    Rgb565 = 2,
}

impl RgbMode {
    pub fn from_u8(v: u8) -> Result<Self, ConfigError> {
        match v {
            0 => Ok(Self::Bgr888),
            1 => Ok(Self::Bgra8888),
            2 => Ok(Self::Rgb565),
            other => Err(ConfigError::InvalidRgbMode(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SoundRate {
    Off = 0,
    Hz22050 = 1,
    Hz44100 = 2,
    Hz48000 = 3,
}

impl SoundRate {
    pub fn from_u8(v: u8) -> Result<Self, ConfigError> {
        match v {
            0 => Ok(Self::Off),
            1 => Ok(Self::Hz22050),
            2 => Ok(Self::Hz44100),
            3 => Ok(Self::Hz48000),
            other => Err(ConfigError::InvalidSoundRate(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SoundChannels {
    Off = 0,
    Mono = 1,
    Stereo = 2,
}

impl SoundChannels {
    pub fn from_u8(v: u8) -> Result<Self, ConfigError> {
        match v {
            0 => Ok(Self::Off),
            1 => Ok(Self::Mono),
            2 => Ok(Self::Stereo),
            other => Err(ConfigError::InvalidSoundChannels(other)),
        }
    }
}

// the FPGA only ever sees a single on/off bit, see wire_bit(); the rest
// are host-only hints about which compressor to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lz4Mode {
    Off = 0,
    Lz4 = 1,
    Lz4Delta = 2,
    Lz4Hc = 3,
    Lz4HcDelta = 4,
    Adaptive = 5,
    AdaptiveDelta = 6,
}

impl Lz4Mode {
    pub fn from_u8(v: u8) -> Result<Self, ConfigError> {
        match v {
            0 => Ok(Self::Off),
            1 => Ok(Self::Lz4),
            2 => Ok(Self::Lz4Delta),
            3 => Ok(Self::Lz4Hc),
            4 => Ok(Self::Lz4HcDelta),
            5 => Ok(Self::Adaptive),
            6 => Ok(Self::AdaptiveDelta),
            other => Err(ConfigError::InvalidLz4Mode(other)),
        }
    }

    pub fn wire_bit(self) -> u8 {
        match self {
            Self::Off => 0,
            _ => 1,
        }
    }

    pub fn is_delta(self) -> bool {
        matches!(self, Self::Lz4Delta | Self::Lz4HcDelta | Self::AdaptiveDelta)
    }

    pub fn is_compressed(self) -> bool {
        !matches!(self, Self::Off)
    }
}

pub fn encode_close(buf: &mut [u8]) -> usize {
    buf[0] = Opcode::Close as u8;
    1
}

pub fn encode_init(
    buf: &mut [u8],
    lz4_mode: Lz4Mode,
    sound_rate: SoundRate,
    sound_channels: SoundChannels,
    rgb_mode: RgbMode,
) -> usize {
    buf[0] = Opcode::Init as u8;
    buf[1] = lz4_mode.wire_bit();
    buf[2] = sound_rate as u8;
    buf[3] = sound_channels as u8;
    buf[4] = rgb_mode as u8;
    5
}

pub fn encode_switch_res(buf: &mut [u8], m: &crate::timing::Modeline) -> usize {
    buf[0] = Opcode::SwitchRes as u8;
    LittleEndian::write_f64(&mut buf[1..9], m.pixel_clock);
    LittleEndian::write_u16(&mut buf[9..11], m.h_active);
    LittleEndian::write_u16(&mut buf[11..13], m.h_begin);
    LittleEndian::write_u16(&mut buf[13..15], m.h_end);
    LittleEndian::write_u16(&mut buf[15..17], m.h_total);
    LittleEndian::write_u16(&mut buf[17..19], m.v_active);
    LittleEndian::write_u16(&mut buf[19..21], m.v_begin);
    LittleEndian::write_u16(&mut buf[21..23], m.v_end);
    LittleEndian::write_u16(&mut buf[23..25], m.v_total);
    buf[25] = m.interlaced as u8;
    26
}

pub fn encode_audio_header(buf: &mut [u8], sample_bytes: u16) -> usize {
    buf[0] = Opcode::Audio as u8;
    LittleEndian::write_u16(&mut buf[1..3], sample_bytes);
    3
}

pub fn encode_get_status(buf: &mut [u8]) -> usize {
    buf[0] = Opcode::GetStatus as u8;
    1
}

pub fn encode_get_version(buf: &mut [u8]) -> usize {
    buf[0] = Opcode::GetVersion as u8;
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitHeaderKind {
    Raw,
    Lz4,
    Lz4Delta,
}

// first 8 (raw) / 12 (lz4) bytes are a strict prefix of the longer variants
pub fn encode_blit_header(
    buf: &mut [u8],
    kind: BlitHeaderKind,
    frame_num: u32,
    field: u8,
    vsync_line: u16,
    compressed_size: u32,
) -> usize {
    buf[0] = Opcode::Blit as u8;
    LittleEndian::write_u32(&mut buf[1..5], frame_num);
    buf[5] = field;
    LittleEndian::write_u16(&mut buf[6..8], vsync_line);
    match kind {
        BlitHeaderKind::Raw => 8,
        BlitHeaderKind::Lz4 => {
            LittleEndian::write_u32(&mut buf[8..12], compressed_size);
            12
        }
        BlitHeaderKind::Lz4Delta => {
            LittleEndian::write_u32(&mut buf[8..12], compressed_size);
            buf[12] = 0x01;
            13
        }
    }
}

// packed booleans live in byte 12
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FpgaStatus {
    pub frame_echo: u32,
    pub vcount_echo: u16,
    pub frame: u32,
    pub vcount: u16,
    pub vram_ready: bool,
    pub vram_end_frame: bool,
    pub vram_synced: bool,
    pub vga_frameskip: bool,
    pub vga_vblank: bool,
    pub vga_f1: bool,
    pub audio_active: bool,
    pub vram_queue: bool,
}

// only the 13-byte prefix is consumed; shorter datagrams return None
pub fn parse_ack(data: &[u8]) -> Option<FpgaStatus> {
    if data.len() < 13 {
        return None;
    }
    let flags = data[12];
    Some(FpgaStatus {
        frame_echo: LittleEndian::read_u32(&data[0..4]),
        vcount_echo: LittleEndian::read_u16(&data[4..6]),
        frame: LittleEndian::read_u32(&data[6..10]),
        vcount: LittleEndian::read_u16(&data[10..12]),
        vram_ready: flags & 0x01 != 0,
        vram_end_frame: flags & 0x02 != 0,
        vram_synced: flags & 0x04 != 0,
        vga_frameskip: flags & 0x08 != 0,
        vga_vblank: flags & 0x10 != 0,
        vga_f1: flags & 0x20 != 0,
        audio_active: flags & 0x40 != 0,
        vram_queue: flags & 0x80 != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::Modeline;

    #[test]
    fn ack_parse_scenario() {
        let data = [
            0x01, 0x00, 0x00, 0x00, // frame_echo
            0x0C, 0x00, // vcount_echo
            0x02, 0x00, 0x00, 0x00, // frame
            0x0A, 0x00, // vcount
            0x25, // flags: vram_ready | vram_synced | vga_f1
        ];
        let status = parse_ack(&data).unwrap();
        assert_eq!(status.frame_echo, 1);
        assert_eq!(status.vcount_echo, 12);
        assert_eq!(status.frame, 2);
        assert_eq!(status.vcount, 10);
        assert!(status.vram_ready);
        assert!(status.vram_synced);
        assert!(status.vga_f1);
        assert!(!status.vram_end_frame);
        assert!(!status.vga_frameskip);
        assert!(!status.vga_vblank);
        assert!(!status.audio_active);
        assert!(!status.vram_queue);
    }

    #[test]
    fn ack_parse_all_bits() {
        for bit in 0..8u8 {
            let mut data = [0u8; 13];
            data[12] = 1 << bit;
            let status = parse_ack(&data).unwrap();
            let bits = [
                status.vram_ready,
                status.vram_end_frame,
                status.vram_synced,
                status.vga_frameskip,
                status.vga_vblank,
                status.vga_f1,
                status.audio_active,
                status.vram_queue,
            ];
            for (i, b) in bits.iter().enumerate() {
                assert_eq!(*b, i == bit as usize, "bit {bit} produced wrong flag {i}");
            }
        }
    }

    #[test]
    fn ack_parse_rejects_short_datagram() {
        assert!(parse_ack(&[0u8; 12]).is_none());
    }

    #[test]
    fn ack_parse_ignores_trailing_bytes() {
        let mut data = vec![0u8; 13];
        data[12] = 0x01;
        data.extend_from_slice(&[0xff; 20]);
        let status = parse_ack(&data).unwrap();
        assert!(status.vram_ready);
    }

    #[test]
    fn blit_header_variants_share_a_prefix() {
        let mut raw = [0u8; 8];
        let mut lz4 = [0u8; 12];
        let mut delta = [0u8; 13];
        encode_blit_header(&mut raw, BlitHeaderKind::Raw, 42, 1, 900, 0);
        encode_blit_header(&mut lz4, BlitHeaderKind::Lz4, 42, 1, 900, 1234);
        encode_blit_header(&mut delta, BlitHeaderKind::Lz4Delta, 42, 1, 900, 1234);
        assert_eq!(&lz4[..8], &raw[..]);
        assert_eq!(&delta[..12], &lz4[..]);
        assert_eq!(delta[12], 0x01);
    }

    #[test]
    fn init_encoding_clamps_lz4_byte() {
        let mut buf = [0u8; 5];
        for mode in [
            Lz4Mode::Lz4,
            Lz4Mode::Lz4Delta,
            Lz4Mode::Lz4Hc,
            Lz4Mode::Lz4HcDelta,
            Lz4Mode::Adaptive,
            Lz4Mode::AdaptiveDelta,
        ] {
            encode_init(&mut buf, mode, SoundRate::Off, SoundChannels::Off, RgbMode::Bgr888);
            assert_eq!(buf[1], 1, "{mode:?} should clamp to wire bit 1");
        }
        encode_init(&mut buf, Lz4Mode::Off, SoundRate::Off, SoundChannels::Off, RgbMode::Bgr888);
        assert_eq!(buf[1], 0);
    }

    #[test]
    fn switch_res_encoding_roundtrips_pixel_clock() {
        let m = Modeline::new(6.7, 320, 426, 350, 426, 240, 244, 246, 262, false).unwrap();
        let mut buf = [0u8; 26];
        let n = encode_switch_res(&mut buf, &m);
        assert_eq!(n, 26);
        assert_eq!(LittleEndian::read_f64(&buf[1..9]), 6.7);
        assert_eq!(LittleEndian::read_u16(&buf[23..25]), 262);
        assert_eq!(buf[25], 0);
    }
}
