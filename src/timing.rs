use crate::error::ConfigError;
use crate::protocol::FpgaStatus;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modeline {
    pub pixel_clock: f64,
    pub h_active: u16,
    pub h_begin: u16,
    pub h_end: u16,
    pub h_total: u16,
    pub v_active: u16,
    pub v_begin: u16,
    pub v_end: u16,
    pub v_total: u16,
    pub interlaced: bool,
}

impl Modeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pixel_clock: f64,
        h_active: u16,
        h_begin: u16,
        h_end: u16,
        h_total: u16,
        v_active: u16,
        v_begin: u16,
        v_end: u16,
        v_total: u16,
        interlaced: bool,
    ) -> Result<Self, ConfigError> {
        if pixel_clock <= 0.0 {
            return Err(ConfigError::InvalidModeline("pixel_clock must be > 0"));
        }
        if !(h_active <= h_begin && h_begin < h_end && h_end <= h_total) {
            return Err(ConfigError::InvalidModeline(
                "horizontal timing must satisfy h_active <= h_begin < h_end <= h_total",
            ));
        }
        if !(v_active <= v_begin && v_begin < v_end && v_end <= v_total) {
            return Err(ConfigError::InvalidModeline(
                "vertical timing must satisfy v_active <= v_begin < v_end <= v_total",
            ));
        }
        Ok(Self {
            pixel_clock,
            h_active,
            h_begin,
            h_end,
            h_total,
            v_active,
            v_begin,
            v_end,
            v_total,
            interlaced,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub line_time_ns: u64,
    pub frame_time_ns: u64,
    pub v_total: u16,
    pub interlace: u32,
}

pub fn frame_timing(m: &Modeline) -> FrameTiming {
    let interlace = m.interlaced as u32;
    let line_time_ns = (m.h_total as f64 * 1000.0 / m.pixel_clock).round() as u64;
    let frame_time_ns = (m.v_total as u64 * line_time_ns) >> interlace;
    FrameTiming {
        line_time_ns,
        frame_time_ns,
        v_total: m.v_total,
        interlace,
    }
}

// positive means the FPGA is behind (headroom), negative means the host is late
// returns 0 against a stale frame_echo, there's no valid comparison then
pub fn raster_offset_ns(timing: &FrameTiming, status: &FpgaStatus, submitted_frame: u32) -> i64 {
    if status.frame_echo != submitted_frame {
        return 0;
    }
    let interlace = timing.interlace;
    let v_total = timing.v_total as i64;
    let v1 = ((status.frame_echo as i64 - 1) * v_total + status.vcount_echo as i64) >> interlace;
    let v2 = (status.frame as i64 * v_total + status.vcount as i64) >> interlace;
    // Dichotomic damping: a first-order low-pass on the raw raster delta.
    let dif = (v1 - v2) / 2;
    timing.line_time_ns as i64 * dif
}

pub fn calc_vsync_line(
    timing: &FrameTiming,
    ping_ns: i64,
    margin_ns: i64,
    emulation_ns: i64,
    stream_ns: i64,
) -> u16 {
    let budget = ping_ns + margin_ns + emulation_ns;
    if budget >= timing.frame_time_ns as i64 {
        return 1;
    }
    let time_calc = (budget - stream_ns).max(0);
    let v_total = timing.v_total as i64;
    let line = v_total - (v_total * time_calc / timing.frame_time_ns as i64);
    line.clamp(1, v_total) as u16
}

// target_drift keeps the host a few frames ahead so jitter never starves the scanout;
// the interlaced phase-gain term uses 3 / field_rate_hz as the convergence eigenvalue
pub fn compute_pace_multiplier(
    timing: &FrameTiming,
    client_frame: u64,
    status: &FpgaStatus,
    target_drift: f64,
    drift_gain: f64,
) -> f64 {
    let drift = client_frame as f64 - status.frame as f64;
    let error = target_drift - drift;
    let mut mult = 1.0 - error * drift_gain;

    if timing.interlace != 0 {
        let expected_f1 = (client_frame & 1) != 0;
        if expected_f1 != status.vga_f1 {
            let field_rate_hz = 1.0e9 / timing.frame_time_ns as f64;
            let phase_gain = drift_gain + 3.0 / field_rate_hz;
            mult -= phase_gain;
        }
    }

    mult.clamp(0.92, 1.05)
}
