use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::OutputError;
use crate::health::HealthWindow;
use crate::output::{precision_sleep_until, OutputConnection};
use crate::timing::{compute_pace_multiplier, FrameTiming};

const SETTLE_FRAMES: u64 = 30;
const SETTLE_TIMEOUT_MS: u32 = 50;
const STEADY_TIMEOUT_MS: u32 = 16;
const MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;
const MAX_CONSECUTIVE_DROPS: u32 = 60;
const TARGET_DRIFT: f64 = 3.0;
const DRIFT_GAIN: f64 = 0.02;
const GAP_CREDIT_THRESHOLD_FRAMES: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceOutcome {
    Ready,
    Skip,
    Stalled,
}

pub struct PacerState {
    pub client_frame: u64,
    last_pace_ns: Option<Instant>,
    last_ready_ns: Option<Instant>,
    pub dropped_frames: u64,
    consecutive_timeouts: u32,
    consecutive_drops: u32,
    timing: Option<FrameTiming>,
}

impl Default for PacerState {
    fn default() -> Self {
        Self::new()
    }
}

impl PacerState {
    pub fn new() -> Self {
        Self {
            client_frame: 0,
            last_pace_ns: None,
            last_ready_ns: None,
            dropped_frames: 0,
            consecutive_timeouts: 0,
            consecutive_drops: 0,
            timing: None,
        }
    }

    pub fn set_timing(&mut self, timing: FrameTiming) {
        self.timing = Some(timing);
    }

    fn in_settle(&self) -> bool {
        self.client_frame < SETTLE_FRAMES
    }
}

pub fn begin_frame(
    conn: &mut OutputConnection,
    health: &mut HealthWindow,
    state: &mut PacerState,
) -> Result<PaceOutcome, OutputError> {
    let timing = match state.timing {
        Some(t) if t.frame_time_ns > 0 => t,
        _ => return Ok(PaceOutcome::Stalled),
    };

    let timeout_ms = if state.in_settle() { SETTLE_TIMEOUT_MS } else { STEADY_TIMEOUT_MS };

    let t0 = Instant::now();
    let acked = conn.wait_sync(timeout_ms)?;
    let elapsed = t0.elapsed();

    if !acked {
        state.consecutive_timeouts += 1;
        if !state.in_settle() && state.consecutive_timeouts >= MAX_CONSECUTIVE_TIMEOUTS {
            warn!("pacer: stalled after {} consecutive sync timeouts", state.consecutive_timeouts);
            return Ok(PaceOutcome::Stalled);
        }
        std::thread::sleep(Duration::from_nanos(timing.frame_time_ns));
        state.client_frame += 1;
        return Ok(PaceOutcome::Ready);
    }

    state.consecutive_timeouts = 0;
    health.record(elapsed.as_secs_f64() * 1000.0, conn.status().vram_ready);

    if !conn.status().vram_ready {
        state.consecutive_drops += 1;
        if state.consecutive_drops >= MAX_CONSECUTIVE_DROPS {
            warn!("pacer: stalled after {} consecutive vram-not-ready skips", state.consecutive_drops);
            return Ok(PaceOutcome::Stalled);
        }
        return Ok(PaceOutcome::Skip);
    }
    state.consecutive_drops = 0;

    let mult = compute_pace_multiplier(&timing, state.client_frame, &conn.status(), TARGET_DRIFT, DRIFT_GAIN);
    debug!("pacer: client_frame={} mult={mult:.4}", state.client_frame);

    let now = Instant::now();
    if let Some(last_ready) = state.last_ready_ns {
        let gap_ns = now.saturating_duration_since(last_ready).as_nanos() as f64;
        let threshold_ns = GAP_CREDIT_THRESHOLD_FRAMES * timing.frame_time_ns as f64;
        if gap_ns > threshold_ns {
            let credit = (gap_ns / timing.frame_time_ns as f64).floor() as i64 - 1;
            if credit > 0 {
                state.dropped_frames += credit as u64;
                warn!("pacer: crediting {credit} dropped frame(s) after a {gap_ns:.0}ns gap");
            }
        }
    }

    let deadline = match state.last_pace_ns {
        Some(last) => last + Duration::from_nanos((timing.frame_time_ns as f64 * mult) as u64),
        None => now,
    };
    precision_sleep_until(deadline);

    state.last_pace_ns = Some(Instant::now());
    state.last_ready_ns = Some(Instant::now());
    state.client_frame += 1;

    Ok(PaceOutcome::Ready)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacer_reports_stalled_without_timing() {
        let state = PacerState::new();
        assert!(state.timing.is_none());
    }

    #[test]
    fn settle_window_uses_longer_timeout() {
        let mut state = PacerState::new();
        assert!(state.in_settle());
        state.client_frame = SETTLE_FRAMES;
        assert!(!state.in_settle());
    }

    #[test]
    fn dropped_frames_starts_at_zero() {
        let state = PacerState::new();
        assert_eq!(state.dropped_frames, 0);
        assert_eq!(state.client_frame, 0);
    }
}
