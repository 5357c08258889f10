use crate::lz4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Zero = 0,
    One = 1,
}

struct FieldState {
    prev_frame: Vec<u8>,
    has_prev: bool,
    frame_count: u64,
}

impl FieldState {
    fn new(max_frame_size: usize) -> Self {
        Self {
            prev_frame: vec![0u8; max_frame_size],
            has_prev: false,
            frame_count: 0,
        }
    }
}

pub struct DeltaState {
    fields: [FieldState; 2],
    delta_buf: Vec<u8>,
    keyframe_interval: u64,
}

impl DeltaState {
    // keyframe_interval == 0 disables periodic keyframing
    pub fn new(max_frame_size: usize, keyframe_interval: u64) -> Self {
        Self {
            fields: [FieldState::new(max_frame_size), FieldState::new(max_frame_size)],
            delta_buf: vec![0u8; max_frame_size],
            keyframe_interval,
        }
    }

    pub fn encode(&mut self, src: &[u8], field: Field, dst: &mut [u8]) -> Option<(usize, bool)> {
        let state = &mut self.fields[field as usize];

        if !state.has_prev {
            state.prev_frame[..src.len()].copy_from_slice(src);
            state.has_prev = true;
            state.frame_count = 0;
            let n = lz4::compress(src, dst)?;
            return Some((n, false));
        }

        state.frame_count += 1;
        if self.keyframe_interval > 0 && state.frame_count >= self.keyframe_interval {
            state.frame_count = 0;
            state.prev_frame[..src.len()].copy_from_slice(src);
            let n = lz4::compress(src, dst)?;
            return Some((n, false));
        }

        let delta_buf = &mut self.delta_buf[..src.len()];
        for i in 0..src.len() {
            delta_buf[i] = src[i].wrapping_sub(state.prev_frame[i]);
        }
        state.prev_frame[..src.len()].copy_from_slice(src);
        let n = lz4::compress(delta_buf, dst)?;
        Some((n, true))
    }
}

// mirrors the FPGA-side reconstruction, kept here so tests can assert the round trip
pub fn reconstruct(prev: &mut [u8], delta: &[u8]) {
    for (p, d) in prev.iter_mut().zip(delta.iter()) {
        *p = p.wrapping_add(*d);
    }
}
