use std::ffi::CStr;
use std::os::raw::c_char;

use crate::health::HealthWindow;
use crate::input::InputConnection;
use crate::output::{OutputConfig, OutputConnection};
use crate::pacer::{self, PacerState};
use crate::protocol::{Lz4Mode, RgbMode, SoundChannels, SoundRate};
use crate::timing::{self, Modeline};

pub struct GmzConn {
    output: OutputConnection,
    health: HealthWindow,
    pacer: PacerState,
    modeline: Option<Modeline>,
}

pub struct GmzInput(InputConnection);

// field order and widths must never change without a matching C header update
#[repr(C)]
pub struct GmzState {
    pub frame_echo: u32,
    pub vcount_echo: u16,
    pub frame: u32,
    pub vcount: u16,
    pub vram_ready: u8,
    pub vram_end_frame: u8,
    pub vram_synced: u8,
    pub vga_frameskip: u8,
    pub vga_vblank: u8,
    pub vga_f1: u8,
    pub audio_active: u8,
    pub vram_queue: u8,
    pub vram_ready_rate_x1000: u32,
    pub avg_sync_wait_us: u32,
    pub p95_sync_wait_us: u32,
    pub dropped_frames: u32,
    pub client_frame: u32,
    _reserved: [u8; 12],
}

#[repr(C)]
pub struct GmzModeline {
    pub pixel_clock: f64,
    pub h_active: u16,
    pub h_begin: u16,
    pub h_end: u16,
    pub h_total: u16,
    pub v_active: u16,
    pub v_begin: u16,
    pub v_end: u16,
    pub v_total: u16,
    pub interlaced: u8,
}

fn host_from_cstr(host: *const c_char) -> Option<String> {
    if host.is_null() {
        return None;
    }
    // SAFETY: caller guarantees `host` is a valid NUL-terminated C string
    // for the duration of this call, per the C ABI contract.
    unsafe { CStr::from_ptr(host) }.to_str().ok().map(str::to_owned)
}

// safety: host must be a valid NUL-terminated C string pointer or null
#[no_mangle]
pub unsafe extern "C" fn gmz_connect(
    host: *const c_char,
    mtu: u32,
    rgb_mode: u8,
    sound_rate: u8,
    sound_channels: u8,
) -> *mut GmzConn {
    gmz_connect_ex(host, mtu, rgb_mode, sound_rate, sound_channels, 0)
}

// safety: host must be a valid NUL-terminated C string pointer or null
#[no_mangle]
pub unsafe extern "C" fn gmz_connect_ex(
    host: *const c_char,
    mtu: u32,
    rgb_mode: u8,
    sound_rate: u8,
    sound_channels: u8,
    lz4_mode: u8,
) -> *mut GmzConn {
    let Some(host) = host_from_cstr(host) else {
        return std::ptr::null_mut();
    };
    let (Ok(rgb), Ok(rate), Ok(channels), Ok(lz4)) = (
        RgbMode::from_u8(rgb_mode),
        SoundRate::from_u8(sound_rate),
        SoundChannels::from_u8(sound_channels),
        Lz4Mode::from_u8(lz4_mode),
    ) else {
        return std::ptr::null_mut();
    };

    let config = OutputConfig {
        host,
        port: crate::output::DEFAULT_OUTPUT_PORT,
        mtu: mtu as usize,
        max_frame_size: 1920 * 1080 * 4,
        rgb_mode: rgb,
        sound_rate: rate,
        sound_channels: channels,
        lz4_mode: lz4,
        keyframe_interval: 0,
    };

    match OutputConnection::open(config) {
        Ok(output) => Box::into_raw(Box::new(GmzConn {
            output,
            health: HealthWindow::new(),
            pacer: PacerState::new(),
            modeline: None,
        })),
        Err(e) => {
            log::error!("gmz_connect failed: {e}");
            std::ptr::null_mut()
        }
    }
}

// safety: handle must be null or a non-freed pointer from gmz_connect/gmz_connect_ex
#[no_mangle]
pub unsafe extern "C" fn gmz_disconnect(handle: *mut GmzConn) {
    if handle.is_null() {
        return;
    }
    let mut conn = Box::from_raw(handle);
    conn.output.close();
}

#[no_mangle]
pub unsafe extern "C" fn gmz_tick(handle: *mut GmzConn) -> GmzState {
    let Some(conn) = handle.as_mut() else {
        return zeroed_state();
    };
    conn.output.poll();
    let status = conn.output.status();
    conn.health.record_ready(status.vram_ready);
    state_from(&status, &conn.health, &conn.pacer)
}

#[no_mangle]
pub unsafe extern "C" fn gmz_set_modeline(handle: *mut GmzConn, modeline: *const GmzModeline) -> i32 {
    let (Some(conn), Some(m)) = (handle.as_mut(), modeline.as_ref()) else {
        return -1;
    };
    let Ok(ml) = Modeline::new(
        m.pixel_clock,
        m.h_active,
        m.h_begin,
        m.h_end,
        m.h_total,
        m.v_active,
        m.v_begin,
        m.v_end,
        m.v_total,
        m.interlaced != 0,
    ) else {
        return -1;
    };
    if conn.output.switch_res(&ml).is_err() {
        return -1;
    }
    conn.pacer.set_timing(timing::frame_timing(&ml));
    conn.modeline = Some(ml);
    0
}

// safety: data must point to len readable bytes, or be non-null with len == 0
#[no_mangle]
pub unsafe extern "C" fn gmz_submit(
    handle: *mut GmzConn,
    data: *const u8,
    len: usize,
    frame_num: u32,
    field: u8,
    vsync_line: u16,
) -> i32 {
    let Some(conn) = handle.as_mut() else {
        return -1;
    };
    let bytes = if len == 0 { &[][..] } else { std::slice::from_raw_parts(data, len) };
    let field = if field == 0 { crate::delta::Field::Zero } else { crate::delta::Field::One };
    match conn.output.send_frame(bytes, frame_num, field, vsync_line) {
        Ok(()) => 0,
        Err(e) => {
            log::error!("gmz_submit failed: {e}");
            -1
        }
    }
}

// safety: data must point to len readable bytes
#[no_mangle]
pub unsafe extern "C" fn gmz_submit_audio(handle: *mut GmzConn, data: *const u8, len: usize) -> i32 {
    let Some(conn) = handle.as_mut() else {
        return -1;
    };
    let bytes = if len == 0 { &[][..] } else { std::slice::from_raw_parts(data, len) };
    match conn.output.send_audio(bytes) {
        Ok(()) => 0,
        Err(e) => {
            log::error!("gmz_submit_audio failed: {e}");
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn gmz_wait_sync(handle: *mut GmzConn, timeout_ms: u32) -> i32 {
    let Some(conn) = handle.as_mut() else {
        return -1;
    };
    match conn.output.wait_sync(timeout_ms) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            log::error!("gmz_wait_sync failed: {e}");
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn gmz_frame_time_ns(handle: *const GmzConn) -> u64 {
    handle
        .as_ref()
        .and_then(|c| c.modeline.as_ref())
        .map(|m| timing::frame_timing(m).frame_time_ns)
        .unwrap_or(0)
}

#[no_mangle]
pub unsafe extern "C" fn gmz_raster_offset_ns(handle: *const GmzConn, submitted_frame: u32) -> i64 {
    let Some(conn) = handle.as_ref() else {
        return 0;
    };
    let Some(m) = conn.modeline.as_ref() else {
        return 0;
    };
    let t = timing::frame_timing(m);
    timing::raster_offset_ns(&t, &conn.output.status(), submitted_frame)
}

#[no_mangle]
pub unsafe extern "C" fn gmz_calc_vsync(
    handle: *const GmzConn,
    ping_ns: i64,
    margin_ns: i64,
    emulation_ns: i64,
    stream_ns: i64,
) -> u16 {
    let Some(conn) = handle.as_ref() else {
        return 0;
    };
    let Some(m) = conn.modeline.as_ref() else {
        return 0;
    };
    let t = timing::frame_timing(m);
    if t.frame_time_ns == 0 {
        return m.v_total / 2;
    }
    timing::calc_vsync_line(&t, ping_ns, margin_ns, emulation_ns, stream_ns)
}

#[no_mangle]
pub unsafe extern "C" fn gmz_begin_frame(handle: *mut GmzConn) -> i32 {
    let Some(conn) = handle.as_mut() else {
        return 1;
    };
    let GmzConn { output, health, pacer, .. } = conn;
    match pacer::begin_frame(output, health, pacer) {
        Ok(pacer::PaceOutcome::Ready) => 0,
        Ok(pacer::PaceOutcome::Stalled) => 1,
        Ok(pacer::PaceOutcome::Skip) => 2,
        Err(e) => {
            log::error!("gmz_begin_frame failed: {e}");
            1
        }
    }
}

pub const GMZ_VERSION_MAJOR: u32 = 0;
pub const GMZ_VERSION_MINOR: u32 = 1;
pub const GMZ_VERSION_PATCH: u32 = 0;

#[no_mangle]
pub extern "C" fn gmz_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

#[no_mangle]
pub extern "C" fn gmz_version_major() -> u32 {
    GMZ_VERSION_MAJOR
}

#[no_mangle]
pub extern "C" fn gmz_version_minor() -> u32 {
    GMZ_VERSION_MINOR
}

#[no_mangle]
pub extern "C" fn gmz_version_patch() -> u32 {
    GMZ_VERSION_PATCH
}

// safety: host must be a valid NUL-terminated C string pointer or null
#[no_mangle]
pub unsafe extern "C" fn gmz_input_bind(host: *const c_char, port: u16) -> *mut GmzInput {
    let Some(host) = host_from_cstr(host) else {
        return std::ptr::null_mut();
    };
    match InputConnection::bind(&host, port) {
        Ok(conn) => Box::into_raw(Box::new(GmzInput(conn))),
        Err(e) => {
            log::error!("gmz_input_bind failed: {e}");
            std::ptr::null_mut()
        }
    }
}

// safety: handle must be null or a non-freed pointer from gmz_input_bind
#[no_mangle]
pub unsafe extern "C" fn gmz_input_close(handle: *mut GmzInput) {
    if handle.is_null() {
        return;
    }
    drop(Box::from_raw(handle));
}

#[no_mangle]
pub unsafe extern "C" fn gmz_input_poll(handle: *mut GmzInput) -> i32 {
    match handle.as_mut() {
        Some(input) => input.0.poll() as i32,
        None => -1,
    }
}

#[repr(C)]
pub struct GmzJoy {
    pub frame: u32,
    pub order: u8,
    pub joy1: u16,
    pub joy2: u16,
    pub axes: [i8; 8],
}

#[repr(C)]
pub struct GmzPs2 {
    pub frame: u32,
    pub order: u8,
    pub keys: [u8; 32],
    pub mouse_btns: u8,
    pub mouse_x: i8,
    pub mouse_y: i8,
    pub mouse_z: i8,
}

#[no_mangle]
pub unsafe extern "C" fn gmz_input_joy(handle: *const GmzInput) -> GmzJoy {
    match handle.as_ref() {
        Some(input) => {
            let j = input.0.joystick();
            GmzJoy { frame: j.frame, order: j.order, joy1: j.joy1, joy2: j.joy2, axes: j.axes }
        }
        None => GmzJoy { frame: 0, order: 0, joy1: 0, joy2: 0, axes: [0; 8] },
    }
}

#[no_mangle]
pub unsafe extern "C" fn gmz_input_ps2(handle: *const GmzInput) -> GmzPs2 {
    match handle.as_ref() {
        Some(input) => {
            let p = input.0.ps2();
            GmzPs2 {
                frame: p.frame,
                order: p.order,
                keys: p.keys,
                mouse_btns: p.mouse_btns,
                mouse_x: p.mouse_x,
                mouse_y: p.mouse_y,
                mouse_z: p.mouse_z,
            }
        }
        None => GmzPs2 { frame: 0, order: 0, keys: [0; 32], mouse_btns: 0, mouse_x: 0, mouse_y: 0, mouse_z: 0 },
    }
}

fn zeroed_state() -> GmzState {
    GmzState {
        frame_echo: 0,
        vcount_echo: 0,
        frame: 0,
        vcount: 0,
        vram_ready: 0,
        vram_end_frame: 0,
        vram_synced: 0,
        vga_frameskip: 0,
        vga_vblank: 0,
        vga_f1: 0,
        audio_active: 0,
        vram_queue: 0,
        vram_ready_rate_x1000: 0,
        avg_sync_wait_us: 0,
        p95_sync_wait_us: 0,
        dropped_frames: 0,
        client_frame: 0,
        _reserved: [0; 12],
    }
}

fn state_from(status: &crate::protocol::FpgaStatus, health: &HealthWindow, pacer: &PacerState) -> GmzState {
    GmzState {
        frame_echo: status.frame_echo,
        vcount_echo: status.vcount_echo,
        frame: status.frame,
        vcount: status.vcount,
        vram_ready: status.vram_ready as u8,
        vram_end_frame: status.vram_end_frame as u8,
        vram_synced: status.vram_synced as u8,
        vga_frameskip: status.vga_frameskip as u8,
        vga_vblank: status.vga_vblank as u8,
        vga_f1: status.vga_f1 as u8,
        audio_active: status.audio_active as u8,
        vram_queue: status.vram_queue as u8,
        vram_ready_rate_x1000: (health.vram_ready_rate() * 1000.0) as u32,
        avg_sync_wait_us: (health.avg_sync_wait_ms() * 1000.0) as u32,
        p95_sync_wait_us: (health.p95_sync_wait_ms() * 1000.0) as u32,
        dropped_frames: pacer.dropped_frames as u32,
        client_frame: pacer.client_frame as u32,
        _reserved: [0; 12],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gmz_state_is_fixed_56_bytes() {
        assert_eq!(std::mem::size_of::<GmzState>(), 56);
    }

    #[test]
    fn null_handles_are_safe() {
        unsafe {
            assert_eq!(gmz_tick(std::ptr::null_mut()).frame, 0);
            assert_eq!(gmz_set_modeline(std::ptr::null_mut(), std::ptr::null()), -1);
            assert_eq!(gmz_submit(std::ptr::null_mut(), std::ptr::null(), 0, 0, 0, 0), -1);
            assert_eq!(gmz_submit_audio(std::ptr::null_mut(), std::ptr::null(), 0), -1);
            assert_eq!(gmz_wait_sync(std::ptr::null_mut(), 0), -1);
            assert_eq!(gmz_frame_time_ns(std::ptr::null()), 0);
            assert_eq!(gmz_raster_offset_ns(std::ptr::null(), 0), 0);
            assert_eq!(gmz_calc_vsync(std::ptr::null(), 0, 0, 0, 0), 0);
            assert_eq!(gmz_begin_frame(std::ptr::null_mut()), 1);
            assert_eq!(gmz_input_poll(std::ptr::null_mut()), -1);
            // Must not panic or crash:
            gmz_disconnect(std::ptr::null_mut());
            gmz_input_close(std::ptr::null_mut());
        }
    }

    #[test]
    fn version_accessors_match_cargo_metadata() {
        assert_eq!(gmz_version_major(), 0);
        assert_eq!(gmz_version_minor(), 1);
        assert_eq!(gmz_version_patch(), 0);
    }
}
