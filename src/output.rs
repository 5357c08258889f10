use std::net::{Ipv4Addr, UdpSocket};
use std::os::unix::io::AsRawFd;
use std::str::FromStr;
use std::time::Duration;

use log::{debug, error, trace, warn};
use socket2::{Domain, Protocol, Socket, Type};

use crate::delta::{DeltaState, Field};
use crate::error::OutputError;
use crate::lz4;
use crate::protocol::{
    self, BlitHeaderKind, FpgaStatus, Lz4Mode, RgbMode, SoundChannels, SoundRate,
};
use crate::timing::Modeline;

pub const DEFAULT_OUTPUT_PORT: u16 = 32100;
const IP_UDP_HEADER_OVERHEAD: usize = 28;
const SEND_BUFFER_BYTES: usize = 2 * 1024 * 1024;
const MAX_SCRATCH_HEADER: usize = 26;

// mtu is the link MTU, not the effective payload size (see mtu_eff)
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub host: String,
    pub port: u16,
    pub mtu: usize,
    pub max_frame_size: usize,
    pub rgb_mode: RgbMode,
    pub sound_rate: SoundRate,
    pub sound_channels: SoundChannels,
    pub lz4_mode: Lz4Mode,
    pub keyframe_interval: u64,
}

impl OutputConfig {
    pub fn mtu_eff(&self) -> usize {
        self.mtu - IP_UDP_HEADER_OVERHEAD
    }
}

enum Compressor {
    None,
    Lz4,
    Delta(DeltaState),
}

struct OwnedBuffers {
    lz4_out: Vec<u8>,
}

impl OwnedBuffers {
    fn new(max_frame_size: usize) -> Self {
        Self {
            lz4_out: vec![0u8; lz4::compress_bound(max_frame_size)],
        }
    }
}

pub struct OutputConnection {
    socket: UdpSocket,
    config: OutputConfig,
    compressor: Compressor,
    buffers: OwnedBuffers,
    status: FpgaStatus,
    scratch: [u8; MAX_SCRATCH_HEADER],
}

impl OutputConnection {
    pub fn open(config: OutputConfig) -> Result<Self, OutputError> {
        let ip = Ipv4Addr::from_str(&config.host).map_err(|_| OutputError::ResolveFailed {
            host: config.host.clone(),
        })?;

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(OutputError::SocketCreateFailed)?;
        socket
            .set_send_buffer_size(SEND_BUFFER_BYTES)
            .map_err(OutputError::SetSendBufFailed)?;
        socket.set_nonblocking(true).map_err(OutputError::SocketCreateFailed)?;
        socket
            .connect(&std::net::SocketAddr::from((ip, config.port)).into())
            .map_err(OutputError::SocketCreateFailed)?;
        let socket: UdpSocket = socket.into();

        let compressor = match config.lz4_mode {
            Lz4Mode::Off => Compressor::None,
            mode if mode.is_delta() => {
                Compressor::Delta(DeltaState::new(config.max_frame_size, config.keyframe_interval))
            }
            _ => Compressor::Lz4,
        };
        let buffers = OwnedBuffers::new(config.max_frame_size);

        let mut conn = Self {
            socket,
            config,
            compressor,
            buffers,
            status: FpgaStatus::default(),
            scratch: [0u8; MAX_SCRATCH_HEADER],
        };
        conn.send_init()?;
        Ok(conn)
    }

    pub fn status(&self) -> FpgaStatus {
        self.status
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    fn send_raw(&self, data: &[u8]) -> Result<(), OutputError> {
        trace!("output: sending {} bytes", data.len());
        self.socket.send(data).map(|_| ()).map_err(OutputError::SendFailed)
    }

    pub fn send_init(&mut self) -> Result<(), OutputError> {
        let n = protocol::encode_init(
            &mut self.scratch,
            self.config.lz4_mode,
            self.config.sound_rate,
            self.config.sound_channels,
            self.config.rgb_mode,
        );
        let buf = self.scratch;
        self.send_raw(&buf[..n])
    }

    pub fn switch_res(&mut self, modeline: &Modeline) -> Result<(), OutputError> {
        let n = protocol::encode_switch_res(&mut self.scratch, modeline);
        let buf = self.scratch;
        self.send_raw(&buf[..n])
    }

    pub fn send_frame(
        &mut self,
        bytes: &[u8],
        frame_num: u32,
        field: Field,
        vsync_line: u16,
    ) -> Result<(), OutputError> {
        let (payload, header_kind): (&[u8], BlitHeaderKind) = match &mut self.compressor {
            Compressor::None => (bytes, BlitHeaderKind::Raw),
            Compressor::Lz4 => {
                let n = lz4::compress(bytes, &mut self.buffers.lz4_out).ok_or(OutputError::CompressFailed)?;
                (&self.buffers.lz4_out[..n], BlitHeaderKind::Lz4)
            }
            Compressor::Delta(state) => {
                let (n, is_delta) = state
                    .encode(bytes, field, &mut self.buffers.lz4_out)
                    .ok_or(OutputError::CompressFailed)?;
                let kind = if is_delta { BlitHeaderKind::Lz4Delta } else { BlitHeaderKind::Lz4 };
                (&self.buffers.lz4_out[..n], kind)
            }
        };

        let mut header = [0u8; 13];
        let header_len = protocol::encode_blit_header(
            &mut header,
            header_kind,
            frame_num,
            field as u8,
            vsync_line,
            payload.len() as u32,
        );
        self.send_raw(&header[..header_len])?;

        let mtu_eff = self.config.mtu_eff();
        if !payload.is_empty() {
            for chunk in payload.chunks(mtu_eff) {
                self.send_raw(chunk)?;
            }
        }
        Ok(())
    }

    pub fn send_audio(&mut self, pcm: &[u8]) -> Result<(), OutputError> {
        if pcm.len() > 65535 {
            return Err(OutputError::AudioTooLarge { len: pcm.len() });
        }
        if pcm.is_empty() {
            return Ok(());
        }
        let n = protocol::encode_audio_header(&mut self.scratch, pcm.len() as u16);
        let buf = self.scratch;
        self.send_raw(&buf[..n])?;

        let mtu_eff = self.config.mtu_eff();
        for chunk in pcm.chunks(mtu_eff) {
            self.send_raw(chunk)?;
        }
        Ok(())
    }

    pub fn poll(&mut self) {
        let mut buf = [0u8; 256];
        loop {
            match self.socket.recv(&mut buf) {
                Ok(n) => {
                    if let Some(status) = protocol::parse_ack(&buf[..n]) {
                        self.status = status;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }

    // the only call that unblocks bootstrap (FPGA only ACKs when asked) and
    // stall recovery (backpressure suppresses frame submission otherwise)
    pub fn wait_sync(&mut self, timeout_ms: u32) -> Result<bool, OutputError> {
        let n = protocol::encode_get_status(&mut self.scratch);
        let buf = self.scratch;
        // Fire-and-forget: a failure here still lets us wait for an ACK
        // that might already be in flight from a prior request.
        if let Err(e) = self.send_raw(&buf[..n]) {
            warn!("wait_sync: get_status send failed: {e}");
        }

        let ready = poll_readable(self.socket.as_raw_fd(), timeout_ms);
        self.poll();
        Ok(ready)
    }

    pub fn close(&mut self) {
        let n = protocol::encode_close(&mut self.scratch);
        let buf = self.scratch;
        if let Err(e) = self.send_raw(&buf[..n]) {
            error!("close: failed to send close packet: {e}");
        }
    }
}

impl Drop for OutputConnection {
    fn drop(&mut self) {
        debug!("output connection dropped");
    }
}

fn poll_readable(fd: std::os::unix::io::RawFd, timeout_ms: u32) -> bool {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout: i32 = timeout_ms.min(i32::MAX as u32) as i32;
    // SAFETY: `pfd` is a single valid pollfd on the stack and `nfds=1`
    // matches it; no memory is retained across the call.
    let rv = unsafe { libc::poll(&mut pfd, 1, timeout) };
    rv > 0 && (pfd.revents & libc::POLLIN) != 0
}

// coarse 2ms sleeps followed by a short spin-wait for the remainder
pub fn precision_sleep_until(deadline: std::time::Instant) {
    loop {
        let now = std::time::Instant::now();
        if now >= deadline {
            return;
        }
        let remaining = deadline - now;
        if remaining > Duration::from_millis(2) {
            std::thread::sleep(Duration::from_millis(2));
        } else {
            std::hint::spin_loop();
        }
    }
}
