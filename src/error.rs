use std::io;

#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error("failed to resolve host {host:?} as an IPv4 address")]
    ResolveFailed { host: String },

    #[error("failed to create UDP socket: {0}")]
    SocketCreateFailed(#[source] io::Error),

    #[error("failed to set SO_SNDBUF: {0}")]
    SetSendBufFailed(#[source] io::Error),

    #[error("sendto failed: {0}")]
    SendFailed(#[source] io::Error),

    #[error("audio payload of {len} bytes exceeds the 65535 byte limit")]
    AudioTooLarge { len: usize },

    #[error("lz4 compression failed (destination buffer too small)")]
    CompressFailed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid rgb_mode value: {0}")]
    InvalidRgbMode(u8),

    #[error("invalid sound_rate value: {0}")]
    InvalidSoundRate(u8),

    #[error("invalid sound_channels value: {0}")]
    InvalidSoundChannels(u8),

    #[error("invalid lz4_mode value: {0}")]
    InvalidLz4Mode(u8),

    #[error("modeline violates ordering invariants: {0}")]
    InvalidModeline(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum InputError {
    #[error("failed to resolve host {host:?} as an IPv4 address")]
    ResolveFailed { host: String },

    #[error("failed to create UDP socket: {0}")]
    SocketCreateFailed(#[source] io::Error),

    #[error("failed to send hello datagram: {0}")]
    HelloFailed(#[source] io::Error),
}
