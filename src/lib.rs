pub mod delta;
pub mod error;
pub mod ffi;
pub mod health;
pub mod input;
pub mod lz4;
pub mod output;
pub mod pacer;
pub mod protocol;
pub mod timing;

pub use delta::{DeltaState, Field};
pub use error::{ConfigError, InputError, OutputError};
pub use health::HealthWindow;
pub use input::{InputConnection, JoystickState, Ps2State, DEFAULT_INPUT_PORT};
pub use output::{OutputConfig, OutputConnection, DEFAULT_OUTPUT_PORT};
pub use pacer::{begin_frame, PaceOutcome, PacerState};
pub use protocol::{FpgaStatus, Lz4Mode, RgbMode, SoundChannels, SoundRate};
pub use timing::{compute_pace_multiplier, frame_timing, raster_offset_ns, calc_vsync_line, FrameTiming, Modeline};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
