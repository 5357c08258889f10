use std::time::Duration;

use clap::Parser;
use log::info;

use gmz::{
    begin_frame, HealthWindow, InputConnection, Lz4Mode, Modeline, OutputConfig, OutputConnection,
    PaceOutcome, PacerState, RgbMode, SoundChannels, SoundRate,
};

#[derive(Parser, Debug)]
#[command(name = "gmz-tool", about = "Stream synthetic frames to a Groovy_MiSTer host")]
struct Args {
    /// FPGA host IPv4 address.
    #[arg(long, default_value = "192.168.1.50")]
    host: String,

    /// Output (video/audio) port.
    #[arg(long, default_value_t = gmz::DEFAULT_OUTPUT_PORT)]
    port: u16,

    /// Input (joystick/PS2) port.
    #[arg(long, default_value_t = gmz::DEFAULT_INPUT_PORT)]
    input_port: u16,

    /// Number of synthetic frames to stream before exiting.
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// LZ4 mode: off, lz4, lz4-delta.
    #[arg(long, default_value = "lz4-delta")]
    lz4_mode: String,

    /// Also bind the input socket and log joystick/PS2 snapshots.
    #[arg(long)]
    with_input: bool,
}

fn parse_lz4_mode(s: &str) -> Lz4Mode {
    match s {
        "off" => Lz4Mode::Off,
        "lz4" => Lz4Mode::Lz4,
        "lz4-delta" => Lz4Mode::Lz4Delta,
        "lz4-hc" => Lz4Mode::Lz4Hc,
        "lz4-hc-delta" => Lz4Mode::Lz4HcDelta,
        other => {
            eprintln!("unknown lz4 mode {other:?}, falling back to lz4-delta");
            Lz4Mode::Lz4Delta
        }
    }
}

fn synthetic_frame(frame_num: u32, size: usize) -> Vec<u8> {
    let tone = (frame_num % 256) as u8;
    vec![tone; size]
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    const WIDTH: u16 = 320;
    const HEIGHT: u16 = 240;
    const FRAME_SIZE: usize = WIDTH as usize * HEIGHT as usize * 2;

    let config = OutputConfig {
        host: args.host.clone(),
        port: args.port,
        mtu: 1500,
        max_frame_size: FRAME_SIZE,
        rgb_mode: RgbMode::Rgb565,
        sound_rate: SoundRate::Off,
        sound_channels: SoundChannels::Off,
        lz4_mode: parse_lz4_mode(&args.lz4_mode),
        keyframe_interval: 60,
    };

    let mut conn = match OutputConnection::open(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to connect to {}:{}: {e}", args.host, args.port);
            std::process::exit(1);
        }
    };

    let modeline = Modeline::new(6.7, WIDTH, WIDTH + 20, WIDTH + 30, WIDTH + 106, HEIGHT, HEIGHT + 4, HEIGHT + 6, 262, false)
        .expect("synthetic modeline must satisfy timing invariants");
    if let Err(e) = conn.switch_res(&modeline) {
        eprintln!("switch_res failed: {e}");
        std::process::exit(1);
    }

    let mut input = if args.with_input {
        match InputConnection::bind(&args.host, args.input_port) {
            Ok(c) => Some(c),
            Err(e) => {
                eprintln!("input bind failed: {e}");
                None
            }
        }
    } else {
        None
    };

    let mut health = HealthWindow::new();
    let mut pacer = PacerState::new();
    pacer.set_timing(gmz::frame_timing(&modeline));

    info!("streaming {} synthetic frames to {}:{}", args.frames, args.host, args.port);

    for frame_num in 0..args.frames {
        match begin_frame(&mut conn, &mut health, &mut pacer) {
            Ok(PaceOutcome::Ready) => {
                let frame = synthetic_frame(frame_num, FRAME_SIZE);
                if let Err(e) = conn.send_frame(&frame, frame_num, gmz::Field::Zero, HEIGHT / 2) {
                    eprintln!("send_frame failed: {e}");
                    break;
                }
            }
            Ok(PaceOutcome::Skip) => {
                info!("frame {frame_num}: vram not ready, skipping submission");
            }
            Ok(PaceOutcome::Stalled) => {
                eprintln!("pacer reports the link is stalled, disconnecting");
                break;
            }
            Err(e) => {
                eprintln!("begin_frame failed: {e}");
                break;
            }
        }

        if let Some(input) = input.as_mut() {
            if input.poll() {
                let joy = input.joystick();
                info!("joy1={:#06x} joy2={:#06x} axes={:?}", joy.joy1, joy.joy2, joy.axes);
            }
        }
    }

    info!(
        "done: avg_sync_wait={:.2}ms p95_sync_wait={:.2}ms vram_ready_rate={:.2} dropped={}",
        health.avg_sync_wait_ms(),
        health.p95_sync_wait_ms(),
        health.vram_ready_rate(),
        pacer.dropped_frames,
    );

    conn.close();
    std::thread::sleep(Duration::from_millis(10));
}
