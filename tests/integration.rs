//! Cross-module scenarios that need a real (loopback) UDP socket: an
//! `OutputConnection` talking to a stand-in FPGA, an `InputConnection`
//! receiving real datagrams, and the pacer's stall detection when
//! nothing answers at all.

use std::net::UdpSocket;
use std::time::Duration;

use gmz::{
    begin_frame, HealthWindow, InputConnection, Lz4Mode, Modeline, OutputConfig, OutputConnection,
    PaceOutcome, PacerState, RgbMode, SoundChannels, SoundRate,
};

fn free_loopback_socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").expect("bind ephemeral loopback socket")
}

fn tiny_config(port: u16) -> OutputConfig {
    OutputConfig {
        host: "127.0.0.1".to_string(),
        port,
        mtu: 1500,
        max_frame_size: 256,
        rgb_mode: RgbMode::Rgb565,
        sound_rate: SoundRate::Off,
        sound_channels: SoundChannels::Off,
        lz4_mode: Lz4Mode::Off,
        keyframe_interval: 0,
    }
}

#[test]
fn output_connects_and_observes_ack_from_fake_fpga() {
    let fake_fpga = free_loopback_socket();
    fake_fpga.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let fake_port = fake_fpga.local_addr().unwrap().port();

    let mut conn = OutputConnection::open(tiny_config(fake_port)).expect("open output connection");

    // `open` already sent `init`; drain it so the next recv is ours to
    // control, then reply to whatever `wait_sync` sends.
    let mut buf = [0u8; 64];
    let (_, peer) = fake_fpga.recv_from(&mut buf).expect("fake fpga receives init");

    let ack: [u8; 13] = [
        0x2A, 0x00, 0x00, 0x00, // frame_echo = 42
        0x05, 0x00, // vcount_echo
        0x2B, 0x00, 0x00, 0x00, // frame = 43
        0x06, 0x00, // vcount
        0x01, // vram_ready
    ];
    fake_fpga.send_to(&ack, peer).expect("fake fpga replies with ack");

    let acked = conn.wait_sync(200).expect("wait_sync should not error on a live socket");
    assert!(acked);
    assert_eq!(conn.status().frame_echo, 42);
    assert_eq!(conn.status().frame, 43);
    assert!(conn.status().vram_ready);
}

#[test]
fn input_connection_receives_and_dedupes_joystick_packets() {
    let fake_fpga = free_loopback_socket();
    let fake_port = fake_fpga.local_addr().unwrap().port();

    let mut input = InputConnection::bind("127.0.0.1", fake_port).expect("bind input connection");

    let mut hello = [0u8; 1];
    let (_, client_addr) = fake_fpga.recv_from(&mut hello).expect("fake fpga receives hello");
    assert_eq!(hello[0], 0x00);

    let make_packet = |frame: u32, order: u8, joy1: u16| {
        let mut data = [0u8; 9];
        data[0..4].copy_from_slice(&frame.to_le_bytes());
        data[4] = order;
        data[5..7].copy_from_slice(&joy1.to_le_bytes());
        data[7..9].copy_from_slice(&0u16.to_le_bytes());
        data
    };

    fake_fpga.send_to(&make_packet(1, 0, 0x0001), client_addr).unwrap();
    fake_fpga.send_to(&make_packet(1, 0, 0xFFFF), client_addr).unwrap();
    fake_fpga.send_to(&make_packet(2, 0, 0x0003), client_addr).unwrap();

    std::thread::sleep(Duration::from_millis(50));
    assert!(input.poll());

    let joy = input.joystick();
    assert_eq!(joy.frame, 2);
    assert_eq!(joy.joy1, 0x0003);
}

#[test]
fn pacer_reports_stalled_when_fpga_never_responds() {
    // Nothing is bound on this port, so every `wait_sync` call times out.
    let unused = free_loopback_socket();
    let dead_port = unused.local_addr().unwrap().port();
    drop(unused);

    let mut conn = OutputConnection::open(tiny_config(dead_port)).expect("open output connection");

    // A tiny synthetic modeline so the settle window's real sleeps stay
    // short: frame_time_ns works out to 100 microseconds.
    let modeline = Modeline::new(100.0, 10, 20, 30, 100, 10, 20, 30, 100, false).unwrap();
    let mut pacer = PacerState::new();
    pacer.set_timing(gmz::frame_timing(&modeline));
    let mut health = HealthWindow::new();

    let mut outcome = PaceOutcome::Ready;
    for _ in 0..64 {
        outcome = begin_frame(&mut conn, &mut health, &mut pacer).expect("begin_frame should not error");
        if outcome == PaceOutcome::Stalled {
            break;
        }
    }
    assert_eq!(outcome, PaceOutcome::Stalled);
}
