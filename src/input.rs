use std::net::UdpSocket;

use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};

use crate::error::InputError;

pub const DEFAULT_INPUT_PORT: u16 = 32101;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoystickState {
    pub frame: u32,
    pub order: u8,
    pub joy1: u16,
    pub joy2: u16,
    pub axes: [i8; 8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ps2State {
    pub frame: u32,
    pub order: u8,
    pub keys: [u8; 32],
    pub mouse_btns: u8,
    pub mouse_x: i8,
    pub mouse_y: i8,
    pub mouse_z: i8,
}

impl Default for Ps2State {
    fn default() -> Self {
        Self {
            frame: 0,
            order: 0,
            keys: [0u8; 32],
            mouse_btns: 0,
            mouse_x: 0,
            mouse_y: 0,
            mouse_z: 0,
        }
    }
}

fn is_newer(new_frame: u32, new_order: u8, stored_frame: u32, stored_order: u8) -> bool {
    new_frame > stored_frame || (new_frame == stored_frame && new_order > stored_order)
}

fn parse_joy_digital(data: &[u8]) -> JoystickState {
    JoystickState {
        frame: LittleEndian::read_u32(&data[0..4]),
        order: data[4],
        joy1: LittleEndian::read_u16(&data[5..7]),
        joy2: LittleEndian::read_u16(&data[7..9]),
        axes: [0; 8],
    }
}

fn parse_joy_analog(data: &[u8]) -> JoystickState {
    let mut axes = [0i8; 8];
    for (i, axis) in axes.iter_mut().enumerate() {
        *axis = data[9 + i] as i8;
    }
    JoystickState {
        frame: LittleEndian::read_u32(&data[0..4]),
        order: data[4],
        joy1: LittleEndian::read_u16(&data[5..7]),
        joy2: LittleEndian::read_u16(&data[7..9]),
        axes,
    }
}

fn parse_ps2_keyboard(data: &[u8]) -> Ps2State {
    let mut keys = [0u8; 32];
    keys.copy_from_slice(&data[5..37]);
    Ps2State {
        frame: LittleEndian::read_u32(&data[0..4]),
        order: data[4],
        keys,
        mouse_btns: 0,
        mouse_x: 0,
        mouse_y: 0,
        mouse_z: 0,
    }
}

fn parse_ps2_kb_mouse(data: &[u8]) -> Ps2State {
    let mut keys = [0u8; 32];
    keys.copy_from_slice(&data[5..37]);
    Ps2State {
        frame: LittleEndian::read_u32(&data[0..4]),
        order: data[4],
        keys,
        mouse_btns: data[37],
        mouse_x: data[38] as i8,
        mouse_y: data[39] as i8,
        mouse_z: data[40] as i8,
    }
}

pub struct InputConnection {
    socket: UdpSocket,
    joystick: JoystickState,
    ps2: Ps2State,
}

impl InputConnection {
    // sends a one-byte hello so the FPGA learns the client's address
    pub fn bind(host: &str, port: u16) -> Result<Self, InputError> {
        use std::net::Ipv4Addr;
        use std::str::FromStr;

        let ip = Ipv4Addr::from_str(host).map_err(|_| InputError::ResolveFailed { host: host.to_string() })?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(InputError::SocketCreateFailed)?;
        socket.set_nonblocking(true).map_err(InputError::SocketCreateFailed)?;
        socket
            .connect((ip, port))
            .map_err(InputError::SocketCreateFailed)?;
        socket.send(&[0x00]).map_err(InputError::HelloFailed)?;

        Ok(Self {
            socket,
            joystick: JoystickState::default(),
            ps2: Ps2State::default(),
        })
    }

    pub fn joystick(&self) -> JoystickState {
        self.joystick
    }

    pub fn ps2(&self) -> Ps2State {
        self.ps2
    }

    pub fn poll(&mut self) -> bool {
        let mut buf = [0u8; 64];
        let mut accepted_any = false;
        loop {
            match self.socket.recv(&mut buf) {
                Ok(n) => {
                    trace!("input: received {n}-byte datagram");
                    if self.dispatch(&buf[..n]) {
                        accepted_any = true;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        accepted_any
    }

    fn dispatch(&mut self, data: &[u8]) -> bool {
        match data.len() {
            9 => self.accept_joystick(parse_joy_digital(data)),
            17 => self.accept_joystick(parse_joy_analog(data)),
            37 => self.accept_ps2(parse_ps2_keyboard(data)),
            41 => self.accept_ps2(parse_ps2_kb_mouse(data)),
            other => {
                warn!("input: discarding datagram of unrecognized length {other}");
                false
            }
        }
    }

    fn accept_joystick(&mut self, candidate: JoystickState) -> bool {
        if is_newer(candidate.frame, candidate.order, self.joystick.frame, self.joystick.order) {
            self.joystick = candidate;
            true
        } else {
            false
        }
    }

    fn accept_ps2(&mut self, candidate: Ps2State) -> bool {
        if is_newer(candidate.frame, candidate.order, self.ps2.frame, self.ps2.order) {
            self.ps2 = candidate;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joy_digital_parses_frame_order_and_masks() {
        let mut data = [0u8; 9];
        LittleEndian::write_u32(&mut data[0..4], 7);
        data[4] = 3;
        LittleEndian::write_u16(&mut data[5..7], 0x00FF);
        LittleEndian::write_u16(&mut data[7..9], 0x0F0F);
        let joy = parse_joy_digital(&data);
        assert_eq!(joy.frame, 7);
        assert_eq!(joy.order, 3);
        assert_eq!(joy.joy1, 0x00FF);
        assert_eq!(joy.joy2, 0x0F0F);
        assert_eq!(joy.axes, [0; 8]);
    }

    #[test]
    fn joy_analog_parses_signed_axes() {
        let mut data = [0u8; 17];
        LittleEndian::write_u32(&mut data[0..4], 1);
        data[4] = 0;
        for (i, v) in [1i8, -1, 127, -128, 0, 5, -5, 100].iter().enumerate() {
            data[9 + i] = *v as u8;
        }
        let joy = parse_joy_analog(&data);
        assert_eq!(joy.axes, [1, -1, 127, -128, 0, 5, -5, 100]);
    }

    #[test]
    fn ps2_kb_mouse_parses_keys_and_mouse() {
        let mut data = [0u8; 41];
        LittleEndian::write_u32(&mut data[0..4], 2);
        data[4] = 1;
        data[5] = 0xAA;
        data[37] = 0b101;
        data[38] = (-10i8) as u8;
        data[39] = 20;
        data[40] = (-3i8) as u8;
        let ps2 = parse_ps2_kb_mouse(&data);
        assert_eq!(ps2.keys[0], 0xAA);
        assert_eq!(ps2.mouse_btns, 0b101);
        assert_eq!(ps2.mouse_x, -10);
        assert_eq!(ps2.mouse_y, 20);
        assert_eq!(ps2.mouse_z, -3);
    }

    #[test]
    fn ps2_keyboard_only_parses_keys_and_zeroes_mouse() {
        let mut data = [0u8; 37];
        LittleEndian::write_u32(&mut data[0..4], 4);
        data[4] = 2;
        data[5] = 0x5A;
        let ps2 = parse_ps2_keyboard(&data);
        assert_eq!(ps2.frame, 4);
        assert_eq!(ps2.order, 2);
        assert_eq!(ps2.keys[0], 0x5A);
        assert_eq!(ps2.mouse_btns, 0);
        assert_eq!(ps2.mouse_x, 0);
        assert_eq!(ps2.mouse_y, 0);
        assert_eq!(ps2.mouse_z, 0);
    }

    #[test]
    fn dedup_rejects_stale_or_equal_packets() {
        assert!(is_newer(5, 0, 4, 0));
        assert!(is_newer(5, 2, 5, 1));
        assert!(!is_newer(5, 1, 5, 1));
        assert!(!is_newer(4, 9, 5, 0));
    }

    #[test]
    fn connection_accept_helpers_respect_dedup() {
        // Constructing a real InputConnection requires a socket; exercise
        // the accept logic directly through a bare joystick/ps2 pair
        // instead, mirroring what `accept_joystick`/`accept_ps2` do.
        let mut stored = JoystickState::default();
        let candidate = JoystickState { frame: 1, order: 0, ..Default::default() };
        assert!(is_newer(candidate.frame, candidate.order, stored.frame, stored.order));
        stored = candidate;
        let stale = JoystickState { frame: 1, order: 0, joy1: 0xFFFF, ..Default::default() };
        assert!(!is_newer(stale.frame, stale.order, stored.frame, stored.order));
    }
}
