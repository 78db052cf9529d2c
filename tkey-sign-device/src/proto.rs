//! TKey framing protocol.
//!
//! Every frame starts with a one-byte header:
//!
//! ```text
//! bit 7     reserved, zero
//! bits 6-5  frame id
//! bits 4-3  endpoint
//! bit 2     response status, set means "not OK"
//! bits 1-0  length code: 1, 4, 32 or 128 bytes follow
//! ```
//!
//! The first byte after the header is the command or response code. Multi
//! byte integers are little endian.

use tkey_sign_lib::device::DeviceError;

/// Frame id used for every command.
pub const FRAME_ID: u8 = 2;

/// Bytes of app data carried by one load or sign frame.
pub const CHUNK_LEN: usize = 127;

/// Largest app image the firmware accepts.
pub const APP_MAX_SIZE: usize = 100 * 1024;

/// Destination of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Firmware = 2,
    App = 3,
}

impl Endpoint {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            2 => Some(Self::Firmware),
            3 => Some(Self::App),
            _ => None,
        }
    }
}

/// Frame length code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmdLen {
    Len1 = 0,
    Len4 = 1,
    Len32 = 2,
    Len128 = 3,
}

impl CmdLen {
    /// Number of bytes following the header.
    pub fn bytes(self) -> usize {
        match self {
            Self::Len1 => 1,
            Self::Len4 => 4,
            Self::Len32 => 32,
            Self::Len128 => 128,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Len1,
            1 => Self::Len4,
            2 => Self::Len32,
            _ => Self::Len128,
        }
    }
}

/// A command or response code with its frame shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    pub code: u8,
    pub len: CmdLen,
    pub endpoint: Endpoint,
    pub name: &'static str,
}

const fn fw(code: u8, len: CmdLen, name: &'static str) -> Command {
    Command {
        code,
        len,
        endpoint: Endpoint::Firmware,
        name,
    }
}

const fn app(code: u8, len: CmdLen, name: &'static str) -> Command {
    Command {
        code,
        len,
        endpoint: Endpoint::App,
        name,
    }
}

// Firmware
pub const CMD_FW_NAME_VERSION: Command = fw(0x01, CmdLen::Len1, "cmdGetNameVersion");
pub const RSP_FW_NAME_VERSION: Command = fw(0x02, CmdLen::Len32, "rspGetNameVersion");
pub const CMD_LOAD_APP: Command = fw(0x03, CmdLen::Len128, "cmdLoadApp");
pub const RSP_LOAD_APP: Command = fw(0x04, CmdLen::Len4, "rspLoadApp");
pub const CMD_LOAD_APP_DATA: Command = fw(0x05, CmdLen::Len128, "cmdLoadAppData");
pub const RSP_LOAD_APP_DATA: Command = fw(0x06, CmdLen::Len4, "rspLoadAppData");
pub const RSP_LOAD_APP_DATA_READY: Command = fw(0x07, CmdLen::Len128, "rspLoadAppDataReady");

// Signer app
pub const CMD_GET_PUBKEY: Command = app(0x01, CmdLen::Len1, "cmdGetPubkey");
pub const RSP_GET_PUBKEY: Command = app(0x02, CmdLen::Len128, "rspGetPubkey");
pub const CMD_SET_SIZE: Command = app(0x03, CmdLen::Len32, "cmdSetSize");
pub const RSP_SET_SIZE: Command = app(0x04, CmdLen::Len4, "rspSetSize");
pub const CMD_SIGN_DATA: Command = app(0x05, CmdLen::Len128, "cmdSignData");
pub const RSP_SIGN_DATA: Command = app(0x06, CmdLen::Len4, "rspSignData");
pub const CMD_GET_SIG: Command = app(0x07, CmdLen::Len1, "cmdGetSig");
pub const RSP_GET_SIG: Command = app(0x08, CmdLen::Len128, "rspGetSig");
pub const CMD_APP_NAME_VERSION: Command = app(0x09, CmdLen::Len1, "cmdGetNameVersion");
pub const RSP_APP_NAME_VERSION: Command = app(0x0a, CmdLen::Len32, "rspGetNameVersion");

/// Status byte of a successful response.
pub const STATUS_OK: u8 = 0;

/// A decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: u8,
    pub endpoint: Endpoint,
    pub len: CmdLen,
    pub not_ok: bool,
}

impl FrameHeader {
    /// Encode to the header byte.
    pub fn encode(&self) -> u8 {
        let status = if self.not_ok { 0x04 } else { 0 };
        ((self.id & 0x3) << 5) | ((self.endpoint as u8) << 3) | status | self.len as u8
    }

    /// Decode a header byte.
    pub fn decode(byte: u8) -> Result<Self, DeviceError> {
        if byte & 0x80 != 0 {
            return Err(DeviceError::Protocol(format!(
                "reserved bit set in header {:#04x}",
                byte
            )));
        }
        let endpoint = Endpoint::from_bits((byte >> 3) & 0x3).ok_or_else(|| {
            DeviceError::Protocol(format!("unknown endpoint in header {:#04x}", byte))
        })?;

        Ok(Self {
            id: (byte >> 5) & 0x3,
            endpoint,
            len: CmdLen::from_bits(byte),
            not_ok: byte & 0x04 != 0,
        })
    }
}

/// Build a command frame carrying `data` after the command code.
///
/// Unused bytes are zero.
pub fn build_frame(cmd: Command, id: u8, data: &[u8]) -> Result<Vec<u8>, DeviceError> {
    let body = cmd.len.bytes();
    if data.len() > body - 1 {
        return Err(DeviceError::Protocol(format!(
            "{}: {} bytes do not fit in a {} byte frame",
            cmd.name,
            data.len(),
            body
        )));
    }

    let header = FrameHeader {
        id,
        endpoint: cmd.endpoint,
        len: cmd.len,
        not_ok: false,
    };

    let mut frame = vec![0u8; 1 + body];
    frame[0] = header.encode();
    frame[1] = cmd.code;
    frame[2..2 + data.len()].copy_from_slice(data);
    Ok(frame)
}

/// Check that a received frame is the expected response.
///
/// `rx` is the complete frame, header included.
pub fn check_response(rx: &[u8], expected: Command, id: u8) -> Result<(), DeviceError> {
    let header = FrameHeader::decode(rx[0])?;

    if header.not_ok {
        return Err(DeviceError::Protocol(format!(
            "{}: response status not OK",
            expected.name
        )));
    }
    if header.id != id {
        return Err(DeviceError::Protocol(format!(
            "{}: expected frame id {}, got {}",
            expected.name, id, header.id
        )));
    }
    if header.endpoint != expected.endpoint || header.len != expected.len {
        return Err(DeviceError::Protocol(format!(
            "{}: unexpected frame shape {:?}",
            expected.name, header
        )));
    }
    match rx.get(1) {
        Some(&code) if code == expected.code => Ok(()),
        Some(&code) => Err(DeviceError::Protocol(format!(
            "{}: expected code {:#04x}, got {:#04x}",
            expected.name, expected.code, code
        ))),
        None => Err(DeviceError::EndOfStream),
    }
}

/// Read the status byte of a response; anything but zero is an error.
pub fn check_status(rx: &[u8], expected: Command) -> Result<(), DeviceError> {
    match rx.get(2) {
        Some(&STATUS_OK) => Ok(()),
        Some(status) => Err(DeviceError::Protocol(format!(
            "{}: status {}",
            expected.name, status
        ))),
        None => Err(DeviceError::EndOfStream),
    }
}
