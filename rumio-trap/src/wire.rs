// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire record exchanged with the device model.
//!
//! Six fixed-width fields, 24 bytes total, in native byte order — the model
//! runs on the same host, so no declared byte order is needed (a cross-host
//! channel would have to pick one). Requests and responses share the layout.

use std::io::Cursor;

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use rumio_common::DeviceId;

/// Size of the wire record in bytes.
pub const MESSAGE_SIZE: usize = 24;

/// Access direction carried in the `command` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    Read = 1,
    Write = 2,
}

impl Command {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Read),
            2 => Some(Self::Write),
            _ => None,
        }
    }
}

/// Errors raised while decoding a record received from the model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown command value {0} in wire record")]
    BadCommand(u32),
}

/// One request or response record.
///
/// `data` carries the stored value on WRITE requests and the returned value
/// on READ responses, zero-extended to 32 bits; it is ignored in the other
/// two directions. `result` is zero on success, negative on a device-model
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub device_id: DeviceId,
    pub command: Command,
    pub address: u32,
    pub data: u32,
    pub length: u32,
    pub result: i32,
}

impl Message {
    /// Build a READ request.
    pub fn read(device_id: DeviceId, address: u32, length: u32) -> Self {
        Self {
            device_id,
            command: Command::Read,
            address,
            data: 0,
            length,
            result: 0,
        }
    }

    /// Build a WRITE request.
    pub fn write(device_id: DeviceId, address: u32, data: u32, length: u32) -> Self {
        Self {
            device_id,
            command: Command::Write,
            address,
            data,
            length,
            result: 0,
        }
    }

    /// The benign all-zero-data success response synthesized when the model
    /// endpoint is absent and permissive startup is enabled.
    pub fn synthesized_response(&self) -> Self {
        Self {
            data: 0,
            result: 0,
            ..*self
        }
    }

    /// Serialize into a stack buffer. No allocation: safe on the fault path.
    pub fn encode(&self) -> [u8; MESSAGE_SIZE] {
        let mut buf = [0u8; MESSAGE_SIZE];
        let mut cur = Cursor::new(&mut buf[..]);
        let _ = cur.write_u32::<NativeEndian>(self.device_id);
        let _ = cur.write_u32::<NativeEndian>(self.command as u32);
        let _ = cur.write_u32::<NativeEndian>(self.address);
        let _ = cur.write_u32::<NativeEndian>(self.data);
        let _ = cur.write_u32::<NativeEndian>(self.length);
        let _ = cur.write_i32::<NativeEndian>(self.result);
        buf
    }

    /// Deserialize a record received from the model.
    pub fn decode(buf: &[u8; MESSAGE_SIZE]) -> Result<Self, WireError> {
        let mut cur = Cursor::new(&buf[..]);
        // Reads from a fixed correctly-sized buffer cannot fail.
        let device_id = cur.read_u32::<NativeEndian>().unwrap_or(0);
        let command_raw = cur.read_u32::<NativeEndian>().unwrap_or(0);
        let address = cur.read_u32::<NativeEndian>().unwrap_or(0);
        let data = cur.read_u32::<NativeEndian>().unwrap_or(0);
        let length = cur.read_u32::<NativeEndian>().unwrap_or(0);
        let result = cur.read_i32::<NativeEndian>().unwrap_or(0);

        let command = Command::from_u32(command_raw).ok_or(WireError::BadCommand(command_raw))?;
        Ok(Self {
            device_id,
            command,
            address,
            data,
            length,
            result,
        })
    }
}
