// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Interrupt receiver: delivers model-originated interrupts to driver
//! callbacks.
//!
//! The model writes `device_id,interrupt_id` into the side-channel file and
//! raises SIGUSR1. The handler rebuilds the file path in a stack buffer,
//! reads and parses it, dispatches to the registered callback, then unlinks
//! the file. Notifications are advisory: a missing or malformed file, an
//! out-of-range device id, or an empty slot all return silently.

use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use rumio_common::paths::INTERRUPT_INFO_PREFIX;
use rumio_common::{DeviceId, InterruptId, MAX_DEVICES};

use crate::state;

/// Driver callback invoked with the interrupt id.
///
/// A plain function pointer: the slot is read and the callback invoked from
/// signal-delivery context, where boxing a closure (allocation) or guarding
/// one with a lock is off the table. The callback itself must stay
/// async-signal-safe and must not touch protected device memory.
pub type InterruptHandler = fn(InterruptId);

#[derive(Debug, Error)]
pub enum InterruptError {
    #[error("device id {0} is outside the dispatch table capacity of {MAX_DEVICES}")]
    IdOutOfRange(DeviceId),
}

/// Function pointers stored as usize; 0 marks an empty slot.
static HANDLERS: [AtomicUsize; MAX_DEVICES] = [const { AtomicUsize::new(0) }; MAX_DEVICES];

/// Store `handler` in the dispatch slot for `device_id`.
pub fn register_interrupt_handler(
    device_id: DeviceId,
    handler: InterruptHandler,
) -> Result<(), InterruptError> {
    let _guard = state::writer_lock();
    let idx = device_id as usize;
    if idx >= MAX_DEVICES {
        return Err(InterruptError::IdOutOfRange(device_id));
    }
    HANDLERS[idx].store(handler as usize, Ordering::Release);
    log::debug!("registered interrupt handler for device {device_id}");
    Ok(())
}

/// Empty the dispatch table. Used by teardown.
pub(crate) fn clear_handlers() {
    let _guard = state::writer_lock();
    for slot in &HANDLERS {
        slot.store(0, Ordering::Release);
    }
}

/// SIGUSR1 handler. Everything on this path is async-signal-safe: stack
/// buffers, raw open/read/close/unlink, atomic loads.
pub(crate) extern "C" fn on_notify(_sig: libc::c_int) {
    let pid = state::driver_pid();
    if pid <= 0 {
        return;
    }

    let mut path_buf = [0u8; 64];
    if build_side_channel_path(&mut path_buf, pid as u32).is_none() {
        return;
    }
    let path_ptr = path_buf.as_ptr() as *const libc::c_char;

    let fd = unsafe { libc::open(path_ptr, libc::O_RDONLY) };
    if fd < 0 {
        return;
    }

    let mut data = [0u8; 32];
    let n = loop {
        let rc = unsafe { libc::read(fd, data.as_mut_ptr() as *mut libc::c_void, data.len()) };
        if rc >= 0 {
            break rc as usize;
        }
        let errno = unsafe { *libc::__errno_location() };
        if errno != libc::EINTR {
            break 0;
        }
    };
    unsafe {
        libc::close(fd);
    }

    if let Some((device_id, interrupt_id)) = parse_side_channel(&data[..n]) {
        dispatch(device_id, interrupt_id);
    }

    unsafe {
        libc::unlink(path_ptr);
    }
}

fn dispatch(device_id: u32, interrupt_id: u32) {
    let idx = device_id as usize;
    if idx >= MAX_DEVICES {
        return;
    }
    let raw = HANDLERS[idx].load(Ordering::Acquire);
    if raw == 0 {
        return;
    }
    // Slots only ever hold 0 or a valid fn(u32) written by
    // register_interrupt_handler.
    let handler: InterruptHandler = unsafe { mem::transmute(raw) };
    handler(interrupt_id);
}

/// Write `/tmp/interrupt_info_<pid>\0` into `buf`. Returns the length
/// excluding the terminator, or `None` if it does not fit.
fn build_side_channel_path(buf: &mut [u8; 64], pid: u32) -> Option<usize> {
    let prefix = INTERRUPT_INFO_PREFIX.as_bytes();
    let mut pos = prefix.len();
    buf[..pos].copy_from_slice(prefix);

    let mut digits = [0u8; 10];
    let mut n = pid;
    let mut count = 0;
    loop {
        digits[count] = b'0' + (n % 10) as u8;
        n /= 10;
        count += 1;
        if n == 0 {
            break;
        }
    }
    if pos + count + 1 > buf.len() {
        return None;
    }
    for i in 0..count {
        buf[pos + i] = digits[count - 1 - i];
    }
    pos += count;
    buf[pos] = 0;
    Some(pos)
}

/// Parse `<device_id>,<interrupt_id>` in ASCII decimal. Trailing whitespace
/// (a newline from a careless model) is tolerated.
fn parse_side_channel(data: &[u8]) -> Option<(u32, u32)> {
    let comma = data.iter().position(|&b| b == b',')?;
    let device_id = parse_decimal(&data[..comma])?;
    let rest = &data[comma + 1..];
    let end = rest
        .iter()
        .position(|&b| b == b'\n' || b == b'\r' || b == 0 || b == b' ')
        .unwrap_or(rest.len());
    let interrupt_id = parse_decimal(&rest[..end])?;
    Some((device_id, interrupt_id))
}

fn parse_decimal(data: &[u8]) -> Option<u32> {
    if data.is_empty() || data.len() > 10 {
        return None;
    }
    let mut value: u32 = 0;
    for &b in data {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as u32)?;
    }
    Some(value)
}
