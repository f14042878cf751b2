// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device registry: the process-wide table of registered device windows.
//!
//! Slots are indexed by `device_id` (ids are unique and bounded by
//! [`MAX_DEVICES`]). Writers serialize on the trap-layer writer lock and
//! publish each slot with a release store of its `active` flag; the fault
//! handler reads with acquire loads only, so it can never observe a torn
//! entry and never blocks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use thiserror::Error;

use rumio_common::{is_page_aligned, DeviceId, MAX_DEVICES, PAGE_SIZE};

use crate::protect::{self, ProtectError};
use crate::state;

/// Errors returned by the registration API.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("device id {0} is outside the registry capacity of {MAX_DEVICES}")]
    IdOutOfRange(DeviceId),

    #[error("device id {0} is already registered")]
    AlreadyRegistered(DeviceId),

    #[error("window [{base:#x}..{end:#x}) overlaps registered device {other}")]
    Overlap {
        base: usize,
        end: usize,
        other: DeviceId,
    },

    #[error("base address {0:#x} is not page-aligned")]
    MisalignedBase(usize),

    #[error("window size {0:#x} is zero or not a page multiple")]
    BadSize(usize),

    #[error("device {0} is not registered")]
    NotFound(DeviceId),

    #[error(transparent)]
    Reservation(#[from] ProtectError),
}

struct Slot {
    active: AtomicBool,
    base: AtomicUsize,
    len: AtomicUsize,
}

impl Slot {
    const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            base: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
        }
    }
}

static SLOTS: [Slot; MAX_DEVICES] = [const { Slot::new() }; MAX_DEVICES];

/// Register a device window: reserve `[base, base+size)` as inaccessible
/// memory and record the entry.
///
/// Fails if the id is out of range or taken, the geometry is invalid, the
/// window overlaps an existing registration, or the reservation is refused.
pub fn register_device(id: DeviceId, base: usize, size: usize) -> Result<(), RegistryError> {
    let _guard = state::writer_lock();

    let idx = slot_index(id)?;
    if !is_page_aligned(base) {
        return Err(RegistryError::MisalignedBase(base));
    }
    if size == 0 || size % PAGE_SIZE != 0 {
        return Err(RegistryError::BadSize(size));
    }
    let end = base.checked_add(size).ok_or(RegistryError::BadSize(size))?;

    if SLOTS[idx].active.load(Ordering::Acquire) {
        return Err(RegistryError::AlreadyRegistered(id));
    }
    for (other, slot) in SLOTS.iter().enumerate() {
        if !slot.active.load(Ordering::Acquire) {
            continue;
        }
        let other_base = slot.base.load(Ordering::Relaxed);
        let other_end = other_base + slot.len.load(Ordering::Relaxed);
        if base < other_end && other_base < end {
            return Err(RegistryError::Overlap {
                base,
                end,
                other: other as DeviceId,
            });
        }
    }

    protect::reserve(base, size)?;

    let slot = &SLOTS[idx];
    slot.base.store(base, Ordering::Relaxed);
    slot.len.store(size, Ordering::Relaxed);
    slot.active.store(true, Ordering::Release);

    log::debug!("registered device {id} at [{base:#x}..{end:#x})");
    Ok(())
}

/// Release a device window and remove its entry.
///
/// Callers must quiesce the driver first; a fault in flight against the
/// window being removed is out of scope.
pub fn unregister_device(id: DeviceId) -> Result<(), RegistryError> {
    let _guard = state::writer_lock();

    let idx = slot_index(id)?;
    let slot = &SLOTS[idx];
    if !slot.active.load(Ordering::Acquire) {
        return Err(RegistryError::NotFound(id));
    }

    slot.active.store(false, Ordering::Release);
    let base = slot.base.load(Ordering::Relaxed);
    let len = slot.len.load(Ordering::Relaxed);
    protect::release(base, len);

    log::debug!("unregistered device {id}");
    Ok(())
}

/// Find the device whose window contains `addr`.
///
/// Returns `(device_id, window_base)`. Windows never overlap, so at most one
/// device matches. Async-signal-safe: atomic loads only.
pub fn find_device_by_addr(addr: usize) -> Option<(DeviceId, usize)> {
    for (id, slot) in SLOTS.iter().enumerate() {
        if !slot.active.load(Ordering::Acquire) {
            continue;
        }
        let base = slot.base.load(Ordering::Relaxed);
        let len = slot.len.load(Ordering::Relaxed);
        if addr >= base && addr < base + len {
            return Some((id as DeviceId, base));
        }
    }
    None
}

/// Release every registered window. Used by teardown.
pub(crate) fn clear() {
    let _guard = state::writer_lock();
    for slot in &SLOTS {
        if slot.active.load(Ordering::Acquire) {
            slot.active.store(false, Ordering::Release);
            let base = slot.base.load(Ordering::Relaxed);
            let len = slot.len.load(Ordering::Relaxed);
            protect::release(base, len);
        }
    }
}

fn slot_index(id: DeviceId) -> Result<usize, RegistryError> {
    let idx = id as usize;
    if idx >= MAX_DEVICES {
        return Err(RegistryError::IdOutOfRange(id));
    }
    Ok(idx)
}
