// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Address-space protector: reserves a device window as inaccessible memory
//! at the exact virtual address the driver will dereference.
//!
//! The whole mechanism depends on the mapping landing precisely at `base`,
//! so the reservation uses `MAP_FIXED_NOREPLACE`: if the range is already
//! occupied the kernel refuses and the registration is rejected, instead of
//! `MAP_FIXED` silently clobbering whatever lived there.

use std::io;

use thiserror::Error;

/// Errors raised while reserving a device window.
#[derive(Debug, Error)]
pub enum ProtectError {
    #[error("failed to reserve window [{base:#x}..{end:#x}): {source}")]
    ReserveFailed {
        base: usize,
        end: usize,
        #[source]
        source: io::Error,
    },

    #[error("kernel placed the window at {got:#x} instead of {want:#x}")]
    WrongAddress { want: usize, got: usize },
}

/// Reserve `[base, base+len)` as a private anonymous `PROT_NONE` mapping at
/// exactly `base`. Geometry (alignment, non-zero page-multiple length) is
/// validated by the registry before this is called.
pub(crate) fn reserve(base: usize, len: usize) -> Result<(), ProtectError> {
    let mapped = unsafe {
        libc::mmap(
            base as *mut libc::c_void,
            len,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED_NOREPLACE,
            -1,
            0,
        )
    };

    if mapped == libc::MAP_FAILED {
        return Err(ProtectError::ReserveFailed {
            base,
            end: base + len,
            source: io::Error::last_os_error(),
        });
    }

    // Kernels predating MAP_FIXED_NOREPLACE treat it as a hint and may place
    // the mapping elsewhere.
    if mapped as usize != base {
        unsafe {
            libc::munmap(mapped, len);
        }
        return Err(ProtectError::WrongAddress {
            want: base,
            got: mapped as usize,
        });
    }

    Ok(())
}

/// Release a window previously reserved with [`reserve`].
pub(crate) fn release(base: usize, len: usize) {
    let rc = unsafe { libc::munmap(base as *mut libc::c_void, len) };
    if rc != 0 {
        log::warn!(
            "failed to release window [{base:#x}..{:#x}): {}",
            base + len,
            io::Error::last_os_error()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BASE: usize = 0x7230_0000;
    const TEST_LEN: usize = 0x2000;

    #[test]
    fn test_reserve_release_cycle() {
        reserve(TEST_BASE, TEST_LEN).unwrap();
        // The same range is now occupied, so a second reservation must fail.
        assert!(matches!(
            reserve(TEST_BASE, TEST_LEN),
            Err(ProtectError::ReserveFailed { .. })
        ));
        release(TEST_BASE, TEST_LEN);
        // After release the range is free again.
        reserve(TEST_BASE, TEST_LEN).unwrap();
        release(TEST_BASE, TEST_LEN);
    }
}
