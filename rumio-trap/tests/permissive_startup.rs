// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Boot-before-model race: with permissive startup enabled, an absent model
//! endpoint acknowledges stores and answers loads with zero instead of
//! killing the driver.

use std::ptr;

use rumio_trap::Options;

const BASE: usize = 0x4100_0000;

#[test]
fn absent_model_reads_zero_under_permissive_startup() {
    let dir = tempfile::tempdir().unwrap();
    rumio_trap::init_with(Options {
        permissive_startup: true,
        model_socket: dir.path().join("never-bound.sock"),
    })
    .unwrap();
    rumio_trap::register_device(0, BASE, 0x1000).unwrap();

    unsafe {
        // The store is discarded, the load synthesizes zero.
        ptr::write_volatile(BASE as *mut u32, 0xDEAD_BEEF);
        assert_eq!(ptr::read_volatile(BASE as *const u32), 0);
        assert_eq!(ptr::read_volatile((BASE + 4) as *const u8), 0);
    }

    rumio_trap::cleanup();
}
