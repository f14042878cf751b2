// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fatal-access law: a dereference outside every registered window must
//! terminate the process non-zero with a diagnostic naming the address.
//!
//! The faulting half runs in a re-spawned copy of this test binary so the
//! parent can observe the exit status and stderr.

use std::process::Command;

const CHILD_ENV: &str = "RUMIO_FATAL_ACCESS_CHILD";

fn run_child() -> ! {
    let dir = tempfile::tempdir().unwrap();
    rumio_trap::init_with(rumio_trap::Options {
        permissive_startup: true,
        model_socket: dir.path().join("model.sock"),
    })
    .unwrap();
    rumio_trap::register_device(0, 0x4000_0000, 0x1000).unwrap();

    // Only [0x40000000, 0x40001000) is registered; this is a genuine bad
    // access and the interceptor must not try to continue.
    unsafe {
        std::ptr::read_volatile(0x5000_0000 as *const u32);
    }
    std::process::exit(0);
}

#[test]
fn unknown_address_fault_is_fatal() {
    if std::env::var_os(CHILD_ENV).is_some() {
        run_child();
    }

    let exe = std::env::current_exe().unwrap();
    let output = Command::new(exe)
        .args(["unknown_address_fault_is_fatal", "--exact", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .output()
        .unwrap();

    assert!(
        !output.status.success(),
        "faulting child must exit non-zero, got {:?}",
        output.status
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("0x50000000"),
        "diagnostic must name the faulting address, got: {stderr}"
    );
    assert!(stderr.contains("outside any registered device"));
}
