// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Interrupt-dispatch law: a side-channel record plus the notification
//! signal invokes the registered callback exactly once, synchronously, and
//! removes the file. Spurious and malformed notifications are silent.

use std::sync::atomic::{AtomicU32, Ordering};

use rumio_common::paths::interrupt_info_path;
use rumio_trap::Options;

static HITS: AtomicU32 = AtomicU32::new(0);
static LAST_IRQ: AtomicU32 = AtomicU32::new(u32::MAX);

fn on_irq(interrupt_id: u32) {
    HITS.fetch_add(1, Ordering::SeqCst);
    LAST_IRQ.store(interrupt_id, Ordering::SeqCst);
}

fn notify() {
    // raise() delivers to the calling thread before it returns, so the
    // callback has run by the time the assertions below execute.
    unsafe {
        libc::raise(libc::SIGUSR1);
    }
}

#[test]
fn interrupt_dispatch_law() {
    let dir = tempfile::tempdir().unwrap();
    rumio_trap::init_with(Options {
        permissive_startup: true,
        model_socket: dir.path().join("model.sock"),
    })
    .unwrap();
    rumio_trap::register_interrupt_handler(0, on_irq).unwrap();

    let path = interrupt_info_path(std::process::id());

    // The model writes the record, then raises the signal.
    std::fs::write(&path, "0,7").unwrap();
    notify();
    assert_eq!(HITS.load(Ordering::SeqCst), 1);
    assert_eq!(LAST_IRQ.load(Ordering::SeqCst), 7);
    assert!(!path.exists(), "side-channel file must be consumed");

    // Spurious signal with no file: ignored.
    notify();
    assert_eq!(HITS.load(Ordering::SeqCst), 1);

    // Malformed record: ignored, but still consumed.
    std::fs::write(&path, "not-a-record").unwrap();
    notify();
    assert_eq!(HITS.load(Ordering::SeqCst), 1);
    assert!(!path.exists());

    // Device with no registered callback: ignored.
    std::fs::write(&path, "5,1").unwrap();
    notify();
    assert_eq!(HITS.load(Ordering::SeqCst), 1);
    assert!(!path.exists());

    // A second delivery for the registered device dispatches again.
    std::fs::write(&path, "0,2").unwrap();
    notify();
    assert_eq!(HITS.load(Ordering::SeqCst), 2);
    assert_eq!(LAST_IRQ.load(Ordering::SeqCst), 2);

    rumio_trap::cleanup();

    // After cleanup the dispatch table is empty.
    std::fs::write(&path, "0,3").unwrap();
    notify();
    assert_eq!(HITS.load(Ordering::SeqCst), 2);
    assert!(!path.exists());
}
