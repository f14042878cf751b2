// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-process echo device model for the end-to-end tests.
//!
//! Behaves like the reference simulator: stores writes in a per-device map
//! keyed by address and returns the last stored value (or zero) on read.
//! Every request is appended to a log the test can inspect.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rumio_trap::wire::{Command, Message, MESSAGE_SIZE};

pub struct EchoModel {
    /// Every request the model received, in arrival order.
    pub requests: Arc<Mutex<Vec<Message>>>,
}

/// Start an echo model listening on `socket`. The accept loop runs on a
/// detached thread for the lifetime of the test process.
pub fn spawn_echo_model(socket: &Path) -> EchoModel {
    let listener = UnixListener::bind(socket).expect("bind echo model socket");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);

    std::thread::spawn(move || {
        let mut registers: HashMap<(u32, u32), u32> = HashMap::new();
        for conn in listener.incoming() {
            let Ok(mut conn) = conn else { break };
            let mut buf = [0u8; MESSAGE_SIZE];
            if conn.read_exact(&mut buf).is_err() {
                continue;
            }
            let req = Message::decode(&buf).expect("well-formed request");
            log.lock().unwrap().push(req);

            let resp = match req.command {
                Command::Write => {
                    registers.insert((req.device_id, req.address), req.data);
                    Message {
                        data: 0,
                        result: 0,
                        ..req
                    }
                }
                Command::Read => Message {
                    data: registers
                        .get(&(req.device_id, req.address))
                        .copied()
                        .unwrap_or(0),
                    result: 0,
                    ..req
                },
            };
            let _ = conn.write_all(&resp.encode());
        }
    });

    EchoModel { requests }
}
