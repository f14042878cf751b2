// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Well-known filesystem rendezvous points shared between the driver process
//! and the device model.
//!
//! The model listens on [`MODEL_SOCKET_PATH`], learns the driver's pid from
//! the publication file, and passes interrupt parameters through the
//! side-channel file immediately before raising the notification signal.

use std::path::PathBuf;

/// Default rendezvous socket of the device-model process.
pub const MODEL_SOCKET_PATH: &str = "/tmp/driver_simulator_socket";

/// Prefix of the file through which the driver advertises its pid.
pub const PUBLICATION_PREFIX: &str = "/tmp/interface_driver_";

/// Prefix of the ephemeral file carrying `device_id,interrupt_id`.
pub const INTERRUPT_INFO_PREFIX: &str = "/tmp/interrupt_info_";

/// Publication file for the driver process with the given pid.
pub fn publication_path(pid: u32) -> PathBuf {
    PathBuf::from(format!("{PUBLICATION_PREFIX}{pid}"))
}

/// Interrupt side-channel file for the driver process with the given pid.
pub fn interrupt_info_path(pid: u32) -> PathBuf {
    PathBuf::from(format!("{INTERRUPT_INFO_PREFIX}{pid}"))
}
