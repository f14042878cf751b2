// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod paths;
pub mod types;

pub use types::*;
