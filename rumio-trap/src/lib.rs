// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Trap-and-emulate interface layer for user-space device emulation.
//!
//! Lets unmodified driver code perform ordinary load/store instructions
//! against fixed physical-style addresses (say `0x4000_0000`) and
//! transparently redirects each access to an out-of-process device model:
//! registered windows are reserved as inaccessible memory, the resulting
//! access violation is intercepted, the faulting instruction decoded, one
//! request/response record exchanged with the model over a local socket,
//! load results written back into the interrupted register file, and
//! execution resumed past the instruction. Model-originated interrupts come
//! back as asynchronous callbacks via a notification signal and a small
//! side-channel file.
//!
//! Linux x86-64 only: the instruction decoder and the interrupted-context
//! register access have no portable form.
//!
//! ```no_run
//! rumio_trap::init()?;
//! rumio_trap::register_device(0, 0x4000_0000, 0x1000)?;
//! let status = unsafe { std::ptr::read_volatile(0x4000_0004 as *const u32) };
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod channel;
pub mod decode;
pub mod interrupt;
pub mod protect;
pub mod registry;
pub mod session;
pub mod wire;

mod fault;
mod state;

pub use interrupt::{register_interrupt_handler, InterruptError, InterruptHandler};
pub use registry::{find_device_by_addr, register_device, unregister_device, RegistryError};
pub use session::{cleanup, init, init_with, InitError, Options};
