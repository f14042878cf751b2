// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Demonstration driver: pokes a UART-style device window through plain
//! volatile pointers and waits for a model interrupt. Not part of the trap
//! layer itself — this is what driver code using it looks like.

use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use rumio_trap::Options;

// UART register map of the reference device model.
const UART_TX: usize = 0x00;
const UART_STATUS: usize = 0x04;
const UART_CTRL: usize = 0x08;

/// rumio - user-space MMIO trap demonstration driver
#[derive(Parser, Debug)]
#[command(name = "rumio", version, about = "Drives an emulated UART through trapped MMIO")]
struct Args {
    /// Device id to register
    #[arg(long, default_value_t = 0)]
    device_id: u32,

    /// Base address of the device window
    #[arg(long, default_value = "0x40000000", value_parser = parse_addr)]
    base: usize,

    /// Size of the device window in bytes
    #[arg(long, default_value = "0x1000", value_parser = parse_addr)]
    size: usize,

    /// Path to the device-model socket
    #[arg(long)]
    model_socket: Option<PathBuf>,

    /// Treat a missing model as benign (loads read as zero)
    #[arg(long)]
    permissive: bool,

    /// Seconds to wait for a model interrupt after the register pokes
    #[arg(long, default_value_t = 5)]
    wait_interrupt: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_addr(s: &str) -> Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

static LAST_IRQ: AtomicU32 = AtomicU32::new(u32::MAX);

fn uart_interrupt(interrupt_id: u32) {
    // Signal context: just record the id for the main line.
    LAST_IRQ.store(interrupt_id, Ordering::SeqCst);
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("rumio demonstration driver");

    let mut options = Options {
        permissive_startup: args.permissive,
        ..Options::default()
    };
    if let Some(socket) = args.model_socket {
        options.model_socket = socket;
    }

    rumio_trap::init_with(options).context("failed to initialize the trap layer")?;
    rumio_trap::register_device(args.device_id, args.base, args.size)
        .context("failed to register the device window")?;
    rumio_trap::register_interrupt_handler(args.device_id, uart_interrupt)
        .context("failed to register the interrupt handler")?;

    info!(
        "device {} registered at [{:#x}..{:#x})",
        args.device_id,
        args.base,
        args.base + args.size
    );

    // Every access below faults into the trap layer and round-trips with
    // the model.
    unsafe {
        info!("enabling the UART");
        ptr::write_volatile((args.base + UART_CTRL) as *mut u32, 0x01);

        let status = ptr::read_volatile((args.base + UART_STATUS) as *const u32);
        info!("status register: {status:#010x}");

        info!("transmitting");
        for byte in *b"hello" {
            ptr::write_volatile((args.base + UART_TX) as *mut u32, byte as u32);
        }

        let status = ptr::read_volatile((args.base + UART_STATUS) as *const u32);
        info!("status after transmit: {status:#010x}");
    }

    if args.wait_interrupt > 0 {
        info!("waiting up to {}s for a model interrupt", args.wait_interrupt);
        let deadline = Instant::now() + Duration::from_secs(args.wait_interrupt);
        loop {
            let irq = LAST_IRQ.load(Ordering::SeqCst);
            if irq != u32::MAX {
                info!("interrupt received: id {irq}");
                break;
            }
            if Instant::now() >= deadline {
                info!("no interrupt received");
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    rumio_trap::cleanup();
    info!("done");
    Ok(())
}
