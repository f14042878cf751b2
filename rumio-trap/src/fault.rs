// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Access-violation interceptor.
//!
//! Runs as the process SIGSEGV handler: resolves the faulting address to a
//! registered device, decodes the trapped instruction, round-trips one wire
//! record with the device model, writes load results back into the
//! interrupted register file, and advances the interrupted instruction
//! pointer so execution resumes past the access.
//!
//! The whole path is async-signal-safe: atomic reads, stack buffers, raw
//! socket calls, and direct mutation of the `ucontext_t` the kernel handed
//! us. Fatal conditions format a diagnostic into a stack buffer, emit it
//! with `write(2)`, and terminate with `_exit(1)` — a fault we cannot
//! emulate must never be resumed or silently swallowed.

use std::ptr;

use crate::channel::{self, ChannelError};
use crate::decode::{self, DecodeError, Extend, MemAccess, Reg, StoreSrc, Width};
use crate::registry;
use crate::state;
use crate::wire::Message;

/// gregs slot for each register index named by the decoder (ModR/M order:
/// rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi, r8-r15).
const GREG_SLOTS: [libc::c_int; 16] = [
    libc::REG_RAX,
    libc::REG_RCX,
    libc::REG_RDX,
    libc::REG_RBX,
    libc::REG_RSP,
    libc::REG_RBP,
    libc::REG_RSI,
    libc::REG_RDI,
    libc::REG_R8,
    libc::REG_R9,
    libc::REG_R10,
    libc::REG_R11,
    libc::REG_R12,
    libc::REG_R13,
    libc::REG_R14,
    libc::REG_R15,
];

/// Conditions that terminate the faulting process.
enum FatalFault {
    UnknownAddress,
    Decode(DecodeError),
    Channel(ChannelError),
    Device(i32),
    NotInitialized,
}

/// SIGSEGV entry point, installed with SA_SIGINFO.
pub(crate) unsafe extern "C" fn on_access_fault(
    _sig: libc::c_int,
    info: *mut libc::siginfo_t,
    context: *mut libc::c_void,
) {
    let fault_addr = unsafe { (*info).si_addr() } as usize;
    let uctx = unsafe { &mut *(context as *mut libc::ucontext_t) };

    if let Err(fatal) = handle_fault(fault_addr, uctx) {
        fatal.report(fault_addr);
        unsafe { libc::_exit(1) };
    }
}

fn handle_fault(fault_addr: usize, uctx: &mut libc::ucontext_t) -> Result<(), FatalFault> {
    let (device_id, _base) =
        registry::find_device_by_addr(fault_addr).ok_or(FatalFault::UnknownAddress)?;

    let rip = uctx.uc_mcontext.gregs[libc::REG_RIP as usize] as usize;
    let mut insn = [0u8; decode::MAX_INSN_BYTES];
    // RIP points into the driver's own executable text.
    unsafe {
        ptr::copy_nonoverlapping(rip as *const u8, insn.as_mut_ptr(), insn.len());
    }
    let decoded = decode::decode(&insn).map_err(FatalFault::Decode)?;

    let request = match decoded.access {
        MemAccess::Load { width, .. } => {
            Message::read(device_id, fault_addr as u32, width.bytes())
        }
        MemAccess::Store { width, src } => {
            let data = match src {
                StoreSrc::Imm(imm) => imm,
                StoreSrc::Reg(reg) => store_value(read_greg(uctx, reg), width, reg),
            };
            Message::write(device_id, fault_addr as u32, data, width.bytes())
        }
    };

    let socket = state::model_socket().ok_or(FatalFault::NotInitialized)?;
    let response = match channel::transact(socket, &request) {
        Ok(resp) => resp,
        // Boot-before-model liveness concession: with permissive startup
        // enabled, an absent model acknowledges stores and reads as zero.
        Err(ChannelError::Unreachable(_)) if state::permissive() => {
            request.synthesized_response()
        }
        Err(err) => return Err(FatalFault::Channel(err)),
    };
    if response.result != 0 {
        return Err(FatalFault::Device(response.result));
    }

    if let MemAccess::Load {
        width,
        dest,
        extend,
    } = decoded.access
    {
        let old = read_greg(uctx, dest);
        write_greg(uctx, dest, merge_load(old, response.data, width, extend, dest));
    }

    uctx.uc_mcontext.gregs[libc::REG_RIP as usize] += decoded.len as libc::greg_t;
    Ok(())
}

fn read_greg(uctx: &libc::ucontext_t, reg: Reg) -> u64 {
    uctx.uc_mcontext.gregs[GREG_SLOTS[reg.index as usize] as usize] as u64
}

fn write_greg(uctx: &mut libc::ucontext_t, reg: Reg, value: u64) {
    uctx.uc_mcontext.gregs[GREG_SLOTS[reg.index as usize] as usize] = value as libc::greg_t;
}

/// Extract the stored value from a source register, truncated to the access
/// width and zero-extended to 32 bits.
fn store_value(raw: u64, width: Width, reg: Reg) -> u32 {
    match width {
        Width::Byte if reg.high_byte => ((raw >> 8) & 0xFF) as u32,
        Width::Byte => (raw & 0xFF) as u32,
        Width::Word => (raw & 0xFFFF) as u32,
        Width::Dword => (raw & 0xFFFF_FFFF) as u32,
    }
}

/// Combine the model's response with the previous destination register value
/// according to the decoded width and extension rule.
fn merge_load(old: u64, data: u32, width: Width, extend: Extend, dest: Reg) -> u64 {
    match extend {
        Extend::Zero => match width {
            Width::Byte => (data & 0xFF) as u64,
            Width::Word => (data & 0xFFFF) as u64,
            Width::Dword => data as u64,
        },
        Extend::Sign => match width {
            Width::Byte => (data as u8 as i8 as i32) as u32 as u64,
            Width::Word => (data as u16 as i16 as i32) as u32 as u64,
            Width::Dword => data as u64,
        },
        Extend::Merge => match width {
            Width::Byte if dest.high_byte => {
                (old & !0xFF00) | (((data & 0xFF) as u64) << 8)
            }
            Width::Byte => (old & !0xFF) | (data & 0xFF) as u64,
            Width::Word => (old & !0xFFFF) | (data & 0xFFFF) as u64,
            Width::Dword => data as u64,
        },
    }
}

// ---------------------------------------------------------------------------
// Async-signal-safe diagnostics
// ---------------------------------------------------------------------------

/// Fixed-size stderr message builder. `format!` and the `log` macros
/// allocate, which is off-limits here.
struct DiagBuf {
    buf: [u8; 192],
    len: usize,
}

impl DiagBuf {
    fn new() -> Self {
        Self {
            buf: [0; 192],
            len: 0,
        }
    }

    fn push_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            if self.len < self.buf.len() {
                self.buf[self.len] = b;
                self.len += 1;
            }
        }
    }

    fn push_hex(&mut self, value: u64) {
        self.push_str("0x");
        let digits = b"0123456789abcdef";
        let mut started = false;
        for shift in (0..16).rev() {
            let nibble = ((value >> (shift * 4)) & 0xF) as usize;
            if nibble != 0 || started || shift == 0 {
                started = true;
                if self.len < self.buf.len() {
                    self.buf[self.len] = digits[nibble];
                    self.len += 1;
                }
            }
        }
    }

    fn push_dec(&mut self, value: i64) {
        if value < 0 {
            self.push_str("-");
        }
        let mut magnitude = value.unsigned_abs();
        let mut digits = [0u8; 20];
        let mut count = 0;
        loop {
            digits[count] = b'0' + (magnitude % 10) as u8;
            magnitude /= 10;
            count += 1;
            if magnitude == 0 {
                break;
            }
        }
        for i in (0..count).rev() {
            if self.len < self.buf.len() {
                self.buf[self.len] = digits[i];
                self.len += 1;
            }
        }
    }

    fn emit(&self) {
        unsafe {
            libc::write(
                libc::STDERR_FILENO,
                self.buf.as_ptr() as *const libc::c_void,
                self.len,
            );
        }
    }
}

impl FatalFault {
    fn report(&self, fault_addr: usize) {
        let mut diag = DiagBuf::new();
        diag.push_str("rumio-trap: ");
        match self {
            Self::UnknownAddress => {
                diag.push_str("fault at ");
                diag.push_hex(fault_addr as u64);
                diag.push_str(" outside any registered device");
            }
            Self::Decode(err) => {
                diag.push_str("cannot emulate access at ");
                diag.push_hex(fault_addr as u64);
                diag.push_str(": ");
                diag.push_str(decode_error_text(err));
                if let Some(byte) = decode_error_byte(err) {
                    diag.push_str(" ");
                    diag.push_hex(byte as u64);
                }
            }
            Self::Channel(err) => {
                diag.push_str("model channel failure for access at ");
                diag.push_hex(fault_addr as u64);
                diag.push_str(": ");
                diag.push_str(channel_error_text(err));
                if let Some(errno) = err.raw_os_error() {
                    diag.push_str(" (errno ");
                    diag.push_dec(errno as i64);
                    diag.push_str(")");
                }
            }
            Self::Device(result) => {
                diag.push_str("device model returned error ");
                diag.push_dec(*result as i64);
                diag.push_str(" for access at ");
                diag.push_hex(fault_addr as u64);
            }
            Self::NotInitialized => {
                diag.push_str("fault at ");
                diag.push_hex(fault_addr as u64);
                diag.push_str(" before the trap layer was initialized");
            }
        }
        diag.push_str("\n");
        diag.emit();
    }
}

fn decode_error_text(err: &DecodeError) -> &'static str {
    match err {
        DecodeError::UnsupportedOpcode(_) => "unsupported opcode",
        DecodeError::UnsupportedOpcode2(_) => "unsupported two-byte opcode 0f",
        DecodeError::UnsupportedGroup { .. } => "unsupported group-opcode form",
        DecodeError::Width64 => "64-bit operand width",
        DecodeError::PrefixedExtendedLoad => "16-bit-prefixed extended load",
        DecodeError::NotMemory => "register-direct operand",
        DecodeError::Truncated => "instruction runs past the fetch window",
    }
}

fn decode_error_byte(err: &DecodeError) -> Option<u8> {
    match err {
        DecodeError::UnsupportedOpcode(b)
        | DecodeError::UnsupportedOpcode2(b)
        | DecodeError::UnsupportedGroup { opcode: b, .. } => Some(*b),
        _ => None,
    }
}

fn channel_error_text(err: &ChannelError) -> &'static str {
    match err {
        ChannelError::Unreachable(_) => "endpoint not reachable",
        ChannelError::PathTooLong => "socket path too long",
        ChannelError::Io(_) => "socket I/O error",
        ChannelError::ShortTransfer { .. } => "short transfer",
        ChannelError::Malformed(_) => "malformed response record",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOW: Reg = Reg {
        index: 0,
        high_byte: false,
    };
    const HIGH: Reg = Reg {
        index: 0,
        high_byte: true,
    };

    #[test]
    fn test_store_value_truncates_to_width() {
        assert_eq!(store_value(0x1122_3344_5566_7788, Width::Dword, LOW), 0x5566_7788);
        assert_eq!(store_value(0x1122_3344_5566_7788, Width::Word, LOW), 0x7788);
        assert_eq!(store_value(0x1122_3344_5566_7788, Width::Byte, LOW), 0x88);
        assert_eq!(store_value(0x1122_3344_5566_7788, Width::Byte, HIGH), 0x77);
    }

    #[test]
    fn test_merge_preserves_upper_bits_for_subword_mov() {
        let old = 0xFFFF_FFFF_FFFF_FFFF;
        assert_eq!(
            merge_load(old, 0xAB, Width::Byte, Extend::Merge, LOW),
            0xFFFF_FFFF_FFFF_FFAB
        );
        assert_eq!(
            merge_load(old, 0xAB, Width::Byte, Extend::Merge, HIGH),
            0xFFFF_FFFF_FFFF_ABFF
        );
        assert_eq!(
            merge_load(old, 0xBEEF, Width::Word, Extend::Merge, LOW),
            0xFFFF_FFFF_FFFF_BEEF
        );
    }

    #[test]
    fn test_dword_load_zero_extends() {
        assert_eq!(
            merge_load(u64::MAX, 0x1234_5678, Width::Dword, Extend::Zero, LOW),
            0x1234_5678
        );
    }

    #[test]
    fn test_movzx_movsx_semantics() {
        assert_eq!(
            merge_load(u64::MAX, 0x80, Width::Byte, Extend::Zero, LOW),
            0x80
        );
        assert_eq!(
            merge_load(u64::MAX, 0x80, Width::Byte, Extend::Sign, LOW),
            0xFFFF_FF80
        );
        assert_eq!(
            merge_load(u64::MAX, 0x8000, Width::Word, Extend::Sign, LOW),
            0xFFFF_8000
        );
        assert_eq!(
            merge_load(u64::MAX, 0x7FFF, Width::Word, Extend::Sign, LOW),
            0x7FFF
        );
    }

    #[test]
    fn test_diag_buf_formatting() {
        let mut diag = DiagBuf::new();
        diag.push_str("fault at ");
        diag.push_hex(0x5000_0000);
        diag.push_str(" result ");
        diag.push_dec(-5);
        assert_eq!(
            &diag.buf[..diag.len],
            b"fault at 0x50000000 result -5"
        );
    }
}
