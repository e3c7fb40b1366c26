// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! String-match action register map.
//!
//! All registers are 32 bits wide. 64-bit values (addresses, sizes) are split
//! into `_L`/`_H` pairs holding the low and high word. Each engine owns a
//! copy of the string-match block at `engine * ENGINE_REGISTER_STRIDE`.

use bitflags::bitflags;

/// SNAP action control register (HLS `ap_ctrl` layout).
pub const ACTION_CONTROL: u32 = 0x00;
/// Action type register, identifies the loaded action.
pub const ACTION_TYPE: u32 = 0x10;

/// Action type of the string-match action.
pub const ACTION_TYPE_STRING_MATCH: u32 = 0x1014_1008;

/// Distance between the register blocks of two engines.
pub const ENGINE_REGISTER_STRIDE: u32 = 0x100;

/// String-match registers, relative to an engine's register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Reg {
    ControlL = 0x30,
    ControlH = 0x34,
    StatusL = 0x38,
    /// Number of matched packets once the flush completes.
    StatusH = 0x3C,
    PattInitAddrL = 0x40,
    PattInitAddrH = 0x44,
    PktInitAddrL = 0x48,
    PktInitAddrH = 0x4C,
    PattCardDdrAddrL = 0x50,
    PattCardDdrAddrH = 0x54,
    StatInitAddrL = 0x58,
    StatInitAddrH = 0x5C,
    PattTotalNumL = 0x60,
    PattTotalNumH = 0x64,
    PktTotalNumL = 0x68,
    PktTotalNumH = 0x6C,
    StatTotalSizeL = 0x70,
    StatTotalSizeH = 0x74,
}

impl Reg {
    const ALL: [Reg; 18] = [
        Reg::ControlL,
        Reg::ControlH,
        Reg::StatusL,
        Reg::StatusH,
        Reg::PattInitAddrL,
        Reg::PattInitAddrH,
        Reg::PktInitAddrL,
        Reg::PktInitAddrH,
        Reg::PattCardDdrAddrL,
        Reg::PattCardDdrAddrH,
        Reg::StatInitAddrL,
        Reg::StatInitAddrH,
        Reg::PattTotalNumL,
        Reg::PattTotalNumH,
        Reg::PktTotalNumL,
        Reg::PktTotalNumH,
        Reg::StatTotalSizeL,
        Reg::StatTotalSizeH,
    ];

    /// Offset relative to the engine register block.
    #[inline]
    pub const fn offset(self) -> u32 {
        self as u32
    }

    /// Absolute offset of this register for `engine`.
    #[inline]
    pub const fn at(self, engine: usize) -> u32 {
        engine_base(engine) + self.offset()
    }

    /// Resolve an absolute offset back to `(engine, register)`.
    pub fn decode(offset: u32) -> Option<(usize, Reg)> {
        let engine = (offset / ENGINE_REGISTER_STRIDE) as usize;
        let rel = offset % ENGINE_REGISTER_STRIDE;
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.offset() == rel)
            .map(|r| (engine, r))
    }

    /// Returns a human-readable name for the register.
    pub const fn name(self) -> &'static str {
        match self {
            Self::ControlL => "CONTROL_L",
            Self::ControlH => "CONTROL_H",
            Self::StatusL => "STATUS_L",
            Self::StatusH => "STATUS_H",
            Self::PattInitAddrL => "PATT_INIT_ADDR_L",
            Self::PattInitAddrH => "PATT_INIT_ADDR_H",
            Self::PktInitAddrL => "PKT_INIT_ADDR_L",
            Self::PktInitAddrH => "PKT_INIT_ADDR_H",
            Self::PattCardDdrAddrL => "PATT_CARD_DDR_ADDR_L",
            Self::PattCardDdrAddrH => "PATT_CARD_DDR_ADDR_H",
            Self::StatInitAddrL => "STAT_INIT_ADDR_L",
            Self::StatInitAddrH => "STAT_INIT_ADDR_H",
            Self::PattTotalNumL => "PATT_TOTAL_NUM_L",
            Self::PattTotalNumH => "PATT_TOTAL_NUM_H",
            Self::PktTotalNumL => "PKT_TOTAL_NUM_L",
            Self::PktTotalNumH => "PKT_TOTAL_NUM_H",
            Self::StatTotalSizeL => "STAT_TOTAL_SIZE_L",
            Self::StatTotalSizeH => "STAT_TOTAL_SIZE_H",
        }
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.offset())
    }
}

/// Base offset of the register block for `engine`.
#[inline]
pub const fn engine_base(engine: usize) -> u32 {
    engine as u32 * ENGINE_REGISTER_STRIDE
}

bitflags! {
    /// `CONTROL_L` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u32 {
        /// Copy the pattern buffer from host memory to the card.
        const COPY_PATTERN = 1 << 0;
        /// Start scanning packets (both bits must be set).
        const WORK = 0b11 << 1;
        /// Flush outstanding result slots to host memory.
        const FLUSH = 1 << 3;
        /// Soft reset of the engine.
        const SOFT_RESET = 1 << 4;
    }
}

bitflags! {
    /// `STATUS_L` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        /// Pattern copy finished.
        const COPY_DONE = 1 << 0;
        /// Packet scan finished (both bits set).
        const WORK_DONE = 0b11 << 1;
        /// Result flush finished; `STATUS_H` holds the match count.
        const FLUSH_DONE = 1 << 3;
        /// Result buffer space used up.
        const STAT_SPACE_EXHAUSTED = 1 << 4;
        /// Error code field, bits 8-23.
        const ERROR_CODE = 0x00FF_FF00;

        const _ = !0;
    }
}

impl Status {
    /// Error code carried in bits 8-23, zero when healthy.
    #[inline]
    pub fn error_code(self) -> u16 {
        ((self.bits() & Self::ERROR_CODE.bits()) >> 8) as u16
    }
}

bitflags! {
    /// SNAP `ACTION_CONTROL` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ActionControl: u32 {
        const START = 1 << 0;
        const DONE = 1 << 1;
        const IDLE = 1 << 2;
        const READY = 1 << 3;

        const _ = !0;
    }
}

/// Split a 64-bit value into its `(low, high)` register words.
#[inline]
pub const fn split_u64(value: u64) -> (u32, u32) {
    (value as u32, (value >> 32) as u32)
}
