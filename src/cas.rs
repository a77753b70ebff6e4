//! ABCD line signaling words
//!
//! Every CAS timeslot carries four signaling bits next to its PCM. Only a
//! subset of the bits encodes call state (A and B under ITU-T Q.421); the
//! rest are held at fixed values that also differ per variant. Patterns are
//! compared after masking with the R2-bit mask of the active variant.

use modular_bitfield::prelude::*;

/// Raw ABCD word at the device boundary. Bit A is the most significant bit
/// of the nibble (0x8), D the least (0x1); the upper half of the octet is
/// ignored by the framer.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CasBits {
    pub d: bool,
    pub c: bool,
    pub b: bool,
    pub a: bool,
    pub rfu: B4,
}

impl CasBits {
    pub fn from_raw(raw: u8) -> Self {
        Self::from_bytes([raw & 0xF])
    }

    pub fn raw(self) -> u8 {
        self.into_bytes()[0] & 0xF
    }
}

/// Symbolic line-state signals of the R2 handshake.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasSignal {
    Idle,
    Block,
    Seize,
    SeizeAck,
    ClearBack,
    ClearForward,
    Answer,
}

impl CasSignal {
    pub const fn name(self) -> &'static str {
        match self {
            CasSignal::Idle => "IDLE",
            CasSignal::Block => "BLOCK",
            CasSignal::Seize => "SEIZE",
            CasSignal::SeizeAck => "SEIZE_ACK",
            CasSignal::ClearBack => "CLEAR_BACK",
            CasSignal::ClearForward => "CLEAR_FORWARD",
            CasSignal::Answer => "ANSWER",
        }
    }
}

/// Per-variant map from symbolic signal to its four-bit pattern.
///
/// Patterns are not unique: under the ITU assignments SEIZE ACK, CLEAR BACK
/// and BLOCK all read 0xC, and IDLE equals CLEAR FORWARD. Received words
/// are therefore meaningful only relative to the current protocol state.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CasSignalSet {
    pub idle: u8,
    pub block: u8,
    pub seize: u8,
    pub seize_ack: u8,
    pub clear_back: u8,
    pub clear_forward: u8,
    pub answer: u8,
}

impl CasSignalSet {
    /// ITU-T Q.421 assignments.
    pub const ITU: Self = Self {
        idle: 0x8,
        block: 0xC,
        seize: 0x0,
        seize_ack: 0xC,
        clear_back: 0xC,
        clear_forward: 0x8,
        answer: 0x4,
    };

    pub const fn pattern(&self, signal: CasSignal) -> u8 {
        match signal {
            CasSignal::Idle => self.idle,
            CasSignal::Block => self.block,
            CasSignal::Seize => self.seize,
            CasSignal::SeizeAck => self.seize_ack,
            CasSignal::ClearBack => self.clear_back,
            CasSignal::ClearForward => self.clear_forward,
            CasSignal::Answer => self.answer,
        }
    }
}
