//! MF tone codes of the interregister signal system
//!
//! ITU-T Q.441 defines fifteen two-out-of-six frequency combinations per
//! direction. Combinations are carried here under their conventional
//! character values: combinations 1..9 as the matching ASCII digit,
//! combination 10 as `'0'` (it encodes the digit zero), 11..15 as
//! `'B'..'F'`. What a combination *means* depends on the tone group in
//! effect, which is a property of the protocol variant, not of the code.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// One MF combination, as exchanged with the tone engine.
///
/// Silence and "signal absent in this variant" are `Option<MfTone>::None`
/// at every boundary; there is no in-band sentinel value.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MfTone {
    Tone1 = b'1',
    Tone2 = b'2',
    Tone3 = b'3',
    Tone4 = b'4',
    Tone5 = b'5',
    Tone6 = b'6',
    Tone7 = b'7',
    Tone8 = b'8',
    Tone9 = b'9',
    /// Combination 10 carries the digit "0".
    Tone10 = b'0',
    Tone11 = b'B',
    Tone12 = b'C',
    Tone13 = b'D',
    Tone14 = b'E',
    Tone15 = b'F',
}

impl MfTone {
    /// The address digit this combination encodes, for the ten numeric
    /// combinations.
    pub const fn digit(self) -> Option<char> {
        let c = self as u8;
        if c.is_ascii_digit() {
            Some(c as char)
        } else {
            None
        }
    }

    pub const fn is_digit(self) -> bool {
        self.digit().is_some()
    }

    /// The combination for an address digit.
    pub fn from_digit(digit: char) -> Option<Self> {
        if digit.is_ascii_digit() {
            Self::try_from(digit as u8).ok()
        } else {
            None
        }
    }

    /// The conventional character for log output.
    pub const fn as_char(self) -> char {
        self as u8 as char
    }
}
