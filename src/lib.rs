//! MFC/R2 call-setup signaling over CAS trunks
//!
//! MFC/R2 sets up calls on a T1/E1 timeslot with two interleaved planes:
//! four line-state bits (ABCD, ITU-T Q.421) for seize/answer/clear
//! supervision, and compelled multi-frequency register signaling (ITU-T
//! Q.441) for the address information. This crate is the per-timeslot state
//! machine that couples the two planes and survives their very different
//! speeds; the trunk hardware, the MF tone DSP and the G.711 tables stay
//! behind traits.
//!
//! One [`R2Channel`] serves one timeslot. The host owns the blocking: it
//! waits on the descriptor (bounded by [`R2Channel::time_to_next_event`])
//! and calls [`R2Channel::process_events`], which drains work without
//! blocking and reports call progress through [`ChannelEvents`].
//!
//! Supports `no_std`; file-based debug captures need the `std` feature.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod cas;
pub mod chan;
pub mod context;
pub mod device;
pub mod events;
pub mod mf;
pub mod proto;
pub mod timer;
pub mod tone;
mod trace;
pub mod variant;

pub use chan::{CallError, OpenError, OsError, R2Channel, BLOCK_SIZE};
pub use context::{ConfigError, R2Context, MAX_DIGITS};
pub use events::ChannelEvents;
pub use proto::{MfGroup, MfState, ProtocolErrorReason, R2State};
pub use timer::TimerKind;
pub use tone::MfTone;
pub use variant::{UnknownVariant, Variant};

/// Who initiated the call on this channel.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// No call in either direction.
    Stopped,
    /// We seized the line.
    Forward,
    /// We were seized.
    Backward,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Stopped => "Stopped",
            Direction::Forward => "Forward",
            Direction::Backward => "Backward",
        }
    }
}

/// Host-visible call progress.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Dialing,
    /// Address exchange finished; awaiting the host's verdict.
    Offered,
    Accepted,
    Answered,
    Disconnected,
}

impl CallState {
    pub const fn as_str(self) -> &'static str {
        match self {
            CallState::Idle => "Idle",
            CallState::Dialing => "Dialing",
            CallState::Offered => "Offered",
            CallState::Accepted => "Accepted",
            CallState::Answered => "Answered",
            CallState::Disconnected => "Disconnected",
        }
    }
}

/// Charging mode attached to an accepted call.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    WithCharge,
    NoCharge,
    Special,
    Unknown,
}

impl CallMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            CallMode::WithCharge => "Call With Charge",
            CallMode::NoCharge => "Call With No Charge",
            CallMode::Special => "Special Call",
            CallMode::Unknown => "*Unknown*",
        }
    }
}

/// Why a call went away.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    BusyNumber,
    NetworkCongestion,
    UnallocatedNumber,
    OutOfOrder,
    Unspecified,
    NormalClearing,
    NoAnswer,
}

impl DisconnectCause {
    pub const fn as_str(self) -> &'static str {
        match self {
            DisconnectCause::BusyNumber => "Busy Number",
            DisconnectCause::NetworkCongestion => "Network Congestion",
            DisconnectCause::UnallocatedNumber => "Unallocated Number",
            DisconnectCause::OutOfOrder => "Line Out Of Order",
            DisconnectCause::Unspecified => "Not Specified",
            DisconnectCause::NormalClearing => "Normal Clearing",
            DisconnectCause::NoAnswer => "No Answer",
        }
    }
}

/// Calling party category, transmitted once per call as a Group II
/// combination.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    NationalSubscriber,
    NationalPrioritySubscriber,
    InternationalSubscriber,
    InternationalPrioritySubscriber,
    Unknown,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::NationalSubscriber => "National Subscriber",
            Category::NationalPrioritySubscriber => "National Priority Subscriber",
            Category::InternationalSubscriber => "International Subscriber",
            Category::InternationalPrioritySubscriber => "International Priority Subscriber",
            Category::Unknown => "*Unknown*",
        }
    }

    /// Parse a provisioning name. Matching is case-insensitive on the
    /// leading characters, so decorated names still resolve.
    pub fn from_name(name: &str) -> Self {
        fn starts(name: &str, prefix: &str) -> bool {
            name.len() >= prefix.len()
                && name.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
        }
        if starts(name, "NATIONAL_SUBSCRIBER") {
            Category::NationalSubscriber
        } else if starts(name, "NATIONAL_PRIORITY_SUBSCRIBER") {
            Category::NationalPrioritySubscriber
        } else if starts(name, "INTERNATIONAL_SUBSCRIBER") {
            Category::InternationalSubscriber
        } else if starts(name, "INTERNATIONAL_PRIORITY_SUBSCRIBER") {
            Category::InternationalPrioritySubscriber
        } else {
            Category::Unknown
        }
    }
}
