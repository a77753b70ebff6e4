//! Per-channel protocol timer
//!
//! Exactly one deadline is outstanding per channel. Arming a new one
//! replaces the previous entry; the event loop fires an expired entry once,
//! after clearing the slot, so the handler may re-arm.

use embedded_time::{Clock, Instant};

/// What to do when the pending deadline expires.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// No seize ack from the far end.
    Seize,
    /// The far end accepted but never answered.
    Answer,
    /// The compelled backward cycle stalled.
    MfBackCycle,
    /// Mute our request tone now that the far end has gone silent.
    MfBackResumeCycle,
    /// Forward-side cap on waiting for the far-end cycle timeout.
    MfFwdSafety,
    /// CLEAR BACK flicker window on metering-pulse variants.
    MeteringPulse,
    /// The far end has had time to see our accept tone off; report the
    /// accept so the host may answer.
    ReadyToAnswer,
}

#[derive(Debug)]
pub(crate) struct TimerSlot<C: Clock> {
    pub deadline: Instant<C>,
    pub kind: TimerKind,
}
