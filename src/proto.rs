//! The coupled ABCD and MF state machines
//!
//! Call setup interleaves two planes. The ABCD bits carry line supervision
//! (seize, answer, clear); the compelled MF exchange carries the address:
//! each forward tone stays up until the backward side answers with its own
//! tone, which stays up until the forward side mutes, and so on. The bits
//! move faster than any tone can be detected, so the two machines must
//! tolerate either plane arriving first (see
//! [`R2State::AnswerRxdMfPending`]).
//!
//! The backward side acts on tone-on edges; the forward side acts on
//! tone-off edges. Every state that waits on far-end progress arms the
//! channel timer, and every failure path funnels through one handler that
//! returns the line to idle.

use embedded_time::duration::Milliseconds;
use embedded_time::Clock;
use log::{debug, error, info, trace, warn};

use crate::cas::CasSignal;
use crate::chan::{CallError, OsError, R2Channel};
use crate::device::CasDevice;
use crate::events::ChannelEvents;
use crate::mf::{MfEngine, PcmCodec, ToneEvent};
use crate::timer::TimerKind;
use crate::tone::MfTone;
use crate::{CallMode, CallState, Category, Direction, DisconnectCause};

/// Delay between our accept tone going silent and reporting the accept, so
/// the far end cannot miss the later answer transition on the bits.
const ANSWER_WAIT: Milliseconds<u32> = Milliseconds(150);

/// Line-signaling plane state.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R2State {
    Idle,
    /// Locally blocked for maintenance.
    Blocked,
    SeizeTxd,
    SeizeAckRxd,
    SeizeAckTxd,
    /// The MF accept tone arrived; waiting for answer on the bits.
    AcceptRxd,
    AnswerTxd,
    AnswerRxd,
    /// Answer came on the bits before the accept tone finished.
    AnswerRxdMfPending,
    ClearBackTxd,
    ClearBackRxd,
    /// A Group A/B disconnect tone stands in for CLEAR BACK.
    ClearBackToneRxd,
    ClearFwdTxd,
    ClearFwdRxd,
}

impl R2State {
    pub const fn as_str(self) -> &'static str {
        match self {
            R2State::Idle => "Idle",
            R2State::Blocked => "Blocked",
            R2State::SeizeTxd => "Seize Transmitted",
            R2State::SeizeAckRxd => "Seize ACK Received",
            R2State::SeizeAckTxd => "Seize ACK Transmitted",
            R2State::AcceptRxd => "Accept Received",
            R2State::AnswerTxd => "Answer Transmitted",
            R2State::AnswerRxd => "Answer Received",
            R2State::AnswerRxdMfPending => "Answer Received with MF Pending",
            R2State::ClearBackTxd => "Clear Back Transmitted",
            R2State::ClearBackRxd => "Clear Back Received",
            R2State::ClearBackToneRxd => "Clear Back Tone Received",
            R2State::ClearFwdTxd => "Clear Forward Transmitted",
            R2State::ClearFwdRxd => "Clear Forward Received",
        }
    }
}

/// MF plane state. TXD states name the last thing we put on the line.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfState {
    /// Engine off; PCM flows to the host once answered.
    Off,
    SeizeAckTxd,
    CategoryRqTxd,
    DnisRqTxd,
    AniRqTxd,
    ChgGiiTxd,
    AcceptedTxd,
    DisconnectTxd,
    CategoryTxd,
    DnisTxd,
    DnisEndTxd,
    AniTxd,
    AniEndTxd,
    /// Out of digits with no end signal in this variant; the far end must
    /// time out to resume the cycle.
    WaitingTimeout,
}

impl MfState {
    pub const fn as_str(self) -> &'static str {
        match self {
            MfState::Off => "MF Engine Off",
            MfState::SeizeAckTxd => "Seize ACK Transmitted",
            MfState::CategoryRqTxd => "Category Request Transmitted",
            MfState::DnisRqTxd => "DNIS Request Transmitted",
            MfState::AniRqTxd => "ANI Request Transmitted",
            MfState::ChgGiiTxd => "Change To Group II Request Transmitted",
            MfState::AcceptedTxd => "Accepted Call Transmitted",
            MfState::DisconnectTxd => "Disconnect Tone Transmitted",
            MfState::CategoryTxd => "Category Transmitted",
            MfState::DnisTxd => "DNIS Digit Transmitted",
            MfState::DnisEndTxd => "End of DNIS Transmitted",
            MfState::AniTxd => "ANI Digit Transmitted",
            MfState::AniEndTxd => "End of ANI Transmitted",
            MfState::WaitingTimeout => "Waiting Far End Timeout",
        }
    }
}

/// Which tone vocabulary is in effect.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfGroup {
    None,
    BackInit,
    GroupA,
    GroupB,
    GroupC,
    FwdInit,
    GroupI,
    GroupII,
    GroupIII,
}

impl MfGroup {
    pub const fn as_str(self) -> &'static str {
        match self {
            MfGroup::None => "No Group",
            MfGroup::BackInit => "Backward MF init",
            MfGroup::GroupA => "Backward Group A",
            MfGroup::GroupB => "Backward Group B",
            MfGroup::GroupC => "Backward Group C",
            MfGroup::FwdInit => "Forward MF init",
            MfGroup::GroupI => "Forward Group I",
            MfGroup::GroupII => "Forward Group II",
            MfGroup::GroupIII => "Forward Group III",
        }
    }
}

/// Why a channel was reset to idle.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorReason {
    InvalidCasBits,
    InvalidMfTone,
    BackMfTimeout,
    SeizeTimeout,
    AnswerTimeout,
    InvalidR2State,
    InvalidMfState,
    InvalidMfGroup,
    FwdSafetyTimeout,
    BrokenMfSequence,
    LibraryBug,
    InternalError,
}

impl ProtocolErrorReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProtocolErrorReason::InvalidCasBits => "Invalid CAS",
            ProtocolErrorReason::InvalidMfTone => "Invalid Multi Frequency Tone",
            ProtocolErrorReason::BackMfTimeout => "Multi Frequency Cycle Timeout",
            ProtocolErrorReason::SeizeTimeout => "Seize Timeout",
            ProtocolErrorReason::AnswerTimeout => "Answer Timeout",
            ProtocolErrorReason::InvalidR2State => "Invalid R2 state",
            ProtocolErrorReason::InvalidMfState => "Invalid Multi Frequency State",
            ProtocolErrorReason::InvalidMfGroup => "Invalid R2 Group",
            ProtocolErrorReason::FwdSafetyTimeout => "Forward Safety Timeout",
            ProtocolErrorReason::BrokenMfSequence => "Broken MF Sequence",
            ProtocolErrorReason::LibraryBug => "Library Bug",
            ProtocolErrorReason::InternalError => "Internal Error",
        }
    }
}

fn tone_char(tone: Option<MfTone>) -> char {
    match tone {
        Some(t) => t.as_char(),
        None => ' ',
    }
}

impl<'a, D, M, C, X> R2Channel<'a, D, M, C, X>
where
    D: CasDevice,
    M: MfEngine,
    C: Clock,
    C::T: TryFrom<u32>,
    u32: TryFrom<C::T>,
    X: PcmCodec,
{
    pub(crate) fn set_cas_signal<E>(&mut self, events: &mut E, signal: CasSignal) -> Result<(), ()>
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let pattern = self.ctx.cas_signals.pattern(signal);
        trace!(
            "chan {}: CAS Tx >> [{}] 0x{:X}",
            self.number,
            signal.name(),
            pattern
        );
        self.call_capture.line(
            self.number,
            format_args!("CAS Tx >> [{}] 0x{:X}", signal.name(), pattern),
        );
        self.cas_write = Some(pattern);
        // the non-R2 bits ride along at their fixed values
        let wire = crate::cas::CasBits::from_raw(pattern | self.ctx.nonr2_bits);
        match self.dev.set_tx_cas_bits(wire) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("chan {}: failed to set CAS bits: {:?}", self.number, e);
                events.on_os_error(self, OsError::Device(e));
                Err(())
            }
        }
    }

    fn reset_call_state(&mut self) {
        self.cancel_timer();
        self.ani.clear();
        self.dnis.clear();
        self.ani_cursor = 0;
        self.dnis_cursor = 0;
        self.ani_restricted = false;
        self.category_sent = false;
        self.caller_category = None;
        self.accept_mode = None;
        self.r2_state = R2State::Idle;
        self.mf_state = MfState::Off;
        self.mf_group = MfGroup::None;
        self.call_state = CallState::Idle;
        self.direction = Direction::Stopped;
        self.answered = false;
        self.mf_write_tone = None;
        self.mf_read_tone = None;
        self.call_capture.close();
    }

    /// Reset the call machinery and drive the line to IDLE.
    pub fn set_idle<E>(&mut self, events: &mut E) -> Result<(), CallError>
    where
        E: ChannelEvents<D, M, C, X>,
    {
        self.reset_call_state();
        if self.set_cas_signal(events, CasSignal::Idle).is_err() {
            error!("chan {}: failed to set channel to IDLE", self.number);
            return Err(CallError::Signaling);
        }
        Ok(())
    }

    /// Reset the call machinery and block the line for maintenance.
    pub fn set_blocked<E>(&mut self, events: &mut E) -> Result<(), CallError>
    where
        E: ChannelEvents<D, M, C, X>,
    {
        self.reset_call_state();
        self.r2_state = R2State::Blocked;
        if self.set_cas_signal(events, CasSignal::Block).is_err() {
            error!("chan {}: failed to set channel to BLOCKED", self.number);
            return Err(CallError::Signaling);
        }
        Ok(())
    }

    fn protocol_error<E>(&mut self, events: &mut E, reason: ProtocolErrorReason)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        error!(
            "chan {}: protocol error: {} (r2 state '{}', mf state '{}', mf group '{}')",
            self.number,
            reason.as_str(),
            self.r2_state.as_str(),
            self.mf_state.as_str(),
            self.mf_group.as_str()
        );
        debug!(
            "chan {}: DNIS \"{}\", ANI \"{}\", last tone '{}'",
            self.number,
            self.dnis,
            self.ani,
            tone_char(self.mf_read_tone)
        );
        // mute anything we may have on the line
        let _ = self.mf_tx.select_tone(None);
        let _ = self.set_idle(events);
        events.on_protocol_error(self, reason);
    }

    // ---- ABCD plane ----

    pub(crate) fn handle_cas_change<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let raw = match self.dev.rx_cas_bits() {
            Ok(word) => word.raw(),
            Err(e) => {
                error!("chan {}: failed to read CAS bits: {:?}", self.number, e);
                events.on_os_error(self, OsError::Device(e));
                return;
            }
        };
        trace!("chan {}: CAS Rx << 0x{:X}", self.number, raw);
        let bits = raw & self.ctx.r2_bits;
        // repeats of the masked pattern carry no information
        if self.cas_read == Some(bits) {
            debug!("chan {}: no change in bits", self.number);
            return;
        }
        debug!(
            "chan {}: bits changed to 0x{:X} (masked)",
            self.number, bits
        );
        self.cas_read = Some(bits);
        self.call_capture
            .line(self.number, format_args!("CAS Rx << 0x{:X}", bits));

        let signals = self.ctx.cas_signals;
        match self.r2_state {
            R2State::Idle => {
                if bits == signals.block {
                    events.on_line_blocked(self);
                } else if bits == signals.idle {
                    events.on_line_idle(self);
                } else if bits == signals.seize {
                    self.handle_incoming_call(events);
                } else {
                    self.protocol_error(events, ProtocolErrorReason::InvalidCasBits);
                }
            }
            // once setup started or the call is up, the forward side can
            // only clear
            R2State::SeizeAckTxd | R2State::AnswerTxd => {
                if bits == signals.clear_forward {
                    self.r2_state = R2State::ClearFwdRxd;
                    self.report_call_disconnection(events, DisconnectCause::NormalClearing);
                } else {
                    self.protocol_error(events, ProtocolErrorReason::InvalidCasBits);
                }
            }
            R2State::SeizeTxd => {
                if bits == signals.seize_ack {
                    // seize acknowledged: the MF dance starts with our DNIS
                    self.cancel_timer();
                    self.r2_state = R2State::SeizeAckRxd;
                    self.mf_group = MfGroup::GroupI;
                    self.mf_tx.write_init(true);
                    self.mf_rx.read_init(false);
                    self.mf_send_dnis(events);
                } else {
                    self.protocol_error(events, ProtocolErrorReason::InvalidCasBits);
                }
            }
            R2State::ClearBackTxd => {
                if bits == signals.clear_forward {
                    self.report_call_end(events);
                } else {
                    self.protocol_error(events, ProtocolErrorReason::InvalidCasBits);
                }
            }
            R2State::AcceptRxd => {
                if bits == signals.answer {
                    self.cancel_timer();
                    self.r2_state = R2State::AnswerRxd;
                    self.call_state = CallState::Answered;
                    self.mf_state = MfState::Off;
                    self.answered = true;
                    events.on_call_answered(self);
                } else if bits == signals.clear_back {
                    self.report_call_disconnection(events, DisconnectCause::NormalClearing);
                } else {
                    self.protocol_error(events, ProtocolErrorReason::InvalidCasBits);
                }
            }
            R2State::SeizeAckRxd => {
                if bits == signals.answer {
                    // the bits outran the MF detector: the accept tone is
                    // still up, so the detector must stay on until its off
                    // edge arrives
                    self.r2_state = R2State::AnswerRxdMfPending;
                } else if bits == signals.clear_back {
                    // Seize ACK and Clear Back share a pattern under the
                    // ITU assignments, so this cannot normally be told
                    // apart from a repeated ack
                    warn!(
                        "chan {}: clear back before answer, ignoring",
                        self.number
                    );
                } else {
                    self.protocol_error(events, ProtocolErrorReason::InvalidCasBits);
                }
            }
            R2State::AnswerRxdMfPending | R2State::AnswerRxd => {
                if bits == signals.clear_back {
                    self.r2_state = R2State::ClearBackRxd;
                    if let Some(pulse) = self.ctx.timers.r2_metering_pulse {
                        // could be a metering pulse rather than a clear
                        // back; disconnect only if ANSWER does not return
                        // in time
                        self.set_timer(pulse, TimerKind::MeteringPulse);
                    } else {
                        self.report_call_disconnection(events, DisconnectCause::NormalClearing);
                    }
                } else {
                    self.protocol_error(events, ProtocolErrorReason::InvalidCasBits);
                }
            }
            R2State::ClearBackToneRxd => {
                if bits == signals.idle {
                    let _ = self.set_idle(events);
                } else {
                    self.protocol_error(events, ProtocolErrorReason::InvalidCasBits);
                }
            }
            R2State::ClearFwdTxd => {
                if bits == signals.idle {
                    self.report_call_end(events);
                } else {
                    self.protocol_error(events, ProtocolErrorReason::InvalidCasBits);
                }
            }
            R2State::ClearBackRxd => {
                if self.ctx.timers.r2_metering_pulse.is_some() && bits == signals.answer {
                    // it was never a disconnect
                    self.cancel_timer();
                    self.r2_state = R2State::AnswerRxd;
                    info!("chan {}: metering pulse received", self.number);
                } else {
                    self.protocol_error(events, ProtocolErrorReason::InvalidCasBits);
                }
            }
            R2State::Blocked => {
                info!(
                    "chan {}: ignoring CAS change while blocked",
                    self.number
                );
            }
            R2State::ClearFwdRxd => {
                self.protocol_error(events, ProtocolErrorReason::InvalidR2State);
            }
        }
    }

    fn handle_incoming_call<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        if self.call_files {
            self.call_capture
                .open(self.number, Direction::Backward, self.ctx);
        }
        // without a working engine there is no point acking the seize; the
        // far end will time out on its own
        if !self.mf_tx.write_init(false) {
            error!("chan {}: failed to init MF writer", self.number);
            self.protocol_error(events, ProtocolErrorReason::InternalError);
            return;
        }
        if !self.mf_rx.read_init(true) {
            error!("chan {}: failed to init MF reader", self.number);
            self.protocol_error(events, ProtocolErrorReason::InternalError);
            return;
        }
        if self.set_cas_signal(events, CasSignal::SeizeAck).is_err() {
            error!(
                "chan {}: failed to ack the seize, incoming call not proceeding",
                self.number
            );
            self.protocol_error(events, ProtocolErrorReason::InternalError);
            return;
        }
        self.r2_state = R2State::SeizeAckTxd;
        self.mf_state = MfState::SeizeAckTxd;
        self.mf_group = MfGroup::BackInit;
        self.direction = Direction::Backward;
        events.on_call_init(self);
    }

    // ---- timers ----

    pub(crate) fn timer_expired<E>(&mut self, events: &mut E, kind: TimerKind)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        match kind {
            TimerKind::Seize => {
                warn!("chan {}: seize timeout expired", self.number);
                self.protocol_error(events, ProtocolErrorReason::SeizeTimeout);
            }
            TimerKind::Answer => {
                self.report_call_disconnection(events, DisconnectCause::NoAnswer);
            }
            TimerKind::MfBackCycle => self.mf_back_cycle_expired(events),
            TimerKind::MfBackResumeCycle => self.set_silence(events),
            TimerKind::MfFwdSafety => {
                self.protocol_error(events, ProtocolErrorReason::FwdSafetyTimeout);
            }
            TimerKind::MeteringPulse => {
                self.report_call_disconnection(events, DisconnectCause::NormalClearing);
            }
            TimerKind::ReadyToAnswer => {
                let mode = self.accept_mode.unwrap_or(CallMode::Unknown);
                events.on_call_accepted(self, mode);
            }
        }
    }

    fn mf_back_cycle_expired<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        if self.ctx.gi.no_more_dnis_available.is_none()
            && self.mf_group == MfGroup::GroupA
            && self.mf_state == MfState::DnisRqTxd
        {
            debug!("chan {}: MF cycle timed out, no more DNIS", self.number);
            // The variant has no end-of-DNIS signal: the far end just goes
            // silent when it runs out. It will give us no tone-off edge to
            // mute on, so a short timer mutes the request tone we are about
            // to put up instead; the far end then acts on that off edge.
            let resume = self.ctx.timers.mf_back_resume_cycle;
            self.set_timer(resume, TimerKind::MfBackResumeCycle);
            if !self.fetch_ani_first() {
                self.request_calling_party_category(events);
            } else {
                // ANI was fetched before the DNIS ran dry; go straight to
                // the Group II stage
                self.request_change_to_g2(events);
            }
        } else {
            warn!("chan {}: MF back cycle timed out", self.number);
            self.protocol_error(events, ProtocolErrorReason::BackMfTimeout);
        }
    }

    // ---- MF plane ----

    pub(crate) fn handle_mf_event<E>(&mut self, events: &mut E, event: ToneEvent)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        match event {
            ToneEvent::On(tone) => {
                // the far end holds its tone until it sees ours, so the
                // detector keeps reporting it; repeats are old news
                if self.mf_read_tone == Some(tone) {
                    return;
                }
                // a different tone with no silence in between cannot
                // happen in a compelled exchange
                if let Some(stuck) = self.mf_read_tone {
                    error!(
                        "chan {}: broken MF sequence, got '{}' with no tone off for '{}'",
                        self.number,
                        tone.as_char(),
                        stuck.as_char()
                    );
                    self.protocol_error(events, ProtocolErrorReason::BrokenMfSequence);
                    return;
                }
                if self.threshold_rejects(Some(tone)) {
                    return;
                }
                trace!("chan {}: MF Rx << '{}' [on]", self.number, tone.as_char());
                self.call_capture
                    .line(self.number, format_args!("MF Rx << {} [on]", tone.as_char()));
                self.mf_read_tone = Some(tone);
                match self.direction {
                    Direction::Backward => self.handle_forward_mf_tone(events, tone),
                    Direction::Forward => self.handle_backward_mf_tone(events),
                    Direction::Stopped => {
                        error!("chan {}: MF tone with no call direction", self.number);
                        self.protocol_error(events, ProtocolErrorReason::LibraryBug);
                    }
                }
            }
            ToneEvent::Off => {
                // silence we already acted on
                let Some(tone) = self.mf_read_tone else {
                    return;
                };
                if self.threshold_rejects(None) {
                    return;
                }
                trace!("chan {}: MF Rx << '{}' [off]", self.number, tone.as_char());
                self.call_capture.line(
                    self.number,
                    format_args!("MF Rx << {} [off]", tone.as_char()),
                );
                match self.direction {
                    Direction::Backward => self.handle_forward_mf_silence(events),
                    Direction::Forward => self.handle_backward_mf_silence(events, tone),
                    Direction::Stopped => {
                        error!("chan {}: MF silence with no call direction", self.number);
                        self.protocol_error(events, ProtocolErrorReason::LibraryBug);
                    }
                }
                self.mf_read_tone = None;
            }
        }
    }

    /// True when the candidate verdict has not yet been stable for the
    /// configured threshold and must be ignored.
    fn threshold_rejects(&mut self, tone: Option<MfTone>) -> bool {
        let Some(threshold) = self.ctx.mf_threshold else {
            return false;
        };
        let Ok(now) = self.clock.try_now() else {
            error!("chan {}: clock failure in threshold check", self.number);
            return true;
        };
        if self.mf_threshold_tone != tone {
            self.mf_threshold_at = Some(now);
            self.mf_threshold_tone = tone;
        }
        let elapsed = self
            .mf_threshold_at
            .as_ref()
            .and_then(|at| now.checked_duration_since(at))
            .and_then(|d| Milliseconds::<u32>::try_from(d).ok());
        match elapsed {
            Some(elapsed) if elapsed < threshold => {
                match tone {
                    Some(t) => debug!("chan {}: tone '{}' ignored", self.number, t.as_char()),
                    None => debug!("chan {}: tone off ignored", self.number),
                }
                true
            }
            _ => false,
        }
    }

    /// Backward side, far-end tone came on: collect and answer it.
    fn handle_forward_mf_tone<E>(&mut self, events: &mut E, tone: MfTone)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        // every received tone restarts the compelled-cycle supervision
        let cycle = self.ctx.timers.mf_back_cycle;
        self.set_timer(cycle, TimerKind::MfBackCycle);
        match self.mf_group {
            MfGroup::BackInit => match self.mf_state {
                MfState::SeizeAckTxd => self.mf_receive_expected_dnis(events, tone),
                _ => self.protocol_error(events, ProtocolErrorReason::InvalidMfState),
            },
            MfGroup::GroupA => match self.mf_state {
                MfState::DnisRqTxd => self.mf_receive_expected_dnis(events, tone),
                MfState::CategoryRqTxd => {
                    self.caller_category = Some(tone);
                    if self.ctx.max_ani > 0 {
                        self.mf_receive_expected_ani(events, None);
                    } else {
                        // nothing else to collect; ready to offer
                        self.request_change_to_g2(events);
                    }
                }
                MfState::AniRqTxd => self.mf_receive_expected_ani(events, Some(tone)),
                _ => self.protocol_error(events, ProtocolErrorReason::InvalidMfState),
            },
            MfGroup::GroupB => match self.mf_state {
                MfState::ChgGiiTxd => {
                    // address exchange done; the host decides the verdict
                    self.call_state = CallState::Offered;
                    let ani = self.ani.clone();
                    let dnis = self.dnis.clone();
                    let category = self.category();
                    events.on_call_offered(self, &ani, &dnis, category);
                }
                _ => self.protocol_error(events, ProtocolErrorReason::InvalidMfState),
            },
            // Group C sits between the category and the ANI (Mexico)
            MfGroup::GroupC => match self.mf_state {
                MfState::CategoryRqTxd => {
                    self.caller_category = Some(tone);
                    if self.ctx.max_ani > 0 {
                        self.mf_receive_expected_ani(events, None);
                    } else {
                        self.request_change_to_g2(events);
                    }
                }
                MfState::AniRqTxd => self.mf_receive_expected_ani(events, Some(tone)),
                _ => self.protocol_error(events, ProtocolErrorReason::InvalidMfState),
            },
            MfGroup::None
            | MfGroup::FwdInit
            | MfGroup::GroupI
            | MfGroup::GroupII
            | MfGroup::GroupIII => {
                self.protocol_error(events, ProtocolErrorReason::InvalidMfGroup);
            }
        }
    }

    /// Backward side, far-end tone went off: mute ours in turn.
    fn handle_forward_mf_silence<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        self.set_silence(events);
        match self.mf_group {
            MfGroup::GroupA | MfGroup::GroupC => {
                // the far end is acting on our standing request
            }
            MfGroup::GroupB => match self.mf_state {
                MfState::ChgGiiTxd => {}
                MfState::AcceptedTxd => {
                    // The dance is over but the far end still needs to see
                    // our tone off before we may flip the answer bits, or
                    // it can miss the ABCD transition entirely. Hold the
                    // accept report back for a moment.
                    self.mf_state = MfState::Off;
                    self.call_state = CallState::Accepted;
                    self.set_timer(ANSWER_WAIT, TimerKind::ReadyToAnswer);
                }
                MfState::DisconnectTxd => {
                    // the far end owns the teardown from here
                    self.cancel_timer();
                }
                _ => self.protocol_error(events, ProtocolErrorReason::InvalidMfState),
            },
            MfGroup::None
            | MfGroup::BackInit
            | MfGroup::FwdInit
            | MfGroup::GroupI
            | MfGroup::GroupII
            | MfGroup::GroupIII => {
                self.protocol_error(events, ProtocolErrorReason::InvalidMfGroup);
            }
        }
    }

    /// Forward side, far-end tone came on: just mute ours; the information
    /// is acted on at its off edge.
    fn handle_backward_mf_tone<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        self.cancel_timer();
        self.set_silence(events);
    }

    /// Forward side, far-end tone went off: act on what it said.
    fn handle_backward_mf_silence<E>(&mut self, events: &mut E, tone: MfTone)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        match self.mf_group {
            MfGroup::GroupI => self.handle_group_a_request(events, tone),
            MfGroup::GroupII => self.handle_group_b_request(events, tone),
            MfGroup::GroupIII => self.handle_group_c_request(events, tone),
            MfGroup::None
            | MfGroup::BackInit
            | MfGroup::GroupA
            | MfGroup::GroupB
            | MfGroup::GroupC
            | MfGroup::FwdInit => {
                self.protocol_error(events, ProtocolErrorReason::InvalidMfGroup);
            }
        }
    }

    fn handle_group_a_request<E>(&mut self, events: &mut E, tone: MfTone)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let ga = self.ctx.ga;
        let request_category = ga.request_category.or(ga.request_category_and_change_to_gc);
        if Some(tone) == ga.request_next_dnis_digit {
            self.mf_send_dnis(events);
        } else if self.category_sent && Some(tone) == ga.request_next_ani_digit {
            // under ITU assignments this is the same combination as the
            // category request; having sent the category disambiguates
            self.mf_send_ani(events);
        } else if Some(tone) == request_category {
            if ga.request_category.is_none() {
                // the category request doubles as the switch to Group C
                self.mf_group = MfGroup::GroupIII;
            }
            self.mf_send_category(events);
        } else if Some(tone) == ga.request_change_to_g2 {
            self.mf_group = MfGroup::GroupII;
            self.mf_send_category(events);
        } else if Some(tone) == ga.address_complete_charge_setup {
            self.handle_accept_tone(events, CallMode::WithCharge);
        } else if Some(tone) == ga.network_congestion {
            self.r2_state = R2State::ClearBackToneRxd;
            self.report_call_disconnection(events, DisconnectCause::NetworkCongestion);
        } else {
            self.protocol_error(events, ProtocolErrorReason::InvalidMfTone);
        }
    }

    fn handle_group_b_request<E>(&mut self, events: &mut E, tone: MfTone)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let gb = self.ctx.gb;
        if Some(tone) == gb.accept_call_with_charge
            || Some(tone) == gb.accept_call_no_charge
            || Some(tone) == gb.special_info_tone
        {
            let mode = self.mode_from_tone(tone);
            self.handle_accept_tone(events, mode);
        } else if Some(tone) == gb.busy_number {
            self.r2_state = R2State::ClearBackToneRxd;
            self.report_call_disconnection(events, DisconnectCause::BusyNumber);
        } else if Some(tone) == gb.network_congestion {
            self.r2_state = R2State::ClearBackToneRxd;
            self.report_call_disconnection(events, DisconnectCause::NetworkCongestion);
        } else if Some(tone) == gb.unallocated_number {
            self.r2_state = R2State::ClearBackToneRxd;
            self.report_call_disconnection(events, DisconnectCause::UnallocatedNumber);
        } else if Some(tone) == gb.line_out_of_order {
            self.r2_state = R2State::ClearBackToneRxd;
            self.report_call_disconnection(events, DisconnectCause::OutOfOrder);
        } else {
            self.protocol_error(events, ProtocolErrorReason::InvalidMfTone);
        }
    }

    fn handle_group_c_request<E>(&mut self, events: &mut E, tone: MfTone)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let gc = self.ctx.gc;
        if Some(tone) == gc.request_next_ani_digit {
            self.mf_send_ani(events);
        } else if Some(tone) == gc.request_change_to_g2 {
            // the category goes out again, now as a Group II combination
            self.mf_group = MfGroup::GroupII;
            self.mf_send_category(events);
        } else if Some(tone) == gc.request_next_dnis_digit_and_change_to_ga {
            self.mf_group = MfGroup::GroupI;
            self.mf_send_dnis(events);
        } else {
            self.protocol_error(events, ProtocolErrorReason::InvalidMfTone);
        }
    }

    fn mode_from_tone(&self, tone: MfTone) -> CallMode {
        let gb = self.ctx.gb;
        if Some(tone) == gb.accept_call_with_charge {
            CallMode::WithCharge
        } else if Some(tone) == gb.accept_call_no_charge {
            CallMode::NoCharge
        } else if Some(tone) == gb.special_info_tone {
            CallMode::Special
        } else {
            warn!(
                "chan {}: no accept mode for tone '{}'",
                self.number,
                tone.as_char()
            );
            CallMode::Unknown
        }
    }

    fn handle_accept_tone<E>(&mut self, events: &mut E, mode: CallMode)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        if self.r2_state == R2State::AnswerRxdMfPending {
            // the answer bits beat the accept tone; deliver accept and
            // answer back to back
            let previous_mf_state = self.mf_state;
            let previous_call_state = self.call_state;
            self.r2_state = R2State::AcceptRxd;
            events.on_call_accepted(self, mode);
            // the handler may have driven the call elsewhere already
            if self.r2_state != R2State::AcceptRxd
                || self.mf_state != previous_mf_state
                || self.call_state != previous_call_state
            {
                info!("chan {}: not proceeding with answer", self.number);
                return;
            }
            self.cancel_timer();
            self.r2_state = R2State::AnswerRxd;
            self.call_state = CallState::Answered;
            self.mf_state = MfState::Off;
            self.answered = true;
            events.on_call_answered(self);
        } else {
            self.r2_state = R2State::AcceptRxd;
            let answer = self.ctx.timers.r2_answer;
            self.set_timer(answer, TimerKind::Answer);
            events.on_call_accepted(self, mode);
        }
    }

    // ---- backward-side address collection ----

    /// DNIS collection is done. Compared with `>=` so that even a
    /// zero-digit expectation terminates after the first digit.
    fn dnis_complete(&self) -> bool {
        self.dnis.len() >= self.ctx.max_dnis
    }

    /// Whether to divert to category/ANI right after the first DNIS digit.
    /// Moot when no ANI is wanted at all.
    fn fetch_ani_first(&self) -> bool {
        self.ctx.get_ani_first && self.ctx.max_ani > 0
    }

    fn mf_receive_expected_dnis<E>(&mut self, events: &mut E, tone: MfTone)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        if let Some(digit) = tone.digit() {
            debug!("chan {}: getting DNIS digit {}", self.number, digit);
            if self.dnis.push(digit).is_err() {
                self.protocol_error(events, ProtocolErrorReason::LibraryBug);
                return;
            }
            debug!(
                "chan {}: DNIS so far \"{}\", expected length {}",
                self.number, self.dnis, self.ctx.max_dnis
            );
            if self.dnis_complete() {
                debug!("chan {}: done getting DNIS", self.number);
                // if the first digit was also the last, or ANI was not
                // wanted up front, the category is still missing;
                // otherwise the Group II stage is next
                if self.dnis.len() == 1 || !self.fetch_ani_first() {
                    self.request_calling_party_category(events);
                } else {
                    self.request_change_to_g2(events);
                }
            } else if self.dnis.len() == 1 && self.fetch_ani_first() {
                self.request_calling_party_category(events);
            } else {
                self.request_next_dnis_digit(events);
            }
        } else if Some(tone) == self.ctx.gi.no_more_dnis_available {
            // possibly before any digit at all
            if self.dnis.is_empty() || !self.fetch_ani_first() {
                self.request_calling_party_category(events);
            } else {
                self.request_change_to_g2(events);
            }
        } else {
            self.protocol_error(events, ProtocolErrorReason::InvalidMfTone);
        }
    }

    /// `tone` is `None` on the very first request, before anything was
    /// received.
    fn mf_receive_expected_ani<E>(&mut self, events: &mut E, tone: Option<MfTone>)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let next_request = self
            .ctx
            .gc
            .request_next_ani_digit
            .or(self.ctx.ga.request_next_ani_digit);
        let digit = tone.and_then(MfTone::digit);
        if tone.is_none() || digit.is_some() {
            if let Some(digit) = digit {
                debug!("chan {}: getting ANI digit {}", self.number, digit);
                if self.ani.push(digit).is_err() {
                    self.protocol_error(events, ProtocolErrorReason::LibraryBug);
                    return;
                }
                debug!(
                    "chan {}: ANI so far \"{}\", expected length {}",
                    self.number, self.ani, self.ctx.max_ani
                );
            }
            if tone.is_none() || self.ctx.max_ani > self.ani.len() {
                self.mf_state = MfState::AniRqTxd;
                self.prepare_mf_tone(events, next_request);
            } else {
                debug!("chan {}: done getting ANI", self.number);
                if !self.ctx.get_ani_first || self.dnis_complete() {
                    self.request_change_to_g2(events);
                } else {
                    self.request_next_dnis_digit(events);
                }
            }
        } else if tone == self.ctx.gi.no_more_ani_available
            || tone == self.ctx.gi.caller_ani_is_restricted
        {
            debug!("chan {}: got end of ANI", self.number);
            if tone == self.ctx.gi.caller_ani_is_restricted {
                debug!("chan {}: ANI is restricted", self.number);
                self.ani_restricted = true;
            }
            if !self.ctx.get_ani_first || self.dnis_complete() {
                self.request_change_to_g2(events);
            } else {
                self.request_next_dnis_digit(events);
            }
        } else {
            self.protocol_error(events, ProtocolErrorReason::InvalidMfTone);
        }
    }

    fn request_calling_party_category<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let ga = self.ctx.ga;
        let (tone, group) = match ga.request_category {
            Some(tone) => (Some(tone), MfGroup::GroupA),
            None => (ga.request_category_and_change_to_gc, MfGroup::GroupC),
        };
        self.mf_group = group;
        self.mf_state = MfState::CategoryRqTxd;
        self.prepare_mf_tone(events, tone);
    }

    fn request_change_to_g2<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        // the request can come from Group C (Mexico) or Group A (everyone,
        // Mexico included)
        let tone = if self.mf_group == MfGroup::GroupC {
            self.ctx.gc.request_change_to_g2
        } else {
            self.ctx.ga.request_change_to_g2
        };
        self.mf_group = MfGroup::GroupB;
        self.mf_state = MfState::ChgGiiTxd;
        debug!(
            "chan {}: requesting change to group II with '{}'",
            self.number,
            tone_char(tone)
        );
        self.prepare_mf_tone(events, tone);
    }

    fn request_next_dnis_digit<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let tone = if self.mf_group == MfGroup::GroupC {
            self.ctx.gc.request_next_dnis_digit_and_change_to_ga
        } else {
            self.ctx.ga.request_next_dnis_digit
        };
        self.mf_group = MfGroup::GroupA;
        self.mf_state = MfState::DnisRqTxd;
        debug!(
            "chan {}: requesting next DNIS with '{}'",
            self.number,
            tone_char(tone)
        );
        self.prepare_mf_tone(events, tone);
    }

    // ---- forward-side address transmission ----

    fn mf_send_dnis<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let next = self
            .dnis
            .as_bytes()
            .get(self.dnis_cursor)
            .map(|&b| b as char);
        if let Some(digit) = next {
            debug!("chan {}: sending DNIS digit {}", self.number, digit);
            self.mf_state = MfState::DnisTxd;
            self.prepare_mf_tone(events, MfTone::from_digit(digit));
            self.dnis_cursor += 1;
        } else if let Some(end) = self.ctx.gi.no_more_dnis_available {
            debug!("chan {}: sending end-of-DNIS signal", self.number);
            self.mf_state = MfState::DnisEndTxd;
            self.prepare_mf_tone(events, Some(end));
        } else {
            debug!(
                "chan {}: out of DNIS, waiting for the far-end timeout",
                self.number
            );
            // the far end detects the end of the DNIS by timing out; that
            // wait still gets a cap
            self.mf_state = MfState::WaitingTimeout;
            let safety = self.ctx.timers.mf_fwd_safety;
            self.set_timer(safety, TimerKind::MfFwdSafety);
        }
    }

    fn mf_send_ani<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let next = self
            .ani
            .as_bytes()
            .get(self.ani_cursor)
            .map(|&b| b as char);
        if self.ani_restricted {
            debug!("chan {}: sending restricted ANI", self.number);
            self.mf_state = MfState::AniEndTxd;
            let tone = self.ctx.gi.caller_ani_is_restricted;
            self.prepare_mf_tone(events, tone);
        } else if let Some(digit) = next {
            debug!("chan {}: sending ANI digit {}", self.number, digit);
            self.mf_state = MfState::AniTxd;
            self.prepare_mf_tone(events, MfTone::from_digit(digit));
            self.ani_cursor += 1;
        } else if let Some(end) = self.ctx.gi.no_more_ani_available {
            debug!("chan {}: sending end-of-ANI signal", self.number);
            self.mf_state = MfState::AniEndTxd;
            self.prepare_mf_tone(events, Some(end));
        } else {
            debug!(
                "chan {}: out of ANI, expecting the far-end timeout",
                self.number
            );
            self.mf_state = MfState::WaitingTimeout;
            let safety = self.ctx.timers.mf_fwd_safety;
            self.set_timer(safety, TimerKind::MfFwdSafety);
        }
    }

    fn mf_send_category<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        self.mf_state = MfState::CategoryTxd;
        self.category_sent = true;
        let tone = self.caller_category;
        debug!(
            "chan {}: sending category {}",
            self.number,
            self.category().as_str()
        );
        self.prepare_mf_tone(events, tone);
    }

    /// The calling party category of the current call, decoded from the
    /// stored Group II combination.
    pub fn category(&self) -> Category {
        self.caller_category
            .map(|tone| self.ctx.category_from_tone(tone))
            .unwrap_or(Category::Unknown)
    }

    // ---- tone output ----

    fn prepare_mf_tone<E>(&mut self, events: &mut E, tone: Option<MfTone>)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        // when muting, throw away any tone PCM still queued in the device
        if tone.is_none() && self.mf_write_tone.is_some() {
            trace!(
                "chan {}: MF Tx >> '{}' [off]",
                self.number,
                tone_char(self.mf_write_tone)
            );
            self.call_capture.line(
                self.number,
                format_args!("MF Tx >> {} [off]", tone_char(self.mf_write_tone)),
            );
            if let Err(e) = self.dev.flush_write() {
                error!("chan {}: flush failed: {:?}", self.number, e);
                events.on_os_error(self, OsError::Device(e));
                return;
            }
        }
        if self.mf_write_tone != tone {
            if self.mf_tx.select_tone(tone).is_err() {
                // nothing sensible left to do with a deaf-mute engine
                error!("chan {}: failed to select MF tone", self.number);
                self.protocol_error(events, ProtocolErrorReason::InternalError);
                return;
            }
            if let Some(t) = tone {
                trace!("chan {}: MF Tx >> '{}' [on]", self.number, t.as_char());
                self.call_capture
                    .line(self.number, format_args!("MF Tx >> {} [on]", t.as_char()));
            }
            self.mf_write_tone = tone;
        }
    }

    fn set_silence<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        self.prepare_mf_tone(events, None);
        self.mf_write_tone = None;
    }

    // ---- call progress reporting ----

    fn report_call_disconnection<E>(&mut self, events: &mut E, cause: DisconnectCause)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        info!(
            "chan {}: far end disconnected: {}",
            self.number,
            cause.as_str()
        );
        self.call_state = CallState::Disconnected;
        events.on_call_disconnect(self, cause);
    }

    fn report_call_end<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        debug!("chan {}: call ended", self.number);
        self.call_capture
            .line(self.number, format_args!("call ended"));
        let _ = self.set_idle(events);
        events.on_call_end(self);
    }

    // ---- call control ----

    /// Seize the line and dial. `ani` of `None` marks the caller's number
    /// restricted; non-numeric ANI or DNIS content drops that field with a
    /// log note.
    pub fn make_call<E>(
        &mut self,
        events: &mut E,
        ani: Option<&str>,
        dnis: &str,
        category: Category,
    ) -> Result<(), CallError>
    where
        E: ChannelEvents<D, M, C, X>,
    {
        debug!(
            "chan {}: attempting call (ani {:?}, dnis \"{}\", category {})",
            self.number,
            ani,
            dnis,
            category.as_str()
        );
        if self.call_state != CallState::Idle {
            error!(
                "chan {}: call state should be Idle but is '{}'",
                self.number,
                self.call_state.as_str()
            );
            return Err(CallError::InvalidState);
        }
        // pick up any line transition the host has not polled in yet
        self.handle_cas_change(events);
        if self.cas_read != Some(self.ctx.cas_signals.idle) {
            error!("chan {}: trying to dial out on a non-idle line", self.number);
            return Err(CallError::LineNotIdle);
        }

        let mut ani_digits: heapless::String<{ crate::context::MAX_DIGITS }> =
            heapless::String::new();
        let ani_restricted = ani.is_none();
        if let Some(ani) = ani {
            if ani.chars().all(|c| c.is_ascii_digit()) {
                for c in ani.chars().take(crate::context::MAX_DIGITS) {
                    let _ = ani_digits.push(c);
                }
            } else {
                info!(
                    "chan {}: ANI contains non-digits and will not be sent",
                    self.number
                );
            }
        }
        let mut dnis_digits: heapless::String<{ crate::context::MAX_DIGITS }> =
            heapless::String::new();
        if dnis.chars().all(|c| c.is_ascii_digit()) {
            for c in dnis.chars().take(crate::context::MAX_DIGITS) {
                let _ = dnis_digits.push(c);
            }
        } else {
            info!(
                "chan {}: DNIS contains non-digits and will not be sent",
                self.number
            );
        }

        if self.call_files {
            self.call_capture
                .open(self.number, Direction::Forward, self.ctx);
        }
        if self.set_cas_signal(events, CasSignal::Seize).is_err() {
            error!("chan {}: failed to seize the line", self.number);
            return Err(CallError::Signaling);
        }
        self.call_state = CallState::Dialing;
        self.r2_state = R2State::SeizeTxd;
        self.mf_group = MfGroup::FwdInit;
        self.direction = Direction::Forward;
        self.caller_category = Some(self.ctx.tone_from_category(category));
        self.ani = ani_digits;
        self.ani_cursor = 0;
        self.ani_restricted = ani_restricted;
        self.dnis = dnis_digits;
        self.dnis_cursor = 0;
        // cannot wait forever for the seize ack
        let seize = self.ctx.timers.r2_seize;
        self.set_timer(seize, TimerKind::Seize);
        Ok(())
    }

    /// Commit to an offered inbound call with the given charging mode. The
    /// accept is reported back through
    /// [`ChannelEvents::on_call_accepted`] once the far end has had a
    /// chance to see our tone.
    pub fn accept_call<E>(&mut self, events: &mut E, mode: CallMode) -> Result<(), CallError>
    where
        E: ChannelEvents<D, M, C, X>,
    {
        if self.call_state != CallState::Offered {
            warn!(
                "chan {}: cannot accept a call that has not been offered",
                self.number
            );
            return Err(CallError::InvalidState);
        }
        self.mf_state = MfState::AcceptedTxd;
        self.accept_mode = Some(mode);
        let tone = self.accept_tone_for_mode(mode);
        self.prepare_mf_tone(events, tone);
        Ok(())
    }

    fn accept_tone_for_mode(&self, mode: CallMode) -> Option<MfTone> {
        let gb = self.ctx.gb;
        match mode {
            CallMode::WithCharge => gb.accept_call_with_charge,
            CallMode::NoCharge => gb.accept_call_no_charge,
            CallMode::Special => gb.special_info_tone,
            CallMode::Unknown => {
                warn!(
                    "chan {}: unknown call mode, defaulting to {}",
                    self.number,
                    CallMode::NoCharge.as_str()
                );
                gb.accept_call_no_charge
            }
        }
    }

    /// Flip the answer bits on an accepted inbound call.
    pub fn answer_call<E>(&mut self, events: &mut E) -> Result<(), CallError>
    where
        E: ChannelEvents<D, M, C, X>,
    {
        if self.call_state != CallState::Accepted {
            warn!(
                "chan {}: cannot answer a call that has not been accepted",
                self.number
            );
            return Err(CallError::InvalidState);
        }
        if self.set_cas_signal(events, CasSignal::Answer).is_err() {
            error!("chan {}: cannot send the ANSWER signal", self.number);
            return Err(CallError::Signaling);
        }
        self.call_state = CallState::Answered;
        self.r2_state = R2State::AnswerTxd;
        events.on_call_answered(self);
        self.answered = true;
        Ok(())
    }

    /// Tear the call down. On an offered inbound call this sends the
    /// matching Group B verdict tone and waits for the far end to clear;
    /// otherwise the appropriate clear signal goes out on the bits.
    pub fn disconnect_call<E>(
        &mut self,
        events: &mut E,
        cause: DisconnectCause,
    ) -> Result<(), CallError>
    where
        E: ChannelEvents<D, M, C, X>,
    {
        if self.call_state == CallState::Idle {
            return Err(CallError::InvalidState);
        }
        if self.direction == Direction::Backward {
            if self.call_state == CallState::Offered {
                self.send_disconnect_tone(events, cause);
            } else if self.r2_state == R2State::ClearFwdRxd {
                // both sides agree; nothing left to signal
                self.report_call_end(events);
            } else if self.send_clear_backward(events).is_err() {
                error!("chan {}: failed to send clear backward", self.number);
                return Err(CallError::Signaling);
            }
        } else if self.send_clear_forward(events).is_err() {
            error!("chan {}: failed to send clear forward", self.number);
            return Err(CallError::Signaling);
        }
        Ok(())
    }

    fn send_disconnect_tone<E>(&mut self, events: &mut E, cause: DisconnectCause)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        self.mf_state = MfState::DisconnectTxd;
        let gb = self.ctx.gb;
        let tone = match cause {
            DisconnectCause::BusyNumber => gb.busy_number,
            DisconnectCause::NetworkCongestion => gb.network_congestion,
            DisconnectCause::UnallocatedNumber => gb.unallocated_number,
            DisconnectCause::OutOfOrder
            | DisconnectCause::Unspecified
            | DisconnectCause::NormalClearing
            | DisconnectCause::NoAnswer => gb.line_out_of_order,
        };
        self.prepare_mf_tone(events, tone);
    }

    fn send_clear_forward<E>(&mut self, events: &mut E) -> Result<(), ()>
    where
        E: ChannelEvents<D, M, C, X>,
    {
        self.r2_state = R2State::ClearFwdTxd;
        self.mf_state = MfState::Off;
        self.set_silence(events);
        self.set_cas_signal(events, CasSignal::ClearForward)
    }

    fn send_clear_backward<E>(&mut self, events: &mut E) -> Result<(), ()>
    where
        E: ChannelEvents<D, M, C, X>,
    {
        self.r2_state = R2State::ClearBackTxd;
        self.mf_state = MfState::Off;
        self.set_silence(events);
        self.set_cas_signal(events, CasSignal::ClearBack)
    }
}
