//! Channel runtime: device binding, buffers, timers and the event loop
//!
//! One [`R2Channel`] drives one trunk timeslot. All state changes happen
//! inside [`R2Channel::process_events`] or inside a call-control method, on
//! the thread that owns the channel; there is no internal thread and the
//! loop never blocks. Hosts wait on the descriptor themselves (bounded by
//! [`R2Channel::time_to_next_event`]) and call back in.

use embedded_time::duration::Milliseconds;
use embedded_time::{Clock, Instant};
use heapless::String;
use log::{debug, error};

use crate::context::{R2Context, MAX_DIGITS};
use crate::device::{
    BufferPolicy, CasDevice, GainTable, IoInterest, LineCodec, LineEvent, SignalingType,
};
use crate::events::ChannelEvents;
use crate::mf::{MfEngine, PcmCodec};
use crate::proto::{MfGroup, MfState, R2State};
use crate::timer::{TimerKind, TimerSlot};
use crate::tone::MfTone;
use crate::trace::{CallCapture, PcmCapture};
use crate::{CallState, Direction};

/// Samples per PCM block: 20 ms at 8 kHz.
pub const BLOCK_SIZE: usize = 160;

/// Failure while binding a channel to its device.
#[derive(Debug)]
pub enum OpenError<E> {
    /// The timeslot is not provisioned for channel-associated signaling.
    NotCas,
    /// The device rejected a setup operation.
    Device(E),
}

impl<E> From<E> for OpenError<E> {
    fn from(e: E) -> Self {
        OpenError::Device(e)
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug> std::fmt::Display for OpenError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenError::NotCas => write!(f, "timeslot has no CAS signaling"),
            OpenError::Device(e) => write!(f, "device setup failed: {:?}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug> std::error::Error for OpenError<E> {}

/// Failure of a call-control operation.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    /// The operation does not apply to the current call state.
    InvalidState,
    /// The far end is not presenting an idle line.
    LineNotIdle,
    /// The device refused the line signal; details went to
    /// [`ChannelEvents::on_os_error`].
    Signaling,
}

/// Operating-system-level failure reported to the host.
#[derive(Debug)]
pub enum OsError<E> {
    /// A device operation failed outright.
    Device(E),
    /// The device accepted fewer PCM octets than requested.
    ShortWrite { wrote: usize, expected: usize },
}

/// The per-timeslot R2 engine.
///
/// `D` is the trunk device, `M` the MF engine (one instance per direction),
/// `C` the monotonic clock and `X` the companding codec.
pub struct R2Channel<'a, D, M, C: Clock, X> {
    pub(crate) ctx: &'a R2Context,
    pub(crate) dev: D,
    pub(crate) mf_tx: M,
    pub(crate) mf_rx: M,
    pub(crate) codec: X,
    pub(crate) clock: C,

    pub(crate) number: u32,
    pub(crate) buf_size: usize,

    pub(crate) direction: Direction,
    pub(crate) call_state: CallState,
    pub(crate) r2_state: R2State,
    pub(crate) mf_state: MfState,
    pub(crate) mf_group: MfGroup,

    pub(crate) ani: String<MAX_DIGITS>,
    pub(crate) dnis: String<MAX_DIGITS>,
    pub(crate) ani_cursor: usize,
    pub(crate) dnis_cursor: usize,
    pub(crate) ani_restricted: bool,
    pub(crate) category_sent: bool,
    pub(crate) caller_category: Option<MfTone>,
    pub(crate) accept_mode: Option<crate::CallMode>,

    pub(crate) cas_read: Option<u8>,
    pub(crate) cas_write: Option<u8>,
    pub(crate) mf_read_tone: Option<MfTone>,
    pub(crate) mf_write_tone: Option<MfTone>,
    pub(crate) mf_threshold_tone: Option<MfTone>,
    pub(crate) mf_threshold_at: Option<Instant<C>>,
    pub(crate) timer: Option<TimerSlot<C>>,

    pub(crate) answered: bool,
    pub(crate) read_enabled: bool,
    pub(crate) call_files: bool,
    pub(crate) call_capture: CallCapture,
    pub(crate) pcm_capture: PcmCapture,
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
    /// Bind a CAS timeslot device and prepare it for signaling use.
    ///
    /// The device must already be open in non-blocking mode and bound to
    /// its timeslot. The call checks the provisioned signaling, switches
    /// the buffering to four immediate blocks, loads identity gains,
    /// selects A-law and turns echo cancellation off.
    pub fn new(
        ctx: &'a R2Context,
        mut dev: D,
        mf_tx: M,
        mf_rx: M,
        codec: X,
        clock: C,
    ) -> Result<Self, OpenError<D::Error>> {
        let number = dev.channel_number()?;
        match dev.signaling_type()? {
            SignalingType::Cas => {}
            SignalingType::Other => {
                error!("chan {}: timeslot has no CAS signaling", number);
                return Err(OpenError::NotCas);
            }
        }
        let mut buffers = dev.buffer_info()?;
        buffers.tx_policy = BufferPolicy::Immediate;
        buffers.rx_policy = BufferPolicy::Immediate;
        buffers.count = 4;
        buffers.size = BLOCK_SIZE;
        dev.set_buffer_info(&buffers)?;
        dev.set_gains(&GainTable::identity())?;
        dev.set_codec(LineCodec::Alaw)?;
        dev.set_echo_cancel(false)?;
        Ok(Self {
            ctx,
            dev,
            mf_tx,
            mf_rx,
            codec,
            clock,
            number,
            buf_size: buffers.size,
            direction: Direction::Stopped,
            call_state: CallState::Idle,
            r2_state: R2State::Idle,
            mf_state: MfState::Off,
            mf_group: MfGroup::None,
            ani: String::new(),
            dnis: String::new(),
            ani_cursor: 0,
            dnis_cursor: 0,
            ani_restricted: false,
            category_sent: false,
            caller_category: None,
            accept_mode: None,
            cas_read: None,
            cas_write: None,
            mf_read_tone: None,
            mf_write_tone: None,
            mf_threshold_tone: None,
            mf_threshold_at: None,
            timer: None,
            answered: false,
            read_enabled: true,
            call_files: false,
            call_capture: CallCapture::default(),
            pcm_capture: PcmCapture::default(),
        })
    }

    /// Run the channel until quiescent: fire an expired timer, then drain
    /// device readiness. Signaling events take precedence over PCM in
    /// every iteration. Never blocks.
    pub fn process_events<E>(&mut self, events: &mut E)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        if let Some(kind) = self.take_expired_timer() {
            debug!("chan {}: timer {:?} fired", self.number, kind);
            self.timer_expired(events, kind);
        }
        loop {
            let mut interest = IoInterest::SIG_EVENT;
            if self.read_enabled {
                interest |= IoInterest::READ;
            }
            if self.mf_state != MfState::Off && self.mf_tx.want_generate(self.mf_write_tone) {
                interest |= IoInterest::WRITE;
            }
            let ready = match self.dev.io_mux(interest) {
                Ok(ready) => ready,
                Err(e) => {
                    events.on_os_error(self, OsError::Device(e));
                    return;
                }
            };
            if ready.is_empty() {
                return;
            }
            if ready.contains(IoInterest::SIG_EVENT) {
                match self.dev.next_event() {
                    Ok(Some(event)) => self.handle_line_event(events, event),
                    Ok(None) => {}
                    Err(e) => {
                        events.on_os_error(self, OsError::Device(e));
                        return;
                    }
                }
                continue;
            }
            if ready.contains(IoInterest::READ) {
                if !self.pump_read(events) {
                    return;
                }
                continue;
            }
            if ready.contains(IoInterest::WRITE) && !self.pump_write(events) {
                return;
            }
        }
    }

    fn handle_line_event<E>(&mut self, events: &mut E, event: LineEvent)
    where
        E: ChannelEvents<D, M, C, X>,
    {
        match event {
            LineEvent::BitsChanged => self.handle_cas_change(events),
            LineEvent::Alarm | LineEvent::NoAlarm => {
                let raised = matches!(event, LineEvent::Alarm);
                debug!(
                    "chan {}: {}",
                    self.number,
                    if raised { "alarm raised" } else { "alarm cleared" }
                );
                events.on_hardware_alarm(self, raised);
            }
        }
    }

    /// Returns false when the drain loop should stop.
    fn pump_read<E>(&mut self, events: &mut E) -> bool
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let mut alaw = [0u8; BLOCK_SIZE];
        let n = match self.dev.read(&mut alaw) {
            Ok(n) => n,
            Err(nb::Error::WouldBlock) => return false,
            Err(nb::Error::Other(e)) => {
                events.on_os_error(self, OsError::Device(e));
                return false;
            }
        };
        if self.mf_state != MfState::Off {
            let mut linear = [0i16; BLOCK_SIZE];
            for (dst, src) in linear[..n].iter_mut().zip(&alaw[..n]) {
                *dst = self.codec.alaw_to_linear(*src);
            }
            self.pcm_capture.rx(&linear[..n]);
            if let Some(event) = self.mf_rx.detect(&linear[..n]) {
                self.handle_mf_event(events, event);
            }
        } else if self.answered {
            events.on_call_read(self, &alaw[..n]);
        }
        true
    }

    /// Writes one block of the selected MF tone. Speech is the host's
    /// business via [`R2Channel::write`].
    fn pump_write<E>(&mut self, events: &mut E) -> bool
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let mut linear = [0i16; BLOCK_SIZE];
        let take = self.buf_size.min(BLOCK_SIZE);
        let n = match self.mf_tx.generate(&mut linear[..take]) {
            Ok(0) => return true,
            Ok(n) => n.min(take),
            Err(_) => {
                error!("chan {}: failed to generate MF tone", self.number);
                return false;
            }
        };
        self.pcm_capture.tx(&linear[..n]);
        let mut alaw = [0u8; BLOCK_SIZE];
        for (dst, src) in alaw[..n].iter_mut().zip(&linear[..n]) {
            *dst = self.codec.linear_to_alaw(*src);
        }
        match self.dev.write(&alaw[..n]) {
            Ok(wrote) if wrote == n => {}
            Ok(wrote) => {
                events.on_os_error(
                    self,
                    OsError::ShortWrite {
                        wrote,
                        expected: n,
                    },
                );
            }
            Err(nb::Error::WouldBlock) => return false,
            Err(nb::Error::Other(e)) => {
                events.on_os_error(self, OsError::Device(e));
                return false;
            }
        }
        true
    }

    /// Write speech PCM to the line, looping over partial writes. Returns
    /// the number of octets written.
    pub fn write<E>(&mut self, events: &mut E, buf: &[u8]) -> usize
    where
        E: ChannelEvents<D, M, C, X>,
    {
        let mut wrote = 0;
        while wrote < buf.len() {
            match self.dev.write(&buf[wrote..]) {
                Ok(n) => wrote += n,
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(e)) => {
                    events.on_os_error(self, OsError::Device(e));
                    break;
                }
            }
        }
        wrote
    }

    pub(crate) fn set_timer(&mut self, ms: Milliseconds<u32>, kind: TimerKind) {
        let Ok(now) = self.clock.try_now() else {
            error!("chan {}: clock failure while arming {:?}", self.number, kind);
            return;
        };
        match now.checked_add(ms) {
            Some(deadline) => self.timer = Some(TimerSlot { deadline, kind }),
            None => error!("chan {}: clock overflow while arming {:?}", self.number, kind),
        }
    }

    pub(crate) fn cancel_timer(&mut self) {
        self.timer = None;
    }

    fn take_expired_timer(&mut self) -> Option<TimerKind> {
        let now = self.clock.try_now().ok()?;
        match &self.timer {
            Some(slot) if now.checked_duration_since(&slot.deadline).is_some() => {
                let kind = slot.kind;
                self.timer = None;
                Some(kind)
            }
            _ => None,
        }
    }

    /// Milliseconds until the pending timer expires (0 if already past),
    /// or `None` when no timer is armed. Hosts bound their descriptor
    /// wait with this.
    pub fn time_to_next_event(&self) -> Option<Milliseconds<u32>> {
        let slot = self.timer.as_ref()?;
        let now = self.clock.try_now().ok()?;
        match slot.deadline.checked_duration_since(&now) {
            Some(left) => Milliseconds::<u32>::try_from(left).ok(),
            None => Some(Milliseconds(0)),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn context(&self) -> &R2Context {
        self.ctx
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn call_state(&self) -> CallState {
        self.call_state
    }

    pub fn ani(&self) -> &str {
        &self.ani
    }

    pub fn dnis(&self) -> &str {
        &self.dnis
    }

    /// Last masked ABCD pattern we put on the line, if any.
    pub fn tx_cas_pattern(&self) -> Option<u8> {
        self.cas_write
    }

    /// Last masked ABCD pattern observed from the far end, if any.
    pub fn rx_cas_pattern(&self) -> Option<u8> {
        self.cas_read
    }

    /// The combination currently being transmitted, if any.
    pub fn tx_mf_tone(&self) -> Option<MfTone> {
        self.mf_write_tone
    }

    /// The combination currently detected from the far end, if any.
    pub fn rx_mf_tone(&self) -> Option<MfTone> {
        self.mf_read_tone
    }

    /// Direct device access, e.g. for host-side descriptor waits.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.dev
    }

    pub fn enable_read(&mut self) {
        self.read_enabled = true;
    }

    pub fn disable_read(&mut self) {
        self.read_enabled = false;
    }

    pub fn read_enabled(&self) -> bool {
        self.read_enabled
    }

    /// Capture each call's progression to a per-call text file
    /// (`chan-<N>-{forward|backward}-<seq>.call`). Takes effect from the
    /// next call.
    pub fn enable_call_files(&mut self) {
        self.call_files = true;
    }

    pub fn disable_call_files(&mut self) {
        self.call_files = false;
    }

    pub fn call_files_enabled(&self) -> bool {
        self.call_files
    }

    /// Tap raw linear PCM around the MF engine into per-channel files.
    pub fn enable_mf_capture(&mut self) {
        let number = self.number;
        self.pcm_capture.enable(number);
    }

    pub fn disable_mf_capture(&mut self) {
        self.pcm_capture.disable();
    }

    pub fn mf_capture_enabled(&self) -> bool {
        self.pcm_capture.is_enabled()
    }
}
