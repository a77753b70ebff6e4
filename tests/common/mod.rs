//! Shared mock rig: a scriptable CAS device, MF engine, codec and clock.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_time::clock::Error as ClockError;
use embedded_time::fraction::Fraction;
use embedded_time::{Clock, Instant};

use mfcr2::cas::CasBits;
use mfcr2::device::{BufferInfo, BufferPolicy, CasDevice, IoInterest, LineCodec, LineEvent, SignalingType};
use mfcr2::mf::{MfEngine, MfEngineError, PcmCodec, ToneEvent};
use mfcr2::{
    CallMode, Category, ChannelEvents, DisconnectCause, MfTone, ProtocolErrorReason, R2Channel,
    R2Context, BLOCK_SIZE,
};

#[derive(Debug)]
pub struct MockError;

#[derive(Clone)]
pub struct MockDevice {
    pub number: u32,
    pub cas: bool,
    pub rx_bits: Rc<Cell<u8>>,
    pub tx_bits: Rc<RefCell<Vec<u8>>>,
    pub line_events: Rc<RefCell<VecDeque<LineEvent>>>,
    pub rx_pcm: Rc<RefCell<VecDeque<Vec<u8>>>>,
    pub written: Rc<RefCell<Vec<u8>>>,
    pub writable: Rc<Cell<bool>>,
    pub write_limit: Rc<Cell<usize>>,
    pub flushes: Rc<Cell<u32>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            number: 1,
            cas: true,
            rx_bits: Rc::new(Cell::new(0)),
            tx_bits: Rc::new(RefCell::new(Vec::new())),
            line_events: Rc::new(RefCell::new(VecDeque::new())),
            rx_pcm: Rc::new(RefCell::new(VecDeque::new())),
            written: Rc::new(RefCell::new(Vec::new())),
            writable: Rc::new(Cell::new(false)),
            write_limit: Rc::new(Cell::new(usize::MAX)),
            flushes: Rc::new(Cell::new(0)),
        }
    }

    /// Present `bits` from the far end and queue a bit-change event.
    pub fn push_bits(&self, bits: u8) {
        self.rx_bits.set(bits);
        self.line_events
            .borrow_mut()
            .push_back(LineEvent::BitsChanged);
    }

    /// Full last transmitted word (R2 bits plus the fixed non-R2 bits).
    pub fn last_tx(&self) -> Option<u8> {
        self.tx_bits.borrow().last().copied()
    }

    /// Last transmitted word masked down to the R2 bits.
    pub fn last_tx_masked(&self, mask: u8) -> Option<u8> {
        self.last_tx().map(|b| b & mask)
    }

    /// All transmitted words masked down to the R2 bits.
    pub fn tx_history_masked(&self, mask: u8) -> Vec<u8> {
        self.tx_bits.borrow().iter().map(|b| b & mask).collect()
    }
}

impl CasDevice for MockDevice {
    type Error = MockError;

    fn channel_number(&mut self) -> Result<u32, MockError> {
        Ok(self.number)
    }

    fn signaling_type(&mut self) -> Result<SignalingType, MockError> {
        Ok(if self.cas {
            SignalingType::Cas
        } else {
            SignalingType::Other
        })
    }

    fn buffer_info(&mut self) -> Result<BufferInfo, MockError> {
        Ok(BufferInfo {
            tx_policy: BufferPolicy::WhenFull,
            rx_policy: BufferPolicy::WhenFull,
            count: 8,
            size: 1024,
        })
    }

    fn set_buffer_info(&mut self, _info: &BufferInfo) -> Result<(), MockError> {
        Ok(())
    }

    fn set_gains(&mut self, _gains: &mfcr2::device::GainTable) -> Result<(), MockError> {
        Ok(())
    }

    fn set_codec(&mut self, _codec: LineCodec) -> Result<(), MockError> {
        Ok(())
    }

    fn set_echo_cancel(&mut self, _enable: bool) -> Result<(), MockError> {
        Ok(())
    }

    fn io_mux(&mut self, interest: IoInterest) -> Result<IoInterest, MockError> {
        let mut ready = IoInterest::empty();
        if !self.line_events.borrow().is_empty() {
            ready |= IoInterest::SIG_EVENT;
        }
        if !self.rx_pcm.borrow().is_empty() {
            ready |= IoInterest::READ;
        }
        if self.writable.get() {
            ready |= IoInterest::WRITE;
        }
        Ok(ready & interest)
    }

    fn next_event(&mut self) -> Result<Option<LineEvent>, MockError> {
        Ok(self.line_events.borrow_mut().pop_front())
    }

    fn read(&mut self, buf: &mut [u8]) -> nb::Result<usize, MockError> {
        match self.rx_pcm.borrow_mut().pop_front() {
            Some(block) => {
                let n = block.len().min(buf.len());
                buf[..n].copy_from_slice(&block[..n]);
                Ok(n)
            }
            None => Err(nb::Error::WouldBlock),
        }
    }

    fn write(&mut self, buf: &[u8]) -> nb::Result<usize, MockError> {
        let n = buf.len().min(self.write_limit.get());
        self.written.borrow_mut().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush_write(&mut self) -> Result<(), MockError> {
        self.flushes.set(self.flushes.get() + 1);
        Ok(())
    }

    fn tx_cas_bits(&mut self) -> Result<CasBits, MockError> {
        Ok(CasBits::from_raw(self.last_tx().unwrap_or(0)))
    }

    fn set_tx_cas_bits(&mut self, bits: CasBits) -> Result<(), MockError> {
        self.tx_bits.borrow_mut().push(bits.raw());
        Ok(())
    }

    fn rx_cas_bits(&mut self) -> Result<CasBits, MockError> {
        Ok(CasBits::from_raw(self.rx_bits.get()))
    }
}

#[derive(Clone)]
pub struct MockMf {
    pub selected: Rc<RefCell<Vec<Option<MfTone>>>>,
    pub current: Rc<Cell<Option<MfTone>>>,
    pub verdicts: Rc<RefCell<VecDeque<ToneEvent>>>,
    pub gen_remaining: Rc<Cell<usize>>,
    pub init_ok: Rc<Cell<bool>>,
    pub write_inits: Rc<RefCell<Vec<bool>>>,
    pub read_inits: Rc<RefCell<Vec<bool>>>,
}

impl MockMf {
    pub fn new() -> Self {
        Self {
            selected: Rc::new(RefCell::new(Vec::new())),
            current: Rc::new(Cell::new(None)),
            verdicts: Rc::new(RefCell::new(VecDeque::new())),
            gen_remaining: Rc::new(Cell::new(0)),
            init_ok: Rc::new(Cell::new(true)),
            write_inits: Rc::new(RefCell::new(Vec::new())),
            read_inits: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// The sequence of combinations put on the line, silence elided.
    pub fn tones_selected(&self) -> Vec<MfTone> {
        self.selected.borrow().iter().filter_map(|t| *t).collect()
    }
}

impl MfEngine for MockMf {
    fn write_init(&mut self, forward: bool) -> bool {
        self.write_inits.borrow_mut().push(forward);
        self.init_ok.get()
    }

    fn read_init(&mut self, forward: bool) -> bool {
        self.read_inits.borrow_mut().push(forward);
        self.init_ok.get()
    }

    fn select_tone(&mut self, tone: Option<MfTone>) -> Result<(), MfEngineError> {
        self.selected.borrow_mut().push(tone);
        self.current.set(tone);
        Ok(())
    }

    fn want_generate(&mut self, _tone: Option<MfTone>) -> bool {
        self.gen_remaining.get() > 0
    }

    fn generate(&mut self, buf: &mut [i16]) -> Result<usize, MfEngineError> {
        let n = buf.len().min(self.gen_remaining.get());
        for sample in &mut buf[..n] {
            *sample = 1000;
        }
        self.gen_remaining.set(self.gen_remaining.get() - n);
        Ok(n)
    }

    fn detect(&mut self, _pcm: &[i16]) -> Option<ToneEvent> {
        self.verdicts.borrow_mut().pop_front()
    }
}

pub struct IdentityCodec;

impl PcmCodec for IdentityCodec {
    fn alaw_to_linear(&self, alaw: u8) -> i16 {
        i16::from(alaw)
    }

    fn linear_to_alaw(&self, linear: i16) -> u8 {
        linear as u8
    }
}

#[derive(Debug, Clone)]
pub struct MockClock(pub Rc<Cell<u64>>);

impl Clock for MockClock {
    type T = u64;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1000);

    fn try_now(&self) -> Result<Instant<Self>, ClockError> {
        Ok(Instant::new(self.0.get()))
    }
}

pub type Chan<'a> = R2Channel<'a, MockDevice, MockMf, MockClock, IdentityCodec>;

pub struct Rig {
    pub dev: MockDevice,
    pub mf_tx: MockMf,
    pub mf_rx: MockMf,
    pub clock: Rc<Cell<u64>>,
}

pub fn rig() -> Rig {
    Rig {
        dev: MockDevice::new(),
        mf_tx: MockMf::new(),
        mf_rx: MockMf::new(),
        clock: Rc::new(Cell::new(0)),
    }
}

impl Rig {
    pub fn channel<'a>(&self, ctx: &'a R2Context) -> Chan<'a> {
        R2Channel::new(
            ctx,
            self.dev.clone(),
            self.mf_tx.clone(),
            self.mf_rx.clone(),
            IdentityCodec,
            MockClock(self.clock.clone()),
        )
        .expect("channel setup")
    }

    pub fn advance(&self, ms: u64) {
        self.clock.set(self.clock.get() + ms);
    }

    /// Queue one PCM block paired with a detector verdict.
    pub fn queue_verdict(&self, verdict: ToneEvent) {
        self.dev.rx_pcm.borrow_mut().push_back(vec![0u8; BLOCK_SIZE]);
        self.mf_rx.verdicts.borrow_mut().push_back(verdict);
    }

    /// Queue one PCM block with no tone verdict (plain audio).
    pub fn queue_pcm(&self, block: Vec<u8>) {
        self.dev.rx_pcm.borrow_mut().push_back(block);
    }
}

/// Everything a call reports, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ev {
    CallInit,
    Offered {
        ani: String,
        dnis: String,
        category: Category,
    },
    Accepted(CallMode),
    Answered,
    Disconnect(DisconnectCause),
    End,
    Read(usize),
    Alarm(bool),
    OsError,
    ProtocolError(ProtocolErrorReason),
    LineBlocked,
    LineIdle,
}

/// Recording event sink with optional scripted host reactions.
#[derive(Default)]
pub struct Recorder {
    pub log: Vec<Ev>,
    pub accept_on_offer: Option<CallMode>,
    pub disconnect_on_offer: Option<DisconnectCause>,
    pub answer_on_accept: bool,
    pub disconnect_on_accept: bool,
    pub release_on_disconnect: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, ev: &Ev) -> bool {
        self.log.contains(ev)
    }
}

impl ChannelEvents<MockDevice, MockMf, MockClock, IdentityCodec> for Recorder {
    fn on_call_init(&mut self, _chan: &mut Chan<'_>) {
        self.log.push(Ev::CallInit);
    }

    fn on_call_offered(&mut self, chan: &mut Chan<'_>, ani: &str, dnis: &str, category: Category) {
        self.log.push(Ev::Offered {
            ani: ani.to_owned(),
            dnis: dnis.to_owned(),
            category,
        });
        if let Some(mode) = self.accept_on_offer {
            chan.accept_call(self, mode).expect("accept");
        } else if let Some(cause) = self.disconnect_on_offer {
            chan.disconnect_call(self, cause).expect("disconnect");
        }
    }

    fn on_call_accepted(&mut self, chan: &mut Chan<'_>, mode: CallMode) {
        self.log.push(Ev::Accepted(mode));
        if self.answer_on_accept {
            chan.answer_call(self).expect("answer");
        } else if self.disconnect_on_accept {
            chan.disconnect_call(self, DisconnectCause::NormalClearing)
                .expect("disconnect");
        }
    }

    fn on_call_answered(&mut self, _chan: &mut Chan<'_>) {
        self.log.push(Ev::Answered);
    }

    fn on_call_disconnect(&mut self, chan: &mut Chan<'_>, cause: DisconnectCause) {
        self.log.push(Ev::Disconnect(cause));
        if self.release_on_disconnect {
            chan.disconnect_call(self, DisconnectCause::NormalClearing)
                .expect("release");
        }
    }

    fn on_call_end(&mut self, _chan: &mut Chan<'_>) {
        self.log.push(Ev::End);
    }

    fn on_call_read(&mut self, _chan: &mut Chan<'_>, pcm: &[u8]) {
        self.log.push(Ev::Read(pcm.len()));
    }

    fn on_hardware_alarm(&mut self, _chan: &mut Chan<'_>, raised: bool) {
        self.log.push(Ev::Alarm(raised));
    }

    fn on_os_error(&mut self, _chan: &mut Chan<'_>, _error: mfcr2::OsError<MockError>) {
        self.log.push(Ev::OsError);
    }

    fn on_protocol_error(&mut self, _chan: &mut Chan<'_>, reason: ProtocolErrorReason) {
        self.log.push(Ev::ProtocolError(reason));
    }

    fn on_line_blocked(&mut self, _chan: &mut Chan<'_>) {
        self.log.push(Ev::LineBlocked);
    }

    fn on_line_idle(&mut self, _chan: &mut Chan<'_>) {
        self.log.push(Ev::LineIdle);
    }
}

/// Deliver a far-end ABCD word and run the loop.
pub fn deliver_bits(chan: &mut Chan<'_>, rec: &mut Recorder, rig: &Rig, bits: u8) {
    rig.dev.push_bits(bits);
    chan.process_events(rec);
}

pub fn deliver_tone_on(chan: &mut Chan<'_>, rec: &mut Recorder, rig: &Rig, tone: MfTone) {
    rig.queue_verdict(ToneEvent::On(tone));
    chan.process_events(rec);
}

pub fn deliver_tone_off(chan: &mut Chan<'_>, rec: &mut Recorder, rig: &Rig) {
    rig.queue_verdict(ToneEvent::Off);
    chan.process_events(rec);
}

/// One compelled pulse from the far end: tone on, then off.
pub fn peer_pulse(chan: &mut Chan<'_>, rec: &mut Recorder, rig: &Rig, tone: MfTone) {
    deliver_tone_on(chan, rec, rig, tone);
    deliver_tone_off(chan, rec, rig);
}
