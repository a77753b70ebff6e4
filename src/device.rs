//! CAS trunk device access
//!
//! The engine drives one timeslot of a CAS-capable T1/E1 span through this
//! trait: A-law PCM in both directions, the ABCD bits, and a non-blocking
//! readiness poll with an out-of-band event queue for bit changes and
//! alarms. Opening the device and binding it to its timeslot are host
//! concerns; the trait receives an already-bound descriptor.

use bitflags::bitflags;

use crate::cas::CasBits;

bitflags! {
    /// Readiness interest/result mask for [`CasDevice::io_mux`].
    pub struct IoInterest: u8 {
        /// A signaling event (ABCD change, alarm) is pending.
        const SIG_EVENT = 0b001;
        /// PCM is available to read.
        const READ = 0b010;
        /// PCM can be written without blocking.
        const WRITE = 0b100;
    }
}

/// Line-level events delivered out of band from the PCM stream.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    /// The received ABCD bits changed.
    BitsChanged,
    /// The span went into alarm.
    Alarm,
    /// The span recovered from alarm.
    NoAlarm,
}

/// Signaling provisioned on the timeslot.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingType {
    /// Channel-associated signaling; the only type this engine drives.
    Cas,
    /// Anything else (clear channel, CCS, ...).
    Other,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Hand buffers over as soon as data arrives.
    Immediate,
    /// Hold buffers until they fill.
    WhenFull,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub tx_policy: BufferPolicy,
    pub rx_policy: BufferPolicy,
    pub count: usize,
    pub size: usize,
}

/// 256-entry companded gain maps applied by the framer.
#[derive(Debug, Clone, Copy)]
pub struct GainTable {
    pub rx: [u8; 256],
    pub tx: [u8; 256],
}

impl GainTable {
    /// Identity mapping: every code translates to itself.
    pub const fn identity() -> Self {
        let mut map = [0u8; 256];
        let mut i = 0;
        while i < 256 {
            map[i] = i as u8;
            i += 1;
        }
        Self { rx: map, tx: map }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCodec {
    Alaw,
    Mulaw,
}

/// One CAS timeslot as exposed by the trunk hardware.
pub trait CasDevice {
    type Error: core::fmt::Debug;

    /// The timeslot identity as the hardware reports it.
    fn channel_number(&mut self) -> Result<u32, Self::Error>;
    fn signaling_type(&mut self) -> Result<SignalingType, Self::Error>;

    fn buffer_info(&mut self) -> Result<BufferInfo, Self::Error>;
    fn set_buffer_info(&mut self, info: &BufferInfo) -> Result<(), Self::Error>;
    fn set_gains(&mut self, gains: &GainTable) -> Result<(), Self::Error>;
    fn set_codec(&mut self, codec: LineCodec) -> Result<(), Self::Error>;
    fn set_echo_cancel(&mut self, enable: bool) -> Result<(), Self::Error>;

    /// Poll readiness. Must not block: returns the subset of `interest`
    /// that is ready right now, possibly empty.
    fn io_mux(&mut self, interest: IoInterest) -> Result<IoInterest, Self::Error>;
    /// Pop the pending signaling event, if any.
    fn next_event(&mut self) -> Result<Option<LineEvent>, Self::Error>;

    /// Read companded PCM octets.
    fn read(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error>;
    /// Write companded PCM octets; may accept fewer than offered.
    fn write(&mut self, buf: &[u8]) -> nb::Result<usize, Self::Error>;
    /// Drop any queued-but-untransmitted PCM.
    fn flush_write(&mut self) -> Result<(), Self::Error>;

    fn tx_cas_bits(&mut self) -> Result<CasBits, Self::Error>;
    fn set_tx_cas_bits(&mut self, bits: CasBits) -> Result<(), Self::Error>;
    fn rx_cas_bits(&mut self) -> Result<CasBits, Self::Error>;
}

// A channel owns its device if handed one by value; handing it `&mut dev`
// keeps ownership (and the close) at the call site.
impl<T: CasDevice + ?Sized> CasDevice for &mut T {
    type Error = T::Error;

    fn channel_number(&mut self) -> Result<u32, Self::Error> {
        (**self).channel_number()
    }

    fn signaling_type(&mut self) -> Result<SignalingType, Self::Error> {
        (**self).signaling_type()
    }

    fn buffer_info(&mut self) -> Result<BufferInfo, Self::Error> {
        (**self).buffer_info()
    }

    fn set_buffer_info(&mut self, info: &BufferInfo) -> Result<(), Self::Error> {
        (**self).set_buffer_info(info)
    }

    fn set_gains(&mut self, gains: &GainTable) -> Result<(), Self::Error> {
        (**self).set_gains(gains)
    }

    fn set_codec(&mut self, codec: LineCodec) -> Result<(), Self::Error> {
        (**self).set_codec(codec)
    }

    fn set_echo_cancel(&mut self, enable: bool) -> Result<(), Self::Error> {
        (**self).set_echo_cancel(enable)
    }

    fn io_mux(&mut self, interest: IoInterest) -> Result<IoInterest, Self::Error> {
        (**self).io_mux(interest)
    }

    fn next_event(&mut self) -> Result<Option<LineEvent>, Self::Error> {
        (**self).next_event()
    }

    fn read(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> nb::Result<usize, Self::Error> {
        (**self).write(buf)
    }

    fn flush_write(&mut self) -> Result<(), Self::Error> {
        (**self).flush_write()
    }

    fn tx_cas_bits(&mut self) -> Result<CasBits, Self::Error> {
        (**self).tx_cas_bits()
    }

    fn set_tx_cas_bits(&mut self, bits: CasBits) -> Result<(), Self::Error> {
        (**self).set_tx_cas_bits(bits)
    }

    fn rx_cas_bits(&mut self) -> Result<CasBits, Self::Error> {
        (**self).rx_cas_bits()
    }
}
