#![deny(clippy::wildcard_enum_match_arm)]

//! Per-country protocol variants
//!
//! Configuration is layered: the ITU-T defaults are installed first, then a
//! country override adjusts tone assignments, supervision timers, address
//! ordering and the fixed non-R2 bits. An `Option::None` in a tone table
//! means the variant has no signal for that meaning; receivers get by on a
//! timeout instead.

use core::str::FromStr;

use embedded_time::duration::Milliseconds;

use crate::cas::CasSignalSet;
use crate::tone::MfTone;

/// Supported national variants of the R2 register signaling.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Argentina,
    Brazil,
    China,
    Czech,
    Ecuador,
    Itu,
    Mexico,
    Philippines,
}

impl Variant {
    /// Provisioning name, as used by switch configuration front ends.
    pub const fn name(self) -> &'static str {
        match self {
            Variant::Argentina => "AR",
            Variant::Brazil => "BR",
            Variant::China => "CN",
            Variant::Czech => "CZ",
            Variant::Ecuador => "EC",
            Variant::Itu => "ITU",
            Variant::Mexico => "MX",
            Variant::Philippines => "PH",
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownVariant;

impl FromStr for Variant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let variants = [
            Variant::Argentina,
            Variant::Brazil,
            Variant::China,
            Variant::Czech,
            Variant::Ecuador,
            Variant::Itu,
            Variant::Mexico,
            Variant::Philippines,
        ];
        variants
            .into_iter()
            .find(|v| s.eq_ignore_ascii_case(v.name()))
            .ok_or(UnknownVariant)
    }
}

/// Group A: backward requests for DNIS, ANI and the calling party category.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct GroupATones {
    pub request_next_dnis_digit: Option<MfTone>,
    pub request_next_ani_digit: Option<MfTone>,
    pub request_category: Option<MfTone>,
    /// Doubles as the switch to Group C (Mexico).
    pub request_category_and_change_to_gc: Option<MfTone>,
    pub request_change_to_g2: Option<MfTone>,
    /// Accept straight out of Group A; unusual but ITU-compliant.
    pub address_complete_charge_setup: Option<MfTone>,
    pub network_congestion: Option<MfTone>,
}

/// Group B: the backward verdict on the offered call.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct GroupBTones {
    pub accept_call_with_charge: Option<MfTone>,
    pub accept_call_no_charge: Option<MfTone>,
    pub busy_number: Option<MfTone>,
    pub network_congestion: Option<MfTone>,
    pub unallocated_number: Option<MfTone>,
    pub line_out_of_order: Option<MfTone>,
    pub special_info_tone: Option<MfTone>,
}

/// Group C: the intermediate backward group used by Mexico between the
/// category and the ANI collection.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct GroupCTones {
    pub request_next_ani_digit: Option<MfTone>,
    pub request_change_to_g2: Option<MfTone>,
    pub request_next_dnis_digit_and_change_to_ga: Option<MfTone>,
}

/// Group I: forward answers to Group A requests.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct GroupITones {
    pub no_more_dnis_available: Option<MfTone>,
    pub no_more_ani_available: Option<MfTone>,
    pub caller_ani_is_restricted: Option<MfTone>,
}

/// Group II: the calling party category, sent once per call.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct GroupIITones {
    pub national_subscriber: MfTone,
    pub national_priority_subscriber: MfTone,
    pub international_subscriber: MfTone,
    pub international_priority_subscriber: MfTone,
}

/// Protocol supervision timers.
#[derive(Debug, Clone, Copy)]
pub struct TimerSet {
    /// Compelled backward cycle watchdog.
    pub mf_back_cycle: Milliseconds<u32>,
    /// Mute delay after a silent far end stops the cycle.
    pub mf_back_resume_cycle: Milliseconds<u32>,
    /// Forward cap on waiting for the far-end cycle timeout.
    pub mf_fwd_safety: Milliseconds<u32>,
    /// Seize to seize-ack.
    pub r2_seize: Milliseconds<u32>,
    /// Accept to answer.
    pub r2_answer: Milliseconds<u32>,
    /// CLEAR BACK flicker window; `None` on variants without metering
    /// pulses, where CLEAR BACK always means disconnection.
    pub r2_metering_pulse: Option<Milliseconds<u32>>,
}

/// A fully resolved variant: ITU defaults with the country override applied.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Profile {
    pub cas_signals: CasSignalSet,
    pub nonr2_bits: u8,
    pub r2_bits: u8,
    pub timers: TimerSet,
    pub get_ani_first: bool,
    pub ga: GroupATones,
    pub gb: GroupBTones,
    pub gc: GroupCTones,
    pub gi: GroupITones,
    pub gii: GroupIITones,
}

impl Profile {
    fn itu() -> Self {
        Self {
            cas_signals: CasSignalSet::ITU,
            // D is held at 1; C stays 0
            nonr2_bits: 0x1,
            // A and B carry the line state
            r2_bits: 0xC,
            timers: TimerSet {
                mf_back_cycle: Milliseconds(1500),
                mf_back_resume_cycle: Milliseconds(150),
                mf_fwd_safety: Milliseconds(10_000),
                r2_seize: Milliseconds(8000),
                r2_answer: Milliseconds(80_000),
                r2_metering_pulse: None,
            },
            // the forward side always sends DNIS first, but most variants
            // then ask for ANI before finishing the DNIS
            get_ani_first: true,
            ga: GroupATones {
                request_next_dnis_digit: Some(MfTone::Tone1),
                request_next_ani_digit: Some(MfTone::Tone5),
                request_category: Some(MfTone::Tone5),
                request_category_and_change_to_gc: None,
                request_change_to_g2: Some(MfTone::Tone3),
                address_complete_charge_setup: Some(MfTone::Tone6),
                network_congestion: Some(MfTone::Tone4),
            },
            gb: GroupBTones {
                accept_call_with_charge: Some(MfTone::Tone6),
                accept_call_no_charge: Some(MfTone::Tone7),
                busy_number: Some(MfTone::Tone3),
                network_congestion: Some(MfTone::Tone4),
                unallocated_number: Some(MfTone::Tone5),
                line_out_of_order: Some(MfTone::Tone8),
                special_info_tone: Some(MfTone::Tone2),
            },
            gc: GroupCTones {
                request_next_ani_digit: None,
                request_change_to_g2: None,
                request_next_dnis_digit_and_change_to_ga: None,
            },
            gi: GroupITones {
                no_more_dnis_available: Some(MfTone::Tone15),
                no_more_ani_available: Some(MfTone::Tone15),
                caller_ani_is_restricted: None,
            },
            gii: GroupIITones {
                national_subscriber: MfTone::Tone1,
                national_priority_subscriber: MfTone::Tone2,
                international_subscriber: MfTone::Tone7,
                international_priority_subscriber: MfTone::Tone9,
            },
        }
    }
}

pub(crate) fn profile_for(variant: Variant) -> Profile {
    let mut p = Profile::itu();
    match variant {
        Variant::Argentina => argentina(&mut p),
        Variant::Brazil => brazil(&mut p),
        Variant::China => china(&mut p),
        Variant::Mexico => mexico(&mut p),
        Variant::Czech | Variant::Ecuador | Variant::Itu | Variant::Philippines => {}
    }
    p
}

fn argentina(p: &mut Profile) {
    p.gi.no_more_dnis_available = None;
    p.gi.caller_ani_is_restricted = Some(MfTone::Tone12);
    p.timers.r2_metering_pulse = Some(Milliseconds(400));
}

fn brazil(p: &mut Profile) {
    p.gi.no_more_dnis_available = None;
    p.gi.caller_ani_is_restricted = Some(MfTone::Tone12);

    p.ga.address_complete_charge_setup = None;

    p.gb.accept_call_with_charge = Some(MfTone::Tone1);
    p.gb.busy_number = Some(MfTone::Tone2);
    p.gb.accept_call_no_charge = Some(MfTone::Tone5);
    p.gb.special_info_tone = Some(MfTone::Tone6);
    p.gb.unallocated_number = Some(MfTone::Tone7);
}

fn china(p: &mut Profile) {
    // ITU line signaling holds C at 0 and D at 1; China holds both at 1.
    // Neither carries call state.
    p.nonr2_bits = 0x3;

    p.ga.request_next_ani_digit = Some(MfTone::Tone1);
    p.ga.request_category = Some(MfTone::Tone6);
    p.ga.address_complete_charge_setup = None;

    p.gb.accept_call_with_charge = Some(MfTone::Tone1);
    p.gb.busy_number = Some(MfTone::Tone2);
    p.gb.special_info_tone = None;

    p.gi.no_more_dnis_available = None;
}

fn mexico(p: &mut Profile) {
    // Telmex, Avantel and most telcos in Mexico send DNIS first and the
    // ANI at the end; a few (Maxcom) want ANI first, which the host can
    // still get by flipping this on the context.
    p.get_ani_first = false;

    // category is requested with a signal that also switches to Group C
    p.ga.request_category = None;
    p.ga.request_category_and_change_to_gc = Some(MfTone::Tone6);
    p.ga.address_complete_charge_setup = None;

    // GA next-ANI is replaced by the GC next-ANI signal
    p.ga.request_next_ani_digit = None;

    p.gb.accept_call_with_charge = Some(MfTone::Tone1);
    p.gb.accept_call_no_charge = Some(MfTone::Tone5);
    p.gb.busy_number = Some(MfTone::Tone2);
    p.gb.unallocated_number = Some(MfTone::Tone2);
    p.gb.special_info_tone = None;

    p.gc.request_next_ani_digit = Some(MfTone::Tone1);
    p.gc.request_change_to_g2 = Some(MfTone::Tone3);
    p.gc.request_next_dnis_digit_and_change_to_ga = Some(MfTone::Tone5);

    // no end-of-DNIS signal; the backward side times out instead
    p.gi.no_more_dnis_available = None;
}
