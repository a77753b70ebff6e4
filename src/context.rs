//! Shared configuration for a bundle of channels
//!
//! A context resolves a [`Variant`] into its tone tables, bit masks and
//! timers, and carries the address-length policy. Channels borrow it
//! immutably, so it cannot be reconfigured while any channel is live.

use embedded_time::duration::Milliseconds;

use crate::cas::CasSignalSet;
use crate::tone::MfTone;
use crate::variant::{
    self, GroupATones, GroupBTones, GroupCTones, GroupITones, GroupIITones, TimerSet, Variant,
};
use crate::Category;

/// Capacity of the ANI/DNIS digit buffers.
pub const MAX_DIGITS: usize = 32;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_ani` exceeds the digit buffer capacity.
    AniTooLong { requested: usize },
    /// `max_dnis` exceeds the digit buffer capacity.
    DnisTooLong { requested: usize },
}

#[derive(Debug, Clone)]
pub struct R2Context {
    variant: Variant,
    pub(crate) cas_signals: CasSignalSet,
    pub(crate) nonr2_bits: u8,
    pub(crate) r2_bits: u8,
    pub(crate) timers: TimerSet,
    pub(crate) get_ani_first: bool,
    pub(crate) ga: GroupATones,
    pub(crate) gb: GroupBTones,
    pub(crate) gc: GroupCTones,
    pub(crate) gi: GroupITones,
    pub(crate) gii: GroupIITones,
    pub(crate) max_ani: usize,
    pub(crate) max_dnis: usize,
    pub(crate) mf_threshold: Option<Milliseconds<u32>>,
    #[cfg(feature = "std")]
    pub(crate) log_dir: Option<std::path::PathBuf>,
}

impl R2Context {
    /// Resolve `variant` and fix the address lengths for this trunk group.
    pub fn new(variant: Variant, max_ani: usize, max_dnis: usize) -> Result<Self, ConfigError> {
        if max_ani > MAX_DIGITS {
            return Err(ConfigError::AniTooLong { requested: max_ani });
        }
        if max_dnis > MAX_DIGITS {
            return Err(ConfigError::DnisTooLong {
                requested: max_dnis,
            });
        }
        let p = variant::profile_for(variant);
        Ok(Self {
            variant,
            cas_signals: p.cas_signals,
            nonr2_bits: p.nonr2_bits,
            r2_bits: p.r2_bits,
            timers: p.timers,
            get_ani_first: p.get_ani_first,
            ga: p.ga,
            gb: p.gb,
            gc: p.gc,
            gi: p.gi,
            gii: p.gii,
            max_ani,
            max_dnis,
            mf_threshold: None,
            #[cfg(feature = "std")]
            log_dir: None,
        })
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn max_ani(&self) -> usize {
        self.max_ani
    }

    pub fn max_dnis(&self) -> usize {
        self.max_dnis
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    /// Minimum stable detection time before a tone edge is believed.
    /// `None` (the default) disables debouncing.
    pub fn set_mf_threshold(&mut self, threshold: Option<Milliseconds<u32>>) {
        self.mf_threshold = threshold;
    }

    /// Override the variant's address ordering. Some operators deviate from
    /// their national default (e.g. Maxcom in Mexico wants ANI first).
    pub fn set_get_ani_first(&mut self, get_ani_first: bool) {
        self.get_ani_first = get_ani_first;
    }

    /// Directory for per-call capture files; the working directory is used
    /// when unset.
    #[cfg(feature = "std")]
    pub fn set_log_dir(&mut self, dir: impl Into<std::path::PathBuf>) {
        self.log_dir = Some(dir.into());
    }

    /// Decode a received Group II combination.
    pub fn category_from_tone(&self, tone: MfTone) -> Category {
        if tone == self.gii.national_subscriber {
            Category::NationalSubscriber
        } else if tone == self.gii.national_priority_subscriber {
            Category::NationalPrioritySubscriber
        } else if tone == self.gii.international_subscriber {
            Category::InternationalSubscriber
        } else if tone == self.gii.international_priority_subscriber {
            Category::InternationalPrioritySubscriber
        } else {
            Category::Unknown
        }
    }

    /// The Group II combination for a category; unknown callers go out as
    /// national subscribers.
    pub fn tone_from_category(&self, category: Category) -> MfTone {
        match category {
            Category::NationalSubscriber | Category::Unknown => self.gii.national_subscriber,
            Category::NationalPrioritySubscriber => self.gii.national_priority_subscriber,
            Category::InternationalSubscriber => self.gii.international_subscriber,
            Category::InternationalPrioritySubscriber => {
                self.gii.international_priority_subscriber
            }
        }
    }
}
