//! Optional per-call capture files
//!
//! Capturing is a runtime switch on the channel; only the file backends
//! need the `std` feature. Without it the lifecycle still runs (sequence
//! numbers advance) but nothing is persisted.

#[cfg(feature = "std")]
use std::{fs::File, io::Write as _};

use crate::context::R2Context;
use crate::Direction;

/// Text log of one call's progression, named
/// `chan-<N>-{forward|backward}-<seq>.call` in the context's log directory
/// (or the working directory if unset).
#[derive(Debug, Default)]
pub(crate) struct CallCapture {
    seq: u32,
    #[cfg(feature = "std")]
    file: Option<File>,
}

impl CallCapture {
    pub fn open(&mut self, number: u32, direction: Direction, ctx: &R2Context) {
        let seq = self.seq;
        self.seq += 1;
        #[cfg(feature = "std")]
        {
            if self.file.is_some() {
                log::warn!("chan {}: capture file still open, closing", number);
                self.file = None;
            }
            let leg = match direction {
                Direction::Backward => "backward",
                Direction::Forward | Direction::Stopped => "forward",
            };
            let name = std::format!("chan-{}-{}-{}.call", number, leg, seq);
            let path = match &ctx.log_dir {
                Some(dir) => dir.join(name),
                None => std::path::PathBuf::from(name),
            };
            match File::create(&path) {
                Ok(file) => {
                    self.file = Some(file);
                    log::debug!("chan {}: call capture {} started", number, path.display());
                    self.line(number, format_args!("call {} started on chan {}", seq, number));
                }
                Err(e) => {
                    log::error!("chan {}: failed to open {}: {}", number, path.display(), e);
                }
            }
        }
        #[cfg(not(feature = "std"))]
        let _ = (seq, number, direction, ctx);
    }

    pub fn line(&mut self, number: u32, args: core::fmt::Arguments<'_>) {
        #[cfg(feature = "std")]
        if let Some(file) = self.file.as_mut() {
            if writeln!(file, "{}", args).is_err() {
                log::warn!("chan {}: capture write failed, closing file", number);
                self.file = None;
            }
        }
        #[cfg(not(feature = "std"))]
        let _ = (number, args);
    }

    pub fn close(&mut self) {
        #[cfg(feature = "std")]
        {
            self.file = None;
        }
    }
}

/// Raw linear-PCM taps around the MF engine, named
/// `mfcr2-chan-<N>-{tx,rx}.raw`.
#[derive(Debug, Default)]
pub(crate) struct PcmCapture {
    enabled: bool,
    #[cfg(feature = "std")]
    tx: Option<File>,
    #[cfg(feature = "std")]
    rx: Option<File>,
}

impl PcmCapture {
    pub fn enable(&mut self, number: u32) {
        self.enabled = true;
        #[cfg(feature = "std")]
        {
            self.tx = File::create(std::format!("mfcr2-chan-{}-tx.raw", number)).ok();
            self.rx = File::create(std::format!("mfcr2-chan-{}-rx.raw", number)).ok();
        }
        #[cfg(not(feature = "std"))]
        let _ = number;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        #[cfg(feature = "std")]
        {
            self.tx = None;
            self.rx = None;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn tx(&mut self, pcm: &[i16]) {
        if !self.enabled {
            return;
        }
        #[cfg(feature = "std")]
        Self::append(&mut self.tx, pcm);
        #[cfg(not(feature = "std"))]
        let _ = pcm;
    }

    pub fn rx(&mut self, pcm: &[i16]) {
        if !self.enabled {
            return;
        }
        #[cfg(feature = "std")]
        Self::append(&mut self.rx, pcm);
        #[cfg(not(feature = "std"))]
        let _ = pcm;
    }

    #[cfg(feature = "std")]
    fn append(file: &mut Option<File>, pcm: &[i16]) {
        if let Some(f) = file.as_mut() {
            for sample in pcm {
                if f.write_all(&sample.to_le_bytes()).is_err() {
                    *file = None;
                    return;
                }
            }
        }
    }
}
