// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Pairing light spectra with the dark spectrum taken at the same integration time.
use log::debug;

#[derive(Clone, Debug, PartialEq)]
struct DarkFrame {
    integration_time_us: i64,
    counts: Vec<f64>,
}

/// The dark spectra recorded during the current dark sweep.
///
/// The device takes a sweep of dark readings at increasing integration times, so a dark reading
/// shorter than the last one starts a new sweep and discards the old readings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DarkFrames {
    frames: Vec<DarkFrame>,
}

impl DarkFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, integration_time_us: i64, counts: Vec<f64>) {
        let new_sweep = self
            .frames
            .last()
            .map_or(true, |last| integration_time_us < last.integration_time_us);
        if new_sweep && !self.frames.is_empty() {
            debug!(
                "Dark sweep restarted at {} µs, dropping {} dark frames",
                integration_time_us,
                self.frames.len()
            );
            self.frames.clear();
        }
        // Times only increase within a sweep, so a repeat can only be the last frame.
        match self.frames.last_mut() {
            Some(last) if last.integration_time_us == integration_time_us => last.counts = counts,
            _ => self.frames.push(DarkFrame {
                integration_time_us,
                counts,
            }),
        }
    }

    /// The most recent dark counts with exactly this integration time.
    pub fn lookup(&self, integration_time_us: i64) -> Option<&[f64]> {
        self.frames
            .iter()
            .rev()
            .find(|frame| frame.integration_time_us == integration_time_us)
            .map(|frame| frame.counts.as_slice())
    }

    /// Subtract the matching dark spectrum from `light`, or `None` if there isn't one.
    ///
    /// Bins missing from the dark spectrum are left as is.
    pub fn subtract(&self, integration_time_us: i64, light: &[f64]) -> Option<Vec<f64>> {
        let dark = self.lookup(integration_time_us)?;
        Some(
            light
                .iter()
                .enumerate()
                .map(|(bin, value)| value - dark.get(bin).copied().unwrap_or_default())
                .collect(),
        )
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
