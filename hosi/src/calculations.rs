// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Per-pixel conversion from dark-subtracted counts to spectral radiance.
//!
//! These functions are deliberately small and free-standing so they can be checked against
//! hand-worked values. [`convert_sample`] ties them together for one spectrum.
use num_traits::Float;

use crate::colorimetry::ChannelSums;
use crate::common::CalibrationData;

/// The fitted response curve mapping raw counts to counts proportional to light.
///
/// `linear = exp(exponent * ln(raw) + offset)` for positive counts, mirrored for negative ones.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Linearization {
    pub exponent: f64,
    pub offset: f64,
}

impl Linearization {
    /// A response curve that leaves counts unchanged.
    pub const IDENTITY: Self = Self {
        exponent: 1.0,
        offset: 0.0,
    };

    pub fn new(exponent: f64, offset: f64) -> Self {
        Self { exponent, offset }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        if *self == Self::IDENTITY {
            // Skips the ln/exp round trip, which isn't always exact.
            raw
        } else {
            linearize(raw, self.exponent, self.offset)
        }
    }
}

impl Default for Linearization {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Apply the log-linear response model, mirrored about zero. Zero passes through.
pub fn linearize<F: Float>(raw: F, exponent: F, offset: F) -> F {
    if raw > F::zero() {
        (raw.ln() * exponent + offset).exp()
    } else if raw < F::zero() {
        -((-raw).ln() * exponent + offset).exp()
    } else {
        raw
    }
}

/// Evaluate the wavelength polynomial `Σ cₖ·pixelᵏ` for one pixel.
pub fn pixel_wavelength(coefficients: &[f64], pixel: usize) -> f64 {
    let x = pixel as f64;
    coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, coefficient| acc * x + coefficient)
}

pub fn pixel_wavelengths(coefficients: &[f64], pixel_count: usize) -> Vec<f64> {
    (0..pixel_count)
        .map(|pixel| pixel_wavelength(coefficients, pixel))
        .collect()
}

/// The width of each pixel in nanometers, as the distance to the next pixel's wavelength.
///
/// The last pixel has no successor, so it reuses the width of the one before it.
pub fn wavelength_bins(wavelengths: &[f64]) -> Vec<f64> {
    let mut bins: Vec<f64> = wavelengths
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .collect();
    match bins.last().copied() {
        Some(last) => bins.push(last),
        None => bins.extend(wavelengths.iter().map(|_| 0.0)),
    }
    bins
}

/// The number of spectral bins for a sensor with `pixel_count` pixels and a boxcar width.
pub fn spectral_length(pixel_count: usize, boxcar: usize) -> usize {
    pixel_count.div_ceil(boxcar.max(1))
}

/// Radiance for one pixel: linearized, then normalized by sensitivity and exposure time.
///
/// `effective_integration_us` already includes the base integration offset.
pub fn pixel_radiance(
    counts: f64,
    linearization: Linearization,
    sensitivity: f64,
    effective_integration_us: f64,
) -> f64 {
    linearization.apply(counts) / (sensitivity * effective_integration_us)
}

/// The output of converting one light spectrum.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertedSample {
    /// Radiance density for each bin (W/(sr·m²·nm)).
    pub radiance: Vec<f64>,

    /// Bin-width weighted projections onto the basis curves.
    pub channels: ChannelSums,
}

/// Convert one dark-subtracted spectrum (one value per bin) into radiance and channel sums.
///
/// Each bin's counts are split evenly across the `boxcar` pixels it covers. Pixels with no
/// sensitivity are skipped, as are bins missing from a truncated spectrum.
pub fn convert_sample<Clb: CalibrationData>(
    calibration: &Clb,
    boxcar: usize,
    counts: &[f64],
    integration_time_us: f64,
    base_integration_offset_us: f64,
) -> ConvertedSample {
    let boxcar = boxcar.max(1);
    let pixel_count = calibration.pixel_count();
    let sensitivity = calibration.radiometric_sensitivity();
    let bins = calibration.wavelength_bins();
    let curves = calibration.basis_curves();
    let linearization = calibration.linearization();
    let effective_integration = integration_time_us + base_integration_offset_us;
    let divisor = boxcar as f64;

    let mut channels = ChannelSums::default();
    let radiance = (0..spectral_length(pixel_count, boxcar))
        .map(|loc| {
            let bin_counts = match counts.get(loc) {
                Some(value) => value / divisor,
                None => return 0.0,
            };
            let block_sum: f64 = (loc * boxcar..(loc * boxcar + boxcar).min(pixel_count))
                .filter(|pixel| sensitivity[*pixel] > 0.0)
                .map(|pixel| {
                    let radiance = pixel_radiance(
                        bin_counts,
                        linearization,
                        sensitivity[pixel],
                        effective_integration,
                    );
                    channels.accumulate(curves, pixel, radiance * bins[pixel]);
                    radiance
                })
                .sum();
            block_sum / divisor
        })
        .collect();
    ConvertedSample { radiance, channels }
}
