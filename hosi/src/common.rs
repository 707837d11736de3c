// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Constants and the calibration access trait shared by the rest of the crate.
//!
//! A few terms used throughout:
//!
//! * A *pixel* is one photosite on the spectrometer's linear sensor. Pixel index maps to
//!   wavelength through the unit's wavelength polynomial.
//! * A *bin* is one entry in a stored spectrum. With a boxcar width of N, bin `loc` covers pixels
//!   `loc * N .. loc * N + N`.
//! * A *cell* is one pan/tilt position in a scan. Each cell holds one spectrum in the cube and one
//!   value in each derived image.
use crate::calculations::Linearization;
use crate::colorimetry::BasisCurves;

/// The number of photosites on the sensor.
pub const PIXEL_COUNT: usize = 288;

/// The number of coefficients in the wavelength polynomial (it is a fifth degree polynomial).
pub const WAVELENGTH_COEFFICIENTS: usize = 6;

/// Added to every integration time, in microseconds.
///
/// The sensor keeps integrating for a short, fixed time beyond what is requested.
pub const BASE_INTEGRATION_OFFSET_US: f64 = 550.0;

/// Maximum luminous efficacy (lm/W).
pub const LUMINOUS_EFFICACY: f64 = 683.0;

/// Scale from device radiance units to cd/m² (after multiplying by [`LUMINOUS_EFFICACY`]).
pub const LUMINANCE_SCALE: f64 = 117.159574150716;

/// Starting value for the running display maxima, so normalizing never divides by zero.
pub const NORMALIZATION_EPSILON: f64 = 1E-10;

/// Access to the calibration constants for one device unit.
///
/// All per-pixel slices are [`pixel_count`](CalibrationData::pixel_count) long.
pub trait CalibrationData {
    /// The unit number these constants belong to.
    fn unit(&self) -> u32;

    fn pixel_count(&self) -> usize;

    /// The center wavelength of each pixel, in nanometers.
    fn wavelengths(&self) -> &[f64];

    /// The wavelength span covered by each pixel, in nanometers.
    fn wavelength_bins(&self) -> &[f64];

    /// Per-pixel radiometric sensitivity. Pixels with a sensitivity of zero (or less) are
    /// excluded from every calculation.
    fn radiometric_sensitivity(&self) -> &[f64];

    fn linearization(&self) -> Linearization;

    /// The spectral basis curves, resampled onto this unit's pixel wavelengths.
    fn basis_curves(&self) -> &BasisCurves;

    /// The wavelength of the first pixel of each bin for the given boxcar width.
    fn boxcar_wavelengths(&self, boxcar: usize) -> Vec<f64> {
        self.wavelengths()
            .iter()
            .step_by(boxcar.max(1))
            .copied()
            .collect()
    }
}
