// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use crate::calculations::{self, Linearization};
use crate::calibration::{CalibrationLibrary, CalibrationSet, SpectralLibrary};
use crate::colorimetry::BasisCurves;
use crate::common::{CalibrationData, PIXEL_COUNT};
use crate::cube::{AxisRange, ScanGeometry};

/// A hand-built calibration for exercising the conversion math.
#[derive(Clone, Debug)]
pub(crate) struct SimpleCalibration {
    pub(crate) wavelengths: Vec<f64>,
    pub(crate) bins: Vec<f64>,
    pub(crate) sensitivity: Vec<f64>,
    pub(crate) linearization: Linearization,
    pub(crate) curves: BasisCurves,
}

impl SimpleCalibration {
    /// Every pixel 1 nm wide starting at 400 nm, with the same sensitivity.
    pub(crate) fn uniform(pixel_count: usize, sensitivity: f64, linearization: Linearization) -> Self {
        let wavelengths: Vec<f64> = (0..pixel_count).map(|i| 400.0 + i as f64).collect();
        Self {
            bins: calculations::wavelength_bins(&wavelengths),
            wavelengths,
            sensitivity: vec![sensitivity; pixel_count],
            linearization,
            curves: BasisCurves::zeroed(pixel_count),
        }
    }
}

impl CalibrationData for SimpleCalibration {
    fn unit(&self) -> u32 {
        0
    }

    fn pixel_count(&self) -> usize {
        self.wavelengths.len()
    }

    fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    fn wavelength_bins(&self) -> &[f64] {
        &self.bins
    }

    fn radiometric_sensitivity(&self) -> &[f64] {
        &self.sensitivity
    }

    fn linearization(&self) -> Linearization {
        self.linearization
    }

    fn basis_curves(&self) -> &BasisCurves {
        &self.curves
    }
}

pub(crate) fn spectral_library() -> SpectralLibrary {
    SpectralLibrary::from_reader(hosi_test_data::spectral_sensitivity_data().as_bytes())
        .expect("the example spectral sensitivity data should parse")
}

pub(crate) fn calibration_library() -> CalibrationLibrary {
    CalibrationLibrary::from_readers(
        hosi_test_data::calibration_data().as_bytes(),
        hosi_test_data::spectral_sensitivity_data().as_bytes(),
    )
    .expect("the example calibration data should parse")
}

pub(crate) fn example_calibration() -> CalibrationSet {
    calibration_library()
        .calibration_for(hosi_test_data::EXAMPLE_UNIT, PIXEL_COUNT)
        .expect("the example unit should be fully calibrated")
}

/// Pan and tilt 0 through 8 in steps of 4 with a boxcar of 2.
pub(crate) fn example_geometry() -> ScanGeometry {
    ScanGeometry {
        pan: AxisRange::new(0, 8, 4),
        tilt: AxisRange::new(0, 8, 4),
        max_integration_us: 50000,
        boxcar: 2,
        dark_repeat_ms: 500,
    }
}
