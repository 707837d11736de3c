// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Loading and validating per-unit calibration data.
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

use arrayvec::ArrayVec;
use log::{debug, info};

use crate::calculations::{self, Linearization};
use crate::colorimetry::BasisCurves;
use crate::common::{CalibrationData, WAVELENGTH_COEFFICIENTS};
use crate::error::{CalibrationError, LibraryError};

pub mod file;
pub mod spectral;

pub use file::{read_records, CalibrationRecord};
pub use spectral::SpectralLibrary;

/// The raw coefficient arrays found for one unit, before validation.
#[derive(Clone, Debug, Default, PartialEq)]
struct UnitRecords {
    wavelength_coefficients: Vec<f64>,
    sensitivity: Vec<f64>,
    linearization: Vec<f64>,
}

/// Every unit's calibration rows, plus the shared spectral sensitivity data.
#[derive(Clone, Debug, Default)]
pub struct CalibrationLibrary {
    units: BTreeMap<u32, UnitRecords>,
    spectral: SpectralLibrary,
}

impl CalibrationLibrary {
    /// Later records for the same unit and tag replace earlier ones.
    pub fn new(records: Vec<CalibrationRecord>, spectral: SpectralLibrary) -> Self {
        let mut units: BTreeMap<u32, UnitRecords> = BTreeMap::new();
        for record in records {
            let entry = units.entry(record.unit()).or_default();
            match record {
                CalibrationRecord::WavelengthCoefficients { coefficients, .. } => {
                    entry.wavelength_coefficients = coefficients
                }
                CalibrationRecord::RadiometricSensitivity { values, .. } => {
                    entry.sensitivity = values
                }
                CalibrationRecord::LinearizationCoefficients { coefficients, .. } => {
                    entry.linearization = coefficients
                }
            }
        }
        debug!("Loaded calibration rows for {} units", units.len());
        Self { units, spectral }
    }

    pub fn from_readers<C: io::Read, S: io::Read>(
        calibration: C,
        spectral: S,
    ) -> Result<Self, LibraryError> {
        let records = read_records(calibration)?;
        let spectral = SpectralLibrary::from_reader(spectral)?;
        Ok(Self::new(records, spectral))
    }

    pub fn from_paths<C: AsRef<Path>, S: AsRef<Path>>(
        calibration: C,
        spectral: S,
    ) -> Result<Self, LibraryError> {
        Self::from_readers(File::open(calibration)?, File::open(spectral)?)
    }

    /// The unit numbers with at least one calibration row.
    pub fn units(&self) -> impl Iterator<Item = u32> + '_ {
        self.units.keys().copied()
    }

    pub fn spectral(&self) -> &SpectralLibrary {
        &self.spectral
    }

    /// Validate and derive the calibration tables for one unit.
    pub fn calibration_for(
        &self,
        unit: u32,
        pixel_count: usize,
    ) -> Result<CalibrationSet, CalibrationError> {
        let records = self.units.get(&unit).cloned().unwrap_or_default();
        let incomplete = || CalibrationError::Incomplete {
            unit,
            wavelength_coefficients: records.wavelength_coefficients.len(),
            sensitivities: records.sensitivity.len(),
            linearization_coefficients: records.linearization.len(),
            pixel_count,
        };
        let coefficients = ArrayVec::<f64, WAVELENGTH_COEFFICIENTS>::try_from(
            records.wavelength_coefficients.as_slice(),
        )
        .map_err(|_| incomplete())?;
        if coefficients.len() != WAVELENGTH_COEFFICIENTS
            || records.sensitivity.len() != pixel_count
            || records.linearization.len() != 2
        {
            return Err(incomplete());
        }
        let linearization = Linearization::new(records.linearization[0], records.linearization[1]);
        CalibrationSet::new(
            unit,
            coefficients,
            records.sensitivity.clone(),
            linearization,
            &self.spectral,
        )
    }
}

/// The validated calibration for one unit, with the per-pixel tables derived from it.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationSet {
    unit: u32,
    coefficients: ArrayVec<f64, WAVELENGTH_COEFFICIENTS>,
    wavelengths: Vec<f64>,
    bins: Vec<f64>,
    sensitivity: Vec<f64>,
    linearization: Linearization,
    curves: BasisCurves,
}

impl CalibrationSet {
    /// The pixel count is taken from the length of `sensitivity`.
    pub fn new(
        unit: u32,
        coefficients: ArrayVec<f64, WAVELENGTH_COEFFICIENTS>,
        sensitivity: Vec<f64>,
        linearization: Linearization,
        spectral: &SpectralLibrary,
    ) -> Result<Self, CalibrationError> {
        let wavelengths = calculations::pixel_wavelengths(&coefficients, sensitivity.len());
        let bins = calculations::wavelength_bins(&wavelengths);
        let curves = spectral.resample_bases(&wavelengths)?;
        info!(
            "Unit {} calibrated for {:.1} nm to {:.1} nm",
            unit,
            wavelengths.first().copied().unwrap_or_default(),
            wavelengths.last().copied().unwrap_or_default()
        );
        Ok(Self {
            unit,
            coefficients,
            wavelengths,
            bins,
            sensitivity,
            linearization,
            curves,
        })
    }

    pub fn wavelength_coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

impl CalibrationData for CalibrationSet {
    fn unit(&self) -> u32 {
        self.unit
    }

    fn pixel_count(&self) -> usize {
        self.sensitivity.len()
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
