// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The shared spectral sensitivity file.
//!
//! `base` rows hold the integer wavelength axis (`cieWav`) and the seven basis curves. Every other
//! row is a photoreceptor, named `<species>_<receptor>` from its first two cells.
use std::fs::File;
use std::io;
use std::path::Path;

use log::{debug, warn};

use super::file::csv_reader;
use crate::colorimetry::BasisCurves;
use crate::error::{CalibrationError, LibraryError};

const WAVELENGTH_TAG: &str = "cieWav";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectralLibrary {
    wavelengths: Vec<i64>,
    bases: Vec<(String, Vec<f64>)>,
    receptors: Vec<(String, Vec<f64>)>,
}

/// Digits with at most one decimal point, and no sign or exponent.
fn is_plain_decimal(cell: &str) -> bool {
    let digits = cell.replacen('.', "", 1);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

/// Keep only the cells that are plain non-negative decimals.
fn receptor_values<'a>(cells: impl Iterator<Item = &'a str>) -> Vec<f64> {
    cells
        .filter(|cell| is_plain_decimal(cell))
        .filter_map(|cell| cell.parse::<f64>().ok())
        .collect()
}

fn numeric_cells<'a>(
    line: usize,
    cells: impl Iterator<Item = &'a str>,
) -> Result<Vec<f64>, CalibrationError> {
    cells
        .filter(|cell| !cell.is_empty())
        .map(|cell| {
            cell.parse::<f64>()
                .map_err(|err| CalibrationError::Malformed {
                    line,
                    reason: format!("{:?} is not a number ({})", cell, err),
                })
        })
        .collect()
}

/// Sample a table keyed by integer wavelength at each pixel's wavelength, rounded to the nearest
/// integer (ties to even). Pixels outside the table are zero.
pub fn resample(pixel_wavelengths: &[f64], table_wavelengths: &[i64], values: &[f64]) -> Vec<f64> {
    pixel_wavelengths
        .iter()
        .map(|wavelength| {
            let rounded = wavelength.round_ties_even() as i64;
            table_wavelengths
                .iter()
                .zip(values)
                .rev()
                .find(|(table_wavelength, _)| **table_wavelength == rounded)
                .map_or(0.0, |(_, value)| *value)
        })
        .collect()
}

impl SpectralLibrary {
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, LibraryError> {
        let mut library = Self::default();
        for (index, row) in csv_reader(reader).records().enumerate() {
            let row = row?;
            let line = row
                .position()
                .map_or(index + 1, |position| position.line() as usize);
            let group = row.get(0).unwrap_or_default();
            let name = row.get(1).unwrap_or_default();
            if group.is_empty() && name.is_empty() {
                continue;
            }
            if group == "base" {
                if name == WAVELENGTH_TAG {
                    library.wavelengths = numeric_cells(line, row.iter().skip(2))?
                        .into_iter()
                        .map(|wavelength| wavelength.round() as i64)
                        .collect();
                } else if BasisCurves::TAGS.iter().any(|tag| *tag == name) {
                    let values = numeric_cells(line, row.iter().skip(2))?;
                    library.bases.push((name.to_owned(), values));
                } else {
                    debug!("Skipping unknown base curve {:?}", name);
                }
            } else {
                let values = receptor_values(row.iter().skip(2));
                library
                    .receptors
                    .push((format!("{}_{}", group, name), values));
            }
        }
        if library.wavelengths.is_empty() {
            warn!("Spectral sensitivity data has no wavelength row");
        }
        Ok(library)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, LibraryError> {
        Self::from_reader(File::open(path)?)
    }

    /// The integer wavelengths every curve is tabulated at.
    pub fn wavelengths(&self) -> &[i64] {
        &self.wavelengths
    }

    pub fn basis(&self, tag: &str) -> Option<&[f64]> {
        self.bases
            .iter()
            .rev()
            .find(|(name, _)| name == tag)
            .map(|(_, values)| values.as_slice())
    }

    pub fn receptor_names(&self) -> impl Iterator<Item = &str> {
        self.receptors.iter().map(|(name, _)| name.as_str())
    }

    pub fn receptor(&self, name: &str) -> Option<&[f64]> {
        self.receptors
            .iter()
            .find(|(receptor, _)| receptor == name)
            .map(|(_, values)| values.as_slice())
    }

    /// All seven basis curves sampled at the given pixel wavelengths.
    pub fn resample_bases(&self, pixel_wavelengths: &[f64]) -> Result<BasisCurves, CalibrationError> {
        let mut curves = BasisCurves::zeroed(pixel_wavelengths.len());
        for tag in BasisCurves::TAGS {
            let values = self
                .basis(tag)
                .ok_or(CalibrationError::MissingBasis(*tag))?;
            if let Some(curve) = curves.curve_mut(tag) {
                *curve = resample(pixel_wavelengths, &self.wavelengths, values);
            }
        }
        Ok(curves)
    }

    pub fn resample_receptor(
        &self,
        name: &str,
        pixel_wavelengths: &[f64],
    ) -> Result<Vec<f64>, CalibrationError> {
        let values = self
            .receptor(name)
            .ok_or_else(|| CalibrationError::UnknownReceptor(name.to_owned()))?;
        Ok(resample(pixel_wavelengths, &self.wavelengths, values))
    }
}

#[cfg(test)]
mod test {
    use super::{is_plain_decimal, resample, SpectralLibrary};
    use crate::error::CalibrationError;

    const SMALL: &str = "\
base,cieWav,400,401,402,
base,cieX,0.1,0.2,0.3,
base,cieY,1,1,1,
base,cieZ,0,0,0,
base,chlA,0,0,0,
base,chlB,0,0,0,
base,nIR,0,0,0,
base,nUV,0,0,0,
bird,UVS,0.5,n/a,-0.1,0.25,
";

    #[test]
    fn resample_rounds_to_nearest_wavelength() {
        let table = [400, 401, 402];
        let values = [1.0, 2.0, 3.0];
        let resampled = resample(&[399.2, 400.4, 400.6, 401.5, 402.5, 410.0], &table, &values);
        // Ties go to the even wavelength.
        assert_eq!(resampled, vec![0.0, 1.0, 2.0, 3.0, 3.0, 0.0]);
    }

    #[test]
    fn parses_bases_and_receptors() {
        let library = SpectralLibrary::from_reader(SMALL.as_bytes()).unwrap();
        assert_eq!(library.wavelengths(), &[400, 401, 402]);
        assert_eq!(library.basis("cieX"), Some(&[0.1, 0.2, 0.3][..]));
        assert_eq!(library.receptor_names().collect::<Vec<_>>(), vec!["bird_UVS"]);
        assert_eq!(library.receptor("bird_UVS"), Some(&[0.5, 0.25][..]));
    }

    #[test]
    fn receptor_cells_must_be_plain_decimals() {
        let library = SpectralLibrary::from_reader(
            "base,cieWav,400,\nbee,green,1e-3,+2,.,0.5,.25,3.,7,1.2.3,inf,NaN,\n".as_bytes(),
        )
        .unwrap();
        assert_eq!(
            library.receptor("bee_green"),
            Some(&[0.5, 0.25, 3.0, 7.0][..])
        );
        assert!(is_plain_decimal("12"));
        assert!(!is_plain_decimal(""));
        assert!(!is_plain_decimal(" 1"));
    }

    #[test]
    fn resampled_bases() {
        let library = SpectralLibrary::from_reader(SMALL.as_bytes()).unwrap();
        let curves = library.resample_bases(&[401.1, 405.0]).unwrap();
        assert_eq!(curves.cie_x, vec![0.2, 0.0]);
        assert_eq!(curves.cie_y, vec![1.0, 0.0]);
    }

    #[test]
    fn missing_basis() {
        let library = SpectralLibrary::from_reader("base,cieWav,400,\nbase,cieX,1,\n".as_bytes())
            .unwrap();
        match library.resample_bases(&[400.0]) {
            Err(CalibrationError::MissingBasis(tag)) => assert_eq!(tag, "cieY"),
            other => panic!("expected a missing basis, got {:?}", other),
        }
    }

    #[test]
    fn unknown_receptor() {
        let library = SpectralLibrary::from_reader(SMALL.as_bytes()).unwrap();
        assert!(matches!(
            library.resample_receptor("bee_green", &[400.0]),
            Err(CalibrationError::UnknownReceptor(_))
        ));
    }

    #[test]
    fn example_library() {
        let library = crate::test::spectral_library();
        assert_eq!(library.wavelengths().len(), 801);
        assert_eq!(library.receptor_names().count(), 3);
    }
}
