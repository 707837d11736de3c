// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The per-unit calibration file.
//!
//! Each row is `unit,tag,value,value,…,` where the tag is one of `wavCoef`, `radSens`, or
//! `linCoefs`. Rows that don't start with a unit number (headers, notes) are skipped.
use std::io;

use log::debug;

use crate::error::{CalibrationError, LibraryError};

#[derive(Clone, Debug, PartialEq)]
pub enum CalibrationRecord {
    WavelengthCoefficients { unit: u32, coefficients: Vec<f64> },
    RadiometricSensitivity { unit: u32, values: Vec<f64> },
    LinearizationCoefficients { unit: u32, coefficients: Vec<f64> },
}

impl CalibrationRecord {
    pub fn unit(&self) -> u32 {
        match self {
            Self::WavelengthCoefficients { unit, .. }
            | Self::RadiometricSensitivity { unit, .. }
            | Self::LinearizationCoefficients { unit, .. } => *unit,
        }
    }

    fn from_tag(unit: u32, tag: &str, values: Vec<f64>) -> Option<Self> {
        match tag {
            "wavCoef" => Some(Self::WavelengthCoefficients {
                unit,
                coefficients: values,
            }),
            "radSens" => Some(Self::RadiometricSensitivity { unit, values }),
            "linCoefs" => Some(Self::LinearizationCoefficients {
                unit,
                coefficients: values,
            }),
            _ => None,
        }
    }
}

/// Build a CSV reader for the loosely formatted calibration files.
pub(crate) fn csv_reader<R: io::Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Parse every record in a calibration file.
///
/// Empty cells (including the one left by a trailing comma) are ignored. A cell that isn't a
/// number fails the whole file, as does a row the CSV reader can't split.
pub fn read_records<R: io::Read>(reader: R) -> Result<Vec<CalibrationRecord>, LibraryError> {
    let mut records = Vec::new();
    for (index, row) in csv_reader(reader).records().enumerate() {
        let row = row?;
        let line = row
            .position()
            .map_or(index + 1, |position| position.line() as usize);
        let unit = match row.get(0).and_then(|cell| cell.parse::<u32>().ok()) {
            Some(unit) => unit,
            None => {
                debug!("Skipping calibration line {} without a unit number", line);
                continue;
            }
        };
        let tag = row.get(1).unwrap_or_default();
        let values = row
            .iter()
            .skip(2)
            .filter(|cell| !cell.is_empty())
            .map(|cell| {
                cell.parse::<f64>()
                    .map_err(|err| CalibrationError::Malformed {
                        line,
                        reason: format!("{:?} is not a number ({})", cell, err),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        match CalibrationRecord::from_tag(unit, tag, values) {
            Some(record) => records.push(record),
            None => debug!("Skipping unknown calibration tag {:?} for unit {}", tag, unit),
        }
    }
    Ok(records)
}
