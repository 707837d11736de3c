// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::io;

use thiserror::Error;

/// Failures interpreting a single line from the device.
///
/// None of these abort a scan; the line is dropped and the error logged.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unable to decode {line:?}: {reason}")]
    Decode { line: String, reason: String },

    #[error("unknown frame kind {0}")]
    UnknownFrameKind(i64),

    /// The sample's pan/tilt position falls outside of the allocated cube.
    #[error("sample at pan {pan}, tilt {tilt} is outside of the scan area")]
    OutOfBounds { pan: i32, tilt: i32 },
}

impl ProtocolError {
    pub(crate) fn decode(line: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            line: line.to_owned(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("malformed calibration record on line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// A unit is missing one or more of its coefficient arrays, or one is the wrong length.
    ///
    /// The counts are what was found in the file.
    #[error(
        "calibration incomplete for unit {unit}: {wavelength_coefficients} wavelength \
         coefficients, {sensitivities} sensitivities (expected {pixel_count}), \
         {linearization_coefficients} linearization coefficients"
    )]
    Incomplete {
        unit: u32,
        wavelength_coefficients: usize,
        sensitivities: usize,
        linearization_coefficients: usize,
        pixel_count: usize,
    },

    #[error("spectral sensitivity file has no {0} curve")]
    MissingBasis(&'static str),

    #[error("no receptor named {0}")]
    UnknownReceptor(String),
}

/// Errors that don't depend on the serial transport.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// Scan bounds where a stop isn't after its start, or a zero step or boxcar.
    #[error("invalid scan geometry: {0}")]
    InvalidGeometry(String),

    /// A scan header arrived while a scan is being filled, and the session rejects replacement.
    #[error("a scan is already in progress")]
    ScanInProgress,

    #[error("no cell is selected")]
    NoSelection,

    #[error("no scan has been allocated")]
    NoScan,

    /// Calibrated output was requested from a scan of an uncalibrated unit.
    #[error("the scan has no calibration")]
    Uncalibrated,

    #[error("invalid reference reflectance {0}%")]
    InvalidReflectance(f64),

    #[error("not enough usable data: {0}")]
    InsufficientData(&'static str),

    /// The device didn't send the expected acknowledgement in time.
    #[error("timed out waiting for a line starting with {0:?}")]
    Timeout(char),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// An existing spectrum export has a different number of rows than the spectrum being added.
    #[error("{path} has {existing} rows, expected {expected}")]
    RowCountMismatch {
        path: String,
        existing: usize,
        expected: usize,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl From<toml::de::Error> for LibraryError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Errors from talking to a device, generic over the serial transport's error type.
#[derive(Debug, Error)]
pub enum Error<E> {
    #[error("serial transport error: {0:?}")]
    Transport(E),

    #[error(transparent)]
    Library(#[from] LibraryError),
}

impl<E> From<ProtocolError> for Error<E> {
    fn from(err: ProtocolError) -> Self {
        Self::Library(err.into())
    }
}
