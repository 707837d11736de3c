// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Acquisition and calibration pipeline for HOSI hyperspectral pan/tilt scanners.
//!
//! A HOSI unit is a small grating spectrometer (288 photosites) mounted on a pan/tilt head,
//! controlled over a serial link with a line-oriented ASCII protocol. During a scan the device
//! streams one line per spectrum: dark frames (shutter closed) and light frames at whatever
//! integration time its auto-exposure picked. This crate turns that stream into a calibrated
//! hyperspectral cube (tilt × pan × spectral bin) and a set of derived images.
//!
//! # Pipeline
//!
//! ```text
//! serial bytes ─▶ driver (lines) ─▶ protocol::Decoder ─▶ ScanSession
//!                                                         ├─ header  ─▶ ScanCube::allocate
//!                                                         ├─ dark    ─▶ DarkFrames::record
//!                                                         ├─ light   ─▶ DarkFrames::lookup
//!                                                         │             ─▶ calculations::convert_sample
//!                                                         │             ─▶ colorimetry::DerivedValues
//!                                                         │             ─▶ ScanCube::store
//!                                                         └─ x       ─▶ finalize ─▶ ScanSink
//! ```
//!
//! The conversion math lives in small free functions in [`calculations`] and [`colorimetry`] so
//! they can be tested and benchmarked on their own. The calibration constants are reached through
//! the [`CalibrationData`] trait, implemented by [`calibration::CalibrationSet`].
//!
//! # Transport
//!
//! [`driver::HosiDriver`] is generic over the `embedded-hal` 0.2 serial traits, using `nb` for the
//! non-blocking reads. With the `serialport` feature, [`serial::SerialPortAdapter`] provides those
//! traits on top of a host serial port.
//!
//! # Calibration
//!
//! Each unit has a row-oriented calibration file (wavelength polynomial, per-pixel radiometric
//! sensitivity, linearization coefficients), and all units share a spectral sensitivity file with
//! the CIE observer, chlorophyll absorption, and a library of animal photoreceptor curves. The
//! linearization coefficients are fitted with the procedure in [`linearization`].
//!
//! A unit with missing or short calibration data still scans, but only dark-subtracted counts
//! are stored and the session status says so.

pub mod calculations;
pub mod calibration;
pub mod colorimetry;
pub mod common;
pub mod config;
pub mod cube;
pub mod dark;
pub mod driver;
pub mod error;
pub mod export;
pub mod linearization;
pub mod protocol;
pub mod reflectance;
pub mod render;
#[cfg(feature = "serialport")]
pub mod serial;
pub mod session;
mod util;

#[cfg(test)]
mod test;

pub use calibration::{CalibrationLibrary, CalibrationSet, SpectralLibrary};
pub use common::{CalibrationData, PIXEL_COUNT};
pub use config::{AcquisitionConfig, HeaderPolicy, PreviewMode, SchedulingPolicy};
pub use cube::{Cell, ScanCube, ScanGeometry};
pub use driver::HosiDriver;
pub use error::{CalibrationError, Error, LibraryError, ProtocolError};
pub use export::{DirectorySink, ScanSink};
pub use protocol::{Command, Event, FrameKind};
pub use session::{FinishedScan, ScanSession, ScanState, Status};
