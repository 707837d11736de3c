// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The line-oriented ASCII protocol spoken by the scanner.
//!
//! Commands to the device are a single letter followed by an argument, with no terminator:
//!
//! | Command | Meaning | Acknowledgement |
//! |---------|---------|-----------------|
//! | `l500`  | tilt to 500 | a line starting with `t` |
//! | `p-20`  | pan to -20 | a line starting with `p` |
//! | `t8000` | integrate for 8000 µs | a line starting with `i` |
//! | `r`     | read one auto-exposed spectrum | a line starting with `0` |
//! | `h…,`   | start a scan | a scan header line, then samples |
//!
//! During a scan, the device sends a header (`h,unit,panStart,…`), then one line per spectrum
//! (`pan,tilt,kind,integration,saturation,counts…`), then a line starting with `x`.
use core::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::cube::{AxisRange, ScanGeometry};
use crate::error::ProtocolError;
use crate::util::{parse_counts, parse_field};

/// The number of fields before the counts in a spectrum line.
pub const SAMPLE_PREFIX_FIELDS: usize = 5;

const HEADER_FIELDS: usize = 11;

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FrameKind {
    /// Shutter closed.
    Dark = 0,
    Light = 1,
    /// Anything else the device reports; not used for conversion.
    Other = 2,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Axis {
    Pan,
    Tilt,
}

/// The header the device sends at the start of a scan.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScanHeader {
    pub unit: u32,
    pub geometry: ScanGeometry,
}

impl ScanHeader {
    fn parse(line: &str, fields: &[&str]) -> Result<Self, ProtocolError> {
        if fields.len() < HEADER_FIELDS {
            return Err(ProtocolError::decode(
                line,
                format!("header has {} fields", fields.len()),
            ));
        }
        let field = |index, name| parse_field::<i32>(line, fields, index, name);
        Ok(Self {
            unit: parse_field(line, fields, 1, "unit")?,
            geometry: ScanGeometry {
                pan: AxisRange::new(
                    field(2, "pan start")?,
                    field(3, "pan stop")?,
                    field(4, "pan step")?,
                ),
                tilt: AxisRange::new(
                    field(5, "tilt start")?,
                    field(6, "tilt stop")?,
                    field(7, "tilt step")?,
                ),
                max_integration_us: parse_field(line, fields, 8, "maximum integration time")?,
                boxcar: parse_field(line, fields, 9, "boxcar width")?,
                dark_repeat_ms: parse_field(line, fields, 10, "dark repeat interval")?,
            },
        })
    }
}

/// One spectrum taken during a scan.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectrumSample {
    pub pan: i32,
    pub tilt: i32,
    pub kind: FrameKind,
    pub integration_time_us: i64,
    /// How far past saturation the device had to reduce exposure. Zero when not saturated.
    pub saturation: i32,
    /// Raw counts, one per spectral bin.
    pub counts: Vec<f64>,
}

impl SpectrumSample {
    fn parse(line: &str, fields: &[&str]) -> Result<Self, ProtocolError> {
        let kind: i64 = parse_field(line, fields, 2, "frame kind")?;
        let kind = u8::try_from(kind)
            .ok()
            .and_then(|kind| FrameKind::try_from(kind).ok())
            .ok_or(ProtocolError::UnknownFrameKind(kind))?;
        Ok(Self {
            pan: parse_field(line, fields, 0, "pan position")?,
            tilt: parse_field(line, fields, 1, "tilt position")?,
            kind,
            integration_time_us: parse_field(line, fields, 3, "integration time")?,
            saturation: parse_field(line, fields, 4, "saturation")?,
            counts: parse_counts(line, fields, SAMPLE_PREFIX_FIELDS)?,
        })
    }
}

/// The response to a single read (`r`): the exposure the device picked and the raw counts.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeSpectrum {
    pub integration_time_us: i64,
    pub counts: Vec<f64>,
}

impl ProbeSpectrum {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let fields: Vec<&str> = line.trim_end().split(',').collect();
        Ok(Self {
            integration_time_us: parse_field(line, &fields, 3, "integration time")?,
            counts: parse_counts(
                line,
                fields
                    .iter()
                    .take_while(|field| !field.is_empty())
                    .copied()
                    .collect::<Vec<_>>()
                    .as_slice(),
                SAMPLE_PREFIX_FIELDS,
            )?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    PositionSettled(Axis),
    IntegrationTimeSet,
    ScanHeader(ScanHeader),
    Sample(SpectrumSample),
    Probe(ProbeSpectrum),
    Terminator,
}

/// Turns lines into [`Event`]s.
///
/// Spectrum lines are only recognized by their field count, so the decoder has to know the
/// spectral length of the scan in progress.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Decoder {
    spectral_length: Option<usize>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or clear) the spectral length expected for sample lines.
    pub fn set_spectral_length(&mut self, spectral_length: Option<usize>) {
        self.spectral_length = spectral_length;
    }

    pub fn spectral_length(&self) -> Option<usize> {
        self.spectral_length
    }

    /// Decode one line. `Ok(None)` means the line isn't something the pipeline acts on.
    pub fn decode(&self, line: &str) -> Result<Option<Event>, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.starts_with('x') {
            return Ok(Some(Event::Terminator));
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields[0] == "h" {
            return ScanHeader::parse(line, &fields).map(|header| Some(Event::ScanHeader(header)));
        }
        if let Some(spectral_length) = self.spectral_length {
            if fields.len() == spectral_length + SAMPLE_PREFIX_FIELDS {
                return SpectrumSample::parse(line, &fields).map(|sample| Some(Event::Sample(sample)));
            }
        }
        let event = match line.chars().next() {
            Some('t') => Some(Event::PositionSettled(Axis::Tilt)),
            Some('p') => Some(Event::PositionSettled(Axis::Pan)),
            Some('i') => Some(Event::IntegrationTimeSet),
            Some('0') if fields.len() > SAMPLE_PREFIX_FIELDS => {
                Some(Event::Probe(ProbeSpectrum::parse(line)?))
            }
            _ => None,
        };
        Ok(event)
    }
}

/// Commands sent to the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    Tilt(i32),
    Pan(i32),
    IntegrationTime(u32),
    Read,
    StartScan(ScanGeometry),
}

impl Command {
    /// The first character of the line acknowledging this command, if there is one.
    pub fn acknowledgement(&self) -> Option<char> {
        match self {
            Self::Tilt(_) => Some('t'),
            Self::Pan(_) => Some('p'),
            Self::IntegrationTime(_) => Some('i'),
            Self::Read => Some('0'),
            Self::StartScan(_) => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tilt(position) => write!(f, "l{}", position),
            Self::Pan(position) => write!(f, "p{}", position),
            Self::IntegrationTime(microseconds) => write!(f, "t{}", microseconds),
            Self::Read => f.write_str("r"),
            Self::StartScan(geometry) => write!(
                f,
                "h{},{},{},{},{},{},{},{},{},",
                geometry.pan.start,
                geometry.pan.stop,
                geometry.pan.step,
                geometry.tilt.start,
                geometry.tilt.stop,
                geometry.tilt.step,
                geometry.max_integration_us,
                geometry.boxcar,
                geometry.dark_repeat_ms
            ),
        }
    }
}
