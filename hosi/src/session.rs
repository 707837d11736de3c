// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The state of one acquisition session, fed one line at a time.
//!
//! A [`ScanSession`] owns everything a scan touches: the decoder, the dark frames, the cube and
//! its derived images, the raw log that gets saved with the scan, the selected cell, and the
//! reflectance reference. Lines come in through [`ScanSession::handle_line`] (from the device, or
//! from a saved scan with [`ScanSession::replay`]), and a [`FinishedScan`] comes out when a scan
//! is finalized.
use core::fmt;
use std::io::BufRead;

use image::RgbImage;
use log::{debug, info, warn};

use crate::calculations::convert_sample;
use crate::calibration::{CalibrationLibrary, CalibrationSet};
use crate::colorimetry::DerivedValues;
use crate::common::CalibrationData;
use crate::config::{AcquisitionConfig, HeaderPolicy, PreviewMode, SchedulingPolicy};
use crate::cube::{Cell, ScanCube, ScanGeometry};
use crate::dark::DarkFrames;
use crate::error::{LibraryError, ProtocolError};
use crate::export;
use crate::protocol::{Decoder, Event, FrameKind, ScanHeader, SpectrumSample};
use crate::reflectance::{ReflectanceReference, WhiteBalance};
use crate::render;

/// Where a scan is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanState {
    /// No scan, or the last one has been finalized.
    Idle,
    /// A header has been received, but no light samples yet.
    Allocated,
    Filling,
    /// Being finalized. The session returns to `Idle` before handing back the result.
    Done,
}

/// The short status line shown to the user.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Ready,
    Starting,
    /// Percent of the cells scanned so far.
    Progress(u32),
    Done,
    InvalidPanTilt,
    /// The unit has no (or incomplete) calibration, so only counts are being stored.
    MissingCalibration,
    Disconnected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("Ready"),
            Self::Starting => f.write_str("Starting"),
            Self::Progress(percent) => write!(f, "{}% done", percent),
            Self::Done => f.write_str("Done"),
            Self::InvalidPanTilt => f.write_str("Invalid pan/tilt"),
            Self::MissingCalibration => f.write_str("Missing calibration data"),
            Self::Disconnected => f.write_str("Disconnected"),
        }
    }
}

/// Where the lines of a finished scan came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanOrigin {
    Device,
    /// Replayed from a saved scan. These aren't saved again.
    Import,
}

/// A finalized scan, ready to be saved.
#[derive(Clone, Debug, PartialEq)]
pub struct FinishedScan {
    origin: ScanOrigin,
    unit: u32,
    calibrated: bool,
    log: String,
    wavelengths: Vec<f64>,
    cube: ScanCube,
    preview: RgbImage,
}

impl FinishedScan {
    pub fn origin(&self) -> ScanOrigin {
        self.origin
    }

    pub fn unit(&self) -> u32 {
        self.unit
    }

    /// Whether the cube holds radiance (`true`) or dark-subtracted counts.
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Every line received during the scan, terminator included.
    pub fn log(&self) -> &str {
        &self.log
    }

    /// The wavelength of each spectral bin. Empty for an uncalibrated scan.
    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn cube(&self) -> &ScanCube {
        &self.cube
    }

    /// The RGB render, with neutral white balance.
    pub fn preview(&self) -> &RgbImage {
        &self.preview
    }

    /// The saved CSV: the raw log, then the table of radiance values.
    pub fn csv_contents(&self) -> String {
        let mut contents = self.log.clone();
        contents.push_str(&export::le_values_table(&self.cube, &self.wavelengths));
        contents
    }
}

/// One acquisition session. See the [module documentation](self).
#[derive(Debug)]
pub struct ScanSession {
    library: CalibrationLibrary,
    config: AcquisitionConfig,
    decoder: Decoder,
    darks: DarkFrames,
    state: ScanState,
    status: Status,
    unit: Option<u32>,
    calibration: Option<CalibrationSet>,
    cube: Option<ScanCube>,
    log: String,
    pending: Option<SpectrumSample>,
    selection: Option<Cell>,
    reflectance: Option<ReflectanceReference>,
    white_balance: WhiteBalance,
}

impl ScanSession {
    pub fn new(library: CalibrationLibrary, config: AcquisitionConfig) -> Self {
        Self {
            library,
            config,
            decoder: Decoder::new(),
            darks: DarkFrames::new(),
            state: ScanState::Idle,
            status: Status::Ready,
            unit: None,
            calibration: None,
            cube: None,
            log: String::new(),
            pending: None,
            selection: None,
            reflectance: None,
            white_balance: WhiteBalance::NEUTRAL,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn library(&self) -> &CalibrationLibrary {
        &self.library
    }

    /// The calibration of the current (or last) scan's unit, if it has one.
    pub fn calibration(&self) -> Option<&CalibrationSet> {
        self.calibration.as_ref()
    }

    /// The current (or last) scan's cube.
    pub fn cube(&self) -> Option<&ScanCube> {
        self.cube.as_ref()
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.state, ScanState::Allocated | ScanState::Filling)
    }

    pub fn set_disconnected(&mut self) {
        warn!("Scanner disconnected");
        self.status = Status::Disconnected;
    }

    pub fn preview_mode(&self) -> PreviewMode {
        self.config.preview
    }

    pub fn set_preview_mode(&mut self, mode: PreviewMode) {
        self.config.preview = mode;
    }

    /// Step to the next live preview mode.
    pub fn cycle_preview_mode(&mut self) -> PreviewMode {
        self.config.preview = self.config.preview.next();
        self.config.preview
    }

    /// Check a scan request before it is sent to the device.
    pub fn request_start(&mut self, geometry: &ScanGeometry) -> Result<(), LibraryError> {
        if self.is_scanning() && self.config.header_policy == HeaderPolicy::Reject {
            return Err(LibraryError::ScanInProgress);
        }
        if let Err(err) = geometry.validate() {
            self.status = Status::InvalidPanTilt;
            return Err(err);
        }
        self.status = Status::Starting;
        Ok(())
    }

    /// Take one line from the device.
    ///
    /// Lines that can't be decoded are logged and dropped. The only error is a header refused
    /// because a scan is in progress under [`HeaderPolicy::Reject`].
    pub fn handle_line(&mut self, line: &str) -> Result<Option<FinishedScan>, LibraryError> {
        self.tick();
        let line = line.trim_end_matches(['\r', '\n']);
        let event = match self.decoder.decode(line) {
            Ok(Some(event)) => event,
            Ok(None) => {
                if self.is_scanning() {
                    debug!("Ignoring line {:?}", line);
                    self.record(line);
                }
                return Ok(None);
            }
            Err(err) => {
                warn!("Dropping line: {}", err);
                if self.is_scanning() {
                    self.record(line);
                }
                return Ok(None);
            }
        };
        match event {
            Event::ScanHeader(header) => {
                if self.is_scanning() && self.config.header_policy == HeaderPolicy::Reject {
                    warn!("Rejecting scan header while a scan is in progress");
                    return Err(LibraryError::ScanInProgress);
                }
                let previous = if self.is_scanning() {
                    info!("New scan header, finishing the current scan first");
                    self.finalize()
                } else {
                    None
                };
                self.record(line);
                self.begin(header);
                Ok(previous)
            }
            Event::Sample(sample) => {
                if !self.is_scanning() {
                    debug!("Ignoring a sample with no scan in progress");
                    return Ok(None);
                }
                self.record(line);
                match self.config.scheduling() {
                    SchedulingPolicy::Immediate => self.process(sample),
                    SchedulingPolicy::Deferred => self.pending = Some(sample),
                }
                Ok(None)
            }
            Event::Terminator => {
                if !self.is_scanning() {
                    debug!("Ignoring terminator with no scan in progress");
                    return Ok(None);
                }
                self.record(line);
                Ok(self.finalize())
            }
            Event::PositionSettled(_) | Event::IntegrationTimeSet | Event::Probe(_) => {
                if self.is_scanning() {
                    debug!("Ignoring {:?} during a scan", line);
                    self.record(line);
                }
                Ok(None)
            }
        }
    }

    /// Process a sample deferred by the previous line, if there is one.
    pub fn tick(&mut self) {
        if let Some(sample) = self.pending.take() {
            self.process(sample);
        }
    }

    /// Stop the scan in progress, finalizing what has been collected so far.
    pub fn request_stop(&mut self) -> Option<FinishedScan> {
        if !self.is_scanning() {
            return None;
        }
        info!("Stopping scan");
        self.tick();
        self.record("x");
        self.finalize()
    }

    /// Rebuild a scan from a saved scan file, stopping at its terminator.
    ///
    /// A file without a terminator is finalized at the end of the input.
    pub fn replay<R: BufRead>(&mut self, reader: R) -> Result<Option<FinishedScan>, LibraryError> {
        if self.is_scanning() {
            return Err(LibraryError::ScanInProgress);
        }
        for line in reader.lines() {
            if let Some(mut finished) = self.handle_line(&line?)? {
                finished.origin = ScanOrigin::Import;
                return Ok(Some(finished));
            }
        }
        Ok(self.request_stop().map(|mut finished| {
            finished.origin = ScanOrigin::Import;
            finished
        }))
    }

    fn record(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }

    fn begin(&mut self, header: ScanHeader) {
        let ScanHeader { unit, geometry } = header;
        self.pending = None;
        self.darks.clear();
        self.clear_reflectance();
        self.selection = None;
        let cube = match ScanCube::allocate(geometry, self.config.pixel_count) {
            Ok(cube) => cube,
            Err(err) => {
                warn!("Ignoring scan header: {}", err);
                self.status = Status::InvalidPanTilt;
                self.log.clear();
                return;
            }
        };
        info!(
            "Starting a {} by {} scan on unit {} with {} spectral bins",
            cube.pan_dim(),
            cube.tilt_dim(),
            unit,
            cube.spectral_length()
        );
        self.calibration = match self.library.calibration_for(unit, self.config.pixel_count) {
            Ok(calibration) => {
                self.status = Status::Starting;
                Some(calibration)
            }
            Err(err) => {
                warn!("{}; only dark-subtracted counts will be stored", err);
                self.status = Status::MissingCalibration;
                None
            }
        };
        self.decoder
            .set_spectral_length(Some(cube.spectral_length()));
        self.unit = Some(unit);
        self.cube = Some(cube);
        self.state = ScanState::Allocated;
    }

    fn process(&mut self, sample: SpectrumSample) {
        if let Err(err) = self.process_sample(sample) {
            warn!("Dropping sample: {}", err);
        }
    }

    fn process_sample(&mut self, sample: SpectrumSample) -> Result<(), ProtocolError> {
        let cube = match self.cube.as_mut() {
            Some(cube) if self.state != ScanState::Idle => cube,
            _ => return Ok(()),
        };
        match sample.kind {
            FrameKind::Dark => {
                self.darks.record(sample.integration_time_us, sample.counts);
                return Ok(());
            }
            FrameKind::Other => return Ok(()),
            FrameKind::Light => (),
        }
        let cell = cube.cell_for(sample.pan, sample.tilt)?;
        let counts = match self
            .darks
            .subtract(sample.integration_time_us, &sample.counts)
        {
            Some(counts) => counts,
            None => {
                debug!(
                    "No dark reading at {} µs for pan {}, tilt {}",
                    sample.integration_time_us, sample.pan, sample.tilt
                );
                return Ok(());
            }
        };
        match &self.calibration {
            Some(calibration) => {
                let converted = convert_sample(
                    calibration,
                    cube.geometry().boxcar,
                    &counts,
                    sample.integration_time_us as f64,
                    self.config.base_integration_offset_us,
                );
                cube.accumulate(cell, sample.pan, sample.tilt, &converted.radiance);
                let values =
                    DerivedValues::from_channels(&converted.channels, self.config.luminance_scale);
                cube.store_derived(cell, &values, sample.saturation);
                self.status = Status::Progress(cube.progress(cell));
            }
            None => cube.accumulate(cell, sample.pan, sample.tilt, &counts),
        }
        self.state = ScanState::Filling;
        Ok(())
    }

    fn finalize(&mut self) -> Option<FinishedScan> {
        self.tick();
        let cube = self.cube.as_mut()?;
        self.state = ScanState::Done;
        cube.sanitize();
        let wavelengths = match &self.calibration {
            Some(calibration) => calibration.boxcar_wavelengths(cube.geometry().boxcar),
            None => Vec::new(),
        };
        let finished = FinishedScan {
            origin: ScanOrigin::Device,
            unit: self.unit.unwrap_or_default(),
            calibrated: self.calibration.is_some(),
            log: std::mem::take(&mut self.log),
            wavelengths,
            preview: render::render_srgb(cube.images(), cube.maxima()),
            cube: cube.clone(),
        };
        info!(
            "Scan finished with {} of {} cells filled",
            cube.filled_count(),
            cube.pan_dim() * cube.tilt_dim()
        );
        self.decoder.set_spectral_length(None);
        self.selection = None;
        self.pending = None;
        if self.status != Status::MissingCalibration {
            self.status = Status::Done;
        }
        self.state = ScanState::Idle;
        Some(finished)
    }

    /// Select a cell, clamping the indices into the cube.
    pub fn select(&mut self, pan: usize, tilt: usize) -> Result<Cell, LibraryError> {
        let cell = self.cube.as_ref().ok_or(LibraryError::NoScan)?.clamp(pan, tilt);
        self.selection = Some(cell);
        Ok(cell)
    }

    pub fn selection(&self) -> Option<Cell> {
        self.selection
    }

    /// Use the selected cell as a reflectance reference of `percent`, and white balance the
    /// previews to it.
    pub fn set_reflectance(&mut self, percent: f64) -> Result<(), LibraryError> {
        let cube = self.cube.as_ref().ok_or(LibraryError::NoScan)?;
        let cell = self.selection.ok_or(LibraryError::NoSelection)?;
        let reference = ReflectanceReference::from_cell(cube, cell, percent)?;
        self.white_balance =
            WhiteBalance::from_reference(cube.images(), cube.image_row(cell), cell.pan);
        info!(
            "Reflectance reference set to {}% at pan {}, tilt {}",
            percent, cell.pan, cell.tilt
        );
        self.reflectance = Some(reference);
        Ok(())
    }

    pub fn clear_reflectance(&mut self) {
        if self.reflectance.take().is_some() {
            debug!("Reflectance reference cleared");
        }
        self.white_balance = WhiteBalance::NEUTRAL;
    }

    pub fn reflectance(&self) -> Option<&ReflectanceReference> {
        self.reflectance.as_ref()
    }

    pub fn white_balance(&self) -> WhiteBalance {
        self.white_balance
    }

    /// A cell's spectrum: radiance, or percent reflectance while a reference is set.
    pub fn spectrum(&self, cell: Cell) -> Option<Vec<f64>> {
        let spectrum = self.cube.as_ref()?.spectrum(cell)?;
        Some(match &self.reflectance {
            Some(reference) => reference.apply(spectrum),
            None => spectrum.to_vec(),
        })
    }

    /// A cell's luminance in cd/m².
    pub fn luminance(&self, cell: Cell) -> Option<f64> {
        let cube = self.cube.as_ref()?;
        if cell.pan >= cube.pan_dim() || cell.tilt >= cube.tilt_dim() {
            return None;
        }
        cube.images()
            .luminance
            .get(cube.image_row(cell), cell.pan)
            .copied()
    }

    /// Render the current preview mode.
    pub fn render_preview(&self) -> Option<RgbImage> {
        let cube = self.cube.as_ref()?;
        Some(render::render_preview(
            cube.images(),
            cube.maxima(),
            self.config.preview,
            &self.white_balance,
            self.config.preview_gain(),
        ))
    }
}

#[cfg(test)]
mod test {
    use hosi_test_data::transcript::{self, DARK, LIGHT};

    use super::{ScanOrigin, ScanSession, ScanState, Status};
    use crate::config::{AcquisitionConfig, HeaderPolicy, SchedulingPolicy};
    use crate::cube::Cell;
    use crate::error::LibraryError;
    use crate::test::{calibration_library, example_geometry};

    fn session(scheduling: SchedulingPolicy) -> ScanSession {
        let config = AcquisitionConfig {
            scheduling: Some(scheduling),
            ..AcquisitionConfig::default()
        };
        ScanSession::new(calibration_library(), config)
    }

    fn header() -> String {
        transcript::header_line(1, (0, 8, 4), (0, 8, 4), 50000, 2, 500)
    }

    #[test]
    fn status_strings() {
        assert_eq!(Status::Progress(44).to_string(), "44% done");
        assert_eq!(Status::InvalidPanTilt.to_string(), "Invalid pan/tilt");
        assert_eq!(
            Status::MissingCalibration.to_string(),
            "Missing calibration data"
        );
    }

    #[test]
    fn header_allocates() {
        let mut session = session(SchedulingPolicy::Immediate);
        assert_eq!(session.state(), ScanState::Idle);
        assert_eq!(session.status(), Status::Ready);
        assert!(session.handle_line(&header()).unwrap().is_none());
        assert_eq!(session.state(), ScanState::Allocated);
        let cube = session.cube().unwrap();
        assert_eq!((cube.pan_dim(), cube.tilt_dim()), (3, 3));
        assert!(session.calibration().is_some());
    }

    #[test]
    fn sample_before_header_is_ignored() {
        let mut session = session(SchedulingPolicy::Immediate);
        let counts = transcript::light_counts(2, 500);
        session
            .handle_line(&transcript::sample_line(0, 0, LIGHT, 1000, 0, &counts))
            .unwrap();
        assert!(session.cube().is_none());
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[test]
    fn light_fills_cell() {
        let mut session = session(SchedulingPolicy::Immediate);
        let mut finished = None;
        for line in transcript::single_cell_scan() {
            if let Some(scan) = session.handle_line(&line).unwrap() {
                assert!(finished.is_none());
                finished = Some(scan);
            }
        }
        let finished = finished.unwrap();
        assert_eq!(finished.origin(), ScanOrigin::Device);
        assert!(finished.is_calibrated());
        assert_eq!(finished.cube().filled_count(), 1);
        assert!(finished.cube().is_filled(Cell::new(0, 0)));
        assert!(finished.cube().maxima().rgb > 1E-10);
        assert!(finished.cube().maxima().igu > 1E-10);
        assert_eq!(finished.wavelengths().len(), 144);
        assert!(finished.log().ends_with("x\n"));
        assert_eq!(session.state(), ScanState::Idle);
        assert_eq!(session.status(), Status::Done);
        // A second terminator doesn't finalize again.
        assert!(session.handle_line("x").unwrap().is_none());
    }

    #[test]
    fn progress_status() {
        let mut session = session(SchedulingPolicy::Immediate);
        let lines = transcript::full_scan();
        for line in lines.iter().take(12) {
            session.handle_line(line).unwrap();
        }
        // Three darks and the first three cells, then a new dark sweep and cell 3.
        assert_eq!(session.state(), ScanState::Filling);
        assert_eq!(session.status(), Status::Progress(33));
    }

    #[test]
    fn deferred_waits_for_tick() {
        let mut session = session(SchedulingPolicy::Deferred);
        session.handle_line(&header()).unwrap();
        session
            .handle_line(&transcript::sample_line(
                0,
                0,
                DARK,
                1000,
                0,
                &transcript::dark_counts(2),
            ))
            .unwrap();
        session
            .handle_line(&transcript::sample_line(
                4,
                4,
                LIGHT,
                1000,
                0,
                &transcript::light_counts(2, 600),
            ))
            .unwrap();
        assert_eq!(session.state(), ScanState::Allocated);
        session.tick();
        assert_eq!(session.state(), ScanState::Filling);
        assert!(session.cube().unwrap().is_filled(Cell::new(1, 1)));
    }

    #[test]
    fn out_of_bounds_sample_dropped() {
        let mut session = session(SchedulingPolicy::Immediate);
        session.handle_line(&header()).unwrap();
        session
            .handle_line(&transcript::sample_line(
                0,
                0,
                DARK,
                1000,
                0,
                &transcript::dark_counts(2),
            ))
            .unwrap();
        session
            .handle_line(&transcript::sample_line(
                12,
                0,
                LIGHT,
                1000,
                0,
                &transcript::light_counts(2, 600),
            ))
            .unwrap();
        assert_eq!(session.cube().unwrap().filled_count(), 0);
        assert_eq!(session.state(), ScanState::Allocated);
    }

    #[test]
    fn reject_policy() {
        let config = AcquisitionConfig {
            header_policy: HeaderPolicy::Reject,
            scheduling: Some(SchedulingPolicy::Immediate),
            ..AcquisitionConfig::default()
        };
        let mut session = ScanSession::new(calibration_library(), config);
        session.handle_line(&header()).unwrap();
        assert!(matches!(
            session.handle_line(&header()),
            Err(LibraryError::ScanInProgress)
        ));
        assert!(matches!(
            session.request_start(&example_geometry()),
            Err(LibraryError::ScanInProgress)
        ));
        assert_eq!(session.state(), ScanState::Allocated);
    }

    #[test]
    fn replacing_header_finalizes() {
        let mut session = session(SchedulingPolicy::Immediate);
        for line in transcript::single_cell_scan().iter().take(3) {
            session.handle_line(line).unwrap();
        }
        let previous = session.handle_line(&header()).unwrap().unwrap();
        assert_eq!(previous.cube().filled_count(), 1);
        assert_eq!(session.state(), ScanState::Allocated);
        assert_eq!(session.cube().unwrap().filled_count(), 0);
    }

    #[test]
    fn stop_finalizes_once() {
        let mut session = session(SchedulingPolicy::Deferred);
        for line in transcript::single_cell_scan().iter().take(3) {
            session.handle_line(line).unwrap();
        }
        let finished = session.request_stop().unwrap();
        // The deferred light sample is processed before finalizing.
        assert_eq!(finished.cube().filled_count(), 1);
        assert!(finished.log().ends_with("\nx\n"));
        assert!(session.request_stop().is_none());
        assert!(session.handle_line("x").unwrap().is_none());
    }

    #[test]
    fn invalid_start() {
        let mut session = session(SchedulingPolicy::Immediate);
        let mut geometry = example_geometry();
        geometry.tilt.stop = geometry.tilt.start;
        assert!(matches!(
            session.request_start(&geometry),
            Err(LibraryError::InvalidGeometry(_))
        ));
        assert_eq!(session.status(), Status::InvalidPanTilt);
        session.request_start(&example_geometry()).unwrap();
        assert_eq!(session.status(), Status::Starting);
    }

    #[test]
    fn oversized_header_is_ignored() {
        let mut session = session(SchedulingPolicy::Immediate);
        let wide = (-2_000_000_000, 2_000_000_000, 4);
        let huge = (0, 2_000_000_000, 1);
        for header in [
            transcript::header_line(1, wide, (0, 8, 4), 50000, 2, 500),
            transcript::header_line(1, huge, huge, 50000, 1, 500),
        ] {
            assert!(session.handle_line(&header).unwrap().is_none());
            assert_eq!(session.status(), Status::InvalidPanTilt);
            assert_eq!(session.state(), ScanState::Idle);
            assert!(session.cube().is_none());
        }
        session.handle_line(&header()).unwrap();
        assert_eq!(session.state(), ScanState::Allocated);
    }

    #[test]
    fn uncalibrated_unit_stores_counts() {
        let mut session = session(SchedulingPolicy::Immediate);
        session
            .handle_line(&transcript::header_line(
                hosi_test_data::INCOMPLETE_UNIT,
                (0, 8, 4),
                (0, 8, 4),
                50000,
                2,
                500,
            ))
            .unwrap();
        assert_eq!(session.status(), Status::MissingCalibration);
        assert!(session.calibration().is_none());
        session
            .handle_line(&transcript::sample_line(
                0,
                0,
                DARK,
                1000,
                0,
                &[100; 144],
            ))
            .unwrap();
        session
            .handle_line(&transcript::sample_line(
                0,
                0,
                LIGHT,
                1000,
                0,
                &[150; 144],
            ))
            .unwrap();
        let cube = session.cube().unwrap();
        assert!(cube.spectrum(Cell::new(0, 0)).unwrap().iter().all(|v| *v == 50.0));
        assert_eq!(cube.images().red.as_slice().iter().sum::<f64>(), 0.0);
        assert_eq!(session.status(), Status::MissingCalibration);
        let finished = session.handle_line("x").unwrap().unwrap();
        assert!(!finished.is_calibrated());
        assert_eq!(session.status(), Status::MissingCalibration);
    }

    #[test]
    fn reflectance_mode() {
        let mut session = session(SchedulingPolicy::Immediate);
        for line in transcript::single_cell_scan() {
            session.handle_line(&line).unwrap();
        }
        assert!(matches!(
            session.set_reflectance(100.0),
            Err(LibraryError::NoSelection)
        ));
        assert_eq!(session.select(0, 7).unwrap(), Cell::new(0, 2));
        let cell = session.select(0, 0).unwrap();
        session.set_reflectance(50.0).unwrap();
        let spectrum = session.spectrum(cell).unwrap();
        let radiance = session.cube().unwrap().spectrum(cell).unwrap().to_vec();
        for (reflectance, radiance) in spectrum.iter().zip(&radiance) {
            if *radiance == 0.0 {
                assert!(reflectance.is_nan());
            } else {
                assert!((reflectance - 50.0).abs() < 1E-9);
            }
        }
        assert_ne!(session.white_balance(), crate::reflectance::WhiteBalance::NEUTRAL);
        session.clear_reflectance();
        assert!(session.reflectance().is_none());
        assert_eq!(session.spectrum(cell).unwrap(), radiance.to_vec());
        assert_eq!(session.white_balance(), crate::reflectance::WhiteBalance::NEUTRAL);
        assert!(session.luminance(cell).unwrap() > 0.0);
        assert!(session.luminance(Cell::new(3, 0)).is_none());
    }

    #[test]
    fn header_clears_reflectance() {
        let mut session = session(SchedulingPolicy::Immediate);
        for line in transcript::single_cell_scan() {
            session.handle_line(&line).unwrap();
        }
        session.select(0, 0).unwrap();
        session.set_reflectance(100.0).unwrap();
        session.handle_line(&header()).unwrap();
        assert!(session.reflectance().is_none());
        assert!(session.selection().is_none());
    }

    #[test]
    fn replay_marks_import() {
        let mut session = session(SchedulingPolicy::Immediate);
        let mut saved = None;
        for line in transcript::single_cell_scan() {
            saved = saved.or(session.handle_line(&line).unwrap());
        }
        let saved = saved.unwrap();
        let mut importer = session_for_replay();
        let replayed = importer
            .replay(saved.csv_contents().as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(replayed.origin(), ScanOrigin::Import);
        assert_eq!(replayed.cube(), saved.cube());
        assert_eq!(replayed.preview(), saved.preview());
    }

    fn session_for_replay() -> ScanSession {
        session(SchedulingPolicy::Deferred)
    }
}
