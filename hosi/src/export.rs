// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Writing scans, spectra, and receptor images to disk.
//!
//! A finished scan is saved as `<directory>/<date>_<time>_<label>.csv` (the raw device log
//! followed by the radiance table) and `<…>_sRGB.png`. The other exports are written next to it,
//! named from the same base path.
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use log::{debug, info};

use crate::colorimetry::receptor_catch;
use crate::common::CalibrationData;
use crate::config::AcquisitionConfig;
use crate::cube::{Cell, Grid, ScanCube};
use crate::error::LibraryError;
use crate::reflectance::ReflectanceReference;
use crate::render;
use crate::session::{FinishedScan, ScanOrigin, ScanSession};

/// Radiance values are written with four significant figures, and exact zeros as `0`.
pub fn format_value(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        format!("{:.3e}", value)
    }
}

/// The table appended to a saved scan: one row per cell (tilt-major), each starting with the pan
/// and tilt position, under a header row of bin wavelengths.
pub fn le_values_table(cube: &ScanCube, wavelengths: &[f64]) -> String {
    let mut table = String::from("le values\npan,tilt,wavelength\n,");
    for wavelength in wavelengths {
        table.push_str(&format!(",{}", wavelength.trunc() as i64));
    }
    for cell in cube.cells() {
        let values: Vec<String> = cube
            .spectrum(cell)
            .unwrap_or_default()
            .iter()
            .map(|value| format_value(*value))
            .collect();
        table.push_str(&format!(
            "\n{},{},{}",
            cube.pan_position(cell.pan),
            cube.tilt_position(cell.tilt),
            values.join(",")
        ));
    }
    table.push('\n');
    table
}

/// `base` with `suffix` appended to the file name.
pub fn suffixed<P: AsRef<Path>>(base: P, suffix: &str) -> PathBuf {
    let mut name: OsString = base.as_ref().as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// The base path (no extension) for a scan saved at `timestamp`.
pub fn scan_base_path(directory: &Path, label: &str, timestamp: &NaiveDateTime) -> PathBuf {
    directory.join(format!(
        "{}_{}",
        timestamp.format("%Y-%-m-%-d_%H-%M-%S"),
        label
    ))
}

/// Somewhere to put finished scans.
pub trait ScanSink {
    fn save(&mut self, scan: &FinishedScan) -> Result<(), LibraryError>;
}

/// Saves scans as timestamped files in a directory.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectorySink {
    directory: PathBuf,
    label: String,
    last_base: Option<PathBuf>,
}

impl DirectorySink {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(directory: P, label: S) -> Self {
        Self {
            directory: directory.into(),
            label: label.into(),
            last_base: None,
        }
    }

    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self::new(config.scan_directory.clone(), config.scan_label.clone())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn set_label<S: Into<String>>(&mut self, label: S) {
        self.label = label.into();
    }

    /// The base path of the last scan saved, for naming its other exports.
    pub fn last_base(&self) -> Option<&Path> {
        self.last_base.as_deref()
    }

    fn save_at(&mut self, scan: &FinishedScan, timestamp: &NaiveDateTime) -> Result<(), LibraryError> {
        fs::create_dir_all(&self.directory)?;
        let base = scan_base_path(&self.directory, &self.label, timestamp);
        let csv_path = suffixed(&base, ".csv");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)?;
        file.write_all(scan.csv_contents().as_bytes())?;
        render::save_png(scan.preview(), suffixed(&base, "_sRGB.png"))?;
        info!("Saved scan to {}", csv_path.display());
        self.last_base = Some(base);
        Ok(())
    }
}

impl ScanSink for DirectorySink {
    fn save(&mut self, scan: &FinishedScan) -> Result<(), LibraryError> {
        if scan.origin() == ScanOrigin::Import {
            debug!("Not saving an imported scan");
            return Ok(());
        }
        self.save_at(scan, &Local::now().naive_local())
    }
}

/// The column name for a cell's spectrum in a spectrum export.
pub fn spectrum_column(cell: Cell, label: &str) -> String {
    format!("x{}_y{}_{}", cell.pan, cell.tilt, label)
}

/// Write a spectrum to `<base>_radiance.csv` (or `_reflectance.csv`).
///
/// A new file gets a wavelength column and the spectrum. An existing file gets the spectrum
/// appended as a new column, as long as it has one row per bin.
pub fn export_spectrum<P: AsRef<Path>>(
    base: P,
    column: &str,
    wavelengths: &[f64],
    values: &[f64],
    reflectance: bool,
) -> Result<PathBuf, LibraryError> {
    let kind = if reflectance {
        "_reflectance.csv"
    } else {
        "_radiance.csv"
    };
    let path = suffixed(base, kind);
    let records: Vec<Vec<String>> = if path.exists() {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)?;
        let mut records = Vec::new();
        for record in reader.records() {
            records.push(record?.iter().map(str::to_owned).collect::<Vec<_>>());
        }
        let existing = records.len().saturating_sub(1);
        if existing != values.len() {
            return Err(LibraryError::RowCountMismatch {
                path: path.display().to_string(),
                existing,
                expected: values.len(),
            });
        }
        records
            .into_iter()
            .enumerate()
            .map(|(index, mut record)| {
                record.push(match index {
                    0 => column.to_string(),
                    row => values[row - 1].to_string(),
                });
                record
            })
            .collect()
    } else {
        let mut records = vec![vec!["Wavelength".to_string(), column.to_string()]];
        records.extend(
            wavelengths
                .iter()
                .zip(values)
                .map(|(wavelength, value)| vec![wavelength.to_string(), value.to_string()]),
        );
        records
    };
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(&path)?;
    for record in &records {
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(path)
}

/// Export the session's selected cell, as reflectance if a reference is set.
pub fn export_selected_spectrum<P: AsRef<Path>>(
    session: &ScanSession,
    base: P,
    label: &str,
) -> Result<PathBuf, LibraryError> {
    let cube = session.cube().ok_or(LibraryError::NoScan)?;
    let cell = session.selection().ok_or(LibraryError::NoSelection)?;
    let calibration = session.calibration().ok_or(LibraryError::Uncalibrated)?;
    let values = session.spectrum(cell).ok_or(LibraryError::NoSelection)?;
    export_spectrum(
        base,
        &spectrum_column(cell, label),
        &calibration.boxcar_wavelengths(cube.geometry().boxcar),
        &values,
        session.reflectance().is_some(),
    )
}

/// Photon catch of one receptor for every cell, laid out like the derived images.
///
/// `receptor` has one sensitivity per pixel.
pub fn receptor_image<Clb: CalibrationData>(
    cube: &ScanCube,
    calibration: &Clb,
    receptor: &[f64],
    reflectance: Option<&ReflectanceReference>,
) -> Grid<f64> {
    let boxcar = cube.geometry().boxcar;
    let wavelengths = calibration.boxcar_wavelengths(boxcar);
    let mut image = Grid::new(cube.pan_dim(), cube.tilt_dim(), 0.0);
    for cell in cube.cells() {
        let spectrum = match (cube.spectrum(cell), reflectance) {
            (Some(spectrum), Some(reference)) => reference.apply(spectrum),
            (Some(spectrum), None) => spectrum.to_vec(),
            (None, _) => continue,
        };
        let catch = receptor_catch(
            &spectrum,
            &wavelengths,
            receptor,
            calibration.wavelength_bins(),
            boxcar,
        );
        image.set(cube.image_row(cell), cell.pan, catch);
    }
    image
}

/// Write a grid as CSV, one line per row.
pub fn write_grid<P: AsRef<Path>>(path: P, grid: &Grid<f64>) -> Result<(), LibraryError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    for row in grid.rows() {
        writer.write_record(row.iter().map(|value| value.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `<base>_<receptor>.csv` for each named receptor in the calibration library.
pub fn export_receptor_images<'a, P, I>(
    session: &ScanSession,
    base: P,
    receptors: I,
) -> Result<Vec<PathBuf>, LibraryError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a str>,
{
    let cube = session.cube().ok_or(LibraryError::NoScan)?;
    let calibration = session.calibration().ok_or(LibraryError::Uncalibrated)?;
    let mut written = Vec::new();
    for name in receptors {
        let receptor = session
            .library()
            .spectral()
            .resample_receptor(name, calibration.wavelengths())?;
        let image = receptor_image(cube, calibration, &receptor, session.reflectance());
        let path = suffixed(base.as_ref(), &format!("_{}.csv", name));
        write_grid(&path, &image)?;
        debug!("Wrote {} image to {}", name, path.display());
        written.push(path);
    }
    Ok(written)
}
