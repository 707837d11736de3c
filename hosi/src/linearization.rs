// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Fitting a unit's linearization coefficients.
//!
//! The sensor's counts aren't quite proportional to exposure. To measure how far off they are,
//! point the scanner at a stable light source, take a reading at its automatic exposure, then
//! ramp the integration time up and down around it (with the shutter open, then closed). Exposure
//! is proportional to the integration time plus the base offset, so the dark-subtracted peak
//! counts can be fitted against it as
//!
//! ```text
//! linear = exp(a · ln(observed) + b)
//! ```
//!
//! Good fits have an R² above 0.999. The resulting `a` and `b` go in the unit's `linCoefs` row.
use core::fmt::Debug;

use embedded_hal::serial;
use log::{debug, info};

use crate::calculations::Linearization;
use crate::driver::HosiDriver;
use crate::error::{Error, LibraryError};
use crate::util::argmax;

/// Multiples of the automatic exposure time to take readings at.
pub const EXPOSURE_MULTIPLIERS: [f64; 22] = [
    0.005, 0.006, 0.007, 0.008, 0.009, 0.01, 0.02, 0.05, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8,
    0.9, 1.0, 1.1, 1.2, 1.4, 1.6,
];

/// Readings at or below this integration time (µs) are skipped.
pub const MIN_INTEGRATION_US: u32 = 1000;

/// Raw counts above this are saturated.
pub const SATURATION_COUNT: f64 = 1000.0;

/// Standard deviation (in pixels) of the smoothing applied before reading the peak.
pub const SMOOTHING_SIGMA: f64 = 3.0;

/// Tilt positions with the shutter open and closed.
pub const OPEN_TILT: i32 = 500;
pub const CLOSED_TILT: i32 = 0;

/// A normalized Gaussian kernel, truncated at four standard deviations.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|offset| (-0.5 * (offset as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|weight| weight / total).collect()
}

/// Index into a slice of `len` values, reflecting about the edges (`c b a | a b c | c b a`).
fn reflect(index: i64, len: usize) -> usize {
    let len = len as i64;
    let period = 2 * len;
    let wrapped = index.rem_euclid(period);
    (if wrapped < len {
        wrapped
    } else {
        period - 1 - wrapped
    }) as usize
}

/// Gaussian smoothing, with the edges reflected.
pub fn gaussian_smooth(values: &[f64], sigma: f64) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as i64;
    (0..values.len() as i64)
        .map(|center| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    weight * values[reflect(center + k as i64 - radius, values.len())]
                })
                .sum()
        })
        .collect()
}

/// The integration times to ramp through for a given automatic exposure.
pub fn ramp_integration_times(automatic_us: i64) -> Vec<u32> {
    EXPOSURE_MULTIPLIERS
        .iter()
        .map(|multiplier| (automatic_us as f64 * multiplier) as i64)
        .filter(|time| *time > i64::from(MIN_INTEGRATION_US))
        .filter_map(|time| u32::try_from(time).ok())
        .collect()
}

/// The peak readings at one integration time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RampSample {
    pub integration_time_us: u32,
    /// Smoothed light counts at the peak pixel.
    pub light_peak: f64,
    /// Unsmoothed light counts at the peak pixel, for the saturation check.
    pub raw_peak: f64,
    /// Smoothed dark counts at the peak pixel.
    pub dark_peak: f64,
}

/// One reading used in the fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitPoint {
    pub integration_time_us: u32,
    /// Dark-subtracted counts.
    pub observed: f64,
    /// The counts expected from a linear sensor.
    pub expected: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FitReport {
    pub linearization: Linearization,
    pub r_squared: f64,
    pub points: Vec<FitPoint>,
}

/// Fit linearization coefficients to a ramp.
///
/// Saturated readings and readings no brighter than dark are dropped. The expected counts scale
/// the brightest reading by relative exposure, and the fit is a least squares line through the
/// logs of observed and expected counts. R² is measured on the counts themselves.
pub fn fit(
    samples: &[RampSample],
    base_integration_offset_us: f64,
) -> Result<FitReport, LibraryError> {
    let usable: Vec<(u32, f64)> = samples
        .iter()
        .filter(|sample| sample.raw_peak <= SATURATION_COUNT)
        .map(|sample| {
            (
                sample.integration_time_us,
                sample.light_peak - sample.dark_peak,
            )
        })
        .filter(|(_, observed)| *observed > 0.0)
        .collect();
    debug!(
        "{} of {} ramp readings are usable",
        usable.len(),
        samples.len()
    );
    if usable.len() < 2 {
        return Err(LibraryError::InsufficientData(
            "fewer than two unsaturated readings brighter than dark",
        ));
    }
    let max_time = usable
        .iter()
        .map(|(time, _)| f64::from(*time))
        .fold(f64::NEG_INFINITY, f64::max);
    let max_observed = usable
        .iter()
        .map(|(_, observed)| *observed)
        .fold(f64::NEG_INFINITY, f64::max);
    let mut points: Vec<FitPoint> = usable
        .iter()
        .map(|(time, observed)| FitPoint {
            integration_time_us: *time,
            observed: *observed,
            expected: (f64::from(*time) + base_integration_offset_us)
                / (max_time + base_integration_offset_us)
                * max_observed,
        })
        .collect();
    points.sort_by_key(|point| point.integration_time_us);

    let count = points.len() as f64;
    let xs: Vec<f64> = points.iter().map(|point| point.observed.ln()).collect();
    let ys: Vec<f64> = points.iter().map(|point| point.expected.ln()).collect();
    let mean_x = xs.iter().sum::<f64>() / count;
    let mean_y = ys.iter().sum::<f64>() / count;
    let spread: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    if spread == 0.0 {
        return Err(LibraryError::InsufficientData(
            "every usable reading has the same peak",
        ));
    }
    let covariance: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let exponent = covariance / spread;
    let linearization = Linearization::new(exponent, mean_y - exponent * mean_x);

    let mean_expected = points.iter().map(|point| point.expected).sum::<f64>() / count;
    let ss_res: f64 = points
        .iter()
        .map(|point| (point.expected - linearization.apply(point.observed)).powi(2))
        .sum();
    let ss_tot: f64 = points
        .iter()
        .map(|point| (point.expected - mean_expected).powi(2))
        .sum();
    Ok(FitReport {
        linearization,
        r_squared: 1.0 - ss_res / ss_tot,
        points,
    })
}

/// Peak counts at `pixel` for one reading at `integration_time_us`: smoothed and raw.
fn ramp_reading<S, E>(
    driver: &mut HosiDriver<S>,
    integration_time_us: u32,
    pixel: usize,
) -> Result<(f64, f64), Error<E>>
where
    S: serial::Read<u8, Error = E> + serial::Write<u8, Error = E>,
    E: Debug,
{
    driver.set_integration_time(integration_time_us)?;
    let reading = driver.probe()?;
    let smoothed = gaussian_smooth(&reading.counts, SMOOTHING_SIGMA);
    let at = |values: &[f64]| values.get(pixel).copied().unwrap_or_default();
    debug!(
        "Integration time {} µs, peak {}",
        integration_time_us,
        at(&smoothed)
    );
    Ok((at(&smoothed), at(&reading.counts)))
}

/// Run the whole procedure on a scanner facing a stable light source.
pub fn run_linearization<S, E>(
    driver: &mut HosiDriver<S>,
    base_integration_offset_us: f64,
) -> Result<FitReport, Error<E>>
where
    S: serial::Read<u8, Error = E> + serial::Write<u8, Error = E>,
    E: Debug,
{
    driver.move_tilt(OPEN_TILT)?;
    let automatic = driver.probe()?;
    let pixel = argmax(&automatic.counts)
        .ok_or(LibraryError::InsufficientData("the test reading was empty"))?;
    info!(
        "Automatic exposure {} µs, peak at pixel {}",
        automatic.integration_time_us, pixel
    );
    let times = ramp_integration_times(automatic.integration_time_us);
    let mut light = Vec::with_capacity(times.len());
    for time in &times {
        light.push(ramp_reading(driver, *time, pixel)?);
    }
    driver.move_tilt(CLOSED_TILT)?;
    let mut samples = Vec::with_capacity(times.len());
    for (time, (light_peak, raw_peak)) in times.iter().zip(light) {
        let (dark_peak, _) = ramp_reading(driver, *time, pixel)?;
        samples.push(RampSample {
            integration_time_us: *time,
            light_peak,
            raw_peak,
            dark_peak,
        });
    }
    let report = fit(&samples, base_integration_offset_us)?;
    info!(
        "Linearization coefficients {}, {} (R² {})",
        report.linearization.exponent, report.linearization.offset, report.r_squared
    );
    Ok(report)
}
