// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::fmt::Write;

pub const PIXEL_COUNT: usize = 288;

/// The unit with a complete set of calibration rows.
pub const EXAMPLE_UNIT: u32 = 1;

/// A unit with a short wavelength polynomial and too few sensitivities.
pub const INCOMPLETE_UNIT: u32 = 2;

pub const EXAMPLE_WAVELENGTH_COEFFICIENTS: [f64; 6] = [309.5, 2.71, -0.0012, 0.00000015, 0.0, 0.0];

/// Exponent and offset.
pub const EXAMPLE_LINEARIZATION: [f64; 2] = [1.02, -0.05];

/// Radiometric sensitivity for the example unit. The two pixels at each end are masked off.
fn example_sensitivity(pixel: usize) -> f64 {
    if pixel < 2 || pixel >= PIXEL_COUNT - 2 {
        0.0
    } else {
        0.0008 + 0.0004 * (pixel as f64 / PIXEL_COUNT as f64)
    }
}

fn write_row<I, T>(out: &mut String, unit: u32, tag: &str, values: I)
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let _ = write!(out, "{},{},", unit, tag);
    for value in values {
        let _ = write!(out, "{},", value);
    }
    out.push('\n');
}

/// Calibration file contents for two units, with a header row that isn't a record.
pub fn calibration_data() -> String {
    let mut out = String::from("unit,tag,values\n");
    write_row(&mut out, EXAMPLE_UNIT, "wavCoef", EXAMPLE_WAVELENGTH_COEFFICIENTS);
    write_row(
        &mut out,
        EXAMPLE_UNIT,
        "radSens",
        (0..PIXEL_COUNT).map(example_sensitivity),
    );
    write_row(&mut out, EXAMPLE_UNIT, "linCoefs", EXAMPLE_LINEARIZATION);
    write_row(
        &mut out,
        INCOMPLETE_UNIT,
        "wavCoef",
        &EXAMPLE_WAVELENGTH_COEFFICIENTS[..5],
    );
    write_row(&mut out, INCOMPLETE_UNIT, "radSens", [0.001; 100]);
    write_row(&mut out, INCOMPLETE_UNIT, "linCoefs", EXAMPLE_LINEARIZATION);
    out
}

fn gaussian(wavelength: f64, peak: f64, width: f64) -> f64 {
    (-0.5 * ((wavelength - peak) / width).powi(2)).exp()
}

/// Spectral sensitivity file contents: the seven base curves from 300 to 1100 nm, plus three
/// honeybee photoreceptors.
pub fn spectral_sensitivity_data() -> String {
    let wavelengths: Vec<u32> = (300..=1100).collect();
    type Curve = fn(f64) -> f64;
    let curves: [(&str, &str, Curve); 10] = [
        ("base", "cieX", |w| {
            1.06 * gaussian(w, 599.0, 38.0) + 0.36 * gaussian(w, 446.0, 19.0)
        }),
        ("base", "cieY", |w| gaussian(w, 556.0, 46.0)),
        ("base", "cieZ", |w| 1.78 * gaussian(w, 449.0, 22.0)),
        ("base", "chlA", |w| {
            gaussian(w, 430.0, 14.0) + 0.75 * gaussian(w, 662.0, 9.0)
        }),
        ("base", "chlB", |w| {
            gaussian(w, 453.0, 15.0) + 0.55 * gaussian(w, 642.0, 10.0)
        }),
        ("base", "nIR", |w| gaussian(w, 850.0, 60.0)),
        ("base", "nUV", |w| gaussian(w, 360.0, 20.0)),
        ("honeybee", "uv", |w| gaussian(w, 344.0, 30.0)),
        ("honeybee", "blue", |w| gaussian(w, 436.0, 32.0)),
        ("honeybee", "green", |w| gaussian(w, 544.0, 36.0)),
    ];

    let mut out = String::from("base,cieWav,");
    for wavelength in &wavelengths {
        let _ = write!(out, "{},", wavelength);
    }
    out.push('\n');
    for (group, name, curve) in curves.iter() {
        let _ = write!(out, "{},{},", group, name);
        for wavelength in &wavelengths {
            let _ = write!(out, "{:.6},", curve(f64::from(*wavelength)));
        }
        out.push('\n');
    }
    out
}
