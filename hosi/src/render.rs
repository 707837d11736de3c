// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Rendering the derived images into 8-bit previews.
use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};

use crate::colorimetry::RunningMaxima;
use crate::config::PreviewMode;
use crate::cube::{DerivedImages, Grid};
use crate::error::LibraryError;
use crate::reflectance::WhiteBalance;

/// Display gamma applied after normalizing to the running maximum.
pub const GAMMA: f64 = 0.42;

/// How much blue each step of saturation degree adds in the saturation preview.
const SATURATION_BLUE_STEP: f64 = 5.0;

/// Normalize, gamma-encode, and scale one value to 0–255.
///
/// The sign of the value is kept through the power function, so negative values clip to black.
pub fn tone(value: f64, white_balance: f64, max: f64, gain: f64) -> f64 {
    value.signum() * ((value * white_balance).abs() / max).powf(GAMMA) * 255.0 * gain
}

/// Clip to a displayable byte. Undefined values are black.
pub fn to_byte(value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.clamp(0.0, 255.0) as u8
    }
}

fn toned(grid: &Grid<f64>, white_balance: f64, max: f64, gain: f64) -> Vec<f64> {
    grid.as_slice()
        .iter()
        .map(|value| tone(*value, white_balance, max, gain).clamp(0.0, 255.0))
        .collect()
}

fn compose(width: usize, height: usize, channels: [Vec<f64>; 3]) -> RgbImage {
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let index = y as usize * width + x as usize;
        Rgb(channels
            .each_ref()
            .map(|channel| to_byte(channel.get(index).copied().unwrap_or_default())))
    })
}

/// Render the images in the given preview mode. `Deferred` renders as RGB.
pub fn render_preview(
    images: &DerivedImages,
    maxima: RunningMaxima,
    mode: PreviewMode,
    white_balance: &WhiteBalance,
    gain: f64,
) -> RgbImage {
    let width = images.width();
    let height = images.height();
    let rgb = || {
        [
            toned(&images.red, white_balance.rgb[0], maxima.rgb, gain),
            toned(&images.green, white_balance.rgb[1], maxima.rgb, gain),
            toned(&images.blue, white_balance.rgb[2], maxima.rgb, gain),
        ]
    };
    let channels = match mode {
        PreviewMode::Deferred | PreviewMode::Rgb => rgb(),
        PreviewMode::Saturation => {
            let [_, green, _] = rgb();
            let mut red = Vec::with_capacity(green.len());
            let mut shifted_green = Vec::with_capacity(green.len());
            let mut blue = Vec::with_capacity(green.len());
            for (index, value) in green.iter().enumerate() {
                let (row, column) = (index / width.max(1), index % width.max(1));
                let flag = if images.is_saturated(row, column) {
                    255.0
                } else {
                    0.0
                };
                let degree = f64::from(images.saturation_degree[(row, column)]);
                red.push(*value);
                shifted_green.push((value - flag).clamp(0.0, 255.0));
                blue.push(
                    ((value - flag).clamp(0.0, 255.0) + degree * SATURATION_BLUE_STEP)
                        .clamp(0.0, 255.0),
                );
            }
            [red, shifted_green, blue]
        }
        PreviewMode::Igu => [
            toned(&images.nir, white_balance.igu[0], maxima.igu, gain),
            toned(&images.photopic, white_balance.igu[1], maxima.igu, gain),
            toned(&images.uv, white_balance.igu[2], maxima.igu, gain),
        ],
        PreviewMode::Ndvi => {
            let blue: Vec<f64> = images.chl_b.as_slice().iter().map(|b| b * 255.0).collect();
            let red = images
                .chl_a
                .as_slice()
                .iter()
                .zip(&blue)
                .map(|(a, b)| (255.0 - b) * 2.0 * a)
                .collect();
            let green = images
                .chl_a
                .as_slice()
                .iter()
                .zip(&blue)
                .map(|(a, b)| (255.0 - b) * 2.0 * (1.0 - a))
                .collect();
            [red, green, blue]
        }
    };
    compose(width, height, channels)
}

/// The preview saved alongside each scan: RGB with no white balance or brightness gain.
pub fn render_srgb(images: &DerivedImages, maxima: RunningMaxima) -> RgbImage {
    render_preview(
        images,
        maxima,
        PreviewMode::Rgb,
        &WhiteBalance::NEUTRAL,
        1.0,
    )
}

pub fn save_png<P: AsRef<Path>>(image: &RgbImage, path: P) -> Result<(), LibraryError> {
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
