// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Reflectance relative to a white reference in the scene.
use crate::cube::{Cell, DerivedImages, Grid, ScanCube};
use crate::error::LibraryError;

/// Per-bin multipliers turning radiance into percent reflectance.
///
/// Bins where the reference had no radiance get a `NaN` multiplier, so every value read through
/// them is `NaN` as well.
#[derive(Clone, Debug, PartialEq)]
pub struct ReflectanceReference {
    cell: Cell,
    percent: f64,
    multipliers: Vec<f64>,
}

impl ReflectanceReference {
    /// Use `cell` as a reference with a known reflectance of `percent`.
    pub fn from_cell(cube: &ScanCube, cell: Cell, percent: f64) -> Result<Self, LibraryError> {
        if !(percent > 0.0 && percent.is_finite()) {
            return Err(LibraryError::InvalidReflectance(percent));
        }
        let spectrum = cube.spectrum(cell).ok_or(LibraryError::NoSelection)?;
        Ok(Self {
            cell,
            percent,
            multipliers: reference_multipliers(spectrum, percent),
        })
    }

    pub fn cell(&self) -> Cell {
        self.cell
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn multipliers(&self) -> &[f64] {
        &self.multipliers
    }

    /// Convert a radiance spectrum to percent reflectance.
    pub fn apply(&self, spectrum: &[f64]) -> Vec<f64> {
        spectrum
            .iter()
            .zip(&self.multipliers)
            .map(|(value, multiplier)| value * 100.0 * multiplier)
            .collect()
    }
}

/// `(percent / 100) / radiance` for each bin, or `NaN` where that isn't finite.
pub fn reference_multipliers(spectrum: &[f64], percent: f64) -> Vec<f64> {
    spectrum
        .iter()
        .map(|radiance| {
            let multiplier = (percent / 100.0) / radiance;
            if multiplier.is_finite() {
                multiplier
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Per-channel display gains for the RGB and IGU previews.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WhiteBalance {
    pub rgb: [f64; 3],
    pub igu: [f64; 3],
}

impl WhiteBalance {
    pub const NEUTRAL: Self = Self {
        rgb: [1.0; 3],
        igu: [1.0; 3],
    };

    /// Gains that render the given image cell as neutral, by scaling each channel up to the
    /// brightest one.
    pub fn from_reference(images: &DerivedImages, row: usize, column: usize) -> Self {
        let at = |grid: &Grid<f64>| grid.get(row, column).copied().unwrap_or(f64::NAN);
        Self {
            rgb: neutralize([at(&images.red), at(&images.green), at(&images.blue)]),
            igu: neutralize([at(&images.nir), at(&images.photopic), at(&images.uv)]),
        }
    }
}

impl Default for WhiteBalance {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

fn neutralize(channels: [f64; 3]) -> [f64; 3] {
    let max = channels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    channels.map(|channel| max / channel)
}

#[cfg(test)]
mod test {
    use super::{ReflectanceReference, WhiteBalance};
    use crate::colorimetry::{ChannelSums, DerivedValues};
    use crate::common::PIXEL_COUNT;
    use crate::cube::{Cell, ScanCube};
    use crate::error::LibraryError;
    use crate::test::example_geometry;

    fn cube_with(cell: Cell, value: f64) -> ScanCube {
        let mut cube = ScanCube::allocate(example_geometry(), PIXEL_COUNT).unwrap();
        let spectrum = vec![value; cube.spectral_length()];
        cube.accumulate(cell, 0, 0, &spectrum);
        cube
    }

    #[test]
    fn full_reference_of_two() {
        let cell = Cell::new(1, 2);
        let cube = cube_with(cell, 2.0);
        let reference = ReflectanceReference::from_cell(&cube, cell, 100.0).unwrap();
        assert!(reference.multipliers().iter().all(|m| *m == 0.5));
        let reflectance = reference.apply(cube.spectrum(cell).unwrap());
        assert!(reflectance.iter().all(|value| *value == 100.0));
        assert_eq!(reference.cell(), cell);
    }

    #[test]
    fn zero_radiance_is_undefined() {
        let cube = cube_with(Cell::new(0, 0), 2.0);
        let reference = ReflectanceReference::from_cell(&cube, Cell::new(1, 1), 50.0).unwrap();
        assert!(reference.multipliers().iter().all(|m| m.is_nan()));
        assert!(reference.apply(&[1.0, 2.0]).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn invalid_percent() {
        let cube = cube_with(Cell::new(0, 0), 2.0);
        assert!(matches!(
            ReflectanceReference::from_cell(&cube, Cell::new(0, 0), 0.0),
            Err(LibraryError::InvalidReflectance(_))
        ));
        assert!(matches!(
            ReflectanceReference::from_cell(&cube, Cell::new(0, 0), f64::NAN),
            Err(LibraryError::InvalidReflectance(_))
        ));
    }

    #[test]
    fn cell_outside_cube() {
        let cube = cube_with(Cell::new(0, 0), 2.0);
        assert!(matches!(
            ReflectanceReference::from_cell(&cube, Cell::new(5, 0), 100.0),
            Err(LibraryError::NoSelection)
        ));
    }

    #[test]
    fn white_balance_neutralizes_reference() {
        let mut cube = ScanCube::allocate(example_geometry(), PIXEL_COUNT).unwrap();
        let values = DerivedValues::from_channels(
            &ChannelSums::default()
                .with_cie_x(0.4)
                .with_cie_y(0.5)
                .with_cie_z(0.6)
                .with_nir(2.0)
                .with_nuv(1.0),
            1.0,
        );
        let cell = Cell::new(2, 0);
        cube.store_derived(cell, &values, 0);
        let row = cube.image_row(cell);
        let balance = WhiteBalance::from_reference(cube.images(), row, cell.pan);
        let balanced: Vec<f64> = values
            .rgb
            .iter()
            .zip(balance.rgb)
            .map(|(channel, gain)| channel * gain)
            .collect();
        let max = values.rgb.iter().copied().fold(f64::MIN, f64::max);
        for channel in balanced {
            assert!((channel - max).abs() < 1E-12);
        }
        assert_eq!(balance.igu, [1.0, 4.0, 2.0]);
    }
}
