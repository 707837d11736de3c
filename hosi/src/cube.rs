// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The hyperspectral cube and the 2-D images derived from it.
use core::ops::Index;

use bitvec::vec::BitVec;

use crate::calculations;
use crate::colorimetry::{DerivedValues, RunningMaxima};
use crate::error::{LibraryError, ProtocolError};

/// The most cells a single scan may have.
pub const MAX_SCAN_CELLS: usize = 1 << 18;

/// One scan axis, in device position units.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AxisRange {
    pub start: i32,
    pub stop: i32,
    pub step: i32,
}

impl AxisRange {
    pub fn new(start: i32, stop: i32, step: i32) -> Self {
        Self { start, stop, step }
    }

    fn validate(&self, name: &str) -> Result<(), LibraryError> {
        if self.stop <= self.start {
            Err(LibraryError::InvalidGeometry(format!(
                "{} stop {} is not after start {}",
                name, self.stop, self.start
            )))
        } else if self.step <= 0 {
            Err(LibraryError::InvalidGeometry(format!(
                "{} step must be positive",
                name
            )))
        } else {
            Ok(())
        }
    }

    /// The number of positions visited. Only meaningful for a validated range.
    pub fn position_count(&self) -> usize {
        let span = i64::from(self.stop) - i64::from(self.start);
        1 + (span / i64::from(self.step.max(1))).max(0) as usize
    }

    /// The index of the position, if it's within the range.
    pub fn index_of(&self, position: i32) -> Option<usize> {
        let offset = i64::from(position) - i64::from(self.start);
        if offset < 0 || self.step <= 0 {
            return None;
        }
        let index = (offset / i64::from(self.step)) as usize;
        (index < self.position_count()).then_some(index)
    }

    /// The device position of an index. Only meaningful for an index within the range.
    pub fn position(&self, index: usize) -> i32 {
        (i64::from(self.start) + index as i64 * i64::from(self.step)) as i32
    }
}

/// The parameters of one scan, as requested of (or reported by) the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScanGeometry {
    pub pan: AxisRange,
    pub tilt: AxisRange,
    pub max_integration_us: u32,
    /// The number of adjacent pixels summed into each spectral bin.
    pub boxcar: usize,
    pub dark_repeat_ms: u32,
}

impl ScanGeometry {
    /// Both axes have to move forwards by a positive step, the boxcar has to cover at least one
    /// pixel, and there can be at most [`MAX_SCAN_CELLS`] cells.
    pub fn validate(&self) -> Result<(), LibraryError> {
        self.pan.validate("pan")?;
        self.tilt.validate("tilt")?;
        if self.boxcar == 0 {
            return Err(LibraryError::InvalidGeometry(
                "boxcar width must be at least one pixel".to_string(),
            ));
        }
        match self.pan_dim().checked_mul(self.tilt_dim()) {
            Some(cells) if cells <= MAX_SCAN_CELLS => Ok(()),
            _ => Err(LibraryError::InvalidGeometry(format!(
                "{} by {} cells is more than the {} allowed",
                self.pan_dim(),
                self.tilt_dim(),
                MAX_SCAN_CELLS
            ))),
        }
    }

    pub fn pan_dim(&self) -> usize {
        self.pan.position_count()
    }

    pub fn tilt_dim(&self) -> usize {
        self.tilt.position_count()
    }

    pub fn spectral_length(&self, pixel_count: usize) -> usize {
        calculations::spectral_length(pixel_count, self.boxcar)
    }
}

/// A cell position in a scan, as pan and tilt indices.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Cell {
    pub pan: usize,
    pub tilt: usize,
}

impl Cell {
    pub fn new(pan: usize, tilt: usize) -> Self {
        Self { pan, tilt }
    }
}

/// A row-major 2-D buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&T> {
        if column < self.width {
            self.data.get(row * self.width + column)
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, column: usize, value: T) {
        if column < self.width {
            if let Some(slot) = self.data.get_mut(row * self.width + column) {
                *slot = value;
            }
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks(self.width.max(1))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T> Index<(usize, usize)> for Grid<T> {
    type Output = T;

    fn index(&self, (row, column): (usize, usize)) -> &T {
        &self.data[row * self.width + column]
    }
}

/// The per-cell images, stored with the tilt axis inverted so the top row is the highest tilt.
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedImages {
    pub luminance: Grid<f64>,
    pub red: Grid<f64>,
    pub green: Grid<f64>,
    pub blue: Grid<f64>,
    saturated: BitVec,
    pub saturation_degree: Grid<i32>,
    /// Near infrared.
    pub nir: Grid<f64>,
    /// CIE Y, the green of the IGU false-color image.
    pub photopic: Grid<f64>,
    /// Near ultraviolet.
    pub uv: Grid<f64>,
    pub chl_a: Grid<f64>,
    pub chl_b: Grid<f64>,
}

impl DerivedImages {
    fn new(width: usize, height: usize) -> Self {
        let blank = Grid::new(width, height, 0.0);
        Self {
            luminance: blank.clone(),
            red: blank.clone(),
            green: blank.clone(),
            blue: blank.clone(),
            saturated: BitVec::repeat(false, width * height),
            saturation_degree: Grid::new(width, height, 0),
            nir: blank.clone(),
            photopic: blank.clone(),
            uv: blank.clone(),
            chl_a: blank.clone(),
            chl_b: blank,
        }
    }

    pub fn width(&self) -> usize {
        self.luminance.width()
    }

    pub fn height(&self) -> usize {
        self.luminance.height()
    }

    pub fn is_saturated(&self, row: usize, column: usize) -> bool {
        column < self.width()
            && self
                .saturated
                .get(row * self.width() + column)
                .map_or(false, |bit| *bit)
    }

    fn store(&mut self, row: usize, column: usize, values: &DerivedValues, saturation: i32) {
        self.luminance.set(row, column, values.luminance);
        self.red.set(row, column, values.rgb[0]);
        self.green.set(row, column, values.rgb[1]);
        self.blue.set(row, column, values.rgb[2]);
        if saturation > 0 {
            let index = row * self.width() + column;
            if index < self.saturated.len() {
                self.saturated.set(index, true);
            }
        }
        self.saturation_degree.set(row, column, saturation);
        self.nir.set(row, column, values.igu[0]);
        self.photopic.set(row, column, values.igu[1]);
        self.uv.set(row, column, values.igu[2]);
        self.chl_a.set(row, column, values.chl_a_ratio);
        self.chl_b.set(row, column, values.chl_b_ratio);
    }
}

/// Radiance for every cell of one scan, indexed `[tilt][pan][bin]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanCube {
    geometry: ScanGeometry,
    spectral_length: usize,
    radiance: Vec<f64>,
    pan_positions: Vec<Option<i32>>,
    tilt_positions: Vec<Option<i32>>,
    filled: BitVec,
    images: DerivedImages,
    maxima: RunningMaxima,
}

impl ScanCube {
    /// Allocate a zeroed cube, rejecting invalid geometry.
    pub fn allocate(geometry: ScanGeometry, pixel_count: usize) -> Result<Self, LibraryError> {
        geometry.validate()?;
        let pan_dim = geometry.pan_dim();
        let tilt_dim = geometry.tilt_dim();
        let spectral_length = geometry.spectral_length(pixel_count);
        let samples = (tilt_dim * pan_dim)
            .checked_mul(spectral_length)
            .ok_or_else(|| {
                LibraryError::InvalidGeometry("radiance cube is too large".to_string())
            })?;
        Ok(Self {
            geometry,
            spectral_length,
            radiance: vec![0.0; samples],
            pan_positions: vec![None; pan_dim],
            tilt_positions: vec![None; tilt_dim],
            filled: BitVec::repeat(false, tilt_dim * pan_dim),
            images: DerivedImages::new(pan_dim, tilt_dim),
            maxima: RunningMaxima::default(),
        })
    }

    pub fn geometry(&self) -> &ScanGeometry {
        &self.geometry
    }

    pub fn spectral_length(&self) -> usize {
        self.spectral_length
    }

    pub fn pan_dim(&self) -> usize {
        self.geometry.pan_dim()
    }

    pub fn tilt_dim(&self) -> usize {
        self.geometry.tilt_dim()
    }

    pub fn images(&self) -> &DerivedImages {
        &self.images
    }

    pub fn maxima(&self) -> RunningMaxima {
        self.maxima
    }

    /// Map a device position to a cell.
    pub fn cell_for(&self, pan: i32, tilt: i32) -> Result<Cell, ProtocolError> {
        match (
            self.geometry.pan.index_of(pan),
            self.geometry.tilt.index_of(tilt),
        ) {
            (Some(pan_index), Some(tilt_index)) => Ok(Cell::new(pan_index, tilt_index)),
            _ => Err(ProtocolError::OutOfBounds { pan, tilt }),
        }
    }

    /// Clamp indices into the cube.
    pub fn clamp(&self, pan: usize, tilt: usize) -> Cell {
        Cell::new(
            pan.min(self.pan_dim().saturating_sub(1)),
            tilt.min(self.tilt_dim().saturating_sub(1)),
        )
    }

    fn cell_index(&self, cell: Cell) -> Option<usize> {
        (cell.pan < self.pan_dim() && cell.tilt < self.tilt_dim())
            .then_some(cell.tilt * self.pan_dim() + cell.pan)
    }

    /// The image row a cell is drawn on.
    pub fn image_row(&self, cell: Cell) -> usize {
        self.tilt_dim() - 1 - cell.tilt
    }

    pub fn spectrum(&self, cell: Cell) -> Option<&[f64]> {
        let start = self.cell_index(cell)? * self.spectral_length;
        self.radiance.get(start..start + self.spectral_length)
    }

    /// Add a converted spectrum to a cell and remember the device position it was taken at.
    pub fn accumulate(&mut self, cell: Cell, pan: i32, tilt: i32, radiance: &[f64]) {
        let index = match self.cell_index(cell) {
            Some(index) => index,
            None => return,
        };
        let start = index * self.spectral_length;
        self.radiance[start..start + self.spectral_length]
            .iter_mut()
            .zip(radiance)
            .for_each(|(stored, value)| *stored += value);
        self.pan_positions[cell.pan] = Some(pan);
        self.tilt_positions[cell.tilt] = Some(tilt);
        self.filled.set(index, true);
    }

    /// Write a cell's derived values into the images and update the running maxima.
    pub fn store_derived(&mut self, cell: Cell, values: &DerivedValues, saturation: i32) {
        if self.cell_index(cell).is_none() {
            return;
        }
        let row = self.image_row(cell);
        self.images.store(row, cell.pan, values, saturation);
        self.maxima.update(values);
    }

    pub fn is_filled(&self, cell: Cell) -> bool {
        self.cell_index(cell)
            .and_then(|index| self.filled.get(index).map(|bit| *bit))
            .unwrap_or(false)
    }

    pub fn filled_count(&self) -> usize {
        self.filled.count_ones()
    }

    /// Scan progress through a cell, as a rounded percentage.
    pub fn progress(&self, cell: Cell) -> u32 {
        let total = (self.pan_dim() * self.tilt_dim()) as f64;
        let done = (cell.pan + cell.tilt * self.pan_dim()) as f64;
        (done / total * 100.0).round_ties_even() as u32
    }

    /// The pan position of a column: where it was measured, or where it should have been.
    pub fn pan_position(&self, pan: usize) -> i32 {
        self.pan_positions
            .get(pan)
            .copied()
            .flatten()
            .unwrap_or_else(|| self.geometry.pan.position(pan))
    }

    pub fn tilt_position(&self, tilt: usize) -> i32 {
        self.tilt_positions
            .get(tilt)
            .copied()
            .flatten()
            .unwrap_or_else(|| self.geometry.tilt.position(tilt))
    }

    /// Replace any NaN radiance with zero.
    pub fn sanitize(&mut self) {
        self.radiance
            .iter_mut()
            .filter(|value| value.is_nan())
            .for_each(|value| *value = 0.0);
    }

    /// Every cell in row-major order (tilt, then pan).
    pub fn cells(&self) -> impl Iterator<Item = Cell> {
        let pan_dim = self.pan_dim();
        (0..self.tilt_dim()).flat_map(move |tilt| (0..pan_dim).map(move |pan| Cell::new(pan, tilt)))
    }
}

#[cfg(test)]
mod test {
    use super::{AxisRange, Cell, ScanCube};
    use crate::colorimetry::{ChannelSums, DerivedValues};
    use crate::common::{LUMINANCE_SCALE, NORMALIZATION_EPSILON, PIXEL_COUNT};
    use crate::error::{LibraryError, ProtocolError};
    use crate::test::example_geometry as geometry;

    #[test]
    fn dimensions() {
        let cube = ScanCube::allocate(geometry(), PIXEL_COUNT).unwrap();
        assert_eq!(cube.pan_dim(), 3);
        assert_eq!(cube.tilt_dim(), 3);
        assert_eq!(cube.spectral_length(), 144);
        assert_eq!(cube.images().width(), 3);
        assert_eq!(cube.maxima().rgb, NORMALIZATION_EPSILON);
    }

    #[test]
    fn uneven_range_truncates() {
        let range = AxisRange::new(-10, 5, 4);
        assert_eq!(range.position_count(), 4);
        assert_eq!(range.index_of(-10), Some(0));
        assert_eq!(range.index_of(3), Some(3));
        assert_eq!(range.index_of(7), None);
        assert_eq!(range.index_of(-11), None);
        assert_eq!(range.position(2), -2);
    }

    #[test]
    fn invalid_geometry() {
        let mut reversed = geometry();
        reversed.pan = AxisRange::new(8, 0, 4);
        assert!(matches!(
            ScanCube::allocate(reversed, PIXEL_COUNT),
            Err(LibraryError::InvalidGeometry(_))
        ));
        let mut flat = geometry();
        flat.tilt = AxisRange::new(4, 4, 4);
        assert!(flat.validate().is_err());
        let mut no_boxcar = geometry();
        no_boxcar.boxcar = 0;
        assert!(no_boxcar.validate().is_err());
    }

    #[test]
    fn wide_range_does_not_overflow() {
        let range = AxisRange::new(-2_000_000_000, 2_000_000_000, 4);
        assert_eq!(range.position_count(), 1_000_000_001);
        assert_eq!(range.index_of(2_000_000_000), Some(1_000_000_000));
        assert_eq!(range.index_of(-2_000_000_000), Some(0));
        let coarse = AxisRange::new(-2_000_000_000, 2_000_000_000, 2_000_000_000);
        assert_eq!(coarse.position_count(), 3);
        assert_eq!(coarse.position(2), 2_000_000_000);
    }

    #[test]
    fn oversized_geometry_is_rejected() {
        let mut wide = geometry();
        wide.pan = AxisRange::new(-2_000_000_000, 2_000_000_000, 4);
        assert!(matches!(
            ScanCube::allocate(wide, PIXEL_COUNT),
            Err(LibraryError::InvalidGeometry(_))
        ));
        let mut huge = geometry();
        huge.pan = AxisRange::new(0, 2_000_000_000, 1);
        huge.tilt = AxisRange::new(0, 2_000_000_000, 1);
        assert!(matches!(
            huge.validate(),
            Err(LibraryError::InvalidGeometry(_))
        ));
        let mut largest = geometry();
        largest.pan = AxisRange::new(0, 511, 1);
        largest.tilt = AxisRange::new(0, 511, 1);
        assert!(largest.validate().is_ok());
        largest.tilt = AxisRange::new(0, 512, 1);
        assert!(largest.validate().is_err());
    }

    #[test]
    fn cell_mapping() {
        let cube = ScanCube::allocate(geometry(), PIXEL_COUNT).unwrap();
        assert_eq!(cube.cell_for(4, 4).unwrap(), Cell::new(1, 1));
        assert_eq!(cube.cell_for(8, 0).unwrap(), Cell::new(2, 0));
        assert!(matches!(
            cube.cell_for(12, 0),
            Err(ProtocolError::OutOfBounds { pan: 12, tilt: 0 })
        ));
    }

    #[test]
    fn accumulate_writes_one_cell() {
        let mut cube = ScanCube::allocate(geometry(), PIXEL_COUNT).unwrap();
        let cell = cube.cell_for(4, 4).unwrap();
        let spectrum = vec![1.5; 144];
        cube.accumulate(cell, 4, 4, &spectrum);
        assert_eq!(cube.spectrum(cell).unwrap(), spectrum.as_slice());
        assert_eq!(cube.spectrum(Cell::new(0, 0)).unwrap()[0], 0.0);
        assert!(cube.is_filled(cell));
        assert_eq!(cube.filled_count(), 1);
        cube.accumulate(cell, 4, 4, &spectrum);
        assert_eq!(cube.spectrum(cell).unwrap()[10], 3.0);
    }

    #[test]
    fn derived_images_are_inverted() {
        let mut cube = ScanCube::allocate(geometry(), PIXEL_COUNT).unwrap();
        let values = DerivedValues::from_channels(
            &ChannelSums::default().with_cie_y(2.0).with_nir(1.0),
            LUMINANCE_SCALE,
        );
        cube.store_derived(Cell::new(1, 0), &values, 4);
        let images = cube.images();
        assert_eq!(images.photopic[(2, 1)], 2.0);
        assert_eq!(images.photopic[(0, 1)], 0.0);
        assert!(images.is_saturated(2, 1));
        assert!(!images.is_saturated(0, 1));
        assert_eq!(images.saturation_degree[(2, 1)], 4);
        assert_eq!(cube.maxima().igu, 2.0);
    }

    #[test]
    fn positions_default_to_geometry() {
        let mut cube = ScanCube::allocate(geometry(), PIXEL_COUNT).unwrap();
        assert_eq!(cube.pan_position(2), 8);
        cube.accumulate(Cell::new(2, 1), 9, 5, &[]);
        assert_eq!(cube.pan_position(2), 9);
        assert_eq!(cube.tilt_position(1), 5);
    }

    #[test]
    fn progress() {
        let cube = ScanCube::allocate(geometry(), PIXEL_COUNT).unwrap();
        assert_eq!(cube.progress(Cell::new(0, 0)), 0);
        assert_eq!(cube.progress(Cell::new(1, 1)), 44);
        assert_eq!(cube.progress(Cell::new(2, 2)), 89);
    }

    #[test]
    fn sanitize_zeroes_nan() {
        let mut cube = ScanCube::allocate(geometry(), PIXEL_COUNT).unwrap();
        cube.accumulate(Cell::new(0, 0), 0, 0, &[f64::NAN, 1.0]);
        cube.sanitize();
        assert_eq!(&cube.spectrum(Cell::new(0, 0)).unwrap()[..2], &[0.0, 1.0]);
    }

    #[test]
    fn cells_in_row_major_order() {
        let cube = ScanCube::allocate(geometry(), PIXEL_COUNT).unwrap();
        let cells: Vec<Cell> = cube.cells().collect();
        assert_eq!(cells.len(), 9);
        assert_eq!(cells[1], Cell::new(1, 0));
        assert_eq!(cells[3], Cell::new(0, 1));
    }
}
