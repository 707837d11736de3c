// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
mod calibration_data;
mod serial_mock;
pub mod transcript;

pub use calibration_data::{
    calibration_data, spectral_sensitivity_data, EXAMPLE_LINEARIZATION, EXAMPLE_UNIT,
    EXAMPLE_WAVELENGTH_COEFFICIENTS, INCOMPLETE_UNIT, PIXEL_COUNT,
};
pub use serial_mock::{MockSerial, MockSerialError};
