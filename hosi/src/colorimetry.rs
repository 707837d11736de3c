// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Projection of calibrated spectra onto the human and non-human channels.
use paste::paste;

use crate::common::{LUMINOUS_EFFICACY, NORMALIZATION_EPSILON};

/// Planck's constant (J·s).
pub const PLANCK: f64 = 6.626E-34;

/// Speed of light (m/s).
pub const SPEED_OF_LIGHT: f64 = 2.998E8;

macro_rules! spectral_channels {
    ($($field:ident => $tag:literal),+ $(,)?) => {
        /// The spectral basis curves, with one value per sensor pixel.
        #[derive(Clone, Debug, Default, PartialEq)]
        pub struct BasisCurves {
            $(pub $field: Vec<f64>,)+
        }

        impl BasisCurves {
            /// The row tags each curve has in the spectral sensitivity file.
            pub const TAGS: &'static [&'static str] = &[$($tag),+];

            /// Every curve zeroed for `pixel_count` pixels.
            pub fn zeroed(pixel_count: usize) -> Self {
                Self {
                    $($field: vec![0.0; pixel_count],)+
                }
            }

            pub fn curve(&self, tag: &str) -> Option<&[f64]> {
                match tag {
                    $($tag => Some(&self.$field),)+
                    _ => None,
                }
            }

            pub(crate) fn curve_mut(&mut self, tag: &str) -> Option<&mut Vec<f64>> {
                match tag {
                    $($tag => Some(&mut self.$field),)+
                    _ => None,
                }
            }
        }

        /// Running sums of one spectrum projected onto each basis curve, weighted by the
        /// wavelength span of each pixel.
        #[derive(Clone, Copy, Debug, Default, PartialEq)]
        pub struct ChannelSums {
            $(pub $field: f64,)+
        }

        impl ChannelSums {
            /// Add one pixel's bin-width weighted radiance to every channel.
            pub fn accumulate(&mut self, curves: &BasisCurves, pixel: usize, weighted: f64) {
                $(
                    self.$field += weighted * curves.$field.get(pixel).copied().unwrap_or(0.0);
                )+
            }

            paste! {
                $(
                    pub fn [<with_ $field>](mut self, value: f64) -> Self {
                        self.$field = value;
                        self
                    }
                )+
            }
        }
    };
}

spectral_channels! {
    cie_x => "cieX",
    cie_y => "cieY",
    cie_z => "cieZ",
    chl_a => "chlA",
    chl_b => "chlB",
    nir => "nIR",
    nuv => "nUV",
}

/// Linear sRGB from CIE XYZ, with the per-channel gains that match a typical monitor's white.
pub fn xyz_to_srgb(x: f64, y: f64, z: f64) -> [f64; 3] {
    [
        3.24 * x - 1.54 * y - 0.50 * z,
        (-0.97 * x + 1.88 * y + 0.04 * z) * 1.44,
        (0.06 * x - 0.20 * y + 1.06 * z) * 1.71,
    ]
}

/// `part / (part + nir)`, or NaN when that isn't a finite number.
pub fn chlorophyll_ratio(part: f64, nir: f64) -> f64 {
    let ratio = part / (part + nir);
    if ratio.is_finite() {
        ratio
    } else {
        f64::NAN
    }
}

/// The per-cell values derived from one spectrum's channel sums.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DerivedValues {
    /// Luminance in cd/m².
    pub luminance: f64,
    pub rgb: [f64; 3],
    /// Near infrared, photopic, and near ultraviolet.
    pub igu: [f64; 3],
    /// `NaN` when there's no signal.
    pub chl_a_ratio: f64,
    pub chl_b_ratio: f64,
}

impl DerivedValues {
    pub fn from_channels(channels: &ChannelSums, luminance_scale: f64) -> Self {
        Self {
            luminance: channels.cie_y * LUMINOUS_EFFICACY * luminance_scale,
            rgb: xyz_to_srgb(channels.cie_x, channels.cie_y, channels.cie_z),
            igu: [channels.nir, channels.cie_y, channels.nuv],
            chl_a_ratio: chlorophyll_ratio(channels.chl_a, channels.nir),
            chl_b_ratio: chlorophyll_ratio(channels.chl_b, channels.nir),
        }
    }
}

/// Running maxima for display normalization. They only ever increase within a scan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunningMaxima {
    pub rgb: f64,
    pub igu: f64,
}

impl RunningMaxima {
    pub fn update(&mut self, values: &DerivedValues) {
        self.rgb = values.rgb.iter().fold(self.rgb, |max, v| max.max(*v));
        self.igu = values.igu.iter().fold(self.igu, |max, v| max.max(*v));
    }
}

impl Default for RunningMaxima {
    fn default() -> Self {
        Self {
            rgb: NORMALIZATION_EPSILON,
            igu: NORMALIZATION_EPSILON,
        }
    }
}

/// Energy of one photon at the given wavelength, scaled by 10¹⁸ to stay in a sensible range.
pub fn photon_energy(wavelength_nm: f64) -> f64 {
    (1E18 * PLANCK * SPEED_OF_LIGHT) / (wavelength_nm * 1E-9)
}

/// Photon catch of one receptor for one spectrum.
///
/// `spectrum` and `bin_wavelengths` have one entry per bin, `receptor` and `pixel_bins` one per
/// pixel. Each bin's radiance is converted to photons and weighted by the receptor's sensitivity
/// over every pixel in that bin.
pub fn receptor_catch(
    spectrum: &[f64],
    bin_wavelengths: &[f64],
    receptor: &[f64],
    pixel_bins: &[f64],
    boxcar: usize,
) -> f64 {
    spectrum
        .iter()
        .zip(bin_wavelengths)
        .enumerate()
        .map(|(loc, (radiance, wavelength))| {
            let photons = radiance / photon_energy(*wavelength);
            receptor
                .iter()
                .zip(pixel_bins)
                .skip(loc * boxcar)
                .take(boxcar)
                .map(|(sensitivity, width)| photons * sensitivity * width)
                .sum::<f64>()
        })
        .sum()
}
