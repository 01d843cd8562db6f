//! Spectrum

use crate::lumen::Float;
use std::ops::{Add, AddAssign, Mul};

/// An RGB colour triple. Photons carry one of these, normalized so that the
/// per-photon intensity is folded into the photon count rather than the
/// colour.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RGBSpectrum {
    /// Red channel.
    pub r: Float,

    /// Green channel.
    pub g: Float,

    /// Blue channel.
    pub b: Float,
}

/// Default spectrum used by the engine.
pub type Spectrum = RGBSpectrum;

impl RGBSpectrum {
    /// Spectrum with all channels zero.
    pub const ZERO: Self = Self { r: 0.0, g: 0.0, b: 0.0 };

    /// Create a spectrum with all channels set to the given value.
    ///
    /// * `c` - The channel value.
    pub fn new(c: Float) -> Self {
        Self { r: c, g: c, b: c }
    }

    /// Create a spectrum from individual channel values.
    ///
    /// * `r` - Red channel.
    /// * `g` - Green channel.
    /// * `b` - Blue channel.
    pub fn from_rgb(r: Float, g: Float, b: Float) -> Self {
        Self { r, g, b }
    }

    /// Returns the sum of the channels, the scalar intensity the emission
    /// budget is measured in.
    pub fn sum(&self) -> Float {
        self.r + self.g + self.b
    }

    /// Returns true if all channels are zero.
    pub fn is_black(&self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }
}

impl Add for RGBSpectrum {
    type Output = Self;

    /// Adds the channels of the given spectrum.
    ///
    /// * `other` - The spectrum to add.
    fn add(self, other: Self) -> Self {
        Self::from_rgb(self.r + other.r, self.g + other.g, self.b + other.b)
    }
}

impl AddAssign for RGBSpectrum {
    /// Adds the channels of the given spectrum.
    ///
    /// * `other` - The spectrum to add.
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Mul<Float> for RGBSpectrum {
    type Output = Self;

    /// Scale all channels.
    ///
    /// * `f` - The scaling factor.
    fn mul(self, f: Float) -> Self {
        Self::from_rgb(self.r * f, self.g * f, self.b * f)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
