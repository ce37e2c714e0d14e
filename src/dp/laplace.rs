// SPDX-License-Identifier: MPL-2.0

//! Zero-mean Laplace noise distribution.
//!
//! Sampling uses the inverse CDF transform: for `u` uniform on
//! `(-1/2, 1/2)`, `-b * sgn(u) * ln(1 - 2|u|)` is Laplace(0, b). The
//! distribution is statistically correct but makes no claim of resistance
//! to floating-point side channels.

use super::DpError;
use rand::distr::Distribution;
use rand::Rng;

/// Zero-mean Laplace distribution with scale parameter `b`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Laplace {
    scale: f64,
}

impl Laplace {
    /// Create a distribution with the given scale. Errors unless `scale` is
    /// finite and strictly positive; a degenerate release (sensitivity 0)
    /// never constructs a sampler in the first place.
    pub fn new(scale: f64) -> Result<Self, DpError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(DpError::InvalidParameter(format!(
                "Laplace scale must be a positive, finite float, got {scale}"
            )));
        }
        Ok(Self { scale })
    }

    /// The scale parameter `b`.
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Distribution<f64> for Laplace {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        // `random` draws from the half-open interval [0, 1); the lone
        // endpoint u = -1/2 maps to -infinity under the transform and is
        // redrawn.
        let mut u = rng.random::<f64>() - 0.5;
        while u == -0.5 {
            u = rng.random::<f64>() - 0.5;
        }
        -self.scale * u.signum() * (1.0 - 2.0 * u.abs()).ln()
    }
}
