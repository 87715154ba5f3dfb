//! # Oscillation Analysis
//!
//! Per-dimension spectral signatures of sampled structure data.
//!
//! Input is dimension-major: sample `i` of dimension `d` lives at
//! `data[d * num_samples + i]`. Each series is transformed with the radix-2
//! FFT in [`fft`]; series whose length is not a power of two are zero padded
//! or rejected according to [`PaddingPolicy`].
//!
//! For a transform of length `N` the dominant bin is searched in `[1, N/2)`,
//! skipping DC and the mirrored upper half. Stability and convergence are
//! measured on the magnitude series across all `N` bins, DC included.
//!
//! | Field | Definition |
//! |-------|------------|
//! | dominant bin | first bin of maximum magnitude in `[1, N/2)` |
//! | frequency | `index * sampling_rate / N` |
//! | amplitude | `magnitude / N` |
//! | phase | `arg(X[index])` |
//! | period | `round(N / index)` samples |
//! | stable | CoV of all `N` magnitudes below the configured threshold |
//! | convergence rate | negated OLS slope of all `N` magnitudes against bin index |

pub mod fft;

use crate::config::{OscillationConfig, PaddingPolicy};
use crate::primitives::SPECTRAL_FLOOR;
use crate::types::{PolyrecError, PolyrecResult};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// =============================================================================
// SIGNATURES
// =============================================================================

/// Spectral summary of one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillationSignature {
    pub dimension: usize,
    /// Hz. Zero when bins `[1, N/2)` hold no energy.
    pub frequency: f64,
    pub amplitude: f64,
    /// Radians.
    pub phase: f64,
    /// Samples per cycle of the dominant component.
    pub period: u64,
    pub is_stable: bool,
    /// Negative means diverging.
    pub convergence_rate: f64,
}

/// Signatures of every dimension plus their pairwise correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillationMap {
    pub signatures: Vec<OscillationSignature>,
    /// Symmetric, unit diagonal.
    pub cross_correlations: Vec<Vec<f64>>,
    pub is_converging: bool,
    /// Estimated iterations until the slowest dimension settles.
    pub iterations_to_convergence: u64,
}

impl OscillationMap {
    #[must_use]
    pub fn num_dimensions(&self) -> usize {
        self.signatures.len()
    }

    #[must_use]
    pub fn signature(&self, dimension: usize) -> Option<&OscillationSignature> {
        self.signatures.get(dimension)
    }

    #[must_use]
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        self.cross_correlations.get(i)?.get(j).copied()
    }

    /// Whether the signature of `dimension` exists and is stable.
    #[must_use]
    pub fn is_stable(&self, dimension: usize) -> bool {
        self.signature(dimension).is_some_and(|s| s.is_stable)
    }
}

// =============================================================================
// ANALYZER
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct OscillationAnalyzer {
    config: OscillationConfig,
}

impl OscillationAnalyzer {
    #[must_use]
    pub const fn new(config: OscillationConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &OscillationConfig {
        &self.config
    }

    /// Analyze `num_dimensions` series of `num_samples` samples each.
    pub fn analyze(
        &self,
        data: &[f64],
        num_dimensions: usize,
        num_samples: usize,
        sampling_rate: f64,
    ) -> PolyrecResult<OscillationMap> {
        if num_dimensions == 0 || num_samples == 0 {
            return Err(PolyrecError::EmptyInput("oscillation samples"));
        }
        let expected = num_dimensions.checked_mul(num_samples).ok_or_else(|| {
            PolyrecError::InvalidParameter(format!(
                "{num_dimensions} dimensions of {num_samples} samples overflow"
            ))
        })?;
        if data.len() != expected {
            return Err(PolyrecError::DimensionMismatch {
                expected,
                actual: data.len(),
            });
        }
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(PolyrecError::InvalidParameter(format!(
                "sampling rate must be positive, got {sampling_rate}"
            )));
        }

        let transform_len = self.transform_len(num_samples)?;

        #[cfg(feature = "parallel")]
        let signatures = (0..num_dimensions)
            .into_par_iter()
            .map(|d| {
                let series = &data[d * num_samples..(d + 1) * num_samples];
                self.analyze_dimension(d, series, transform_len, sampling_rate)
            })
            .collect::<PolyrecResult<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let signatures = data
            .chunks(num_samples)
            .enumerate()
            .map(|(d, series)| self.analyze_dimension(d, series, transform_len, sampling_rate))
            .collect::<PolyrecResult<Vec<_>>>()?;

        let cross_correlations = self.cross_correlations(&signatures);
        let is_converging = signatures.iter().all(|s| s.convergence_rate >= 0.0);
        let iterations_to_convergence = estimate_iterations(&signatures, is_converging);

        tracing::debug!(
            dimensions = num_dimensions,
            transform_len,
            is_converging,
            iterations_to_convergence,
            "oscillation analysis"
        );

        Ok(OscillationMap {
            signatures,
            cross_correlations,
            is_converging,
            iterations_to_convergence,
        })
    }

    fn transform_len(&self, num_samples: usize) -> PolyrecResult<usize> {
        if num_samples.is_power_of_two() {
            return Ok(num_samples);
        }
        match self.config.padding {
            PaddingPolicy::Reject => Err(PolyrecError::NonPowerOfTwo(num_samples)),
            PaddingPolicy::ZeroPad => num_samples.checked_next_power_of_two().ok_or_else(|| {
                PolyrecError::InvalidParameter(format!("cannot pad {num_samples} samples"))
            }),
        }
    }

    fn analyze_dimension(
        &self,
        dimension: usize,
        series: &[f64],
        transform_len: usize,
        sampling_rate: f64,
    ) -> PolyrecResult<OscillationSignature> {
        let mut spectrum = fft::to_complex_padded(series, transform_len);
        fft::fft_inplace(&mut spectrum)?;

        let n = transform_len as f64;
        // (bin index, magnitude) over all N bins
        let magnitudes: Vec<(usize, f64)> = spectrum
            .iter()
            .enumerate()
            .map(|(k, x)| {
                let m = x.norm();
                (k, if m < SPECTRAL_FLOOR { 0.0 } else { m })
            })
            .collect();

        let dominant = magnitudes
            .iter()
            .take(transform_len / 2)
            .skip(1)
            .fold(None, |best: Option<(usize, f64)>, &(k, m)| match best {
                Some((_, bm)) if m <= bm => best,
                _ if m > 0.0 => Some((k, m)),
                _ => best,
            });

        let (frequency, amplitude, phase, period) = match dominant {
            Some((k, m)) => (
                k as f64 * sampling_rate / n,
                m / n,
                spectrum[k].arg(),
                (n / k as f64).round() as u64,
            ),
            None => (0.0, 0.0, 0.0, 0),
        };

        let values: Vec<f64> = magnitudes.iter().map(|&(_, m)| m).collect();
        let is_stable = coefficient_of_variation(&values) < self.config.stability_cov_threshold;
        let convergence_rate = -ols_slope(&magnitudes);

        Ok(OscillationSignature {
            dimension,
            frequency,
            amplitude,
            phase,
            period,
            is_stable,
            convergence_rate,
        })
    }

    fn cross_correlations(&self, signatures: &[OscillationSignature]) -> Vec<Vec<f64>> {
        signatures
            .iter()
            .map(|a| {
                signatures
                    .iter()
                    .map(|b| {
                        if a.dimension == b.dimension {
                            1.0
                        } else {
                            (-(a.frequency - b.frequency).abs() / self.config.correlation_scale)
                                .exp()
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// Analyze with the default configuration.
pub fn detect_oscillations(
    data: &[f64],
    num_dimensions: usize,
    num_samples: usize,
    sampling_rate: f64,
) -> PolyrecResult<OscillationMap> {
    OscillationAnalyzer::default().analyze(data, num_dimensions, num_samples, sampling_rate)
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Population stdev over mean. A zero-energy series has CoV 0.
fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= f64::EPSILON {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}

/// Least-squares slope of `y` against `x`; zero for fewer than two points.
fn ols_slope(points: &[(usize, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f64;
    let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
    for &(x, y) in points {
        let x = x as f64;
        sx += x;
        sy += y;
        sxx += x * x;
        sxy += x * y;
    }
    let denom = n * sxx - sx * sx;
    if denom.abs() <= f64::EPSILON {
        return 0.0;
    }
    (n * sxy - sx * sy) / denom
}

fn estimate_iterations(signatures: &[OscillationSignature], is_converging: bool) -> u64 {
    if !is_converging || signatures.is_empty() {
        return 0;
    }
    let slowest = signatures
        .iter()
        .map(|s| s.convergence_rate)
        .filter(|&r| r > 0.0)
        .fold(f64::INFINITY, f64::min);
    if !slowest.is_finite() {
        return 0;
    }
    let mean_amplitude =
        signatures.iter().map(|s| s.amplitude).sum::<f64>() / signatures.len() as f64;
    (mean_amplitude / slowest) as u64
}
