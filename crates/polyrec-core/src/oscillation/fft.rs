//! Iterative radix-2 FFT over `Complex64`.
//!
//! Forward transform only, unnormalized: `X[k] = Σ x[n]·e^(-2πi·kn/N)`.

use crate::types::{PolyrecError, PolyrecResult};
use num_complex::Complex64;
use std::f64::consts::PI;

/// In-place forward FFT. The length must be a non-zero power of two.
pub fn fft_inplace(signal: &mut [Complex64]) -> PolyrecResult<()> {
    let n = signal.len();
    if n == 0 {
        return Err(PolyrecError::EmptyInput("fft signal"));
    }
    if !n.is_power_of_two() {
        return Err(PolyrecError::NonPowerOfTwo(n));
    }

    bit_reverse_permute(signal);
    let mut half = 1;
    while half < n {
        radix2_stage(signal, half);
        half *= 2;
    }
    Ok(())
}

/// Real samples as complex values, zero padded to `len`.
#[must_use]
pub fn to_complex_padded(samples: &[f64], len: usize) -> Vec<Complex64> {
    let mut buf: Vec<Complex64> = samples.iter().map(|&x| Complex64::new(x, 0.0)).collect();
    buf.resize(len.max(samples.len()), Complex64::new(0.0, 0.0));
    buf
}

fn radix2_stage(buf: &mut [Complex64], half_stride: usize) {
    let step = half_stride * 2;
    for k in (0..buf.len()).step_by(step) {
        for j in 0..half_stride {
            let tw = twiddle(j, step);
            let a = buf[k + j];
            let t = buf[k + j + half_stride] * tw;
            buf[k + j] = a + t;
            buf[k + j + half_stride] = a - t;
        }
    }
}

fn twiddle(index: usize, size: usize) -> Complex64 {
    Complex64::from_polar(1.0, -2.0 * PI * index as f64 / size as f64)
}

fn bit_reverse_permute(buf: &mut [Complex64]) {
    let n = buf.len();
    if n < 2 {
        return;
    }
    let bits = n.trailing_zeros();
    for i in 0..n {
        let rev = i.reverse_bits() >> (usize::BITS - bits);
        if i < rev {
            buf.swap(i, rev);
        }
    }
}
