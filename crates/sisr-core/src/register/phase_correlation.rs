use ndarray::Array2;
use num_complex::Complex;
use rustfft::FftPlanner;
use tracing::debug;

use crate::error::{Result, SisrError};
use crate::stats;

use super::Registrator;

/// Translation of a target relative to the reference, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
}

/// Translation-only registration by FFT phase correlation with subpixel
/// peak refinement. Pixels shifted in from outside the target are NaN.
#[derive(Clone, Copy, Debug, Default)]
pub struct PhaseCorrelationRegistrator;

impl Registrator for PhaseCorrelationRegistrator {
    fn name(&self) -> &str {
        "phase-correlation"
    }

    fn register(&self, target: &Array2<f32>, reference: &Array2<f32>) -> Result<Array2<f32>> {
        let offset = compute_offset(reference, target)?;
        debug!(dx = offset.dx, dy = offset.dy, "Phase correlation offset");
        Ok(shift_array(target, &offset))
    }
}

/// Offset that maps `target` onto `reference`.
pub fn compute_offset(reference: &Array2<f32>, target: &Array2<f32>) -> Result<Offset> {
    if reference.dim() != target.dim() {
        return Err(SisrError::ShapeMismatch {
            expected: reference.dim(),
            actual: target.dim(),
        });
    }
    let (h, w) = reference.dim();
    if h < 2 || w < 2 {
        return Err(SisrError::Registration(format!(
            "frame too small for phase correlation: {w}x{h}"
        )));
    }

    let ref_fft = fft2d(&prepare(reference));
    let tgt_fft = fft2d(&prepare(target));
    let correlation = ifft2d(&normalized_cross_power(&ref_fft, &tgt_fft));

    let (peak_row, peak_col) = find_peak(&correlation);
    let dy = wrap(peak_row, h);
    let dx = wrap(peak_col, w);
    let (sub_dy, sub_dx) = refine_peak(&correlation, peak_row, peak_col);

    Ok(Offset {
        dx: dx + sub_dx,
        dy: dy + sub_dy,
    })
}

/// Shift by `offset` with bilinear interpolation.
pub fn shift_array(data: &Array2<f32>, offset: &Offset) -> Array2<f32> {
    let (h, w) = data.dim();
    Array2::from_shape_fn((h, w), |(row, col)| {
        bilinear_sample(data, row as f64 - offset.dy, col as f64 - offset.dx)
    })
}

/// Bilinear sample at (y, x). Positions outside the array are NaN.
pub fn bilinear_sample(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    const EDGE: f64 = 1e-6;
    let (h, w) = data.dim();
    if !(y > -EDGE && x > -EDGE && y < (h - 1) as f64 + EDGE && x < (w - 1) as f64 + EDGE) {
        return f32::NAN;
    }
    let y = y.clamp(0.0, (h - 1) as f64);
    let x = x.clamp(0.0, (w - 1) as f64);

    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let fy = (y - y0 as f64) as f32;
    let fx = (x - x0 as f64) as f32;

    let mut value = data[[y0, x0]] * (1.0 - fx) * (1.0 - fy);
    if fx > 0.0 {
        value += data[[y0, x1]] * fx * (1.0 - fy);
    }
    if fy > 0.0 {
        value += data[[y1, x0]] * (1.0 - fx) * fy;
    }
    if fx > 0.0 && fy > 0.0 {
        value += data[[y1, x1]] * fx * fy;
    }
    value
}

fn wrap(peak: usize, len: usize) -> f64 {
    if peak > len / 2 {
        peak as f64 - len as f64
    } else {
        peak as f64
    }
}

/// Median-subtracted, Hann-windowed copy with non-finite pixels zeroed.
fn prepare(data: &Array2<f32>) -> Array2<f64> {
    let (h, w) = data.dim();
    let mut values = stats::finite_values(data);
    let level = stats::median(&mut values).unwrap_or(0.0);

    Array2::from_shape_fn((h, w), |(row, col)| {
        let v = data[[row, col]];
        if !v.is_finite() {
            return 0.0;
        }
        let wy = 0.5 * (1.0 - (std::f64::consts::TAU * row as f64 / h as f64).cos());
        let wx = 0.5 * (1.0 - (std::f64::consts::TAU * col as f64 / w as f64).cos());
        (v as f64 - level) * wy * wx
    })
}

/// 2D FFT: row-wise, then column-wise.
fn fft2d(data: &Array2<f64>) -> Array2<Complex<f64>> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let fft_row = planner.plan_fft_forward(w);
    let fft_col = planner.plan_fft_forward(h);

    let mut result = data.mapv(|v| Complex::new(v, 0.0));
    let mut buffer = vec![Complex::new(0.0, 0.0); w.max(h)];
    for mut row in result.rows_mut() {
        let line = &mut buffer[..w];
        for (b, v) in line.iter_mut().zip(row.iter()) {
            *b = *v;
        }
        fft_row.process(line);
        for (v, b) in row.iter_mut().zip(line.iter()) {
            *v = *b;
        }
    }
    for mut col in result.columns_mut() {
        let line = &mut buffer[..h];
        for (b, v) in line.iter_mut().zip(col.iter()) {
            *b = *v;
        }
        fft_col.process(line);
        for (v, b) in col.iter_mut().zip(line.iter()) {
            *v = *b;
        }
    }
    result
}

/// Inverse 2D FFT, real part, normalized.
fn ifft2d(data: &Array2<Complex<f64>>) -> Array2<f64> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let ifft_row = planner.plan_fft_inverse(w);
    let ifft_col = planner.plan_fft_inverse(h);

    let mut work = data.clone();
    let mut buffer = vec![Complex::new(0.0, 0.0); w.max(h)];
    for mut col in work.columns_mut() {
        let line = &mut buffer[..h];
        for (b, v) in line.iter_mut().zip(col.iter()) {
            *b = *v;
        }
        ifft_col.process(line);
        for (v, b) in col.iter_mut().zip(line.iter()) {
            *v = *b;
        }
    }
    for mut row in work.rows_mut() {
        let line = &mut buffer[..w];
        for (b, v) in line.iter_mut().zip(row.iter()) {
            *b = *v;
        }
        ifft_row.process(line);
        for (v, b) in row.iter_mut().zip(line.iter()) {
            *v = *b;
        }
    }

    let scale = 1.0 / (h * w) as f64;
    work.mapv(|c| c.re * scale)
}

fn normalized_cross_power(
    ref_fft: &Array2<Complex<f64>>,
    tgt_fft: &Array2<Complex<f64>>,
) -> Array2<Complex<f64>> {
    let mut result = ref_fft.clone();
    result.zip_mut_with(tgt_fft, |r, t| {
        let cross = *r * t.conj();
        let mag = cross.norm();
        *r = if mag > 1e-12 { cross / mag } else { Complex::new(0.0, 0.0) };
    });
    result
}

fn find_peak(data: &Array2<f64>) -> (usize, usize) {
    let mut best = (0, 0);
    let mut best_val = f64::NEG_INFINITY;
    for ((row, col), &v) in data.indexed_iter() {
        if v > best_val {
            best_val = v;
            best = (row, col);
        }
    }
    best
}

/// Parabola fit through the peak and its neighbours along each axis,
/// wrapping around the borders of the periodic correlation surface.
fn refine_peak(correlation: &Array2<f64>, peak_row: usize, peak_col: usize) -> (f64, f64) {
    let (h, w) = correlation.dim();
    let at = |r: usize, c: usize| correlation[[r % h, c % w]];
    let centre = at(peak_row, peak_col);

    let fit = |prev: f64, next: f64| {
        let denom = prev - 2.0 * centre + next;
        if denom.abs() > 1e-12 {
            ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
        } else {
            0.0
        }
    };

    let delta_row = fit(at(peak_row + h - 1, peak_col), at(peak_row + 1, peak_col));
    let delta_col = fit(at(peak_row, peak_col + w - 1), at(peak_row, peak_col + 1));
    (delta_row, delta_col)
}
