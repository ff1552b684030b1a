// im2col + GEMM convolution kernels
//
// For each batch sample:
//   1. im2col: unroll input patches → columns [C_in*kH*kW, H_out*W_out]
//   2. GEMM:   weight [C_out, C_in*kH*kW] × columns → out [C_out, H_out*W_out]
//
// Backward reuses the same column matrix:
//   grad_weight += grad_out[n] × columns^T                (partition-and-combine over n)
//   grad_input[n] = col2im(weight^T × grad_out[n])        (one disjoint sample per job)
//
// grad_weight is a reduction over the whole batch, so each worker folds its
// samples into a private partial buffer and the partials are summed at the
// end. Column buffers are per worker and reused across the samples it handles.

use rayon::prelude::*;

use crate::alloc;
use crate::dtype::Element;
use crate::error::Result;

use super::params::ConvGeometry;

fn col_rows(g: &ConvGeometry) -> usize {
    g.c_in * g.kernel_plane()
}

/// Lazily allocate the column scratch for one worker.
fn scratch<'a, T: Element>(g: &ConvGeometry, buf: &'a mut Vec<T>) -> Result<&'a mut [T]> {
    if buf.is_empty() {
        *buf = alloc::try_filled(col_rows(g) * g.out_plane(), T::zero())?;
    }
    Ok(buf.as_mut_slice())
}

/// Unroll one sample `[C_in, H, W]` into `columns`.
pub(crate) fn im2col<T: Element>(g: &ConvGeometry, input: &[T], columns: &mut [T]) {
    let (rows, cols) = (g.rows(), g.cols());
    let col_cols = g.out_plane();
    for ci in 0..g.c_in {
        let x_c = &input[ci * g.in_plane()..][..g.in_plane()];
        for ki in 0..g.kh {
            for kj in 0..g.kw {
                let row = (ci * g.kh + ki) * g.kw + kj;
                let dst = &mut columns[row * col_cols..][..col_cols];
                for oh in 0..g.out_h {
                    let dst = &mut dst[oh * g.out_w..][..g.out_w];
                    match rows.source(oh, ki) {
                        Some(ih) => {
                            for (ow, v) in dst.iter_mut().enumerate() {
                                *v = cols
                                    .source(ow, kj)
                                    .map_or(T::zero(), |iw| x_c[ih * g.w + iw]);
                            }
                        }
                        None => dst.fill(T::zero()),
                    }
                }
            }
        }
    }
}

/// Scatter-add `columns` back into one sample `[C_in, H, W]`.
pub(crate) fn col2im<T: Element>(g: &ConvGeometry, columns: &[T], output: &mut [T]) {
    let (rows, cols) = (g.rows(), g.cols());
    let col_cols = g.out_plane();
    for ci in 0..g.c_in {
        let out_c = &mut output[ci * g.in_plane()..][..g.in_plane()];
        for ki in 0..g.kh {
            for kj in 0..g.kw {
                let row = (ci * g.kh + ki) * g.kw + kj;
                let src = &columns[row * col_cols..][..col_cols];
                for oh in 0..g.out_h {
                    let Some(ih) = rows.source(oh, ki) else {
                        continue;
                    };
                    for ow in 0..g.out_w {
                        if let Some(iw) = cols.source(ow, kj) {
                            out_c[ih * g.w + iw] = out_c[ih * g.w + iw] + src[oh * g.out_w + ow];
                        }
                    }
                }
            }
        }
    }
}

/// C += A × B with A: [m, k], B: [k, n], C: [m, n], all row-major.
#[inline]
pub(crate) fn gemm<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) {
    for i in 0..m {
        let c_row = &mut c[i * n..][..n];
        for p in 0..k {
            let a_val = a[i * k + p];
            for (cv, &bv) in c_row.iter_mut().zip(&b[p * n..][..n]) {
                *cv = *cv + a_val * bv;
            }
        }
    }
}

/// C += A^T × B with A: [k, m], B: [k, n], C: [m, n].
#[inline]
pub(crate) fn gemm_at_b<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) {
    for i in 0..m {
        let c_row = &mut c[i * n..][..n];
        for p in 0..k {
            let a_val = a[p * m + i];
            for (cv, &bv) in c_row.iter_mut().zip(&b[p * n..][..n]) {
                *cv = *cv + a_val * bv;
            }
        }
    }
}

/// C += A × B^T with A: [m, k], B: [n, k], C: [m, n].
#[inline]
pub(crate) fn gemm_a_bt<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) {
    for i in 0..m {
        let a_row = &a[i * k..][..k];
        for j in 0..n {
            let dot: T = a_row
                .iter()
                .zip(&b[j * k..][..k])
                .map(|(&av, &bv)| av * bv)
                .sum();
            c[i * n + j] = c[i * n + j] + dot;
        }
    }
}

/// out: `[N, C_out, H_out, W_out]`, zero-initialised.
pub(crate) fn forward<T: Element>(
    g: &ConvGeometry,
    x: &[T],
    w: &[T],
    out: &mut [T],
    parallel: bool,
) -> Result<()> {
    let sample_in = g.c_in * g.in_plane();
    let sample_out = g.c_out * g.out_plane();

    let job = |buf: &mut Vec<T>, (x_n, out_n): (&[T], &mut [T])| -> Result<()> {
        let columns = scratch(g, buf)?;
        im2col(g, x_n, columns);
        gemm(w, columns, out_n, g.c_out, g.out_plane(), col_rows(g));
        Ok(())
    };

    if parallel {
        x.par_chunks(sample_in)
            .zip(out.par_chunks_mut(sample_out))
            .try_for_each_init(Vec::new, job)
    } else {
        let mut buf = Vec::new();
        x.chunks(sample_in)
            .zip(out.chunks_mut(sample_out))
            .try_for_each(|pair| job(&mut buf, pair))
    }
}

/// grad_input: `[N, C_in, H, W]`, zero-initialised.
pub(crate) fn backward_input<T: Element>(
    g: &ConvGeometry,
    grad_out: &[T],
    w: &[T],
    grad_input: &mut [T],
    parallel: bool,
) -> Result<()> {
    let sample_in = g.c_in * g.in_plane();
    let sample_out = g.c_out * g.out_plane();

    let job = |buf: &mut Vec<T>, (gy_n, gx_n): (&[T], &mut [T])| -> Result<()> {
        let columns = scratch(g, buf)?;
        columns.fill(T::zero());
        gemm_at_b(w, gy_n, columns, col_rows(g), g.out_plane(), g.c_out);
        col2im(g, columns, gx_n);
        Ok(())
    };

    if parallel {
        grad_out
            .par_chunks(sample_out)
            .zip(grad_input.par_chunks_mut(sample_in))
            .try_for_each_init(Vec::new, job)
    } else {
        let mut buf = Vec::new();
        grad_out
            .chunks(sample_out)
            .zip(grad_input.chunks_mut(sample_in))
            .try_for_each(|pair| job(&mut buf, pair))
    }
}

/// One worker's share of the grad_weight reduction.
struct Partial<T> {
    grad_weight: Vec<T>,
    columns: Vec<T>,
}

impl<T: Element> Partial<T> {
    fn merge(mut self, other: Partial<T>) -> Partial<T> {
        for (a, &b) in self.grad_weight.iter_mut().zip(&other.grad_weight) {
            *a = *a + b;
        }
        self
    }
}

/// Returns grad_weight `[C_out, C_in, kH, kW]` as a fresh buffer.
pub(crate) fn backward_weight<T: Element>(
    g: &ConvGeometry,
    x: &[T],
    grad_out: &[T],
    parallel: bool,
) -> Result<Vec<T>> {
    let sample_in = g.c_in * g.in_plane();
    let sample_out = g.c_out * g.out_plane();
    let gw_len = g.c_out * col_rows(g);

    let fold = |acc: Option<Partial<T>>, (x_n, gy_n): (&[T], &[T])| -> Result<Option<Partial<T>>> {
        let mut part = match acc {
            Some(p) => p,
            None => Partial {
                grad_weight: alloc::try_filled(gw_len, T::zero())?,
                columns: Vec::new(),
            },
        };
        let columns = scratch(g, &mut part.columns)?;
        im2col(g, x_n, columns);
        gemm_a_bt(gy_n, columns, &mut part.grad_weight, g.c_out, col_rows(g), g.out_plane());
        Ok(Some(part))
    };
    let combine = |a: Option<Partial<T>>, b: Option<Partial<T>>| -> Result<Option<Partial<T>>> {
        Ok(match (a, b) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, None) => a,
            (None, b) => b,
        })
    };

    let total = if parallel {
        x.par_chunks(sample_in)
            .zip(grad_out.par_chunks(sample_out))
            .try_fold(|| None, fold)
            .try_reduce(|| None, combine)?
    } else {
        x.chunks(sample_in)
            .zip(grad_out.chunks(sample_out))
            .try_fold(None, fold)?
    };

    match total {
        Some(p) => Ok(p.grad_weight),
        None => alloc::try_filled(gw_len, T::zero()),
    }
}
