// Direct convolution kernels
//
// Each output element (forward) and each gradient element (backward) is an
// independent sum read straight from the operands:
//
//   forward:      out[n,co,oh,ow]   = Σ_{ci,ki,kj}  x[n,ci,ih,iw] · w[co,ci,ki,kj]
//   grad_input:   gx[n,ci,ih,iw]    = Σ_{co,ki,kj}  gy[n,co,oh,ow] · w[co,ci,ki,kj]
//   grad_weight:  gw[co,ci,ki,kj]   = Σ_{n,oh,ow}   gy[n,co,oh,ow] · x[n,ci,ih,iw]
//
// with (ih, iw) = (rows.source(oh, ki), cols.source(ow, kj)). grad_input is
// written in gather form through `AxisMap::target`, so every job owns a
// disjoint slice of the result and no accumulation target is shared between
// workers.
//
// Work is split into planes: (n, co) for the output, (n, ci) for grad_input
// and one filter co for grad_weight.

use rayon::prelude::*;

use crate::dtype::Element;

use super::params::ConvGeometry;

/// out: `[N, C_out, H_out, W_out]`, zero-initialised.
pub(crate) fn forward<T: Element>(
    g: &ConvGeometry,
    x: &[T],
    w: &[T],
    out: &mut [T],
    parallel: bool,
) {
    let (rows, cols) = (g.rows(), g.cols());
    let (in_plane, k_plane) = (g.in_plane(), g.kernel_plane());

    let job = |(plane, dst): (usize, &mut [T])| {
        let (n, co) = (plane / g.c_out, plane % g.c_out);
        let x_n = &x[n * g.c_in * in_plane..][..g.c_in * in_plane];
        let w_co = &w[co * g.c_in * k_plane..][..g.c_in * k_plane];
        for oh in 0..g.out_h {
            for ow in 0..g.out_w {
                let mut acc = T::zero();
                for ci in 0..g.c_in {
                    let x_c = &x_n[ci * in_plane..][..in_plane];
                    let w_c = &w_co[ci * k_plane..][..k_plane];
                    for ki in 0..g.kh {
                        let Some(ih) = rows.source(oh, ki) else {
                            continue;
                        };
                        for kj in 0..g.kw {
                            if let Some(iw) = cols.source(ow, kj) {
                                acc = acc + x_c[ih * g.w + iw] * w_c[ki * g.kw + kj];
                            }
                        }
                    }
                }
                dst[oh * g.out_w + ow] = acc;
            }
        }
    };

    if parallel {
        out.par_chunks_mut(g.out_plane()).enumerate().for_each(job);
    } else {
        out.chunks_mut(g.out_plane()).enumerate().for_each(job);
    }
}

/// grad_input: `[N, C_in, H, W]`, zero-initialised.
pub(crate) fn backward_input<T: Element>(
    g: &ConvGeometry,
    grad_out: &[T],
    w: &[T],
    grad_input: &mut [T],
    parallel: bool,
) {
    let (rows, cols) = (g.rows(), g.cols());
    let (out_plane, k_plane) = (g.out_plane(), g.kernel_plane());

    let job = |(plane, dst): (usize, &mut [T])| {
        let (n, ci) = (plane / g.c_in, plane % g.c_in);
        let gy_n = &grad_out[n * g.c_out * out_plane..][..g.c_out * out_plane];
        for ih in 0..g.h {
            for iw in 0..g.w {
                let mut acc = T::zero();
                for ki in 0..g.kh {
                    let Some(oh) = rows.target(ih, ki, g.out_h) else {
                        continue;
                    };
                    for kj in 0..g.kw {
                        let Some(ow) = cols.target(iw, kj, g.out_w) else {
                            continue;
                        };
                        for co in 0..g.c_out {
                            let wv = w[(co * g.c_in + ci) * k_plane + ki * g.kw + kj];
                            acc = acc + gy_n[co * out_plane + oh * g.out_w + ow] * wv;
                        }
                    }
                }
                dst[ih * g.w + iw] = acc;
            }
        }
    };

    if parallel {
        grad_input
            .par_chunks_mut(g.in_plane())
            .enumerate()
            .for_each(job);
    } else {
        grad_input.chunks_mut(g.in_plane()).enumerate().for_each(job);
    }
}

/// grad_weight: `[C_out, C_in, kH, kW]`, zero-initialised.
pub(crate) fn backward_weight<T: Element>(
    g: &ConvGeometry,
    x: &[T],
    grad_out: &[T],
    grad_weight: &mut [T],
    parallel: bool,
) {
    let (rows, cols) = (g.rows(), g.cols());
    let (in_plane, out_plane, k_plane) = (g.in_plane(), g.out_plane(), g.kernel_plane());

    let job = |(co, dst): (usize, &mut [T])| {
        for ci in 0..g.c_in {
            for ki in 0..g.kh {
                for kj in 0..g.kw {
                    let mut acc = T::zero();
                    for n in 0..g.n {
                        let x_c = &x[(n * g.c_in + ci) * in_plane..][..in_plane];
                        let gy_c = &grad_out[(n * g.c_out + co) * out_plane..][..out_plane];
                        for oh in 0..g.out_h {
                            let Some(ih) = rows.source(oh, ki) else {
                                continue;
                            };
                            for ow in 0..g.out_w {
                                if let Some(iw) = cols.source(ow, kj) {
                                    acc = acc + gy_c[oh * g.out_w + ow] * x_c[ih * g.w + iw];
                                }
                            }
                        }
                    }
                    dst[ci * k_plane + ki * g.kw + kj] = acc;
                }
            }
        }
    };

    let filter = g.c_in * k_plane;
    if parallel {
        grad_weight.par_chunks_mut(filter).enumerate().for_each(job);
    } else {
        grad_weight.chunks_mut(filter).enumerate().for_each(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::ConvParams;
    use crate::shape::Shape;

    fn geometry(input: [usize; 4], weight: [usize; 4], p: ConvParams) -> ConvGeometry {
        ConvGeometry::infer(&Shape::from(input), &Shape::from(weight), p).unwrap()
    }

    #[test]
    fn test_forward_known_values() {
        // 1-channel 3x3 input, 2x2 diagonal kernel
        //   out[0,0] = 1 + 5, out[0,1] = 2 + 6, out[1,0] = 4 + 8, out[1,1] = 5 + 9
        let g = geometry([1, 1, 3, 3], [1, 1, 2, 2], ConvParams::default());
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let w = [1.0, 0.0, 0.0, 1.0];
        let mut out = vec![0.0f64; 4];
        forward(&g, &x, &w, &mut out, false);
        assert_eq!(out, vec![6.0, 8.0, 12.0, 14.0]);
    }

    #[test]
    fn test_forward_padding_reads_zeros() {
        // 2x2 ones, 3x3 ones kernel, pad 1: each output counts the in-bounds taps
        let g = geometry([1, 1, 2, 2], [1, 1, 3, 3], ConvParams::new([1, 1], [1, 1]).unwrap());
        let mut out = vec![0.0f32; 4];
        forward(&g, &[1.0; 4], &[1.0; 9], &mut out, false);
        assert_eq!(out, vec![4.0; 4]);
    }

    #[test]
    fn test_backward_input_counts_overlaps() {
        // With all-ones grad and weight, grad_input counts how many outputs
        // read each input position.
        let g = geometry([1, 1, 3, 3], [1, 1, 2, 2], ConvParams::default());
        let mut gx = vec![0.0f64; 9];
        backward_input(&g, &[1.0; 4], &[1.0; 4], &mut gx, false);
        assert_eq!(gx, vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_backward_weight_sums_windows() {
        let g = geometry([1, 1, 3, 3], [1, 1, 2, 2], ConvParams::default());
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let mut gw = vec![0.0f64; 4];
        backward_weight(&g, &x, &[1.0; 4], &mut gw, false);
        // tap (0,0) sees 1+2+4+5, tap (0,1) sees 2+3+5+6, ...
        assert_eq!(gw, vec![12.0, 16.0, 24.0, 28.0]);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let g = geometry([2, 3, 5, 4], [4, 3, 3, 2], ConvParams::new([2, 1], [1, 1]).unwrap());
        let x: Vec<f64> = (0..g.input_shape().elem_count()).map(|i| (i % 7) as f64 - 3.0).collect();
        let w: Vec<f64> = (0..g.weight_shape().elem_count()).map(|i| (i % 5) as f64 * 0.5).collect();
        let mut serial = vec![0.0; g.output_shape().elem_count()];
        let mut par = serial.clone();
        forward(&g, &x, &w, &mut serial, false);
        forward(&g, &x, &w, &mut par, true);
        assert_eq!(serial, par);
    }
}
