//! Strided sub-matrix GEMM.
//!
//! Every product in the engines is `C = alpha * op(A) * op(B) + beta * C`
//! where `A`, `B` and `C` are rectangular windows into larger flat buffers.
//! A [`MatView`] names such a window: where it starts, its stored shape, the
//! leading dimension (distance between consecutive stored rows) and whether
//! the operand is used transposed.
//!
//! - default: a simple triple loop, fanned out over output rows by the
//!   [`RowExecutor`]
//! - optional: the `matrixmultiply` feature hands whole products to
//!   `matrixmultiply::sgemm`
//!
//! The kernel trusts its callers' offset arithmetic. An out-of-bounds view is a
//! programming error and panics.

use crate::RowExecutor;

/// Window into a flat row-major buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatView {
    /// Index of element `(0, 0)` in the backing buffer.
    pub offset: usize,
    /// Stored rows.
    pub rows: usize,
    /// Stored columns.
    pub cols: usize,
    /// Leading dimension; `ld >= cols`.
    pub ld: usize,
    pub transposed: bool,
}

impl MatView {
    #[inline]
    pub const fn new(offset: usize, rows: usize, cols: usize, ld: usize) -> Self {
        Self {
            offset,
            rows,
            cols,
            ld,
            transposed: false,
        }
    }

    /// Dense `rows x cols` matrix at `offset`.
    #[inline]
    pub const fn dense(offset: usize, rows: usize, cols: usize) -> Self {
        Self::new(offset, rows, cols, cols)
    }

    /// Same window, used transposed.
    #[inline]
    pub const fn t(self) -> Self {
        Self {
            transposed: !self.transposed,
            ..self
        }
    }

    /// Stored rows `[first, first + count)` of this window.
    #[inline]
    pub const fn row_slice(self, first: usize, count: usize) -> Self {
        Self {
            offset: self.offset + first * self.ld,
            rows: count,
            ..self
        }
    }

    /// Stored columns `[first, first + count)` of this window.
    #[inline]
    pub const fn col_slice(self, first: usize, count: usize) -> Self {
        Self {
            offset: self.offset + first,
            cols: count,
            ..self
        }
    }

    /// Rows of `op(self)`.
    #[inline]
    pub const fn op_rows(&self) -> usize {
        if self.transposed { self.cols } else { self.rows }
    }

    /// Columns of `op(self)`.
    #[inline]
    pub const fn op_cols(&self) -> usize {
        if self.transposed { self.rows } else { self.cols }
    }

    /// One past the last element the window can touch.
    #[inline]
    pub const fn extent(&self) -> usize {
        if self.rows == 0 || self.cols == 0 {
            self.offset
        } else {
            self.offset + (self.rows - 1) * self.ld + self.cols
        }
    }

    /// `(row_stride, col_stride)` of `op(self)`.
    #[inline]
    const fn op_strides(&self) -> (usize, usize) {
        if self.transposed {
            (1, self.ld)
        } else {
            (self.ld, 1)
        }
    }
}

/// `c[cv] = alpha * op(a[av]) * op(b[bv]) + beta * c[cv]`.
///
/// With `beta == 0.0` the previous contents of `c[cv]` are ignored.
/// `cv` must not be transposed. Inner dimensions are only checked in debug
/// builds.
#[allow(clippy::too_many_arguments)]
pub fn matmul(
    exec: &RowExecutor,
    alpha: f32,
    a: &[f32],
    av: MatView,
    b: &[f32],
    bv: MatView,
    beta: f32,
    c: &mut [f32],
    cv: MatView,
) {
    debug_assert!(!cv.transposed, "destination view cannot be transposed");
    debug_assert!(cv.cols <= cv.ld || cv.rows <= 1);

    let m = cv.rows;
    let n = cv.cols;
    let k = av.op_cols();
    debug_assert_eq!(av.op_rows(), m, "op(A) rows {} != C rows {m}", av.op_rows());
    debug_assert_eq!(bv.op_rows(), k, "op(B) rows {} != op(A) cols {k}", bv.op_rows());
    debug_assert_eq!(bv.op_cols(), n, "op(B) cols {} != C cols {n}", bv.op_cols());

    if m == 0 || n == 0 {
        return;
    }

    let (rsa, csa) = av.op_strides();
    let (rsb, csb) = bv.op_strides();

    #[cfg(feature = "matrixmultiply")]
    if k > 0 {
        assert!(av.extent() <= a.len(), "A view out of bounds");
        assert!(bv.extent() <= b.len(), "B view out of bounds");
        assert!(cv.extent() <= c.len(), "C view out of bounds");

        // matrixmultiply supports arbitrary strides.
        unsafe {
            matrixmultiply::sgemm(
                m,
                k,
                n,
                alpha,
                a.as_ptr().add(av.offset),
                rsa as isize,
                csa as isize,
                b.as_ptr().add(bv.offset),
                rsb as isize,
                csb as isize,
                beta,
                c.as_mut_ptr().add(cv.offset),
                cv.ld as isize,
                1,
            );
        }
        return;
    }

    let a = &a[av.offset..];
    let b = &b[bv.offset..];
    exec.for_each_row(c, cv.offset, m, n, cv.ld, |i, c_row| {
        let a0 = i * rsa;
        for (j, out) in c_row.iter_mut().enumerate() {
            let b0 = j * csb;
            let mut acc = 0.0_f32;
            for p in 0..k {
                acc = a[a0 + p * csa].mul_add(b[p * rsb + b0], acc);
            }
            *out = if beta == 0.0 {
                alpha * acc
            } else {
                alpha * acc + beta * *out
            };
        }
    });
}

/// `dst[j] += sum_i src[view(i, j)]` over every stored row of `view`.
pub(crate) fn add_column_sums(src: &[f32], view: MatView, dst: &mut [f32]) {
    debug_assert!(!view.transposed);
    debug_assert_eq!(dst.len(), view.cols);
    for r in 0..view.rows {
        let row = &src[view.offset + r * view.ld..][..view.cols];
        for (d, &v) in dst.iter_mut().zip(row) {
            *d += v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plain reference product on dense operands.
    fn reference(m: usize, n: usize, k: usize, a: &[f32], b: &[f32]) -> Vec<f32> {
        let mut c = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0_f32;
                for p in 0..k {
                    acc = a[i * k + p].mul_add(b[p * n + j], acc);
                }
                c[i * n + j] = acc;
            }
        }
        c
    }

    #[test]
    fn dense_product_matches_reference() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2x3
        let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0]; // 3x2
        let mut c = vec![0.0; 4];
        matmul(
            &RowExecutor::Sequential,
            1.0,
            &a,
            MatView::dense(0, 2, 3),
            &b,
            MatView::dense(0, 3, 2),
            0.0,
            &mut c,
            MatView::dense(0, 2, 2),
        );
        assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
        assert_eq!(c, reference(2, 2, 3, &a, &b));
    }

    #[test]
    fn transposed_operands_read_the_same_storage() {
        // A^T stored as 3x2, B^T stored as 2x3.
        let at = [1.0, 4.0, 2.0, 5.0, 3.0, 6.0];
        let bt = [7.0, 9.0, 11.0, 8.0, 10.0, 12.0];
        let mut c = vec![0.0; 4];
        matmul(
            &RowExecutor::Sequential,
            1.0,
            &at,
            MatView::dense(0, 3, 2).t(),
            &bt,
            MatView::dense(0, 2, 3).t(),
            0.0,
            &mut c,
            MatView::dense(0, 2, 2),
        );
        assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn accumulates_with_alpha_and_beta() {
        let a = [1.0, 0.0, 0.0, 1.0];
        let b = [2.0, 3.0, 4.0, 5.0];
        let mut c = vec![1.0, 1.0, 1.0, 1.0];
        matmul(
            &RowExecutor::Sequential,
            2.0,
            &a,
            MatView::dense(0, 2, 2),
            &b,
            MatView::dense(0, 2, 2),
            0.5,
            &mut c,
            MatView::dense(0, 2, 2),
        );
        assert_eq!(c, vec![4.5, 6.5, 8.5, 10.5]);
    }

    #[test]
    fn sub_views_leave_the_rest_of_the_buffer_untouched() {
        // 4x5 buffer; multiply the 2x2 block at (1,2) by identity into a
        // 2x2 block at (2,1) of a 4x4 destination.
        let src: Vec<f32> = (0..20).map(|v| v as f32).collect();
        let eye = [1.0, 0.0, 0.0, 1.0];
        let mut dst = vec![-1.0_f32; 16];
        matmul(
            &RowExecutor::Sequential,
            1.0,
            &src,
            MatView::new(7, 2, 2, 5),
            &eye,
            MatView::dense(0, 2, 2),
            0.0,
            &mut dst,
            MatView::new(9, 2, 2, 4),
        );

        let mut expected = vec![-1.0_f32; 16];
        expected[9] = 7.0;
        expected[10] = 8.0;
        expected[13] = 12.0;
        expected[14] = 13.0;
        assert_eq!(dst, expected);
    }

    #[test]
    fn view_slicing_and_extent() {
        let v = MatView::new(3, 4, 2, 6);
        assert_eq!(v.extent(), 3 + 3 * 6 + 2);
        assert_eq!(v.row_slice(1, 2), MatView::new(9, 2, 2, 6));
        assert_eq!(v.col_slice(1, 1).offset, 4);
        assert_eq!(v.t().op_rows(), 2);
        assert_eq!(v.t().op_cols(), 4);
        assert_eq!(MatView::new(5, 0, 3, 3).extent(), 5);
    }

    #[test]
    fn pooled_rows_are_bit_identical_to_sequential() {
        let m = 37;
        let k = 11;
        let n = 5;
        let a: Vec<f32> = (0..m * k).map(|v| ((v * 7 % 13) as f32 - 6.0) * 0.1).collect();
        let b: Vec<f32> = (0..k * n).map(|v| ((v * 5 % 11) as f32 - 5.0) * 0.07).collect();

        let run = |exec: &RowExecutor| {
            let mut c = vec![0.25_f32; m * n];
            matmul(
                exec,
                1.0,
                &a,
                MatView::dense(0, m, k),
                &b,
                MatView::dense(0, k, n),
                1.0,
                &mut c,
                MatView::dense(0, m, n),
            );
            c
        };

        let pooled = RowExecutor::with_threads(4).unwrap().with_min_rows(1);
        assert_eq!(run(&RowExecutor::Sequential), run(&pooled));
    }

    #[test]
    fn column_sums_cover_only_the_view() {
        // Columns 1..3 of rows 1..3 in a 3x4 buffer.
        let src: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let mut dst = vec![1.0_f32, 1.0];
        add_column_sums(&src, MatView::new(5, 2, 2, 4), &mut dst);
        assert_eq!(dst, vec![1.0 + 5.0 + 9.0, 1.0 + 6.0 + 10.0]);
    }

    #[test]
    fn zero_inner_dimension_only_scales() {
        let mut c = vec![2.0_f32, 4.0];
        matmul(
            &RowExecutor::Sequential,
            1.0,
            &[],
            MatView::dense(0, 1, 0),
            &[],
            MatView::dense(0, 0, 2),
            0.5,
            &mut c,
            MatView::dense(0, 1, 2),
        );
        assert_eq!(c, vec![1.0, 2.0]);
    }
}
