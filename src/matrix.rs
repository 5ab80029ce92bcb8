//! GPU-resident dense matrix value type.
//!
//! [`DeviceMatrix`] owns a column-major device buffer plus its logical shape
//! and a transpose flag. The buffer is capacity-backed: `resize` within the
//! high-water mark is free, growth reallocates. All arithmetic stays on the
//! device; host memory is touched only by the explicit construction and
//! readback paths.

use std::fmt;
use std::mem;
use std::path::Path;

use cudarc::cublas::sys::cublasOperation_t;
use cudarc::driver::{CudaSlice, DevicePtr, DevicePtrMut};

use crate::blas::{check, BlasScalar};
use crate::context::{fatal, BlasContext};
use crate::format;

/// A dense matrix resident in device memory.
///
/// Storage is column-major with leading dimension equal to the physical row
/// count. The transpose flag reinterprets the storage as its transpose
/// without moving data; consumers that check dimensions must go through
/// [`effective_shape`](Self::effective_shape).
///
/// # Examples
///
/// ```rust,no_run
/// use matriz::DeviceMatrix;
///
/// // 2x2 from column-major host data.
/// let mut a = DeviceMatrix::from_host(&[1.0f32, 3.0, 2.0, 4.0], 2, 2);
/// assert_eq!(a.effective_shape(), (2, 2));
///
/// a.transpose(); // O(1), no data movement
/// assert!(a.is_transposed());
/// ```
pub struct DeviceMatrix<T: BlasScalar> {
    rows: usize,
    cols: usize,
    transposed: bool,
    /// `None` is the valid empty state; otherwise the slice length is the
    /// capacity, of which the first `rows * cols` elements are live.
    buf: Option<CudaSlice<T>>,
}

impl<T: BlasScalar> DeviceMatrix<T> {
    /// Create an empty matrix (no device allocation).
    ///
    /// Useful as the output operand of [`gemm`](crate::gemm)/
    /// [`geam`](crate::geam), which resize it. A `new` + `resize` pair is
    /// the uninitialized-buffer construction path.
    pub fn new() -> Self {
        Self {
            rows: 0,
            cols: 0,
            transposed: false,
            buf: None,
        }
    }

    /// Create a zero-filled `rows x cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        let size = rows * cols;
        if size == 0 {
            return Self {
                rows,
                cols,
                transposed: false,
                buf: None,
            };
        }
        let device = BlasContext::global().device();
        let buf = device
            .alloc_zeros::<T>(size)
            .unwrap_or_else(|err| fatal("cuMemAlloc", format!("{err:?}")));
        Self {
            rows,
            cols,
            transposed: false,
            buf: Some(buf),
        }
    }

    /// Create a matrix from a column-major host buffer.
    ///
    /// `data` must hold exactly `rows * cols` elements; the layout contract
    /// is the caller's responsibility.
    pub fn from_host(data: &[T], rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "host buffer has {} elements, shape {}x{} needs {}",
            data.len(),
            rows,
            cols,
            rows * cols
        );
        if data.is_empty() {
            return Self {
                rows,
                cols,
                transposed: false,
                buf: None,
            };
        }
        let device = BlasContext::global().device();
        let buf = device
            .htod_copy(data.to_vec())
            .unwrap_or_else(|err| fatal("cuMemcpyHtoD", format!("{err:?}")));
        Self {
            rows,
            cols,
            transposed: false,
            buf: Some(buf),
        }
    }

    /// Load a matrix from a text file (one row per line, values
    /// whitespace-separated, row-major text order).
    ///
    /// Shape is inferred from the line and token counts. A malformed file is
    /// a fatal input error, consistent with the crate's no-recovery policy.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .unwrap_or_else(|err| fatal("read matrix file", format!("{}: {err}", path.display())));
        let parsed = match format::parse::<T>(&text) {
            Ok(parsed) => parsed,
            Err(err) => fatal("parse matrix file", format!("{}: {err}", path.display())),
        };
        // The file is row-major text; storage is column-major.
        let mut column_major = Vec::with_capacity(parsed.data.len());
        for c in 0..parsed.cols {
            for r in 0..parsed.rows {
                column_major.push(parsed.data[r * parsed.cols + c]);
            }
        }
        Self::from_host(&column_major, parsed.rows, parsed.cols)
    }

    /// Physical row count.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Physical column count.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of live elements, `rows * cols`.
    pub fn size(&self) -> usize {
        self.rows * self.cols
    }

    /// Elements allocatable without reallocation. Grows, never shrinks.
    pub fn capacity(&self) -> usize {
        self.buf.as_ref().map_or(0, CudaSlice::len)
    }

    /// True if the matrix holds no elements.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// True if the transpose view is active.
    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    /// Logical shape after applying the transpose flag.
    ///
    /// This is the single place the transpose swap happens; every dimension
    /// check in the crate goes through it.
    pub fn effective_shape(&self) -> (usize, usize) {
        if self.transposed {
            (self.cols, self.rows)
        } else {
            (self.rows, self.cols)
        }
    }

    /// The cuBLAS operation flag this operand contributes to a BLAS call.
    pub fn op(&self) -> cublasOperation_t {
        if self.transposed {
            cublasOperation_t::CUBLAS_OP_T
        } else {
            cublasOperation_t::CUBLAS_OP_N
        }
    }

    /// Leading dimension of the physical storage: always the physical row
    /// count, regardless of the transpose flag.
    pub fn lda(&self) -> i32 {
        self.rows as i32
    }

    /// The device buffer, if allocated. Length is the capacity.
    pub fn data(&self) -> Option<&CudaSlice<T>> {
        self.buf.as_ref()
    }

    /// Mutable access to the device buffer, if allocated.
    pub fn data_mut(&mut self) -> Option<&mut CudaSlice<T>> {
        self.buf.as_mut()
    }

    /// Toggle the transpose view in place. O(1), no data movement.
    ///
    /// Returns `&mut Self` so call sites can chain into an operation.
    pub fn transpose(&mut self) -> &mut Self {
        self.transposed = !self.transposed;
        self
    }

    pub(crate) fn set_untransposed(&mut self) {
        self.transposed = false;
    }

    /// Set the logical shape to `rows x cols`, reallocating only on growth.
    ///
    /// If `rows * cols` fits in the current capacity the buffer is reused
    /// and no device call is made. On growth a fresh buffer of exactly
    /// `rows * cols` elements is allocated and the old one is freed;
    /// contents are not preserved and the new buffer is not zero-filled.
    /// Capacity never shrinks.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        let needed = rows * cols;
        if needed > self.capacity() {
            let device = BlasContext::global().device();
            // SAFETY: the allocation is uninitialized; resize documents that
            // contents are unspecified until the caller writes them.
            let buf = unsafe { device.alloc::<T>(needed) }
                .unwrap_or_else(|err| fatal("cuMemAlloc", format!("{err:?}")));
            self.buf = Some(buf);
        }
        self.rows = rows;
        self.cols = cols;
    }

    /// Overwrite every live element with `value`.
    pub fn fill(&mut self, value: T) {
        let size = self.size();
        if size == 0 {
            return;
        }
        let device = BlasContext::global().device();
        let host = vec![value; size];
        let buf = self.buf.as_mut().expect("non-empty matrix has a buffer");
        let mut view = buf.slice_mut(0..size);
        device
            .htod_sync_copy_into(&host, &mut view)
            .unwrap_or_else(|err| fatal("cuMemcpyHtoD", format!("{err:?}")));
    }

    /// Scale every live element in place: `A := alpha * A`.
    pub fn scale(&mut self, alpha: T) {
        let size = self.size();
        if size == 0 {
            return;
        }
        let buf = self.buf.as_mut().expect("non-empty matrix has a buffer");
        // SAFETY: buffer holds at least `size` elements.
        unsafe { Self::scal(size as i32, alpha, buf, 1) };
    }

    /// Add a scalar to every live element in place: `A := A + value`.
    ///
    /// Implemented as axpy against the device scalar cache with increment 0,
    /// broadcasting the cached 1 across the buffer.
    pub fn add_scalar(&mut self, value: T) {
        let size = self.size();
        if size == 0 {
            return;
        }
        let unit = T::unit_cache();
        let buf = self.buf.as_mut().expect("non-empty matrix has a buffer");
        // SAFETY: y holds `size` elements; x is read with stride 0.
        unsafe { Self::axpy(size as i32, value, unit, 0, buf, 1) };
    }

    /// Exchange contents with `other`: shape, flag, and buffer ownership.
    ///
    /// The primitive through which operators move a freshly built result
    /// into their destination.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Read the live elements back to host memory, in physical column-major
    /// order. Synchronizes.
    pub fn to_vec(&self) -> Vec<T> {
        let size = self.size();
        let Some(buf) = self.buf.as_ref() else {
            return Vec::new();
        };
        let view = buf.slice(0..size);
        BlasContext::global()
            .device()
            .dtoh_sync_copy(&view)
            .unwrap_or_else(|err| fatal("cuMemcpyDtoH", format!("{err:?}")))
    }

    /// Live elements in effective (logical) row-major order.
    fn effective_row_major(&self) -> Vec<T> {
        let host = self.to_vec();
        let (rows, cols) = self.effective_shape();
        let mut out = Vec::with_capacity(host.len());
        for i in 0..rows {
            for j in 0..cols {
                let (pr, pc) = if self.transposed { (j, i) } else { (i, j) };
                out.push(host[pr + pc * self.rows]);
            }
        }
        out
    }

    /// Write the matrix to `path` in the text format.
    ///
    /// The *effective* view is saved, so save-then-load reproduces what
    /// consumers see regardless of the transpose flag.
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let (rows, cols) = self.effective_shape();
        let text = format::render(rows, cols, &self.effective_row_major());
        std::fs::write(path, text)
            .unwrap_or_else(|err| fatal("write matrix file", format!("{}: {err}", path.display())));
    }

    // ------------------------------------------------------------------
    // Static BLAS wrappers
    //
    // Thin pass-throughs to the cuBLAS handle: explicit dimensions, leading
    // dimensions and multipliers, no validation. A cuBLAS failure is fatal.
    // ------------------------------------------------------------------

    /// `C := alpha*op(A)*op(B) + beta*C`, column-major.
    ///
    /// # Safety
    ///
    /// The buffers must cover the extents described by `m`, `n`, `k` and the
    /// leading dimensions; nothing is validated here.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn gemm(
        transa: cublasOperation_t,
        transb: cublasOperation_t,
        m: i32,
        n: i32,
        k: i32,
        alpha: T,
        a: &CudaSlice<T>,
        lda: i32,
        b: &CudaSlice<T>,
        ldb: i32,
        beta: T,
        c: &mut CudaSlice<T>,
        ldc: i32,
    ) {
        let handle = *BlasContext::global().blas().handle();
        let status = T::gemm(
            handle,
            transa,
            transb,
            m,
            n,
            k,
            alpha,
            *a.device_ptr() as *const T,
            lda,
            *b.device_ptr() as *const T,
            ldb,
            beta,
            *c.device_ptr_mut() as *mut T,
            ldc,
        );
        check(status, "cublas gemm");
    }

    /// `C := alpha*op(A) + beta*op(B)`, column-major.
    ///
    /// # Safety
    ///
    /// As [`gemm`](Self::gemm): extents are the caller's contract.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn geam(
        transa: cublasOperation_t,
        transb: cublasOperation_t,
        m: i32,
        n: i32,
        alpha: T,
        a: &CudaSlice<T>,
        lda: i32,
        beta: T,
        b: &CudaSlice<T>,
        ldb: i32,
        c: &mut CudaSlice<T>,
        ldc: i32,
    ) {
        let handle = *BlasContext::global().blas().handle();
        let status = T::geam(
            handle,
            transa,
            transb,
            m,
            n,
            alpha,
            *a.device_ptr() as *const T,
            lda,
            beta,
            *b.device_ptr() as *const T,
            ldb,
            *c.device_ptr_mut() as *mut T,
            ldc,
        );
        check(status, "cublas geam");
    }

    /// `y := alpha*op(A)*x + beta*y`.
    ///
    /// # Safety
    ///
    /// As [`gemm`](Self::gemm): extents are the caller's contract.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn gemv(
        trans: cublasOperation_t,
        m: i32,
        n: i32,
        alpha: T,
        a: &CudaSlice<T>,
        lda: i32,
        x: &CudaSlice<T>,
        incx: i32,
        beta: T,
        y: &mut CudaSlice<T>,
        incy: i32,
    ) {
        let handle = *BlasContext::global().blas().handle();
        let status = T::gemv(
            handle,
            trans,
            m,
            n,
            alpha,
            *a.device_ptr() as *const T,
            lda,
            *x.device_ptr() as *const T,
            incx,
            beta,
            *y.device_ptr_mut() as *mut T,
            incy,
        );
        check(status, "cublas gemv");
    }

    /// Euclidean norm of `n` strided elements of `x`. Synchronizes (the
    /// result is produced in host memory).
    ///
    /// # Safety
    ///
    /// `x` must cover `n` elements at stride `incx`.
    pub unsafe fn nrm2(n: i32, x: &CudaSlice<T>, incx: i32) -> T {
        let handle = *BlasContext::global().blas().handle();
        let mut result = T::zero();
        let status = T::nrm2(handle, n, *x.device_ptr() as *const T, incx, &mut result);
        check(status, "cublas nrm2");
        result
    }

    /// `x := alpha*x` over `n` strided elements.
    ///
    /// # Safety
    ///
    /// `x` must cover `n` elements at stride `incx`.
    pub unsafe fn scal(n: i32, alpha: T, x: &mut CudaSlice<T>, incx: i32) {
        let handle = *BlasContext::global().blas().handle();
        let status = T::scal(handle, n, alpha, *x.device_ptr_mut() as *mut T, incx);
        check(status, "cublas scal");
    }

    /// `y := alpha*x + y` over `n` strided elements.
    ///
    /// # Safety
    ///
    /// `x` and `y` must cover `n` elements at their strides (`incx` may be 0
    /// to broadcast a device scalar).
    pub unsafe fn axpy(n: i32, alpha: T, x: &CudaSlice<T>, incx: i32, y: &mut CudaSlice<T>, incy: i32) {
        let handle = *BlasContext::global().blas().handle();
        let status = T::axpy(
            handle,
            n,
            alpha,
            *x.device_ptr() as *const T,
            incx,
            *y.device_ptr_mut() as *mut T,
            incy,
        );
        check(status, "cublas axpy");
    }
}

impl<T: BlasScalar> Default for DeviceMatrix<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: BlasScalar> Clone for DeviceMatrix<T> {
    /// Deep copy: a fresh device buffer of exactly `rows * cols` elements
    /// (spare capacity is not inherited) with a device-to-device transfer of
    /// the live contents.
    fn clone(&self) -> Self {
        let size = self.size();
        if size == 0 {
            return Self {
                rows: self.rows,
                cols: self.cols,
                transposed: self.transposed,
                buf: None,
            };
        }
        let device = BlasContext::global().device();
        let src = self.buf.as_ref().expect("non-empty matrix has a buffer");
        // SAFETY: fully overwritten by the dtod copy below.
        let mut buf = unsafe { device.alloc::<T>(size) }
            .unwrap_or_else(|err| fatal("cuMemAlloc", format!("{err:?}")));
        device
            .dtod_copy(&src.slice(0..size), &mut buf)
            .unwrap_or_else(|err| fatal("cuMemcpyDtoD", format!("{err:?}")));
        Self {
            rows: self.rows,
            cols: self.cols,
            transposed: self.transposed,
            buf: Some(buf),
        }
    }
}

impl<T: BlasScalar> fmt::Display for DeviceMatrix<T> {
    /// Renders the effective view in the text file format: one logical row
    /// per line, values space-separated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (rows, cols) = self.effective_shape();
        f.write_str(&format::render(rows, cols, &self.effective_row_major()))
    }
}
