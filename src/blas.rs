//! Type-selected cuBLAS dispatch.
//!
//! [`BlasScalar`] is the seam between the generic [`DeviceMatrix`] API and
//! the precision-specific cuBLAS entry points: `f32` dispatches to the
//! `cublasS*` family, `f64` to `cublasD*`. Each trait method is a raw
//! pass-through returning the cuBLAS status for the caller to check;
//! dimension validation and error policy live a layer up.
//!
//! [`DeviceMatrix`]: crate::DeviceMatrix

#![allow(clippy::too_many_arguments)] // BLAS signatures are what they are
#![allow(clippy::missing_safety_doc)] // the safety contract is documented once, trait-level

use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::sync::OnceLock;

use cudarc::cublas::sys::{self, cublasHandle_t, cublasOperation_t, cublasStatus_t};
use cudarc::driver::{CudaSlice, DeviceRepr, ValidAsZeroBits};
use num_traits::Float;

use crate::context::{fatal, BlasContext};

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Abort unless a cuBLAS call reported success.
pub(crate) fn check(status: cublasStatus_t, call: &'static str) {
    if status != cublasStatus_t::CUBLAS_STATUS_SUCCESS {
        fatal(call, format!("{status:?}"));
    }
}

/// An IEEE floating-point scalar with a full cuBLAS entry-point set.
///
/// Sealed: exactly `f32` and `f64` implement it, matching the precisions
/// cuBLAS covers with the geam extension.
///
/// # Safety contract of the raw methods
///
/// Every pointer argument must be a device pointer valid for the extent the
/// dimension and leading-dimension/increment arguments describe. The methods
/// perform no validation; they exist only to select the right symbol per
/// precision.
pub trait BlasScalar:
    sealed::Sealed
    + Float
    + DeviceRepr
    + ValidAsZeroBits
    + Unpin
    + Display
    + Debug
    + FromStr
    + Send
    + Sync
    + 'static
{
    /// `C := alpha*op(A)*op(B) + beta*C` (column-major).
    unsafe fn gemm(
        handle: cublasHandle_t,
        transa: cublasOperation_t,
        transb: cublasOperation_t,
        m: i32,
        n: i32,
        k: i32,
        alpha: Self,
        a: *const Self,
        lda: i32,
        b: *const Self,
        ldb: i32,
        beta: Self,
        c: *mut Self,
        ldc: i32,
    ) -> cublasStatus_t;

    /// `C := alpha*op(A) + beta*op(B)` (cuBLAS extension).
    unsafe fn geam(
        handle: cublasHandle_t,
        transa: cublasOperation_t,
        transb: cublasOperation_t,
        m: i32,
        n: i32,
        alpha: Self,
        a: *const Self,
        lda: i32,
        beta: Self,
        b: *const Self,
        ldb: i32,
        c: *mut Self,
        ldc: i32,
    ) -> cublasStatus_t;

    /// `y := alpha*op(A)*x + beta*y`.
    unsafe fn gemv(
        handle: cublasHandle_t,
        trans: cublasOperation_t,
        m: i32,
        n: i32,
        alpha: Self,
        a: *const Self,
        lda: i32,
        x: *const Self,
        incx: i32,
        beta: Self,
        y: *mut Self,
        incy: i32,
    ) -> cublasStatus_t;

    /// Euclidean norm of `x`, written to the host location `result`.
    unsafe fn nrm2(
        handle: cublasHandle_t,
        n: i32,
        x: *const Self,
        incx: i32,
        result: *mut Self,
    ) -> cublasStatus_t;

    /// `x := alpha*x`.
    unsafe fn scal(
        handle: cublasHandle_t,
        n: i32,
        alpha: Self,
        x: *mut Self,
        incx: i32,
    ) -> cublasStatus_t;

    /// `y := alpha*x + y`.
    unsafe fn axpy(
        handle: cublasHandle_t,
        n: i32,
        alpha: Self,
        x: *const Self,
        incx: i32,
        y: *mut Self,
        incy: i32,
    ) -> cublasStatus_t;

    /// The device scalar cache: a one-element device buffer holding 1,
    /// created on first use and shared for the rest of the process.
    ///
    /// Used with increment 0 as the broadcast operand of axpy-based scalar
    /// addition, the one place a kernel needs a pointer to a scalar already
    /// resident in device memory.
    fn unit_cache() -> &'static CudaSlice<Self>;
}

impl BlasScalar for f32 {
    unsafe fn gemm(
        handle: cublasHandle_t,
        transa: cublasOperation_t,
        transb: cublasOperation_t,
        m: i32,
        n: i32,
        k: i32,
        alpha: Self,
        a: *const Self,
        lda: i32,
        b: *const Self,
        ldb: i32,
        beta: Self,
        c: *mut Self,
        ldc: i32,
    ) -> cublasStatus_t {
        sys::cublasSgemm_v2(
            handle, transa, transb, m, n, k, &alpha, a, lda, b, ldb, &beta, c, ldc,
        )
    }

    unsafe fn geam(
        handle: cublasHandle_t,
        transa: cublasOperation_t,
        transb: cublasOperation_t,
        m: i32,
        n: i32,
        alpha: Self,
        a: *const Self,
        lda: i32,
        beta: Self,
        b: *const Self,
        ldb: i32,
        c: *mut Self,
        ldc: i32,
    ) -> cublasStatus_t {
        sys::cublasSgeam(
            handle, transa, transb, m, n, &alpha, a, lda, &beta, b, ldb, c, ldc,
        )
    }

    unsafe fn gemv(
        handle: cublasHandle_t,
        trans: cublasOperation_t,
        m: i32,
        n: i32,
        alpha: Self,
        a: *const Self,
        lda: i32,
        x: *const Self,
        incx: i32,
        beta: Self,
        y: *mut Self,
        incy: i32,
    ) -> cublasStatus_t {
        sys::cublasSgemv_v2(handle, trans, m, n, &alpha, a, lda, x, incx, &beta, y, incy)
    }

    unsafe fn nrm2(
        handle: cublasHandle_t,
        n: i32,
        x: *const Self,
        incx: i32,
        result: *mut Self,
    ) -> cublasStatus_t {
        sys::cublasSnrm2_v2(handle, n, x, incx, result)
    }

    unsafe fn scal(
        handle: cublasHandle_t,
        n: i32,
        alpha: Self,
        x: *mut Self,
        incx: i32,
    ) -> cublasStatus_t {
        sys::cublasSscal_v2(handle, n, &alpha, x, incx)
    }

    unsafe fn axpy(
        handle: cublasHandle_t,
        n: i32,
        alpha: Self,
        x: *const Self,
        incx: i32,
        y: *mut Self,
        incy: i32,
    ) -> cublasStatus_t {
        sys::cublasSaxpy_v2(handle, n, &alpha, x, incx, y, incy)
    }

    fn unit_cache() -> &'static CudaSlice<Self> {
        static UNIT: OnceLock<CudaSlice<f32>> = OnceLock::new();
        UNIT.get_or_init(|| {
            let device = BlasContext::global().device();
            device
                .htod_copy(vec![1.0f32])
                .unwrap_or_else(|err| fatal("cuMemAlloc(unit scalar)", format!("{err:?}")))
        })
    }
}

impl BlasScalar for f64 {
    unsafe fn gemm(
        handle: cublasHandle_t,
        transa: cublasOperation_t,
        transb: cublasOperation_t,
        m: i32,
        n: i32,
        k: i32,
        alpha: Self,
        a: *const Self,
        lda: i32,
        b: *const Self,
        ldb: i32,
        beta: Self,
        c: *mut Self,
        ldc: i32,
    ) -> cublasStatus_t {
        sys::cublasDgemm_v2(
            handle, transa, transb, m, n, k, &alpha, a, lda, b, ldb, &beta, c, ldc,
        )
    }

    unsafe fn geam(
        handle: cublasHandle_t,
        transa: cublasOperation_t,
        transb: cublasOperation_t,
        m: i32,
        n: i32,
        alpha: Self,
        a: *const Self,
        lda: i32,
        beta: Self,
        b: *const Self,
        ldb: i32,
        c: *mut Self,
        ldc: i32,
    ) -> cublasStatus_t {
        sys::cublasDgeam(
            handle, transa, transb, m, n, &alpha, a, lda, &beta, b, ldb, c, ldc,
        )
    }

    unsafe fn gemv(
        handle: cublasHandle_t,
        trans: cublasOperation_t,
        m: i32,
        n: i32,
        alpha: Self,
        a: *const Self,
        lda: i32,
        x: *const Self,
        incx: i32,
        beta: Self,
        y: *mut Self,
        incy: i32,
    ) -> cublasStatus_t {
        sys::cublasDgemv_v2(handle, trans, m, n, &alpha, a, lda, x, incx, &beta, y, incy)
    }

    unsafe fn nrm2(
        handle: cublasHandle_t,
        n: i32,
        x: *const Self,
        incx: i32,
        result: *mut Self,
    ) -> cublasStatus_t {
        sys::cublasDnrm2_v2(handle, n, x, incx, result)
    }

    unsafe fn scal(
        handle: cublasHandle_t,
        n: i32,
        alpha: Self,
        x: *mut Self,
        incx: i32,
    ) -> cublasStatus_t {
        sys::cublasDscal_v2(handle, n, &alpha, x, incx)
    }

    unsafe fn axpy(
        handle: cublasHandle_t,
        n: i32,
        alpha: Self,
        x: *const Self,
        incx: i32,
        y: *mut Self,
        incy: i32,
    ) -> cublasStatus_t {
        sys::cublasDaxpy_v2(handle, n, &alpha, x, incx, y, incy)
    }

    fn unit_cache() -> &'static CudaSlice<Self> {
        static UNIT: OnceLock<CudaSlice<f64>> = OnceLock::new();
        UNIT.get_or_init(|| {
            let device = BlasContext::global().device();
            device
                .htod_copy(vec![1.0f64])
                .unwrap_or_else(|err| fatal("cuMemAlloc(unit scalar)", format!("{err:?}")))
        })
    }
}
