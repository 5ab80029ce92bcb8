//! # Matriz
//!
//! GPU-resident dense matrices with cuBLAS-backed operator syntax.
//!
//! Matriz (Spanish: "matrix") keeps matrix data in device memory for its
//! entire lifetime and issues every arithmetic operation through a single
//! process-wide cuBLAS handle. Host memory is touched only at the explicit
//! boundaries: construction from host data, file I/O, and readback.
//!
//! ## Features
//!
//! - **Value semantics**: [`DeviceMatrix`] owns its device buffer; `Clone` is
//!   a device-to-device deep copy, moves transfer ownership.
//! - **Lazy transpose**: [`DeviceMatrix::transpose`] toggles a view flag in
//!   O(1); downstream BLAS calls derive their operation flag and leading
//!   dimension from it. No data movement, ever.
//! - **Amortized reallocation**: buffer capacity is a high-water mark. It
//!   grows as needed but never shrinks, so repeated resize in a hot loop
//!   settles into zero allocations.
//! - **Operator syntax**: `&a * &b` is a gemm, `&a + &b` is a geam,
//!   `&a * 2.0` is a scal, all staying on the GPU.
//!
//! ## Example
//!
//! ```rust,no_run
//! use matriz::{gemm, nrm2, DeviceMatrix};
//!
//! // Column-major host data: A is 2x3, B is 3x2.
//! let a = DeviceMatrix::from_host(&[1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0], 2, 3);
//! let b = DeviceMatrix::from_host(&[1.0f32, 0.0, 1.0, 0.0, 1.0, 1.0], 3, 2);
//!
//! let mut c = DeviceMatrix::new();
//! gemm(&a, &b, &mut c); // C := A * B, resized to 2x2
//!
//! let product = &a * &b; // same thing, operator form
//! assert_eq!(product.to_vec(), c.to_vec());
//!
//! let norm: f32 = nrm2(&c);
//! println!("|C| = {norm}");
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------+
//! |  operators / free fns     |  <- dimension checks, effective shapes
//! +---------------------------+
//! |  DeviceMatrix wrappers    |  <- thin, unvalidated BLAS pass-throughs
//! +---------------------------+
//! |  BlasScalar dispatch      |  <- f32 -> cublasS*, f64 -> cublasD*
//! +---------------------------+
//! |  BlasContext (singleton)  |  <- cudarc driver + cuBLAS handle
//! +---------------------------+
//! ```
//!
//! ## Error policy
//!
//! There are exactly two failure classes and neither is recoverable: a
//! device/runtime failure (allocation, BLAS call, context creation) aborts
//! the process with a diagnostic naming the failing call, and a caller
//! contract violation (mismatched dimensions, malformed matrix file) is an
//! assertion failure. A corrupted device context has no safe continuation,
//! so no `Result` is surfaced from the core API.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)] // matrix dims fit i32 per cuBLAS contract
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)] // usize -> f64 in diagnostics is fine
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)] // the all-fatal policy is documented once, crate-level
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::float_cmp)] // exact comparisons are intentional in the copy/fill laws

pub mod blas;
pub mod context;
pub mod format;
pub mod matrix;
pub mod ops;

pub use blas::BlasScalar;
pub use context::{cuda_available, BlasContext};
pub use format::FormatError;
pub use matrix::DeviceMatrix;
pub use ops::{geam, geam_scaled, gemm, gemm_scaled, nrm2};
