//! # Harbor Core
//!
//! Foundational types shared by every Harbor crate:
//!
//! - [`Error`] / [`ErrorKind`] - structured errors with a transport-neutral taxonomy
//! - [`ErrorList`] / [`Partial`] - ordered error aggregation for best-effort passes
//! - [`Options`] / [`Opt`] - immutable, type-indexed option carrier
//! - [`FactoryRegistry`] - process-wide name → factory maps

#![doc(html_root_url = "https://docs.rs/harbor-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod options;
mod registry;

pub use error::{
    reasons, BoxError, Error, ErrorDetail, ErrorEnvelope, ErrorKind, ErrorList, GrpcCode,
    HarborResult, Partial,
};
pub use options::{Opt, Options};
pub use registry::{DuplicatePolicy, FactoryRegistry};
