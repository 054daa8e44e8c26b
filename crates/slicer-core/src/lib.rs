//! # Slicer Core
//!
//! The domain layer of the image slicer service.
//! Rate-limit policy, client identity and slice job types live here, together
//! with the ports that infrastructure implements. No I/O happens in this crate.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::DomainError;
