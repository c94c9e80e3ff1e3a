//! # HaulWatch S3 Adapter
//!
//! Implements the duty-status log and DVIR ports of `haulwatch-domain` on top
//! of an S3 bucket. Every record is a JSON object; keys are laid out so that
//! a driver's segments and violations list in time order.

pub mod infrastructure;

pub use infrastructure::{S3DvirGate, S3LogStore};
