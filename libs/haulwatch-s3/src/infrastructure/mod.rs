//! S3 implementations of the domain ports

mod keys;
mod objects;
mod s3_dvir_gate;
mod s3_log_store;

pub use objects::ObjectError;
pub use s3_dvir_gate::S3DvirGate;
pub use s3_log_store::S3LogStore;
