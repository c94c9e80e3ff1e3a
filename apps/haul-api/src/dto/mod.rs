//! Request and response bodies

pub mod hos;
