pub mod bound;
pub mod host;
pub mod peak_meter;
pub mod session;
