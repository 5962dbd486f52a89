//! File ownership probes.
//!
//! ## Probes
//! - **ChownProbe**: every chown family syscall, correlated from entry to
//!   exit with the resolved target file attached

pub mod chown;

pub use chown::ChownProbe;
