//! Shared test support (not a standalone integration test target).

mod faulty_directory;

pub use faulty_directory::{FaultConfig, FaultyDirectory};
