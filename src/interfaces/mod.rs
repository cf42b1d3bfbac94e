//! Batch CSV input and report output for the command-line driver.

pub mod csv;
