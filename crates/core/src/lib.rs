//! Domain logic shared by the card reveal crates.
//!
//! Everything in here is pure: subject modelling and validation, the
//! upstream status vocabulary, the progress heuristic, and the timing
//! constants the poll scheduler runs on. No I/O, no runtime.

pub mod error;
pub mod generation;
pub mod progress;
pub mod status;
pub mod subject;
pub mod types;
