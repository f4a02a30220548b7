//! Disassembly strategies
//!
//! Only linear sweep is provided: decoding starts at offset 0 and each record
//! begins where the previous one ended. No control flow is followed.

pub mod linear;

pub use self::linear::{run, run_many, LinearSweep, Stop};
