//! Interactive time tracker. Start an activity, watch the clock run and stop it; the finished
//! activity is appended to a CSV or JSON log.
//!

pub mod cli;
pub mod storage;
pub mod tracking;
pub mod utils;
