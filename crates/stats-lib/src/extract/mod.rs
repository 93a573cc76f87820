//! Host statistics extraction
//!
//! Turns the raw JSON payloads returned by remote CLI commands into the typed
//! records of [`crate::models`]. Extraction never fails: malformed or missing
//! sections yield empty or partial records.

mod edge;
mod esxi;


pub use edge::{extract_interfaces, extract_performance};
pub use esxi::{classify_thread, extract_host, ThreadClass, USAGE_FLOOR};
