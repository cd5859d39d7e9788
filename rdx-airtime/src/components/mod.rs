//! Contains the moving parts that sit around the timeline.
//!
//! The now-playing clock watches the timeline as time passes, autofill keeps
//! it from running dry, and sinks carry the resulting events out of the
//! station. The `AirtimeStation` wires them together.

pub mod autofill;
pub mod now_playing;
pub mod sink;
