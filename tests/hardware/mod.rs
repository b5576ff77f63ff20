//! Tests against real serial hardware. Ignored by default.

pub mod link_tests;
pub mod utils;
