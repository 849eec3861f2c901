//! Primitives shared by the tinykey crates.
//!
//! Kept free of runtime dependencies so both the secrets library and the CLI
//! can use it.

pub mod sensitive;
pub mod util;

pub use sensitive::Sensitive;
