//! Channel layer: output cleaning, pattern matching and the expect loop.

mod buffer;
mod expect;
mod patterns;

pub use buffer::{BufferMatch, PatternBuffer};
pub use expect::{ExpectEngine, Expected};
pub use patterns::{CompiledPattern, PatternSet, PatternSetBuilder};
