//! Feature preprocessing
//!
//! The fitted [`Preprocessor`] is persisted by the transformation stage and
//! bundled with the winning model for serving.

mod pipeline;

pub use pipeline::{PreprocessStep, Preprocessor};
