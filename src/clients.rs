pub mod theme_extractor;

pub use theme_extractor::{InferenceError, ThemeExtractorClient};
