pub mod types;
pub mod similarity;
pub mod matcher;
pub mod sanitize;
pub mod preprocess;
pub mod fields;
pub mod text_fields;
pub mod spatial_fields;
pub mod sections;
pub mod recognizer;
pub mod orchestrator;

pub use types::*;
pub use similarity::{edit_distance, normalize, similarity};
pub use matcher::*;
pub use sanitize::*;
pub use preprocess::*;
pub use fields::*;
pub use text_fields::*;
pub use spatial_fields::*;
pub use sections::*;
pub use recognizer::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("image preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("text recognition failed: {0}")]
    Recognition(String),

    #[error("text recognition timed out after {0:?}")]
    RecognitionTimeout(std::time::Duration),
}
