use std::future::Future;

use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Axis-aligned rectangle in source-image pixel coordinates.
/// Invariant: `x1 >= x0`, `y1 >= y0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        debug_assert!(x1 >= x0 && y1 >= y0, "degenerate box {x0},{y0}-{x1},{y1}");
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }
}

/// One recognized word. Confidence is recognizer-reported, 0–100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedWord {
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// One recognized line; `words` are ordered left-to-right and the order is
/// meaningful to the spatial extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedLine {
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub words: Vec<RecognizedWord>,
}

/// Recognizer block output. Stored for completeness, unused by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedBlock {
    pub text: String,
    pub bbox: BoundingBox,
}

/// Full recognizer output for one image. Produced once per image and held
/// read-only for the life of one extraction call; concurrent field
/// extraction over it needs no locking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedDocument {
    pub full_text: String,
    /// Overall recognizer confidence, 0–100.
    pub confidence: f32,
    pub lines: Vec<RecognizedLine>,
    /// Flattened words across all lines, document order.
    pub words: Vec<RecognizedWord>,
    pub blocks: Vec<RecognizedBlock>,
}

impl RecognizedDocument {
    /// Text-only document (no geometry). The spatial extractor declines
    /// these and the caller falls back to the text strategies.
    pub fn from_text(full_text: impl Into<String>, confidence: f32) -> Self {
        Self {
            full_text: full_text.into(),
            confidence,
            lines: Vec::new(),
            words: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn has_spatial_data(&self) -> bool {
        !self.lines.is_empty() && !self.words.is_empty()
    }
}

/// Provisional (value, confidence, source) triple produced by one text
/// strategy, pre-ranking. `source_line` is the zero-based line index the
/// value came from; -1 marks the whole-text pattern strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub value: String,
    pub confidence: f32,
    pub source_line: i32,
}

/// Boundary to the external text-recognition engine.
///
/// The engine is consumed only through this shape; `lang` is passed through
/// untouched. The returned future is the pipeline's sole suspension point.
pub trait TextRecognizer {
    fn recognize(
        &self,
        image_bytes: &[u8],
        lang: &str,
    ) -> impl Future<Output = Result<RecognizedDocument, ExtractionError>> + Send;
}
