pub mod color;
pub mod compositor;
pub mod element;
pub mod export;
pub mod glyph;
pub mod grid;
pub mod interaction;
pub mod library;
pub mod preview;
pub mod session;
pub mod snapshot;
pub mod store;

pub use color::{Color, ColorError};
pub use compositor::{composite, Compositor};
pub use element::{Element, ElementId, ElementList, Shape};
pub use export::ExportFormat;
pub use glyph::{FormatError, Glyph, GlyphSource};
pub use grid::{PixelGrid, RasterTarget, GRID_HEIGHT, GRID_WIDTH};
pub use interaction::{Feedback, InteractionOptions, Point, Tool};
pub use library::{GlyphLibrary, SnapshotLibrary};
pub use preview::quantize::{ColorBucket, PreviewCell, PreviewGrid, Thresholds};
pub use preview::refresh::RefreshOptions;
pub use preview::sample::SamplePolicy;
pub use preview::{Downsampler, PreviewOptions, PreviewOutput};
pub use session::Session;
pub use snapshot::{Snapshot, SnapshotSummary};
pub use store::{FileStore, KeyValueStore, MemoryStore};

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("invalid board data: {0}")]
    Validation(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("no library entry {0:?}")]
    NotFound(String),
    #[error(transparent)]
    Glyph(#[from] FormatError),
    #[error(transparent)]
    Color(#[from] ColorError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BoardError {
    /// Input was rejected; nothing was changed.
    pub fn is_validation(&self) -> bool {
        matches!(self, BoardError::Validation(_) | BoardError::Glyph(_) | BoardError::Color(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoardConfig {
    pub width: u16,
    pub height: u16,
    /// Surface units per grid cell for pointer interaction.
    pub cell_size: f32,
    pub preview: PreviewOptions,
    pub refresh: RefreshOptions,
    pub interaction: InteractionOptions,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            width: GRID_WIDTH,
            height: GRID_HEIGHT,
            cell_size: 10.0,
            preview: PreviewOptions::default(),
            refresh: RefreshOptions::default(),
            interaction: InteractionOptions::default(),
        }
    }
}
