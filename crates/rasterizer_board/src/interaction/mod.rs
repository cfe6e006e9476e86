pub mod geometry;
pub mod machine;

pub use geometry::{Handle, Point, Surface, SurfaceRect};
pub use machine::{Feedback, InteractionOptions, Interactor, Phase, Tool, HANDLE_SIZE};
