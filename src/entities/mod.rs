//! Entities module - pixel types, collaborator traits and their reference
//! implementations (image decoding, software painting).

pub mod compositor;
pub mod frame;
pub mod loader;
pub mod traits;

pub use compositor::Canvas;
pub use frame::{PixelBuffer, PixelFormat, Rect};
pub use loader::{AnimatedImageSource, ImageKind};
pub use traits::{
    AllocatingProvider, BufferProvider, Clock, DrawStyle, FrameSource, Job, NoopRepaint, Presenter,
    RepaintScheduler, TaskQueue,
};
