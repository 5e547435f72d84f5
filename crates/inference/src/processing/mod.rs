pub mod post;
pub mod pre;

pub use post::{ModelTask, PostProcessor};
pub use pre::{PreProcessor, TransformParams};
