pub mod error;

pub use error::{FrameflowError, Result};
