//! Backend abstraction layer
//!
//! Provides the trait the pipeline drives, the effect parameter model, a headless
//! recording backend and the wgpu implementation.

pub mod effect;
pub mod recording;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use effect::*;
pub use recording::{RecordedCall, RecordedValue, RecordingBackend};
pub use traits::*;
pub use types::*;
