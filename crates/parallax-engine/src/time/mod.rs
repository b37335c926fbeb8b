//! Time subsystem.
//!
//! - `FrameClock`: clamped per-frame delta time and frame index
//! - `FramePacer`: fixed-interval scheduling for render loops that also wait on messages

mod frame_clock;
mod pacer;

pub use frame_clock::{FrameClock, FrameTime};
pub use pacer::FramePacer;
