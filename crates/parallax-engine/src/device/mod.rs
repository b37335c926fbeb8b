//! GPU device + surface management.
//!
//! - `Gpu`: instance/adapter/device/queue plus a configured window surface
//! - `ComputeDevice`: the same without a surface, for compute work
//! - frame acquisition and surface error recovery

mod error;
mod gpu;
mod headless;
mod init;
mod surface;

pub use error::SurfaceErrorAction;
pub use gpu::{Gpu, GpuFrame};
pub use headless::ComputeDevice;
pub use init::GpuInit;
