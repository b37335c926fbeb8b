//! Rendering subsystem.
//!
//! - `Renderer` / `RenderBackend`: the seam the render-side executor drives
//! - `RendererMethod` / `RendererCall`: the allow-listed remote operations
//! - `GpuRenderer`: wgpu renderer bound to a winit window
//! - `HeadlessRenderer`: records frames instead of drawing them
//!
//! Convention: right-handed world space, column-major matrices, no depth
//! buffer (back faces are culled, draw order is scene order).

mod backend;
mod ctx;
mod gpu;
mod headless;
mod mesh;
mod state;

pub use backend::{
    MethodNotAllowed, RenderBackend, Renderer, RendererCall, RendererConfig, RendererMethod,
};
pub use ctx::{RenderCtx, RenderTarget};
pub use gpu::GpuRenderer;
pub use headless::{FrameProbe, HeadlessRenderer, HeadlessSurface, ProbeState};
pub use mesh::{MeshFrame, MeshRenderer};
pub use state::{CallEffect, RendererSettings, ViewportRect};
