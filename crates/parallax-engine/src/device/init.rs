/// Initialization parameters for the GPU layer.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    /// Present mode (swap behavior). FIFO is available everywhere.
    pub present_mode: wgpu::PresentMode,

    /// Requested alpha mode. Ignored when the surface does not support it.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    pub required_features: wgpu::Features,

    pub required_limits: wgpu::Limits,

    /// Hint only; support depends on platform/backend.
    pub desired_maximum_frame_latency: u32,

    /// MSAA sample count for render targets. 1 disables multisampling.
    pub sample_count: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
            sample_count: 1,
        }
    }
}

impl GpuInit {
    /// Settings derived from renderer flags: `antialias` enables 4x MSAA,
    /// `alpha` requests a pre-multiplied surface.
    pub fn for_renderer(antialias: bool, alpha: bool) -> Self {
        Self {
            sample_count: if antialias { 4 } else { 1 },
            alpha_mode: alpha.then_some(wgpu::CompositeAlphaMode::PreMultiplied),
            ..Self::default()
        }
    }
}
