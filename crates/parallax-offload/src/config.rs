use std::time::Duration;

/// Control-side bridge settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Deadline for correlated requests issued after readiness.
    pub ack_timeout: Duration,
    /// Use the shared camera slots instead of `update_camera` messages.
    pub shared_camera: bool,
    /// Target interval of the render loop.
    pub frame_interval: Duration,
    /// Send render-side diagnostics back as `console` events.
    pub forward_console: bool,
    /// Bound of the control → render queue. `None` is unbounded.
    pub channel_capacity: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(5),
            shared_camera: true,
            frame_interval: Duration::from_micros(16_667),
            forward_console: true,
            channel_capacity: None,
        }
    }
}

/// Whether compute units acquire a GPU device for their kind.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum DevicePolicy {
    #[default]
    None,
    /// Acquire a headless device per unit; kinds run without one if that fails.
    Headless,
}

/// Compute unit settings. A run always waits for the unit's single reply.
#[derive(Debug, Clone, Default)]
pub struct ComputeConfig {
    pub device: DevicePolicy,
}
