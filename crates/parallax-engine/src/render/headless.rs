use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use serde_json::Value;

use crate::paint::Color;
use crate::scene::{Camera, CameraPose, Node, Scene};

use super::backend::{RenderBackend, Renderer, RendererCall, RendererConfig, RendererMethod};
use super::state::{check_drawable_size, CallEffect, RendererSettings};

/// Observable state of a headless renderer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeState {
    pub frames: u64,
    /// Camera pose used by the most recent frame.
    pub last_pose: Option<CameraPose>,
    /// Names of all objects in the scene at the most recent frame.
    pub last_objects: Vec<String>,
    /// Every allow-listed call received, in order.
    pub calls: Vec<RendererMethod>,
    /// Names of released subtree roots, in order.
    pub released: Vec<String>,
    pub clear_color: Option<(Color, f32)>,
    pub drawable_size: (u32, u32),
    pub clears: u64,
    pub disposed: bool,
    /// Error message the next `render` should fail with.
    pub fail_next_render: Option<String>,
}

#[derive(Debug, Default)]
struct ProbeInner {
    state: Mutex<ProbeState>,
    changed: Condvar,
}

/// Shared view into a [`HeadlessRenderer`] living on another thread.
#[derive(Debug, Clone, Default)]
pub struct FrameProbe {
    inner: Arc<ProbeInner>,
}

impl FrameProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut ProbeState)) {
        f(&mut self.lock());
        self.inner.changed.notify_all();
    }

    pub fn snapshot(&self) -> ProbeState {
        self.lock().clone()
    }

    pub fn frames(&self) -> u64 {
        self.lock().frames
    }

    /// Makes the next frame fail with `message`.
    pub fn fail_next_render(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.fail_next_render = Some(message));
    }

    /// Blocks until `predicate` holds or `timeout` elapses. Returns the final verdict.
    pub fn wait_until(&self, timeout: Duration, predicate: impl Fn(&ProbeState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if predicate(&state) {
                return true;
            }
            let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            state = match self.inner.changed.wait_timeout(state, left) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Waits for `count` more frames than have been rendered so far.
    pub fn wait_frames(&self, count: u64, timeout: Duration) -> bool {
        let target = self.frames() + count;
        self.wait_until(timeout, |s| s.frames >= target)
    }
}

/// A surface with a size but no pixels. Rendering only records what happened.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    pub width: u32,
    pub height: u32,
    probe: FrameProbe,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            probe: FrameProbe::default(),
        }
    }

    /// Probe that stays connected to the renderer built from this surface.
    pub fn probe(&self) -> FrameProbe {
        self.probe.clone()
    }
}

/// Renderer without a GPU. Used by tests and by hosts that only need the
/// scene-synchronisation side of the system.
#[derive(Debug)]
pub struct HeadlessRenderer {
    settings: RendererSettings,
    probe: FrameProbe,
}

impl HeadlessRenderer {
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn probe(&self) -> FrameProbe {
        self.probe.clone()
    }

    fn publish_settings(&self) {
        let clear = self.settings.effective_clear();
        let size = self.settings.drawable_size();
        self.probe.update(|s| {
            s.clear_color = Some(clear);
            s.drawable_size = size;
        });
    }
}

impl RenderBackend for HeadlessRenderer {
    type Surface = HeadlessSurface;

    fn create(surface: HeadlessSurface, config: &RendererConfig) -> Result<Self> {
        if surface.width == 0 || surface.height == 0 {
            bail!("surface is {}x{}; nothing to render to", surface.width, surface.height);
        }
        config.validate()?;
        check_drawable_size(config.drawable_size(), max_dimension())?;

        let renderer = Self {
            settings: RendererSettings::new(config),
            probe: surface.probe,
        };
        renderer.publish_settings();
        log::debug!(
            "headless renderer created ({}x{} @{})",
            config.width,
            config.height,
            config.pixel_ratio
        );
        Ok(renderer)
    }
}

impl Renderer for HeadlessRenderer {
    fn render(&mut self, scene: &Scene, camera: &Camera) -> Result<()> {
        if let Some(message) = self.probe.lock().fail_next_render.take() {
            bail!(message);
        }
        let names = scene.names();
        let pose = camera.pose();
        self.probe.update(|s| {
            s.frames += 1;
            s.last_pose = Some(pose);
            s.last_objects = names;
        });
        Ok(())
    }

    fn call(&mut self, call: &RendererCall, _scene: Option<&Scene>) -> Result<Value> {
        let effect = self.settings.apply_within(call, max_dimension())?;
        self.probe.update(|s| {
            s.calls.push(call.name);
            match effect {
                CallEffect::Clear => s.clears += 1,
                CallEffect::Dispose => s.disposed = true,
                CallEffect::None | CallEffect::Resize | CallEffect::Compile => {}
            }
        });
        self.publish_settings();
        Ok(Value::Null)
    }

    fn set_background(&mut self, color: Option<Color>) {
        self.settings.background = color;
        self.publish_settings();
    }

    fn release(&mut self, node: &Node) {
        let name = node.name.clone();
        self.probe.update(|s| s.released.push(name));
    }
}

/// Texture limit of a default wgpu device, which the GPU backend requests.
fn max_dimension() -> u32 {
    wgpu::Limits::default().max_texture_dimension_2d
}
