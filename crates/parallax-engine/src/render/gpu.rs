use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::device::{Gpu, GpuInit};
use crate::paint::Color;
use crate::scene::{Camera, Node, Scene};

use super::backend::{RenderBackend, Renderer, RendererCall, RendererConfig};
use super::mesh::{MeshFrame, MeshRenderer};
use super::state::{check_drawable_size, CallEffect, RendererSettings};
use super::{RenderCtx, RenderTarget};

/// wgpu renderer bound to a winit window.
pub struct GpuRenderer {
    gpu: Gpu,
    settings: RendererSettings,
    meshes: MeshRenderer,
}

impl GpuRenderer {
    fn resize_to_settings(&mut self) {
        let (width, height) = self.settings.drawable_size();
        self.gpu.resize(PhysicalSize::new(width, height));
    }

    /// Runs one pass over the surface. `scene == None` only clears.
    fn draw(&mut self, scene: Option<(&Scene, &Camera)>) -> Result<()> {
        let mut frame = match self.gpu.begin_frame() {
            Ok(frame) => frame,
            Err(err) => {
                let action = self.gpu.handle_surface_error(&err);
                if action.is_fatal() {
                    return Err(err).context("surface acquisition failed");
                }
                log::debug!("frame skipped: {err} ({action:?})");
                return Ok(());
            }
        };

        let (clear, alpha) = self.settings.effective_clear();
        let size = self.gpu.size();
        let pass = MeshFrame {
            view_proj: scene.map_or(glam::Mat4::IDENTITY, |(_, camera)| camera.view_projection()),
            clear: clear.to_wgpu(alpha),
            viewport: self
                .settings
                .viewport
                .to_physical(self.settings.pixel_ratio, (size.width, size.height)),
            scissor: self.settings.scissor_test,
        };

        {
            let ctx = RenderCtx::new(
                self.gpu.device(),
                self.gpu.queue(),
                self.gpu.surface_format(),
                self.gpu.sample_count(),
            );
            let mut target = RenderTarget::new(&mut frame.encoder, &frame.view, self.gpu.msaa_view());
            let empty = Scene::new();
            let scene = scene.map_or(&empty, |(scene, _)| scene);
            self.meshes.render(&ctx, &mut target, scene, &pass);
        }

        self.gpu.submit(frame);
        Ok(())
    }
}

impl RenderBackend for GpuRenderer {
    type Surface = Arc<Window>;

    fn create(window: Arc<Window>, config: &RendererConfig) -> Result<Self> {
        config.validate()?;
        let (width, height) = config.drawable_size();
        let init = GpuInit::for_renderer(config.antialias, config.alpha);
        check_drawable_size((width, height), init.required_limits.max_texture_dimension_2d)?;
        let gpu = pollster::block_on(Gpu::new(window, PhysicalSize::new(width, height), init))
            .context("failed to bind renderer to the surface")?;

        Ok(Self {
            gpu,
            settings: RendererSettings::new(config),
            meshes: MeshRenderer::new(),
        })
    }
}

impl Renderer for GpuRenderer {
    fn render(&mut self, scene: &Scene, camera: &Camera) -> Result<()> {
        self.draw(Some((scene, camera)))
    }

    fn call(&mut self, call: &RendererCall, scene: Option<&Scene>) -> Result<Value> {
        let max_dimension = self.gpu.device().limits().max_texture_dimension_2d;
        match self.settings.apply_within(call, max_dimension)? {
            CallEffect::None => {}
            CallEffect::Resize => self.resize_to_settings(),
            CallEffect::Clear => self.draw(None)?,
            CallEffect::Compile => {
                let Some(scene) = scene else {
                    bail!("compile: no scene is loaded");
                };
                let ctx = RenderCtx::new(
                    self.gpu.device(),
                    self.gpu.queue(),
                    self.gpu.surface_format(),
                    self.gpu.sample_count(),
                );
                self.meshes.prepare(&ctx, scene);
                log::debug!("compiled {} geometries", self.meshes.cached_geometries());
            }
            CallEffect::Dispose => self.meshes.dispose(),
        }
        Ok(Value::Null)
    }

    fn set_background(&mut self, color: Option<Color>) {
        self.settings.background = color;
    }

    fn release(&mut self, node: &Node) {
        self.meshes.release(node);
    }
}
