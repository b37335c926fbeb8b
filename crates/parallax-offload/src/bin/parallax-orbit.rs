//! Orbits a camera around an instanced grid while a render unit draws it.
//!
//! The window and its event loop stay on the main thread; the renderer, the
//! scene and the frame loop live on the render unit behind a [`Bridge`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use glam::Vec3;
use parallax_engine::logging::{init_logging, LoggingConfig};
use parallax_engine::render::{GpuRenderer, RendererConfig};
use parallax_engine::scene::{Camera, Geometry, Instances, Material, Node, Scene};
use parallax_engine::Color;
use parallax_offload::{AddOptions, Bridge, BridgeConfig, ComputeDispatcher, RendererOps, TransformUpdate};
use serde_json::json;
use tokio::runtime::Runtime;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

const GRID: usize = 49;
const ORBIT_RADIUS: f32 = 14.0;

struct Session {
    window: Arc<Window>,
    bridge: Bridge<GpuRenderer>,
    camera: Camera,
    started: Instant,
}

struct Orbit {
    rt: Runtime,
    session: Option<Session>,
}

impl Orbit {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("parallax orbit")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let size = window.inner_size();
        let ratio = window.scale_factor() as f32;
        let config = RendererConfig {
            pixel_ratio: ratio,
            background: Some(Color::from_hex(0x101418)),
            ..RendererConfig::default()
        }
        .with_size(
            (size.width as f32 / ratio).round() as u32,
            (size.height as f32 / ratio).round() as u32,
        );
        let aspect = config.width as f32 / config.height.max(1) as f32;

        let mut bridge = Bridge::<GpuRenderer>::new(BridgeConfig::default());
        self.rt
            .block_on(bridge.initialize(window.clone(), config))
            .context("render unit did not come up")?;

        let grid = self
            .rt
            .block_on(ComputeDispatcher::with_builtins().run(
                "instance_grid",
                json!({ "count": GRID, "spacing": 2.0 }),
            ))
            .context("instance layout failed")?;
        let matrices: Vec<f32> =
            serde_json::from_value(grid["instanceMatrices"].clone()).context("bad grid output")?;
        let colors: Vec<f32> = (0..GRID)
            .flat_map(|i| {
                let t = i as f32 / GRID as f32;
                [0.3 + 0.7 * t, 0.5, 1.0 - 0.7 * t]
            })
            .collect();

        let cube = Arc::new(Geometry::cuboid(1.0, 1.0, 1.0));
        let mut material = Material::new(Color::from_hex(0xffffff));
        material.vertex_colors = true;
        let instances = Instances::from_flat(GRID, Some(&matrices[..]), Some(&colors[..]))?;

        let mut scene = Scene::new();
        scene.add(Node::instanced("grid", cube.clone(), material, instances));
        let camera = Camera::perspective(60f32.to_radians(), aspect, 0.1, 200.0)
            .with_position(Vec3::new(0.0, 8.0, ORBIT_RADIUS))
            .looking_at(Vec3::ZERO);
        bridge.load_scene(&scene, &camera, None)?;

        let marker = Node::mesh("marker", cube, Material::new(Color::from_hex(0xffaa33)));
        let handle = self
            .rt
            .block_on(bridge.add_object(&marker, AddOptions::default()))?;
        bridge.update_transform(
            TransformUpdate::new(&handle.name)
                .position(Vec3::new(0.0, 3.0, 0.0))
                .scale(Vec3::splat(0.5)),
        );

        self.session = Some(Session {
            window,
            bridge,
            camera,
            started: Instant::now(),
        });
        Ok(())
    }
}

impl ApplicationHandler for Orbit {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            log::error!("failed to start: {e:#}");
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(session) = &self.session {
            session.window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                session.bridge.stop();
                session.bridge.shutdown();
                self.session = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                let ratio = session.window.scale_factor() as f32;
                let (w, h) = (size.width as f32 / ratio, size.height as f32 / ratio);
                if w >= 1.0 && h >= 1.0 {
                    session.bridge.set_size(w, h, false);
                }
            }
            WindowEvent::RedrawRequested => {
                let t = session.started.elapsed().as_secs_f32() * 0.3;
                session.camera.position =
                    Vec3::new(t.sin() * ORBIT_RADIUS, 8.0, t.cos() * ORBIT_RADIUS);
                session.camera = session.camera.clone().looking_at(Vec3::ZERO);
                session.bridge.update_camera(&session.camera);
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to build runtime")?;
    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut app = Orbit { rt, session: None };
    event_loop
        .run_app(&mut app)
        .context("winit event loop terminated with error")?;
    Ok(())
}
