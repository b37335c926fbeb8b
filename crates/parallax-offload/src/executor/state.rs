use std::sync::Arc;

use glam::Vec3;
use parallax_engine::render::{RenderBackend, RendererCall, RendererConfig, RendererMethod};
use parallax_engine::scene::snapshot::reapply_instance_user_data;
use parallax_engine::scene::{Camera, Scene};
use parallax_engine::time::{FrameClock, FramePacer};

use crate::camera_channel::CameraReader;
use crate::channel::{Packet, Transfer};
use crate::compute::{self, ComputeRegistry};
use crate::protocol::{
    peek_id, CameraUpdate, ComputeRequest, ControlMessage, CorrelationId, Envelope, LoadScene,
    MaterialUpdate, Message, ObjectPayload, RenderEvent, RenderRequest, TransformUpdate,
};

use super::outbox::Outbox;

/// Lifecycle of the render side.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    /// Renderer bound; no loop running yet.
    Ready,
    Rendering,
    Paused,
    Disposed,
}

/// Everything the render side owns, passed explicitly to handlers and frames.
pub(crate) struct RenderState<B: RenderBackend> {
    phase: Phase,
    renderer: Option<B>,
    scene: Option<Scene>,
    camera: Option<Camera>,
    camera_reader: Option<CameraReader>,
    loop_enabled: bool,
    pacer: FramePacer,
    clock: FrameClock,
    outbox: Outbox,
    registry: Option<Arc<ComputeRegistry>>,
}

impl<B: RenderBackend> RenderState<B> {
    pub(crate) fn new(
        outbox: Outbox,
        pacer: FramePacer,
        registry: Option<Arc<ComputeRegistry>>,
    ) -> Self {
        Self {
            phase: Phase::Uninitialized,
            renderer: None,
            scene: None,
            camera: None,
            camera_reader: None,
            loop_enabled: false,
            pacer,
            clock: FrameClock::new(),
            outbox,
            registry,
        }
    }

    #[inline]
    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub(crate) fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub(crate) fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    pub(crate) fn handle_packet(&mut self, packet: Packet<B::Surface>) {
        match packet {
            Packet::Message { envelope, transfer } => self.handle(envelope, transfer),
            Packet::Encoded(text) => match Envelope::<ControlMessage>::decode(&text) {
                Ok(envelope) => self.handle(envelope, None),
                Err(err) => self.outbox.error(peek_id(&text), err.to_string()),
            },
            Packet::Terminate => {}
        }
    }

    pub(crate) fn handle(
        &mut self,
        envelope: Envelope<ControlMessage>,
        transfer: Option<Transfer<B::Surface>>,
    ) {
        let id = envelope.id;
        match envelope.message {
            ControlMessage::InitRd(config) => self.init(config, transfer),
            ControlMessage::Compute(request) => self.compute(request, id),
            message if self.phase == Phase::Disposed => {
                if id.is_some() {
                    self.outbox
                        .error(id, format!("{} rejected: renderer is disposed", message.kind()));
                } else {
                    log::debug!("ignoring {} after dispose", message.kind());
                }
            }
            ControlMessage::LoadScene(load) => self.load_scene(load),
            ControlMessage::UpdateCamera(update) => self.update_camera(update),
            ControlMessage::UpdateTransform(update) => self.update_transform(update),
            ControlMessage::Render(request) => self.render_once(request),
            ControlMessage::AddObject(payload) => self.add_object(payload, id),
            ControlMessage::RemoveObject(remove) => self.remove_object(&remove.name),
            ControlMessage::UpdateMaterial(update) => self.update_material(update),
            ControlMessage::ThreejsFunc(call) => self.call_renderer(call, id),
            ControlMessage::StopLoop => self.stop_loop(),
        }
    }

    fn init(&mut self, config: RendererConfig, transfer: Option<Transfer<B::Surface>>) {
        if self.phase != Phase::Uninitialized {
            self.outbox.error(None, "renderer is already initialized");
            return;
        }
        let Some(Transfer { surface, camera }) = transfer else {
            self.phase = Phase::Disposed;
            self.outbox
                .error(None, "Renderer initialization failed: no surface was transferred");
            return;
        };

        self.phase = Phase::Initializing;
        self.camera_reader = camera;
        match B::create(surface, &config) {
            Ok(mut renderer) => {
                if config.background.is_some() {
                    renderer.set_background(config.background);
                }
                self.renderer = Some(renderer);
                self.phase = Phase::Ready;
                self.outbox.emit(
                    RenderEvent::Ready {
                        message: "Renderer initialized".into(),
                    },
                    None,
                );
            }
            Err(err) => {
                self.phase = Phase::Disposed;
                self.outbox
                    .error(None, format!("Renderer initialization failed: {err:#}"));
            }
        }
    }

    fn load_scene(&mut self, load: LoadScene) {
        let Some(renderer) = self.renderer.as_mut() else {
            self.outbox
                .error(None, "loadScene failed: renderer is not initialized");
            return;
        };

        let restored = load.scene.restore().and_then(|mut scene| {
            let reapplied = reapply_instance_user_data(&mut scene)?;
            let camera = load.camera.restore()?;
            Ok((scene, camera, reapplied))
        });
        let (mut scene, camera, reapplied) = match restored {
            Ok(parts) => parts,
            Err(err) => {
                self.outbox.error(None, format!("loadScene failed: {err}"));
                return;
            }
        };

        scene.background = load.background.or(scene.background);
        renderer.set_background(scene.background);
        if reapplied > 0 {
            self.outbox
                .debug(format!("reapplied instance matrices on {reapplied} objects"));
        }

        let objects = scene.object_count();
        self.scene = Some(scene);
        self.camera = Some(camera);
        self.start_loop();
        self.outbox.emit(RenderEvent::SceneLoaded { objects }, None);
    }

    fn update_camera(&mut self, update: CameraUpdate) {
        let Some(camera) = self.camera.as_mut() else {
            return;
        };
        let mut pose = camera.pose();
        update.apply_to(&mut pose);
        camera.apply_pose(pose);
        camera.update_matrix_world();
    }

    fn update_transform(&mut self, update: TransformUpdate) {
        let Some(node) = self.scene.as_mut().and_then(|s| s.find_mut(&update.name)) else {
            return;
        };
        if let Some(p) = update.position {
            node.transform.position = Vec3::from_array(p);
        }
        if let Some(r) = update.rotation {
            node.transform.set_euler_xyz(r);
        }
        if let Some(s) = update.scale {
            node.transform.scale = Vec3::from_array(s);
        }
    }

    fn render_once(&mut self, request: RenderRequest) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let outcome = request
            .scene
            .restore()
            .map_err(anyhow::Error::from)
            .and_then(|scene| {
                let camera = request.camera.restore()?;
                renderer.render(&scene, &camera)
            });
        if let Err(err) = outcome {
            self.outbox.error(None, format!("render failed: {err:#}"));
        }
    }

    fn add_object(&mut self, payload: ObjectPayload, id: Option<CorrelationId>) {
        let Some(scene) = self.scene.as_mut() else {
            self.outbox
                .error(id, "addObject failed: no scene is loaded");
            return;
        };
        if self.renderer.is_none() {
            self.outbox
                .error(id, "addObject failed: renderer is not initialized");
            return;
        }

        let name = payload.name.clone();
        let node = match payload.into_node() {
            Ok(node) => node,
            Err(err) => {
                self.outbox.error(id, format!("addObject failed: {err}"));
                return;
            }
        };

        if scene.contains(&name) {
            self.outbox.warn(format!(
                "object `{name}` already exists; updates and removal resolve to the earlier one"
            ));
        }
        scene.add(node);
        let total = scene.object_count();

        if !self.loop_enabled && self.camera.is_some() {
            self.outbox.log("starting render loop");
            self.start_loop();
        }
        self.outbox.debug(format!("added `{name}`; scene has {total} objects"));
        self.outbox.emit(RenderEvent::ObjectAdded { name }, id);
    }

    fn remove_object(&mut self, name: &str) {
        let Some(node) = self.scene.as_mut().and_then(|s| s.remove(name)) else {
            return;
        };
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.release(&node);
        }
    }

    fn update_material(&mut self, update: MaterialUpdate) {
        let Some(material) = self
            .scene
            .as_mut()
            .and_then(|s| s.find_mut(&update.name))
            .and_then(|n| n.material_mut())
        else {
            return;
        };
        let ignored = material.apply_properties(&update.props);
        if !ignored.is_empty() {
            self.outbox.debug(format!(
                "update_material `{}`: ignored {}",
                update.name,
                ignored.join(", ")
            ));
        }
    }

    fn call_renderer(&mut self, call: RendererCall, id: Option<CorrelationId>) {
        let method = call.name;
        let Some(renderer) = self.renderer.as_mut() else {
            self.reply_call_error(id, method, "Renderer not initialized".into());
            return;
        };
        match renderer.call(&call, self.scene.as_ref()) {
            Ok(result) => {
                if method == RendererMethod::Dispose {
                    self.dispose();
                }
                self.outbox.emit(RenderEvent::Success { result }, id);
            }
            Err(err) => self.reply_call_error(id, method, format!("{err:#}")),
        }
    }

    fn reply_call_error(&self, id: Option<CorrelationId>, method: RendererMethod, message: String) {
        self.outbox.emit(
            RenderEvent::Error {
                message,
                method: Some(method.as_str().to_string()),
            },
            id,
        );
    }

    fn stop_loop(&mut self) {
        self.loop_enabled = false;
        if self.phase == Phase::Rendering {
            self.phase = Phase::Paused;
        }
    }

    fn compute(&mut self, request: ComputeRequest, id: Option<CorrelationId>) {
        let Some(registry) = self.registry.as_ref() else {
            self.outbox
                .error(id, "compute is not enabled on the render unit");
            return;
        };
        let reply = compute::answer(id, request, registry, None);
        self.outbox.emit(reply.message, reply.id);
    }

    fn start_loop(&mut self) {
        if self.loop_enabled || self.renderer.is_none() {
            return;
        }
        self.loop_enabled = true;
        self.phase = Phase::Rendering;
        self.pacer.reset();
        self.clock.reset();
    }

    /// One loop iteration: pull the shared camera, then draw.
    ///
    /// A failing frame pauses the loop and reports once.
    pub(crate) fn frame(&mut self) {
        let (Some(renderer), Some(scene), Some(camera)) =
            (self.renderer.as_mut(), self.scene.as_ref(), self.camera.as_mut())
        else {
            return;
        };

        if let Some(pose) = self.camera_reader.as_ref().and_then(CameraReader::read) {
            camera.apply_pose(pose);
            camera.update_matrix_world();
        }

        let time = self.clock.tick();
        self.pacer.mark();
        if let Err(err) = renderer.render(scene, camera) {
            self.loop_enabled = false;
            self.phase = Phase::Paused;
            self.outbox.error(
                None,
                format!("render failed at frame {}: {err:#}", time.frame_index),
            );
        }
    }

    /// Drops the renderer and everything it draws.
    pub(crate) fn dispose(&mut self) {
        self.loop_enabled = false;
        self.renderer = None;
        self.scene = None;
        self.camera = None;
        self.phase = Phase::Disposed;
        log::debug!("render state disposed");
    }
}
