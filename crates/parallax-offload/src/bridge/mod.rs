//! Control-side bridge.
//!
//! Owns the render unit, the writing half of the shared camera channel and the
//! correlation table. Fire-and-forget operations only enqueue a packet; the
//! correlated ones are `async` and resolve through the inbound pump.

mod ops;
mod pump;

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parallax_engine::render::{RenderBackend, RendererCall, RendererConfig};
use parallax_engine::scene::{Camera, CameraSnapshot, Node, Scene, SceneSnapshot};
use parallax_engine::Color;
use serde_json::{Map, Value};

use crate::camera_channel::{camera_channel, CameraWriter};
use crate::channel::{Incoming, Packet, Transfer};
use crate::compute::ComputeRegistry;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::executor::{self, ExecutorOptions};
use crate::protocol::{
    AddOptions, ComputeRequest, ControlMessage, CorrelationId, Envelope, LoadScene,
    MaterialUpdate, Message, ObjectPayload, RemoveObject, RenderEvent, RenderRequest,
    TransformUpdate,
};

pub use ops::RendererOps;
use pump::Shared;

/// Acknowledged insertion of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHandle {
    pub name: String,
    pub id: CorrelationId,
}

pub struct Bridge<B: RenderBackend + 'static> {
    config: BridgeConfig,
    registry: Option<Arc<ComputeRegistry>>,
    tx: Option<Sender<Packet<B::Surface>>>,
    camera: Option<CameraWriter>,
    shared: Arc<Shared>,
    executor: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

impl<B: RenderBackend + 'static> Bridge<B> {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            registry: None,
            tx: None,
            camera: None,
            shared: Arc::default(),
            executor: None,
            pump: None,
        }
    }

    /// Lets the render unit answer `compute` requests from `registry`.
    pub fn with_compute(mut self, registry: ComputeRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    /// Correlated requests still awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    /// Every inbound event and fault, in arrival order, from now on.
    pub fn subscribe(&self) -> Receiver<Incoming> {
        self.shared.subscribe()
    }

    /// Starts the render unit and hands it `surface`.
    ///
    /// Waits without a deadline for `ready`. A failure here is final for this
    /// bridge: later calls report [`BridgeError::NotReady`].
    pub async fn initialize(
        &mut self,
        surface: B::Surface,
        config: RendererConfig,
    ) -> Result<(), BridgeError> {
        if self.tx.is_some() {
            return Err(BridgeError::AlreadyInitialized);
        }

        let handle = executor::spawn::<B>(ExecutorOptions {
            frame_interval: self.config.frame_interval,
            forward_console: self.config.forward_console,
            channel_capacity: self.config.channel_capacity,
            registry: self.registry.clone(),
        })?;

        let ready = self.shared.await_ready();
        let shared = self.shared.clone();
        let events = handle.events;
        let pump = std::thread::Builder::new()
            .name("parallax-pump".into())
            .spawn(move || pump::run(events, &shared))
            .map_err(|e| BridgeError::Spawn(e.to_string()))?;

        let reader = if self.config.shared_camera {
            let (writer, reader) = camera_channel();
            self.camera = Some(writer);
            Some(reader)
        } else {
            None
        };

        let packet = Packet::Message {
            envelope: Envelope::new(ControlMessage::InitRd(config)),
            transfer: Some(Transfer {
                surface,
                camera: reader,
            }),
        };
        let sent = handle.tx.send(packet).is_ok();
        self.tx = Some(handle.tx);
        self.executor = Some(handle.thread);
        self.pump = Some(pump);
        if !sent {
            return Err(BridgeError::Disconnected);
        }

        match ready.await {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::Disconnected),
        }
    }

    fn ready_sender(&self) -> Result<&Sender<Packet<B::Surface>>, BridgeError> {
        match &self.tx {
            Some(tx) if self.is_ready() => Ok(tx),
            _ => Err(BridgeError::NotReady),
        }
    }

    fn post(&self, message: ControlMessage) {
        let kind = message.kind();
        let Ok(tx) = self.ready_sender() else {
            log::debug!("dropping `{kind}`: bridge is not ready");
            return;
        };
        if tx.send(Packet::message(Envelope::new(message))).is_err() {
            log::debug!("dropping `{kind}`: render unit is gone");
        }
    }

    async fn request(
        &self,
        op: &'static str,
        build: impl FnOnce(CorrelationId) -> Envelope<ControlMessage>,
    ) -> Result<(CorrelationId, RenderEvent), BridgeError> {
        let tx = self.ready_sender()?;
        let pending = self.shared.pending.register(op);
        let id = pending.id;
        if tx.send(Packet::message(build(id))).is_err() {
            self.shared.pending.cancel(&id);
            return Err(BridgeError::Disconnected);
        }
        let event = self
            .shared
            .pending
            .wait(pending, Some(self.config.ack_timeout))
            .await?;
        Ok((id, event))
    }

    /// Sends the scene and camera once. The live copy then belongs to the
    /// render side.
    pub fn load_scene(
        &self,
        scene: &Scene,
        camera: &Camera,
        background: Option<Color>,
    ) -> Result<(), BridgeError> {
        let tx = self.ready_sender()?;
        let message = ControlMessage::LoadScene(LoadScene {
            scene: SceneSnapshot::capture(scene),
            camera: CameraSnapshot::capture(camera),
            background,
        });
        tx.send(Packet::message(Envelope::new(message)))
            .map_err(|_| BridgeError::Disconnected)
    }

    /// Publishes the camera pose for the next frame. Never blocks.
    pub fn update_camera(&self, camera: &Camera) {
        if !self.is_ready() {
            return;
        }
        let pose = camera.pose();
        match &self.camera {
            Some(writer) => writer.write(&pose),
            None => self.post(ControlMessage::UpdateCamera(pose.into())),
        }
    }

    pub fn update_transform(&self, update: TransformUpdate) {
        self.post(ControlMessage::UpdateTransform(update));
    }

    pub fn remove_object(&self, name: impl Into<String>) {
        self.post(ControlMessage::RemoveObject(RemoveObject { name: name.into() }));
    }

    pub fn update_material(&self, name: impl Into<String>, props: Map<String, Value>) {
        self.post(ControlMessage::UpdateMaterial(MaterialUpdate {
            name: name.into(),
            props,
        }));
    }

    /// Renders `scene` once, outside the loop and without touching the live scene.
    pub fn render_once(&self, scene: &Scene, camera: &Camera) {
        self.post(ControlMessage::Render(RenderRequest {
            scene: SceneSnapshot::capture(scene),
            camera: CameraSnapshot::capture(camera),
        }));
    }

    /// Pauses the render loop. The unit stays alive.
    pub fn stop(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Packet::message(Envelope::new(ControlMessage::StopLoop)));
        }
    }

    /// Inserts `node` into the live scene and waits for the acknowledgement.
    pub async fn add_object(
        &self,
        node: &Node,
        options: AddOptions,
    ) -> Result<ObjectHandle, BridgeError> {
        let payload = ObjectPayload::from_node(node, options)
            .map_err(|e| BridgeError::Operation(e.to_string()))?;
        let (id, event) = self
            .request("add_object", |id| {
                Envelope::correlated(ControlMessage::AddObject(payload), id)
            })
            .await?;
        match event {
            RenderEvent::ObjectAdded { name } => Ok(ObjectHandle { name, id }),
            other => Err(unexpected("add_object", &other)),
        }
    }

    /// Forwards an allow-listed renderer call and waits for its result.
    pub async fn invoke(&self, call: RendererCall) -> Result<Value, BridgeError> {
        let (_, event) = self
            .request("threejs_func", |id| {
                Envelope::correlated(ControlMessage::ThreejsFunc(call), id)
            })
            .await?;
        match event {
            RenderEvent::Success { result } => Ok(result),
            other => Err(unexpected("threejs_func", &other)),
        }
    }

    /// Runs a registered computation on the render unit.
    pub async fn compute(&self, kind: &str, data: Value) -> Result<Value, BridgeError> {
        let request = ComputeRequest {
            kind: kind.to_string(),
            data,
        };
        let outcome = self
            .request("compute", |id| {
                Envelope::correlated(ControlMessage::Compute(request), id)
            })
            .await;
        match outcome {
            Ok((_, RenderEvent::Result { result })) => Ok(result),
            Ok((_, other)) => Err(unexpected("compute", &other)),
            Err(BridgeError::Operation(message)) => Err(BridgeError::Compute(message)),
            Err(err) => Err(err),
        }
    }

    /// Sends an already encoded frame as is; the render side decodes it.
    pub fn post_encoded(&self, text: impl Into<String>) -> Result<(), BridgeError> {
        let tx = self.ready_sender()?;
        tx.send(Packet::Encoded(text.into()))
            .map_err(|_| BridgeError::Disconnected)
    }

    /// Terminates the render unit and joins both threads.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Packet::Terminate);
        }
        self.camera = None;
        if let Some(handle) = self.executor.take() {
            if handle.join().is_err() {
                log::warn!("render unit did not exit cleanly");
            }
        }
        if let Some(handle) = self.pump.take() {
            if handle.join().is_err() {
                log::warn!("inbound pump did not exit cleanly");
            }
        }
        self.shared.set_ready(false);
    }
}

impl<B: RenderBackend + 'static> RendererOps for Bridge<B> {
    fn forward(&self, call: RendererCall) -> CorrelationId {
        let id = CorrelationId::new();
        let method = call.name;
        match self.ready_sender() {
            Ok(tx) => {
                let packet =
                    Packet::message(Envelope::correlated(ControlMessage::ThreejsFunc(call), id));
                if tx.send(packet).is_err() {
                    log::debug!("dropping `{method}`: render unit is gone");
                }
            }
            Err(_) => log::debug!("dropping `{method}`: bridge is not ready"),
        }
        id
    }
}

impl<B: RenderBackend + 'static> Drop for Bridge<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn unexpected(op: &str, event: &RenderEvent) -> BridgeError {
    BridgeError::Operation(format!("unexpected `{}` reply to {op}", event.kind()))
}
