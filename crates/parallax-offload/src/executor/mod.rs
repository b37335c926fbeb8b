//! The render-side execution unit.
//!
//! One dedicated thread owns the renderer, the scene and the camera. It drains
//! control packets and, while the loop runs, draws a frame whenever the pacer
//! says one is due.

mod outbox;
mod state;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parallax_engine::render::RenderBackend;
use parallax_engine::time::FramePacer;

use crate::channel::{Incoming, Packet};
use crate::compute::ComputeRegistry;
use crate::error::BridgeError;

use outbox::Outbox;
pub use state::Phase;
use state::RenderState;

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub frame_interval: Duration,
    pub forward_console: bool,
    /// Bound of the inbound queue. `None` is unbounded.
    pub channel_capacity: Option<usize>,
    /// Kinds answered by `compute` messages sent to the render unit.
    pub registry: Option<Arc<ComputeRegistry>>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_micros(16_667),
            forward_console: true,
            channel_capacity: None,
            registry: None,
        }
    }
}

/// Handles to a running render unit.
pub struct ExecutorHandle<S> {
    pub tx: Sender<Packet<S>>,
    pub events: Receiver<Incoming>,
    pub thread: JoinHandle<()>,
}

/// Starts the render unit for backend `B` on its own thread.
pub fn spawn<B>(opts: ExecutorOptions) -> Result<ExecutorHandle<B::Surface>, BridgeError>
where
    B: RenderBackend + 'static,
{
    let (tx, rx) = match opts.channel_capacity {
        Some(cap) => crossbeam_channel::bounded(cap),
        None => crossbeam_channel::unbounded(),
    };
    let (event_tx, events) = crossbeam_channel::unbounded();

    let thread = std::thread::Builder::new()
        .name("parallax-render".into())
        .spawn(move || {
            let outbox = Outbox::new(event_tx, opts.forward_console);
            let fault = outbox.clone();
            let pacer = FramePacer::new(opts.frame_interval);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                run(rx, RenderState::<B>::new(outbox, pacer, opts.registry));
            }));
            if let Err(payload) = outcome {
                let message = crate::panic_message(payload.as_ref());
                log::error!("render unit panicked: {message}");
                fault.fault(message);
            }
        })
        .map_err(|e| BridgeError::Spawn(e.to_string()))?;

    Ok(ExecutorHandle { tx, events, thread })
}

fn run<B: RenderBackend>(rx: Receiver<Packet<B::Surface>>, mut state: RenderState<B>) {
    log::debug!("render unit started");

    loop {
        if state.loop_enabled() {
            let timeout_rx = crossbeam_channel::after(state.pacer().until_next());
            crossbeam_channel::select_biased! {
                recv(rx) -> msg => match msg {
                    Ok(Packet::Terminate) | Err(_) => break,
                    Ok(packet) => state.handle_packet(packet),
                },
                recv(timeout_rx) -> _ => {}
            };
        } else {
            match rx.recv() {
                Ok(Packet::Terminate) | Err(_) => break,
                Ok(packet) => state.handle_packet(packet),
            }
        }

        if state.loop_enabled() && state.pacer().is_due() {
            state.frame();
        }
    }

    state.dispose();
    log::debug!("render unit stopped in phase {:?}", state.phase());
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parallax_engine::render::{HeadlessRenderer, HeadlessSurface, RendererCall, RendererConfig};
    use parallax_engine::scene::{Camera, Geometry, Material, Node, Scene};
    use parallax_engine::{CameraSnapshot, Color, RendererMethod, SceneSnapshot};
    use serde_json::json;

    use super::*;
    use crate::camera_channel::camera_channel;
    use crate::channel::Transfer;
    use crate::compute::ComputeRegistry;
    use crate::protocol::{
        AddOptions, ComputeRequest, ControlMessage, CorrelationId, Envelope, LoadScene,
        ObjectPayload, RenderEvent, RemoveObject,
    };

    const WAIT: Duration = Duration::from_secs(2);

    fn options() -> ExecutorOptions {
        ExecutorOptions {
            frame_interval: Duration::from_millis(5),
            ..ExecutorOptions::default()
        }
    }

    fn start(surface: HeadlessSurface) -> ExecutorHandle<HeadlessSurface> {
        let handle = spawn::<HeadlessRenderer>(options()).unwrap();
        handle
            .tx
            .send(Packet::Message {
                envelope: Envelope::new(ControlMessage::InitRd(RendererConfig::default().with_size(64, 48))),
                transfer: Some(Transfer {
                    surface,
                    camera: None,
                }),
            })
            .unwrap();
        handle
    }

    fn next_event(events: &Receiver<Incoming>) -> Envelope<RenderEvent> {
        loop {
            match events.recv_timeout(WAIT).unwrap() {
                Incoming::Event(env) if matches!(env.message, RenderEvent::Console { .. }) => {}
                Incoming::Event(env) => return env,
                Incoming::Fault(msg) => panic!("unexpected fault: {msg}"),
            }
        }
    }

    fn cube_scene() -> (Scene, Camera) {
        let geometry = Arc::new(Geometry::cuboid(1.0, 1.0, 1.0));
        let mut scene = Scene::new();
        scene.add(Node::mesh("cube", geometry, Material::new(Color::from_hex(0x44aa88))));
        (scene, Camera::perspective(1.0, 4.0 / 3.0, 0.1, 100.0))
    }

    fn load(handle: &ExecutorHandle<HeadlessSurface>, scene: &Scene, camera: &Camera) {
        let msg = ControlMessage::LoadScene(LoadScene {
            scene: SceneSnapshot::capture(scene),
            camera: CameraSnapshot::capture(camera),
            background: None,
        });
        handle.tx.send(Packet::message(Envelope::new(msg))).unwrap();
    }

    fn shutdown(handle: ExecutorHandle<HeadlessSurface>) {
        handle.tx.send(Packet::Terminate).unwrap();
        handle.thread.join().unwrap();
    }

    #[test]
    fn ready_is_the_first_event() {
        let handle = start(HeadlessSurface::new(64, 48));
        let env = next_event(&handle.events);
        assert_eq!(
            env.message,
            RenderEvent::Ready {
                message: "Renderer initialized".into()
            }
        );
        assert_eq!(env.id, None);
        shutdown(handle);
    }

    #[test]
    fn zero_sized_surface_fails_initialization() {
        let handle = start(HeadlessSurface::new(0, 0));
        match next_event(&handle.events).message {
            RenderEvent::Error { message, .. } => {
                assert!(message.starts_with("Renderer initialization failed"), "{message}")
            }
            other => panic!("expected error, got {other:?}"),
        }
        shutdown(handle);
    }

    #[test]
    fn loaded_scene_renders_continuously() {
        let surface = HeadlessSurface::new(64, 48);
        let probe = surface.probe();
        let handle = start(surface);
        next_event(&handle.events);

        let (scene, camera) = cube_scene();
        load(&handle, &scene, &camera);
        assert_eq!(
            next_event(&handle.events).message,
            RenderEvent::SceneLoaded { objects: 1 }
        );
        assert!(probe.wait_frames(3, WAIT));
        shutdown(handle);
    }

    #[test]
    fn stop_then_add_object_resumes_the_loop() {
        let surface = HeadlessSurface::new(64, 48);
        let probe = surface.probe();
        let handle = start(surface);
        next_event(&handle.events);
        let (scene, camera) = cube_scene();
        load(&handle, &scene, &camera);
        next_event(&handle.events);
        assert!(probe.wait_frames(1, WAIT));

        handle
            .tx
            .send(Packet::message(Envelope::new(ControlMessage::StopLoop)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let paused_at = probe.frames();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(probe.frames(), paused_at);

        let node = Node::mesh(
            "extra",
            Arc::new(Geometry::cuboid(0.5, 0.5, 0.5)),
            Material::default(),
        );
        let payload = ObjectPayload::from_node(&node, AddOptions::default()).unwrap();
        let id = CorrelationId::new();
        handle
            .tx
            .send(Packet::message(Envelope::correlated(
                ControlMessage::AddObject(payload),
                id,
            )))
            .unwrap();

        let ack = next_event(&handle.events);
        assert_eq!(ack.id, Some(id));
        assert_eq!(ack.message, RenderEvent::ObjectAdded { name: "extra".into() });
        assert!(probe.wait_frames(2, WAIT));
        shutdown(handle);
    }

    #[test]
    fn removing_an_unknown_name_is_silent() {
        let handle = start(HeadlessSurface::new(64, 48));
        next_event(&handle.events);
        let (scene, camera) = cube_scene();
        load(&handle, &scene, &camera);
        next_event(&handle.events);

        let remove = ControlMessage::RemoveObject(RemoveObject {
            name: "ghost".into(),
        });
        handle.tx.send(Packet::message(Envelope::new(remove))).unwrap();
        handle
            .tx
            .send(Packet::message(Envelope::new(ControlMessage::StopLoop)))
            .unwrap();
        assert!(handle
            .events
            .recv_timeout(Duration::from_millis(100))
            .is_err());
        shutdown(handle);
    }

    #[test]
    fn encoded_unknown_kind_reports_an_error() {
        let handle = start(HeadlessSurface::new(64, 48));
        next_event(&handle.events);
        handle
            .tx
            .send(Packet::Encoded(r#"{"type":"explode","data":{}}"#.into()))
            .unwrap();
        assert!(matches!(
            next_event(&handle.events).message,
            RenderEvent::Error { .. }
        ));
        shutdown(handle);
    }

    #[test]
    fn oversized_instance_count_is_rejected_and_the_unit_lives_on() {
        let surface = HeadlessSurface::new(64, 48);
        let probe = surface.probe();
        let handle = start(surface);
        next_event(&handle.events);
        let (scene, camera) = cube_scene();
        load(&handle, &scene, &camera);
        next_event(&handle.events);

        let node = Node::instanced(
            "horde",
            Arc::new(Geometry::cuboid(1.0, 1.0, 1.0)),
            Material::default(),
            parallax_engine::scene::Instances::identity(1),
        );
        let mut payload = ObjectPayload::from_node(&node, AddOptions::default()).unwrap();
        payload.count = Some(1 << 60);
        payload.instance_matrices = None;
        payload.instance_colors = None;
        let id = CorrelationId::new();
        let text = Envelope::correlated(ControlMessage::AddObject(payload), id)
            .encode()
            .unwrap();
        handle.tx.send(Packet::Encoded(text)).unwrap();

        let reply = next_event(&handle.events);
        assert_eq!(reply.id, Some(id));
        match reply.message {
            RenderEvent::Error { message, .. } => {
                assert!(message.contains("exceeds the limit"), "{message}")
            }
            other => panic!("expected error, got {other:?}"),
        }

        let node = Node::mesh("extra", Arc::new(Geometry::cuboid(0.5, 0.5, 0.5)), Material::default());
        let payload = ObjectPayload::from_node(&node, AddOptions::default()).unwrap();
        let id = CorrelationId::new();
        handle
            .tx
            .send(Packet::message(Envelope::correlated(
                ControlMessage::AddObject(payload),
                id,
            )))
            .unwrap();
        let ack = next_event(&handle.events);
        assert_eq!(ack.id, Some(id));
        assert_eq!(ack.message, RenderEvent::ObjectAdded { name: "extra".into() });
        assert!(probe.wait_until(WAIT, |s| s.last_objects.iter().any(|n| n == "extra")));
        shutdown(handle);
    }

    #[test]
    fn failing_computations_answer_and_the_unit_keeps_serving() {
        let mut registry = ComputeRegistry::with_builtins();
        registry.register("explode", |_| panic!("kaboom"));
        let handle = spawn::<HeadlessRenderer>(ExecutorOptions {
            registry: Some(Arc::new(registry)),
            ..options()
        })
        .unwrap();
        handle
            .tx
            .send(Packet::Message {
                envelope: Envelope::new(ControlMessage::InitRd(RendererConfig::default().with_size(64, 48))),
                transfer: Some(Transfer {
                    surface: HeadlessSurface::new(64, 48),
                    camera: None,
                }),
            })
            .unwrap();
        next_event(&handle.events);

        let compute = |kind: &str, data: serde_json::Value| {
            let id = CorrelationId::new();
            let request = ComputeRequest {
                kind: kind.into(),
                data,
            };
            handle
                .tx
                .send(Packet::message(Envelope::correlated(ControlMessage::Compute(request), id)))
                .unwrap();
            let reply = next_event(&handle.events);
            assert_eq!(reply.id, Some(id));
            reply.message
        };

        let grid = compute("instance_grid", json!({ "count": 1u64 << 60 }));
        assert!(matches!(grid, RenderEvent::Error { ref message, .. } if message.contains("exceeds")), "{grid:?}");
        let boom = compute("explode", serde_json::Value::Null);
        assert!(matches!(boom, RenderEvent::Error { ref message, .. } if message.contains("kaboom")), "{boom:?}");
        assert_eq!(
            compute("sum", json!([1, 2])),
            RenderEvent::Result { result: json!(3.0) }
        );
        shutdown(handle);
    }

    #[test]
    fn renderer_call_replies_with_the_request_id() {
        let surface = HeadlessSurface::new(64, 48);
        let probe = surface.probe();
        let handle = start(surface);
        next_event(&handle.events);

        let id = CorrelationId::new();
        let call = RendererCall::new(RendererMethod::SetClearColor, vec![json!(0xff0000), json!(1.0)]);
        handle
            .tx
            .send(Packet::message(Envelope::correlated(
                ControlMessage::ThreejsFunc(call),
                id,
            )))
            .unwrap();
        let reply = next_event(&handle.events);
        assert_eq!(reply.id, Some(id));
        assert!(matches!(reply.message, RenderEvent::Success { .. }));
        assert_eq!(
            probe.snapshot().clear_color,
            Some((Color::from_hex(0xff0000), 1.0))
        );
        shutdown(handle);
    }

    #[test]
    fn oversized_resize_is_refused_and_rendering_continues() {
        let surface = HeadlessSurface::new(64, 48);
        let probe = surface.probe();
        let handle = start(surface);
        next_event(&handle.events);
        let (scene, camera) = cube_scene();
        load(&handle, &scene, &camera);
        next_event(&handle.events);

        let id = CorrelationId::new();
        let call = RendererCall::new(RendererMethod::SetSize, vec![json!(1e6), json!(1e6)]);
        handle
            .tx
            .send(Packet::message(Envelope::correlated(
                ControlMessage::ThreejsFunc(call),
                id,
            )))
            .unwrap();
        let reply = next_event(&handle.events);
        assert_eq!(reply.id, Some(id));
        match reply.message {
            RenderEvent::Error { message, method } => {
                assert_eq!(method.as_deref(), Some("setSize"));
                assert!(message.contains("exceeds the device limit"), "{message}");
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(probe.snapshot().drawable_size, (64, 48));
        assert!(probe.wait_frames(2, WAIT));
        shutdown(handle);
    }

    #[test]
    fn disposed_unit_rejects_correlated_requests() {
        let handle = start(HeadlessSurface::new(64, 48));
        next_event(&handle.events);

        let dispose = RendererCall::new(RendererMethod::Dispose, Vec::new());
        handle
            .tx
            .send(Packet::message(Envelope::correlated(
                ControlMessage::ThreejsFunc(dispose),
                CorrelationId::new(),
            )))
            .unwrap();
        assert!(matches!(
            next_event(&handle.events).message,
            RenderEvent::Success { .. }
        ));

        let id = CorrelationId::new();
        let call = RendererCall::new(RendererMethod::Clear, Vec::new());
        handle
            .tx
            .send(Packet::message(Envelope::correlated(
                ControlMessage::ThreejsFunc(call),
                id,
            )))
            .unwrap();
        let reply = next_event(&handle.events);
        assert_eq!(reply.id, Some(id));
        assert!(matches!(reply.message, RenderEvent::Error { .. }));
        shutdown(handle);
    }

    #[test]
    fn failing_frame_pauses_and_reports_once() {
        let surface = HeadlessSurface::new(64, 48);
        let probe = surface.probe();
        let handle = start(surface);
        next_event(&handle.events);
        probe.fail_next_render("device lost");

        let (scene, camera) = cube_scene();
        load(&handle, &scene, &camera);
        next_event(&handle.events);
        match next_event(&handle.events).message {
            RenderEvent::Error { message, .. } => assert!(message.contains("device lost")),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(handle
            .events
            .recv_timeout(Duration::from_millis(60))
            .is_err());
        assert_eq!(probe.frames(), 0);
        shutdown(handle);
    }

    #[test]
    fn shared_camera_is_read_each_frame() {
        let surface = HeadlessSurface::new(64, 48);
        let probe = surface.probe();
        let (writer, reader) = camera_channel();
        let handle = spawn::<HeadlessRenderer>(options()).unwrap();
        handle
            .tx
            .send(Packet::Message {
                envelope: Envelope::new(ControlMessage::InitRd(RendererConfig::default().with_size(64, 48))),
                transfer: Some(Transfer {
                    surface,
                    camera: Some(reader),
                }),
            })
            .unwrap();
        next_event(&handle.events);
        let (scene, camera) = cube_scene();
        load(&handle, &scene, &camera);
        next_event(&handle.events);

        let mut pose = camera.pose();
        pose.position = glam::Vec3::new(3.0, 4.0, 5.0);
        writer.write(&pose);
        assert!(probe.wait_until(WAIT, |s| s
            .last_pose
            .is_some_and(|p| (p.position - pose.position).length() < 1e-5)));
        shutdown(handle);
    }
}
