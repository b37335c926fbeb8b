//! Ephemeral compute units.
//!
//! Each `run` spawns a fresh named thread, sends it exactly one `compute`
//! message and waits for exactly one `result` or `error`. The unit exits after
//! replying and is joined; nothing is pooled or reused.

mod registry;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parallax_engine::device::ComputeDevice;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::channel::Incoming;
use crate::config::{ComputeConfig, DevicePolicy};
use crate::error::BridgeError;
use crate::protocol::{
    ComputeRequest, ControlMessage, CorrelationId, Envelope, Message, RenderEvent,
};

pub use registry::{ComputeFn, ComputeInput, ComputeRegistry};

/// Answers one compute request. Shared by compute units and the render executor.
///
/// A panicking kind becomes an `error` reply; the calling thread survives.
pub(crate) fn answer(
    id: Option<CorrelationId>,
    request: ComputeRequest,
    registry: &ComputeRegistry,
    device: Option<&ComputeDevice>,
) -> Envelope<RenderEvent> {
    let kind = request.kind;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        registry.run(&kind, request.data, device)
    }));
    let event = match outcome {
        Ok(Ok(result)) => RenderEvent::Result { result },
        Ok(Err(err)) => RenderEvent::error(format!("{err:#}")),
        Err(payload) => {
            let message = crate::panic_message(payload.as_ref());
            log::error!("computation `{kind}` panicked: {message}");
            RenderEvent::error(format!("`{kind}` panicked: {message}"))
        }
    };
    Envelope { message: event, id }
}

#[derive(Debug, Default)]
struct Counters {
    spawned: AtomicU64,
    live: AtomicUsize,
}

/// Decrements the live-unit count when the unit thread ends, however it ends.
struct LiveGuard(Arc<Counters>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Runs computations in disposable execution units.
#[derive(Debug, Clone)]
pub struct ComputeDispatcher {
    registry: Arc<ComputeRegistry>,
    config: ComputeConfig,
    counters: Arc<Counters>,
}

impl ComputeDispatcher {
    pub fn new(registry: ComputeRegistry, config: ComputeConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
            counters: Arc::default(),
        }
    }

    /// Dispatcher with the built-in kinds and no GPU device.
    pub fn with_builtins() -> Self {
        Self::new(ComputeRegistry::with_builtins(), ComputeConfig::default())
    }

    pub fn registry(&self) -> &ComputeRegistry {
        &self.registry
    }

    /// Units created since construction.
    pub fn units_spawned(&self) -> u64 {
        self.counters.spawned.load(Ordering::Acquire)
    }

    /// Units whose threads are still alive.
    pub fn in_flight(&self) -> usize {
        self.counters.live.load(Ordering::Acquire)
    }

    /// Runs `kind` over `data` in a fresh unit and returns its single result.
    pub async fn run(&self, kind: &str, data: Value) -> Result<Value, BridgeError> {
        let id = CorrelationId::new();
        let (job_tx, job_rx) = crossbeam_channel::bounded::<Envelope<ControlMessage>>(1);
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Incoming>();

        let unit_no = self.counters.spawned.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters.live.fetch_add(1, Ordering::AcqRel);
        let guard = LiveGuard(self.counters.clone());
        let registry = self.registry.clone();
        let policy = self.config.device;

        let handle = std::thread::Builder::new()
            .name(format!("parallax-compute-{unit_no}"))
            .spawn(move || {
                let _guard = guard;
                run_unit(job_rx, reply_tx, &registry, policy);
            })
            .map_err(|e| BridgeError::Spawn(e.to_string()))?;

        let request = ComputeRequest {
            kind: kind.to_string(),
            data,
        };
        if job_tx
            .send(Envelope::correlated(ControlMessage::Compute(request), id))
            .is_err()
        {
            return Err(BridgeError::Disconnected);
        }
        drop(job_tx);

        let reply = reply_rx.recv().await;

        // The unit exits right after replying.
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(())) => log::debug!("compute unit {unit_no} torn down"),
            _ => log::warn!("compute unit {unit_no} did not exit cleanly"),
        }

        match reply {
            Some(Incoming::Event(env)) if env.id != Some(id) => Err(BridgeError::Operation(
                format!("reply carried id {:?}, expected {id}", env.id),
            )),
            Some(Incoming::Event(env)) => match env.message {
                RenderEvent::Result { result } => Ok(result),
                RenderEvent::Error { message, .. } => Err(BridgeError::Compute(message)),
                other => Err(BridgeError::Operation(format!(
                    "unexpected `{}` reply from compute unit",
                    other.kind()
                ))),
            },
            Some(Incoming::Fault(message)) => Err(BridgeError::Transport(message)),
            None => Err(BridgeError::Disconnected),
        }
    }
}

fn run_unit(
    jobs: Receiver<Envelope<ControlMessage>>,
    replies: mpsc::UnboundedSender<Incoming>,
    registry: &ComputeRegistry,
    policy: DevicePolicy,
) {
    let Ok(envelope) = jobs.recv() else {
        return;
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let device = match policy {
            DevicePolicy::None => None,
            DevicePolicy::Headless => match ComputeDevice::blocking() {
                Ok(device) => Some(device),
                Err(err) => {
                    log::warn!("compute unit running without a device: {err:#}");
                    None
                }
            },
        };
        match envelope.message {
            ControlMessage::Compute(request) => {
                answer(envelope.id, request, registry, device.as_ref())
            }
            other => Envelope {
                message: RenderEvent::error(format!(
                    "compute units only accept `compute`, got `{}`",
                    other.kind()
                )),
                id: envelope.id,
            },
        }
    }));

    let reply = match outcome {
        Ok(envelope) => Incoming::Event(envelope),
        Err(payload) => Incoming::Fault(crate::panic_message(payload.as_ref())),
    };
    let _ = replies.send(reply);
}
