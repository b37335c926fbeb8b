use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use parallax_engine::logging::RENDER_TARGET;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::channel::Incoming;
use crate::correlation::CorrelationTable;
use crate::error::BridgeError;
use crate::protocol::{ConsoleLevel, Envelope, Message, RenderEvent};

const INIT_FAILED_PREFIX: &str = "Renderer initialization failed: ";

type ReadyWaiter = oneshot::Sender<Result<(), BridgeError>>;

/// State the bridge shares with its inbound pump thread.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) pending: CorrelationTable<RenderEvent>,
    ready_waiter: Mutex<Option<ReadyWaiter>>,
    ready: AtomicBool,
    subscribers: Mutex<Vec<Sender<Incoming>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub(crate) fn await_ready(&self) -> oneshot::Receiver<Result<(), BridgeError>> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.ready_waiter) = Some(tx);
        rx
    }

    fn settle_ready(&self, outcome: Result<(), BridgeError>) -> bool {
        match lock(&self.ready_waiter).take() {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    fn waiting_for_ready(&self) -> bool {
        lock(&self.ready_waiter).is_some()
    }

    pub(crate) fn subscribe(&self) -> Receiver<Incoming> {
        let (tx, rx) = crossbeam_channel::unbounded();
        lock(&self.subscribers).push(tx);
        rx
    }

    fn broadcast(&self, incoming: &Incoming) {
        lock(&self.subscribers).retain(|tx| tx.send(incoming.clone()).is_ok());
    }
}

/// Drains render-side output until the render unit goes away.
pub(crate) fn run(events: Receiver<Incoming>, shared: &Shared) {
    for incoming in events.iter() {
        shared.broadcast(&incoming);
        match incoming {
            Incoming::Event(envelope) => dispatch(envelope, shared),
            Incoming::Fault(message) => {
                log::error!("render unit fault: {message}");
                fail_all(shared, BridgeError::Transport(message));
            }
        }
    }
    fail_all(shared, BridgeError::Disconnected);
    log::debug!("inbound pump stopped");
}

fn fail_all(shared: &Shared, err: BridgeError) {
    shared.set_ready(false);
    shared.settle_ready(Err(err.clone()));
    let rejected = shared.pending.reject_all(&err);
    if rejected > 0 {
        log::debug!("rejected {rejected} outstanding requests: {err}");
    }
}

fn dispatch(envelope: Envelope<RenderEvent>, shared: &Shared) {
    let Envelope { message, id } = envelope;
    match (message, id) {
        (RenderEvent::Console { level, args }, _) => relay_console(level, &args),
        (RenderEvent::Ready { message }, _) => {
            log::info!("render side ready: {message}");
            shared.set_ready(true);
            shared.settle_ready(Ok(()));
        }
        (RenderEvent::Error { message, method }, Some(id)) => {
            let message = match method {
                Some(method) => format!("{method}: {message}"),
                None => message,
            };
            if !shared.pending.reject(&id, BridgeError::Operation(message.clone())) {
                log::debug!("error for late or unknown request {id}: {message}");
            }
        }
        (RenderEvent::Error { message, .. }, None) if shared.waiting_for_ready() => {
            let reason = message
                .strip_prefix(INIT_FAILED_PREFIX)
                .unwrap_or(&message)
                .to_string();
            shared.settle_ready(Err(BridgeError::Initialization(reason)));
        }
        (RenderEvent::Error { message, .. }, None) => {
            log::warn!(target: RENDER_TARGET, "[render] {message}");
        }
        (event, Some(id)) => {
            let kind = event.kind();
            if !shared.pending.resolve(&id, event) {
                log::debug!("dropping `{kind}` for late or unmatched id {id}");
            }
        }
        (event, None) => log::debug!("render side: {event:?}"),
    }
}

fn relay_console(level: ConsoleLevel, args: &[Value]) {
    let text = args
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    log::log!(target: RENDER_TARGET, level.to_log_level(), "[render] {text}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CorrelationId;

    fn event(message: RenderEvent, id: Option<CorrelationId>) -> Incoming {
        Incoming::Event(Envelope { message, id })
    }

    #[test]
    fn error_without_id_fails_initialization() {
        let shared = Shared::default();
        let mut ready = shared.await_ready();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(event(
            RenderEvent::error("Renderer initialization failed: surface is 0x0"),
            None,
        ))
        .unwrap();
        drop(tx);
        run(rx, &shared);

        assert_eq!(
            ready.try_recv().unwrap(),
            Err(BridgeError::Initialization("surface is 0x0".into()))
        );
        assert!(!shared.is_ready());
    }

    #[test]
    fn correlated_events_complete_their_entry() {
        let shared = Shared::default();
        let ok = shared.pending.register("add_object");
        let failed = shared.pending.register("threejs_func");
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(event(
            RenderEvent::ObjectAdded { name: "cube".into() },
            Some(ok.id),
        ))
        .unwrap();
        tx.send(event(
            RenderEvent::Error {
                message: "bad arguments".into(),
                method: Some("setSize".into()),
            },
            Some(failed.id),
        ))
        .unwrap();
        // Unmatched ids are dropped without disturbing anything.
        tx.send(event(RenderEvent::ObjectAdded { name: "x".into() }, Some(CorrelationId::new())))
            .unwrap();
        drop(tx);

        let subscriber = shared.subscribe();
        run(rx, &shared);
        assert_eq!(subscriber.try_iter().count(), 3);

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            assert_eq!(
                shared.pending.wait(ok, None).await,
                Ok(RenderEvent::ObjectAdded { name: "cube".into() })
            );
            assert_eq!(
                shared.pending.wait(failed, None).await,
                Err(BridgeError::Operation("setSize: bad arguments".into()))
            );
        });
        assert!(shared.pending.is_empty());
    }

    #[test]
    fn fault_rejects_outstanding_requests() {
        let shared = Shared::default();
        let pending = shared.pending.register("add_object");
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(Incoming::Fault("boom".into())).unwrap();
        drop(tx);
        run(rx, &shared);

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let outcome = rt.block_on(shared.pending.wait(pending, None));
        assert_eq!(outcome, Err(BridgeError::Transport("boom".into())));
    }
}
