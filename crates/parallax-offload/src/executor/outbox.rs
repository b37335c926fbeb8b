use crossbeam_channel::Sender;
use parallax_engine::logging::RENDER_TARGET;

use crate::channel::Incoming;
use crate::protocol::{ConsoleLevel, CorrelationId, Envelope, RenderEvent};

/// Render-side sending half: events, diagnostics and faults.
#[derive(Debug, Clone)]
pub(crate) struct Outbox {
    tx: Sender<Incoming>,
    forward_console: bool,
}

impl Outbox {
    pub(crate) fn new(tx: Sender<Incoming>, forward_console: bool) -> Self {
        Self {
            tx,
            forward_console,
        }
    }

    pub(crate) fn emit(&self, event: RenderEvent, id: Option<CorrelationId>) {
        if self.tx.send(Incoming::Event(Envelope { message: event, id })).is_err() {
            log::trace!(target: RENDER_TARGET, "event dropped: control side is gone");
        }
    }

    pub(crate) fn error(&self, id: Option<CorrelationId>, message: impl Into<String>) {
        self.emit(RenderEvent::error(message), id);
    }

    /// Diagnostics go back as `console` events, or straight to the local
    /// logger when forwarding is off.
    pub(crate) fn console(&self, level: ConsoleLevel, text: impl Into<String>) {
        let text = text.into();
        if self.forward_console {
            self.emit(RenderEvent::console(level, text), None);
        } else {
            log::log!(target: RENDER_TARGET, level.to_log_level(), "{text}");
        }
    }

    pub(crate) fn log(&self, text: impl Into<String>) {
        self.console(ConsoleLevel::Log, text);
    }

    pub(crate) fn warn(&self, text: impl Into<String>) {
        self.console(ConsoleLevel::Warn, text);
    }

    pub(crate) fn debug(&self, text: impl Into<String>) {
        self.console(ConsoleLevel::Debug, text);
    }

    pub(crate) fn fault(&self, message: String) {
        let _ = self.tx.send(Incoming::Fault(message));
    }
}
