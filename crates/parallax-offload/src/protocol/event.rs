use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Message;

/// Severity of a forwarded render-side console message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Debug,
    Log,
    Warn,
    Error,
}

impl ConsoleLevel {
    pub fn to_log_level(self) -> log::Level {
        match self {
            ConsoleLevel::Debug => log::Level::Debug,
            ConsoleLevel::Log => log::Level::Info,
            ConsoleLevel::Warn => log::Level::Warn,
            ConsoleLevel::Error => log::Level::Error,
        }
    }
}

/// Render side → control side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RenderEvent {
    Ready {
        message: String,
    },
    Error {
        message: String,
        /// Renderer method that failed, for forwarded calls.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<String>,
    },
    SceneLoaded {
        objects: usize,
    },
    ObjectAdded {
        name: String,
    },
    /// Result of a forwarded renderer call.
    Success {
        result: Value,
    },
    /// Result of a computation.
    Result {
        result: Value,
    },
    Console {
        level: ConsoleLevel,
        args: Vec<Value>,
    },
}

impl RenderEvent {
    pub fn error(message: impl Into<String>) -> Self {
        RenderEvent::Error {
            message: message.into(),
            method: None,
        }
    }

    pub fn console(level: ConsoleLevel, text: impl Into<String>) -> Self {
        RenderEvent::Console {
            level,
            args: vec![Value::String(text.into())],
        }
    }
}

impl Message for RenderEvent {
    const KINDS: &'static [&'static str] = &[
        "ready",
        "error",
        "scene_loaded",
        "object_added",
        "success",
        "result",
        "console",
    ];

    const CORRELATED: &'static [&'static str] = &["object_added", "success", "result"];

    fn kind(&self) -> &'static str {
        match self {
            RenderEvent::Ready { .. } => "ready",
            RenderEvent::Error { .. } => "error",
            RenderEvent::SceneLoaded { .. } => "scene_loaded",
            RenderEvent::ObjectAdded { .. } => "object_added",
            RenderEvent::Success { .. } => "success",
            RenderEvent::Result { .. } => "result",
            RenderEvent::Console { .. } => "console",
        }
    }
}
