use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::paint::Color;
use crate::scene::{Camera, Node, Scene};

/// Renderer construction parameters, carried by the initialization message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RendererConfig {
    /// Logical width.
    pub width: u32,
    /// Logical height.
    pub height: u32,
    pub pixel_ratio: f32,
    pub antialias: bool,
    /// Transparent canvas (pre-multiplied alpha output).
    pub alpha: bool,
    pub background: Option<Color>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            pixel_ratio: 1.0,
            antialias: true,
            alpha: false,
            background: None,
        }
    }
}

impl RendererConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Drawing buffer size in physical pixels.
    pub fn drawable_size(&self) -> (u32, u32) {
        drawable_size(self.width, self.height, self.pixel_ratio)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.width > 0 && self.height > 0,
            "surface size {}x{} is empty",
            self.width,
            self.height
        );
        anyhow::ensure!(
            self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0,
            "pixel ratio {} must be positive",
            self.pixel_ratio
        );
        Ok(())
    }
}

pub(crate) fn drawable_size(width: u32, height: u32, pixel_ratio: f32) -> (u32, u32) {
    let scale = |v: u32| ((v as f32) * pixel_ratio).round().max(1.0) as u32;
    (scale(width), scale(height))
}

/// Renderer operations that may be invoked remotely. Nothing else is reachable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RendererMethod {
    #[serde(rename = "setSize")]
    SetSize,
    #[serde(rename = "setPixelRatio")]
    SetPixelRatio,
    #[serde(rename = "setClearColor")]
    SetClearColor,
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "compile")]
    Compile,
    #[serde(rename = "dispose")]
    Dispose,
    #[serde(rename = "setScissorTest")]
    SetScissorTest,
    #[serde(rename = "setViewport")]
    SetViewport,
    #[serde(rename = "setRenderTarget")]
    SetRenderTarget,
}

impl RendererMethod {
    pub const ALL: [RendererMethod; 9] = [
        RendererMethod::SetSize,
        RendererMethod::SetPixelRatio,
        RendererMethod::SetClearColor,
        RendererMethod::Clear,
        RendererMethod::Compile,
        RendererMethod::Dispose,
        RendererMethod::SetScissorTest,
        RendererMethod::SetViewport,
        RendererMethod::SetRenderTarget,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RendererMethod::SetSize => "setSize",
            RendererMethod::SetPixelRatio => "setPixelRatio",
            RendererMethod::SetClearColor => "setClearColor",
            RendererMethod::Clear => "clear",
            RendererMethod::Compile => "compile",
            RendererMethod::Dispose => "dispose",
            RendererMethod::SetScissorTest => "setScissorTest",
            RendererMethod::SetViewport => "setViewport",
            RendererMethod::SetRenderTarget => "setRenderTarget",
        }
    }

    /// Looks up an allow-listed method by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl fmt::Display for RendererMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{0}` is not a forwardable renderer method")]
pub struct MethodNotAllowed(pub String);

impl FromStr for RendererMethod {
    type Err = MethodNotAllowed;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| MethodNotAllowed(s.to_string()))
    }
}

/// A forwarded renderer invocation: method plus positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererCall {
    pub name: RendererMethod,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl RendererCall {
    pub fn new(name: RendererMethod, params: Vec<Value>) -> Self {
        Self { name, params }
    }

    /// Decodes the positional arguments into a tuple (or any sequence type).
    ///
    /// The argument list is fitted to `arity`: extra arguments are dropped and
    /// missing ones decode as `null`, so `Option` tail parameters may be omitted.
    pub fn args<T: DeserializeOwned>(&self, arity: usize) -> Result<T> {
        let mut params = self.params.clone();
        params.resize(arity, Value::Null);
        serde_json::from_value(Value::Array(params))
            .with_context(|| format!("bad arguments for `{}`", self.name))
    }
}

/// The operations the render loop and message handlers need from a renderer.
pub trait Renderer {
    /// Draws `scene` as seen from `camera` to the bound surface.
    fn render(&mut self, scene: &Scene, camera: &Camera) -> Result<()>;

    /// Applies an allow-listed renderer operation. `scene` is the live scene,
    /// if one is loaded, for operations like `compile` that need it.
    fn call(&mut self, call: &RendererCall, scene: Option<&Scene>) -> Result<Value>;

    /// Sets (or clears) the scene background used as the clear color.
    fn set_background(&mut self, color: Option<Color>);

    /// Frees resources held for `node` and its descendants.
    fn release(&mut self, node: &Node);
}

/// A renderer that can be constructed from a transferred surface.
///
/// The surface is moved into the render-side thread; the renderer itself is
/// created there and never leaves it.
pub trait RenderBackend: Renderer + Sized {
    type Surface: Send + 'static;

    fn create(surface: Self::Surface, config: &RendererConfig) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn every_method_round_trips_its_name() {
        for m in RendererMethod::ALL {
            assert_eq!(RendererMethod::from_name(m.as_str()), Some(m));
            assert_eq!(serde_json::to_value(m).unwrap(), json!(m.as_str()));
        }
    }

    #[test]
    fn names_outside_the_list_are_refused() {
        for name in ["render", "getContext", "domElement", "setsize", ""] {
            assert!(name.parse::<RendererMethod>().is_err(), "{name}");
        }
        assert!(serde_json::from_value::<RendererCall>(json!({"name": "render"})).is_err());
    }

    #[test]
    fn args_pad_missing_tail() {
        let call = RendererCall::new(RendererMethod::SetClearColor, vec![json!(0xff0000)]);
        let (color, alpha): (Value, Option<f32>) = call.args(2).unwrap();
        assert_eq!(color, json!(0xff0000));
        assert_eq!(alpha, None);

        let bad = RendererCall::new(RendererMethod::SetSize, vec![json!("wide")]);
        assert!(bad.args::<(u32, u32)>(2).is_err());
    }

    #[test]
    fn config_defaults_and_validation() {
        let cfg = RendererConfig::default();
        assert_eq!((cfg.width, cfg.height), (800, 600));
        assert!(cfg.antialias);
        assert!(cfg.validate().is_ok());

        let hi_dpi = RendererConfig {
            pixel_ratio: 2.0,
            ..RendererConfig::default()
        };
        assert_eq!(hi_dpi.drawable_size(), (1600, 1200));

        assert!(RendererConfig::default().with_size(0, 10).validate().is_err());
        let decoded: RendererConfig = serde_json::from_value(json!({"width": 320})).unwrap();
        assert_eq!((decoded.width, decoded.height), (320, 600));
    }
}
