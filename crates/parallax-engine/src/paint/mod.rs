//! Colour model shared between the scene graph, the wire format and renderers.
//!
//! Scene colours are straight (non-premultiplied) RGB in `[0, 1]`. Opacity lives on
//! materials, and the clear alpha is supplied separately by the renderer.

pub mod color;

pub use color::{Color, ColorParseError};
