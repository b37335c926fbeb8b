use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::paint::Color;

use super::backend::{drawable_size, RendererCall, RendererConfig, RendererMethod};

/// Viewport rectangle in logical pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewportRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewportRect {
    /// Scales to physical pixels and clips to `bounds`. `None` when nothing is left.
    pub fn to_physical(self, pixel_ratio: f32, bounds: (u32, u32)) -> Option<(u32, u32, u32, u32)> {
        let (bw, bh) = bounds;
        let clip = |v: f32, max: u32| ((v * pixel_ratio).max(0.0) as u32).min(max);
        let x = clip(self.x, bw);
        let y = clip(self.y, bh);
        let x2 = clip(self.x + self.width, bw);
        let y2 = clip(self.y + self.height, bh);
        let (w, h) = (x2.saturating_sub(x), y2.saturating_sub(y));
        (w > 0 && h > 0).then_some((x, y, w, h))
    }
}

/// What a backend must do after a call has been applied to the settings.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CallEffect {
    /// Settings changed; nothing else to do.
    None,
    /// The drawing buffer size changed.
    Resize,
    /// Clear the surface now.
    Clear,
    /// Prepare GPU resources for the current scene.
    Compile,
    /// Drop every GPU resource.
    Dispose,
}

/// Renderer-side settings shared by all backends.
///
/// Decodes allow-listed calls and records their effect; the backend then acts
/// on the returned [`CallEffect`].
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    pub clear_color: Color,
    pub clear_alpha: f32,
    /// Scene background; overrides `clear_color` when set.
    pub background: Option<Color>,
    pub scissor_test: bool,
    pub viewport: ViewportRect,
}

impl RendererSettings {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            pixel_ratio: config.pixel_ratio,
            clear_color: Color::BLACK,
            clear_alpha: if config.alpha { 0.0 } else { 1.0 },
            background: config.background,
            scissor_test: false,
            viewport: full_viewport(config.width, config.height),
        }
    }

    pub fn drawable_size(&self) -> (u32, u32) {
        drawable_size(self.width, self.height, self.pixel_ratio)
    }

    /// Effective clear color and alpha for the next frame.
    pub fn effective_clear(&self) -> (Color, f32) {
        match self.background {
            Some(bg) => (bg, 1.0),
            None => (self.clear_color, self.clear_alpha),
        }
    }

    /// Applies `call` only if the resulting drawing buffer stays within
    /// `max_dimension` texels per side. Settings are untouched on error.
    pub fn apply_within(&mut self, call: &RendererCall, max_dimension: u32) -> Result<CallEffect> {
        let mut next = self.clone();
        let effect = next.apply(call)?;
        if effect == CallEffect::Resize {
            check_drawable_size(next.drawable_size(), max_dimension)
                .with_context(|| call.name.to_string())?;
        }
        *self = next;
        Ok(effect)
    }

    pub fn apply(&mut self, call: &RendererCall) -> Result<CallEffect> {
        let effect = match call.name {
            RendererMethod::SetSize => {
                let (width, height, _update_style): (f32, f32, Option<bool>) = call.args(3)?;
                if !(width.is_finite() && height.is_finite() && width >= 1.0 && height >= 1.0) {
                    bail!("setSize: {width}x{height} is not a drawable size");
                }
                self.width = width as u32;
                self.height = height as u32;
                self.viewport = full_viewport(self.width, self.height);
                CallEffect::Resize
            }
            RendererMethod::SetPixelRatio => {
                let (ratio,): (f32,) = call.args(1)?;
                if !(ratio.is_finite() && ratio > 0.0) {
                    bail!("setPixelRatio: {ratio} must be positive");
                }
                self.pixel_ratio = ratio;
                CallEffect::Resize
            }
            RendererMethod::SetClearColor => {
                let (color, alpha): (Value, Option<f32>) = call.args(2)?;
                let Some(color) = Color::from_json(&color) else {
                    bail!("setClearColor: unsupported color {color}");
                };
                self.clear_color = color;
                if let Some(alpha) = alpha {
                    self.clear_alpha = alpha.clamp(0.0, 1.0);
                }
                CallEffect::None
            }
            RendererMethod::Clear => CallEffect::Clear,
            RendererMethod::Compile => CallEffect::Compile,
            RendererMethod::Dispose => CallEffect::Dispose,
            RendererMethod::SetScissorTest => {
                let (enabled,): (bool,) = call.args(1)?;
                self.scissor_test = enabled;
                CallEffect::None
            }
            RendererMethod::SetViewport => {
                let (x, y, width, height): (f32, f32, f32, f32) = call.args(4)?;
                self.viewport = ViewportRect {
                    x,
                    y,
                    width,
                    height,
                };
                CallEffect::None
            }
            RendererMethod::SetRenderTarget => {
                let (target,): (Value,) = call.args(1)?;
                if !target.is_null() {
                    bail!("setRenderTarget: only the default surface (null) is supported");
                }
                CallEffect::None
            }
        };
        Ok(effect)
    }
}

fn full_viewport(width: u32, height: u32) -> ViewportRect {
    ViewportRect {
        x: 0.0,
        y: 0.0,
        width: width as f32,
        height: height as f32,
    }
}

/// Fails when a drawing buffer of `size` would exceed the texture limit.
pub(crate) fn check_drawable_size((width, height): (u32, u32), max_dimension: u32) -> Result<()> {
    if width > max_dimension || height > max_dimension {
        bail!("drawing buffer {width}x{height} exceeds the device limit of {max_dimension}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(name: RendererMethod, params: Value) -> RendererCall {
        serde_json::from_value(json!({ "name": name, "params": params })).unwrap()
    }

    #[test]
    fn set_size_resets_viewport() {
        let mut s = RendererSettings::new(&RendererConfig::default());
        s.apply(&call(RendererMethod::SetViewport, json!([10, 10, 20, 20]))).unwrap();
        let effect = s.apply(&call(RendererMethod::SetSize, json!([1024, 768, false]))).unwrap();
        assert_eq!(effect, CallEffect::Resize);
        assert_eq!((s.width, s.height), (1024, 768));
        assert_eq!(s.viewport.width, 1024.0);
    }

    #[test]
    fn clear_color_accepts_hex_and_string() {
        let mut s = RendererSettings::new(&RendererConfig::default());
        s.apply(&call(RendererMethod::SetClearColor, json!(["#00ff00", 0.5]))).unwrap();
        assert_eq!(s.effective_clear(), (Color::from_hex(0x00ff00), 0.5));
        s.apply(&call(RendererMethod::SetClearColor, json!([0x0000ff]))).unwrap();
        assert_eq!(s.effective_clear(), (Color::from_hex(0x0000ff), 0.5));

        s.background = Some(Color::WHITE);
        assert_eq!(s.effective_clear(), (Color::WHITE, 1.0));
    }

    #[test]
    fn oversized_drawing_buffer_is_refused() {
        let mut s = RendererSettings::new(&RendererConfig::default().with_size(800, 600));
        let before = s.clone();

        let err = s
            .apply_within(&call(RendererMethod::SetSize, json!([1e6, 1e6])), 8192)
            .unwrap_err();
        assert!(format!("{err:#}").starts_with("setSize: drawing buffer"), "{err:#}");
        assert_eq!(s, before);

        let err = s
            .apply_within(&call(RendererMethod::SetPixelRatio, json!([20])), 8192)
            .unwrap_err();
        assert!(format!("{err:#}").contains("exceeds the device limit of 8192"), "{err:#}");
        assert_eq!(s, before);

        let effect = s
            .apply_within(&call(RendererMethod::SetSize, json!([4096, 2048])), 8192)
            .unwrap();
        assert_eq!(effect, CallEffect::Resize);
        assert_eq!(s.drawable_size(), (4096, 2048));
    }

    #[test]
    fn bad_arguments_are_errors() {
        let mut s = RendererSettings::new(&RendererConfig::default());
        assert!(s.apply(&call(RendererMethod::SetPixelRatio, json!([0]))).is_err());
        assert!(s.apply(&call(RendererMethod::SetSize, json!([]))).is_err());
        assert!(s.apply(&call(RendererMethod::SetRenderTarget, json!([{"id": 1}]))).is_err());
        assert!(s.apply(&call(RendererMethod::SetRenderTarget, json!([null]))).is_ok());
    }

    #[test]
    fn viewport_scales_and_clips() {
        let rect = ViewportRect {
            x: 100.0,
            y: 0.0,
            width: 400.0,
            height: 300.0,
        };
        assert_eq!(rect.to_physical(2.0, (600, 1200)), Some((200, 0, 400, 600)));
        assert_eq!(rect.to_physical(10.0, (600, 600)), None);
    }
}
