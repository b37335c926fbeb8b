use parallax_engine::render::{RendererCall, RendererMethod};
use parallax_engine::Color;
use serde_json::{json, Value};

use crate::protocol::CorrelationId;

/// The allow-listed renderer surface, as typed forwarding methods.
///
/// Every method sends one `threejs_func` message with a fresh id and returns
/// that id immediately; nothing waits for the reply. Observers can match the
/// `success`/`error` event through [`Bridge::subscribe`](super::Bridge::subscribe).
pub trait RendererOps {
    fn forward(&self, call: RendererCall) -> CorrelationId;

    /// Forwards by wire name. Names outside the allowlist are inert: nothing is
    /// sent and `None` comes back.
    fn forward_named(&self, name: &str, params: Vec<Value>) -> Option<CorrelationId> {
        let method = RendererMethod::from_name(name)?;
        Some(self.forward(RendererCall::new(method, params)))
    }

    fn set_size(&self, width: f32, height: f32, update_style: bool) -> CorrelationId {
        self.forward(RendererCall::new(
            RendererMethod::SetSize,
            vec![json!(width), json!(height), json!(update_style)],
        ))
    }

    fn set_pixel_ratio(&self, ratio: f32) -> CorrelationId {
        self.forward(RendererCall::new(RendererMethod::SetPixelRatio, vec![json!(ratio)]))
    }

    fn set_clear_color(&self, color: Color, alpha: f32) -> CorrelationId {
        self.forward(RendererCall::new(
            RendererMethod::SetClearColor,
            vec![json!(color.to_hex()), json!(alpha)],
        ))
    }

    fn clear(&self) -> CorrelationId {
        self.forward(RendererCall::new(RendererMethod::Clear, Vec::new()))
    }

    /// Uploads the live scene's GPU resources ahead of the first frame.
    fn compile(&self) -> CorrelationId {
        self.forward(RendererCall::new(RendererMethod::Compile, Vec::new()))
    }

    fn dispose(&self) -> CorrelationId {
        self.forward(RendererCall::new(RendererMethod::Dispose, Vec::new()))
    }

    fn set_scissor_test(&self, enabled: bool) -> CorrelationId {
        self.forward(RendererCall::new(RendererMethod::SetScissorTest, vec![json!(enabled)]))
    }

    fn set_viewport(&self, x: f32, y: f32, width: f32, height: f32) -> CorrelationId {
        self.forward(RendererCall::new(
            RendererMethod::SetViewport,
            vec![json!(x), json!(y), json!(width), json!(height)],
        ))
    }

    /// Only the default target (the bound surface) can be selected remotely.
    fn set_render_target_default(&self) -> CorrelationId {
        self.forward(RendererCall::new(RendererMethod::SetRenderTarget, vec![Value::Null]))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<RendererCall>>);

    impl RendererOps for Recorder {
        fn forward(&self, call: RendererCall) -> CorrelationId {
            self.0.borrow_mut().push(call);
            CorrelationId::new()
        }
    }

    #[test]
    fn only_allow_listed_names_are_forwarded() {
        let ops = Recorder::default();
        assert!(ops.forward_named("setPixelRatio", vec![json!(2.0)]).is_some());
        assert!(ops.forward_named("getContext", Vec::new()).is_none());
        assert!(ops.forward_named("domElement", Vec::new()).is_none());
        assert!(ops.forward_named("setsize", Vec::new()).is_none());

        let calls = ops.0.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, RendererMethod::SetPixelRatio);
    }

    #[test]
    fn typed_methods_produce_decodable_arguments() {
        let ops = Recorder::default();
        ops.set_size(640.0, 480.0, false);
        ops.set_clear_color(Color::from_hex(0x112233), 0.5);
        ops.set_viewport(0.0, 0.0, 320.0, 240.0);

        let calls = ops.0.borrow();
        let (w, h, style): (f32, f32, Option<bool>) = calls[0].args(3).unwrap();
        assert_eq!((w, h, style), (640.0, 480.0, Some(false)));
        let (hex, alpha): (u32, f32) = calls[1].args(2).unwrap();
        assert_eq!((hex, alpha), (0x112233, 0.5));
        assert_eq!(calls[2].params.len(), 4);
    }
}
