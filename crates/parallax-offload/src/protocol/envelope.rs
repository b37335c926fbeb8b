use serde_json::Value;

use crate::error::ProtocolError;

use super::{CorrelationId, Message};

/// A message plus its optional correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    pub message: M,
    pub id: Option<CorrelationId>,
}

impl<M: Message> Envelope<M> {
    pub fn new(message: M) -> Self {
        Self { message, id: None }
    }

    pub fn correlated(message: M, id: CorrelationId) -> Self {
        Self {
            message,
            id: Some(id),
        }
    }

    #[inline]
    pub fn kind(&self) -> &'static str {
        self.message.kind()
    }

    pub fn to_value(&self) -> Result<Value, ProtocolError> {
        let mut value = serde_json::to_value(&self.message)?;
        if let (Some(id), Some(obj)) = (self.id, value.as_object_mut()) {
            obj.insert("id".into(), serde_json::to_value(id)?);
        }
        Ok(value)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }

    /// Decodes a wire value.
    ///
    /// An unrecognised `type` is reported as [`ProtocolError::UnknownKind`],
    /// a recognised one with a bad payload as [`ProtocolError::Malformed`].
    pub fn from_value(mut value: Value) -> Result<Self, ProtocolError> {
        let obj = value
            .as_object_mut()
            .ok_or_else(|| ProtocolError::Malformed("expected a JSON object".into()))?;

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::Malformed("missing `type` tag".into()))?;
        let kind = M::KINDS
            .iter()
            .copied()
            .find(|k| *k == kind)
            .ok_or_else(|| ProtocolError::UnknownKind(kind.to_string()))?;

        let id = match obj.remove("id") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(serde_json::from_value::<CorrelationId>(raw)?),
        };
        if id.is_none() && M::CORRELATED.contains(&kind) {
            return Err(ProtocolError::MissingId(kind));
        }

        let message = serde_json::from_value(value)?;
        Ok(Self { message, id })
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Self::from_value(serde_json::from_str(text)?)
    }
}

/// Best-effort extraction of the correlation id from a frame that failed to decode.
pub fn peek_id(text: &str) -> Option<CorrelationId> {
    let value: Value = serde_json::from_str(text).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}

#[cfg(test)]
mod tests {
    use parallax_engine::render::{RendererCall, RendererMethod};
    use serde_json::json;

    use super::*;
    use crate::protocol::{ControlMessage, RemoveObject, RenderEvent};

    #[test]
    fn wire_shape_is_type_id_data() {
        let id = CorrelationId::new();
        let env = Envelope::correlated(
            ControlMessage::ThreejsFunc(RendererCall::new(RendererMethod::SetSize, vec![json!(640), json!(480)])),
            id,
        );
        let value = env.to_value().unwrap();
        assert_eq!(value["type"], "threejs_func");
        assert_eq!(value["id"], json!(id.to_string()));
        assert_eq!(value["data"]["name"], "setSize");

        let back = Envelope::<ControlMessage>::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn unit_kinds_have_no_data() {
        let value = Envelope::new(ControlMessage::StopLoop).to_value().unwrap();
        assert_eq!(value, json!({"type": "stop_loop"}));
        let back = Envelope::<ControlMessage>::from_value(value).unwrap();
        assert_eq!(back.message, ControlMessage::StopLoop);
        assert_eq!(back.id, None);
    }

    #[test]
    fn unknown_kind_is_distinguished_from_bad_payload() {
        let unknown = Envelope::<ControlMessage>::decode(r#"{"type":"teleport","data":{}}"#);
        assert_eq!(unknown, Err(ProtocolError::UnknownKind("teleport".into())));

        let bad = Envelope::<ControlMessage>::decode(r#"{"type":"remove_object","data":{"nom":"x"}}"#);
        assert!(matches!(bad, Err(ProtocolError::Malformed(_))));

        assert!(matches!(
            Envelope::<ControlMessage>::decode("[1,2]"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::<ControlMessage>::decode("not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn correlated_kinds_require_an_id() {
        let frame = json!({"type": "threejs_func", "data": {"name": "clear", "params": []}});
        assert_eq!(
            Envelope::<ControlMessage>::from_value(frame),
            Err(ProtocolError::MissingId("threejs_func"))
        );

        let frame = json!({"type": "remove_object", "data": {"name": "cube"}});
        let env = Envelope::<ControlMessage>::from_value(frame).unwrap();
        assert_eq!(
            env.message,
            ControlMessage::RemoveObject(RemoveObject { name: "cube".into() })
        );
    }

    #[test]
    fn disallowed_method_names_do_not_decode() {
        let frame = json!({
            "type": "threejs_func",
            "id": CorrelationId::new(),
            "data": {"name": "render", "params": []}
        });
        assert!(matches!(
            Envelope::<ControlMessage>::from_value(frame),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn ids_can_be_salvaged_from_bad_frames() {
        let id = CorrelationId::new();
        let text = format!(r#"{{"type":"add_object","id":"{id}","data":{{"broken":true}}}}"#);
        assert!(Envelope::<ControlMessage>::decode(&text).is_err());
        assert_eq!(peek_id(&text), Some(id));
        assert_eq!(peek_id("{}"), None);
    }

    #[test]
    fn events_round_trip() {
        let id = CorrelationId::new();
        let env = Envelope::correlated(RenderEvent::ObjectAdded { name: "cube".into() }, id);
        let value = env.to_value().unwrap();
        assert_eq!(value, json!({"type": "object_added", "id": id, "data": {"name": "cube"}}));
        assert_eq!(Envelope::from_value(value).unwrap(), env);

        let err = Envelope::new(RenderEvent::error("boom")).to_value().unwrap();
        assert_eq!(err, json!({"type": "error", "data": {"message": "boom"}}));
    }
}
