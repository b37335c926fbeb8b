use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::paint::Color;

/// Surface appearance of a mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub uuid: String,

    #[serde(default = "default_color")]
    pub color: Color,

    #[serde(default = "default_opacity")]
    pub opacity: f32,

    #[serde(default)]
    pub transparent: bool,

    #[serde(default)]
    pub wireframe: bool,

    /// Multiply by per-instance (or per-vertex) colors when present.
    #[serde(default)]
    pub vertex_colors: bool,

    #[serde(default = "default_visible")]
    pub visible: bool,

    /// Set whenever a property changes; renderers clear it after re-uploading.
    #[serde(skip)]
    pub needs_update: bool,
}

fn default_color() -> Color {
    Color::WHITE
}

fn default_opacity() -> f32 {
    1.0
}

fn default_visible() -> bool {
    true
}

impl Default for Material {
    fn default() -> Self {
        Self::new(Color::WHITE)
    }
}

impl Material {
    /// Creates a material with a fresh uuid.
    pub fn new(color: Color) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            color,
            opacity: 1.0,
            transparent: false,
            wireframe: false,
            vertex_colors: false,
            visible: true,
            needs_update: false,
        }
    }

    /// Assigns one named property from a loosely typed value.
    ///
    /// `color` accepts a `0xRRGGBB` integer or a `#rrggbb` string. Other keys are
    /// assigned only when the value has the matching JSON type. Returns whether the
    /// property was applied; unknown keys and mismatched types are left untouched.
    pub fn apply_property(&mut self, key: &str, value: &Value) -> bool {
        let applied = match key {
            "color" => Color::from_json(value).map(|c| self.color = c).is_some(),
            "opacity" => value
                .as_f64()
                .map(|v| self.opacity = v as f32)
                .is_some(),
            "transparent" => assign_bool(&mut self.transparent, value),
            "wireframe" => assign_bool(&mut self.wireframe, value),
            "vertexColors" => assign_bool(&mut self.vertex_colors, value),
            "visible" => assign_bool(&mut self.visible, value),
            _ => false,
        };

        if applied {
            self.needs_update = true;
        }
        applied
    }

    /// Applies every entry of `props`, returning the keys that were not applied.
    pub fn apply_properties<'a>(
        &mut self,
        props: &'a serde_json::Map<String, Value>,
    ) -> Vec<&'a str> {
        props
            .iter()
            .filter(|(key, value)| !self.apply_property(key, value))
            .map(|(key, _)| key.as_str())
            .collect()
    }
}

fn assign_bool(slot: &mut bool, value: &Value) -> bool {
    match value.as_bool() {
        Some(v) => {
            *slot = v;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn color_accepts_hex_number_and_string() {
        let mut m = Material::default();
        assert!(m.apply_property("color", &json!(0xff0000)));
        assert_eq!(m.color.to_hex(), 0xff0000);
        assert!(m.apply_property("color", &json!("#00ff00")));
        assert_eq!(m.color.to_hex(), 0x00ff00);
        assert!(m.needs_update);
    }

    #[test]
    fn unknown_and_mistyped_keys_are_ignored() {
        let mut m = Material::default();
        let props = json!({ "shininess": 30, "wireframe": "yes", "opacity": 0.25 });
        let ignored = m.apply_properties(props.as_object().unwrap());
        assert_eq!(m.opacity, 0.25);
        assert!(!m.wireframe);
        assert_eq!(ignored.len(), 2);
        assert!(ignored.contains(&"shininess"));
    }
}
