use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Vec3};
use parallax_engine::device::ComputeDevice;
use parallax_engine::scene::MAX_INSTANCES;
use serde::Deserialize;
use serde_json::{json, Value};

/// Arguments handed to a computation kind.
pub struct ComputeInput<'a> {
    pub data: Value,
    /// Present when the unit acquired a GPU device.
    pub device: Option<&'a ComputeDevice>,
}

pub type ComputeFn = dyn Fn(ComputeInput<'_>) -> Result<Value> + Send + Sync;

/// Named, pre-registered computation kinds.
///
/// Requests select a kind by name; no executable code crosses the channel.
#[derive(Clone, Default)]
pub struct ComputeRegistry {
    kinds: BTreeMap<String, Arc<ComputeFn>>,
}

impl fmt::Debug for ComputeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeRegistry")
            .field("kinds", &self.kinds.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ComputeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `sum` and `instance_grid`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("sum", sum);
        registry.register("instance_grid", instance_grid);
        registry
    }

    /// Adds (or replaces) a kind.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(ComputeInput<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.kinds.insert(name.into(), Arc::new(f));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn run(&self, kind: &str, data: Value, device: Option<&ComputeDevice>) -> Result<Value> {
        let f = self
            .kinds
            .get(kind)
            .ok_or_else(|| anyhow!("unknown computation kind `{kind}`"))?;
        f(ComputeInput { data, device }).with_context(|| format!("`{kind}` failed"))
    }
}

/// Sums a flat array of numbers.
fn sum(input: ComputeInput<'_>) -> Result<Value> {
    let Value::Array(items) = input.data else {
        bail!("expected an array of numbers");
    };
    let mut total = 0.0f64;
    for (i, item) in items.iter().enumerate() {
        total += item
            .as_f64()
            .ok_or_else(|| anyhow!("element {i} is not a number"))?;
    }
    Ok(json!(total))
}

#[derive(Deserialize)]
struct GridSpec {
    count: usize,
    #[serde(default = "default_spacing")]
    spacing: f32,
}

fn default_spacing() -> f32 {
    1.0
}

/// Lays `count` instances out on a centered square grid in the XZ plane.
///
/// `count` is capped at [`MAX_INSTANCES`], the most an instanced mesh accepts.
/// Returns `{ count, instanceMatrices }` with flat column-major matrices,
/// ready to be used as instanced-mesh payload data.
fn instance_grid(input: ComputeInput<'_>) -> Result<Value> {
    let spec: GridSpec = serde_json::from_value(input.data).context("expected {count, spacing}")?;
    if !(spec.spacing.is_finite() && spec.spacing > 0.0) {
        bail!("spacing must be positive");
    }
    if spec.count > MAX_INSTANCES {
        bail!("count {} exceeds the limit of {MAX_INSTANCES}", spec.count);
    }
    let floats = spec
        .count
        .checked_mul(16)
        .ok_or_else(|| anyhow!("count {} overflows the matrix buffer", spec.count))?;

    let side = (spec.count as f64).sqrt().ceil().max(1.0) as usize;
    let offset = (side as f32 - 1.0) * spec.spacing * 0.5;
    let mut flat = Vec::with_capacity(floats);
    for i in 0..spec.count {
        let (row, col) = (i / side, i % side);
        let at = Vec3::new(
            col as f32 * spec.spacing - offset,
            0.0,
            row as f32 * spec.spacing - offset,
        );
        flat.extend_from_slice(&Mat4::from_translation(at).to_cols_array());
    }

    Ok(json!({ "count": spec.count, "instanceMatrices": flat }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_adds_numbers() {
        let registry = ComputeRegistry::with_builtins();
        assert_eq!(registry.run("sum", json!([1, 2.5, 3]), None).unwrap(), json!(6.5));
        assert!(registry.run("sum", json!([1, "two"]), None).is_err());
        assert!(registry.run("sum", json!({"a": 1}), None).is_err());
    }

    #[test]
    fn grid_is_centered() {
        let registry = ComputeRegistry::with_builtins();
        let out = registry
            .run("instance_grid", json!({"count": 4, "spacing": 2.0}), None)
            .unwrap();
        assert_eq!(out["count"], 4);
        let flat: Vec<f32> = serde_json::from_value(out["instanceMatrices"].clone()).unwrap();
        assert_eq!(flat.len(), 64);
        // First instance sits at (-1, 0, -1), last at (1, 0, 1).
        assert_eq!((flat[12], flat[14]), (-1.0, -1.0));
        assert_eq!((flat[48 + 12], flat[48 + 14]), (1.0, 1.0));
    }

    #[test]
    fn oversized_grid_is_an_error() {
        let registry = ComputeRegistry::with_builtins();
        for count in [MAX_INSTANCES as u64 + 1, 1 << 60, u64::MAX] {
            let err = registry
                .run("instance_grid", json!({ "count": count }), None)
                .unwrap_err();
            assert!(format!("{err:#}").contains("exceeds the limit"), "{err:#}");
        }
    }

    #[test]
    fn unknown_kinds_and_custom_registration() {
        let mut registry = ComputeRegistry::new();
        assert!(registry.run("sum", json!([]), None).is_err());

        registry.register("echo", |input| Ok(input.data));
        assert!(registry.contains("echo"));
        assert_eq!(registry.run("echo", json!({"x": 1}), None).unwrap(), json!({"x": 1}));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["echo"]);
    }
}
