//! Structural comparison of desired and actual configuration.
//!
//! Desired values are partial: the gateway fills in defaults for everything a
//! definition leaves out, so only fields present on the desired side count.

use std::collections::HashSet;

use serde_json::{Map, Number, Value};

use crate::control_plane::PluginConfig;
use crate::gateway::{GatewayConsumer, GatewayPlugin};

/// Gateway-assigned or relational fields never compared on plugins.
pub const IDENTITY_KEYS: [&str; 5] = ["id", "route", "service", "consumer", "created_at"];

/// True when every field present in `desired` matches `actual`.
///
/// Objects recurse with the same rule, arrays must have equal length and match
/// element-wise, numbers compare numerically. A desired field missing on the
/// actual side matches only if it is `null`.
pub fn matches(desired: &Value, actual: &Value) -> bool {
    match (desired, actual) {
        (Value::Object(d), Value::Object(a)) => object_matches(d, a, &[]),
        (Value::Array(d), Value::Array(a)) => {
            d.len() == a.len() && d.iter().zip(a).all(|(d, a)| matches(d, a))
        }
        (Value::Number(d), Value::Number(a)) => numbers_match(d, a),
        (d, a) => d == a,
    }
}

/// Integers compare exactly; floats only when either side is one.
fn numbers_match(d: &Number, a: &Number) -> bool {
    if let (Some(d), Some(a)) = (d.as_i64(), a.as_i64()) {
        return d == a;
    }
    if let (Some(d), Some(a)) = (d.as_u64(), a.as_u64()) {
        return d == a;
    }
    if d.is_f64() || a.is_f64() {
        return d.as_f64() == a.as_f64();
    }
    // One side negative, the other above i64::MAX.
    false
}

/// [`matches`] over two JSON objects.
pub fn fields_match(desired: &Map<String, Value>, actual: &Map<String, Value>) -> bool {
    object_matches(desired, actual, &[])
}

fn object_matches(desired: &Map<String, Value>, actual: &Map<String, Value>, skip: &[&str]) -> bool {
    desired
        .iter()
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .all(|(k, d)| matches(d, actual.get(k).unwrap_or(&Value::Null)))
}

/// Plugin comparison by name and declared fields, identity keys excluded.
pub fn plugin_matches(desired: &PluginConfig, actual: &GatewayPlugin) -> bool {
    desired.name == actual.name && object_matches(&desired.fields, &actual.fields, &IDENTITY_KEYS)
}

/// Names the adapter must never update or delete, plus the consumer opt-out tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    names: HashSet<String>,
    tag: Option<String>,
}

impl IgnoreList {
    pub fn new<I, S>(names: I, tag: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            tag: tag.filter(|t| !t.is_empty()),
        }
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// A consumer is ignored by username or by carrying the ignore tag.
    pub fn ignores_consumer(&self, consumer: &GatewayConsumer) -> bool {
        self.is_ignored(&consumer.username)
            || self.tag.as_deref().is_some_and(|tag| consumer.has_tag(tag))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
