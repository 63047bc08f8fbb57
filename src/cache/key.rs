//! Deterministic cache-key derivation.
//!
//! A key is `entity + "_" + json`, where `json` is the descriptor content
//! written in the order it was supplied. Field order is part of the key:
//! `{a, b}` and `{b, a}` produce different keys.

use std::fmt;

use mongodb::bson::{Bson, Document};
use serde_json::{Number, Value};

use crate::query::{QueryDescriptor, QueryShape};

/// Separator between the entity name and the serialized descriptor.
pub const KEY_SEPARATOR: &str = "_";

/// String key identifying a descriptor's semantic content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Glob pattern matching every key derived for `entity`.
pub fn entity_pattern(entity: &str) -> String {
    format!("{entity}{KEY_SEPARATOR}*")
}

/// Derive the cache key for a descriptor.
pub fn derive_key(descriptor: &QueryDescriptor) -> CacheKey {
    let mut out = String::with_capacity(96);
    out.push_str(descriptor.entity());
    out.push_str(KEY_SEPARATOR);

    match descriptor.shape() {
        QueryShape::Filter {
            conditions,
            projection,
            options,
            ..
        } => {
            out.push_str("{\"query\":");
            write_document(conditions, &mut out);
            out.push_str(",\"fields\":");
            write_document(projection, &mut out);
            out.push_str(",\"options\":");
            write_document(options, &mut out);
            out.push('}');
        }
        QueryShape::Aggregate { pipeline, options } => {
            out.push_str("{\"pipeline\":[");
            for (i, stage) in pipeline.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_document(stage, &mut out);
            }
            out.push_str("],\"options\":");
            write_document(options, &mut out);
            out.push('}');
        }
    }

    CacheKey(out)
}

fn write_document(doc: &Document, out: &mut String) {
    out.push('{');
    for (i, (name, value)) in doc.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_str(name, out);
        out.push(':');
        write_bson(value, out);
    }
    out.push('}');
}

fn write_bson(value: &Bson, out: &mut String) {
    match value {
        Bson::Document(doc) => write_document(doc, out),
        Bson::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_bson(item, out);
            }
            out.push(']');
        }
        Bson::String(s) => write_str(s, out),
        // Regexes keep their source text so equal patterns collide.
        Bson::RegularExpression(regex) => {
            write_str(&format!("/{}/{}", regex.pattern, regex.options), out)
        }
        Bson::ObjectId(oid) => write_str(&oid.to_hex(), out),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(text) => write_str(&text, out),
            Err(_) => out.push_str(&dt.timestamp_millis().to_string()),
        },
        Bson::Int32(n) => out.push_str(&n.to_string()),
        Bson::Int64(n) => out.push_str(&n.to_string()),
        Bson::Double(f) => match Number::from_f64(*f) {
            Some(n) => out.push_str(&n.to_string()),
            None => out.push_str("null"),
        },
        Bson::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Bson::Null | Bson::Undefined => out.push_str("null"),
        other => out.push_str(&other.clone().into_relaxed_extjson().to_string()),
    }
}

fn write_str(s: &str, out: &mut String) {
    out.push_str(&Value::from(s).to_string());
}
