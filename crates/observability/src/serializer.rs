//! Safe serializer: any [`LogValue`] to bounded, redacted JSON.
//!
//! `serialize` never fails and never recurses without bound. Limits:
//! nesting depth, items per container, string length. Sensitive keys are
//! replaced wherever they appear, and shared nodes seen twice become
//! `{"$ref": <first path>}`.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::{Map, Number, Value};

use crate::panic_message;
use crate::value::{LogValue, Loggable};

/// Keys whose values are never logged (matched case-insensitively).
pub const REDACT_KEYS: [&str; 6] = [
    "password",
    "hashed_password",
    "access_token",
    "refresh_token",
    "secret",
    "token",
];

/// Keys whose collection values are reduced to `{count, sample}`.
pub const SUMMARIZE_KEYS: [&str; 4] = ["user_details", "wallets", "rules", "transactions"];

/// Entity fields that may appear in logs.
pub const ENTITY_FIELDS: [&str; 12] = [
    "id",
    "email",
    "role",
    "name",
    "type",
    "balance",
    "is_active",
    "user_id",
    "organization_id",
    "created_at",
    "updated_at",
    "active_wallet_id",
];

pub const REDACTED: &str = "***redacted***";
pub const TYPE_KEY: &str = "<type>";
pub const TRUNCATED_KEY: &str = "<truncated>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializerLimits {
    pub max_depth: usize,
    pub max_items: usize,
    pub max_string_len: usize,
    pub sample_items: usize,
}

impl Default for SerializerLimits {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_items: 200,
            max_string_len: 5000,
            sample_items: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafeSerializer {
    limits: SerializerLimits,
}

impl SafeSerializer {
    pub fn new(limits: SerializerLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> SerializerLimits {
        self.limits
    }

    pub fn serialize(&self, value: &LogValue) -> Value {
        self.guarded(|| Visit::new(self.limits).value(value, "$", 0))
    }

    /// Convert and serialize. A panicking `Loggable` impl yields a placeholder.
    pub fn serialize_loggable<T: Loggable + ?Sized>(&self, value: &T) -> Value {
        self.guarded(|| Visit::new(self.limits).value(&value.to_log_value(), "$", 0))
    }

    /// Serialize `value` as the member `key` of a top-level map: the key's
    /// redaction rule applies and nesting starts one level down.
    pub fn serialize_entry<T: Loggable + ?Sized>(&self, key: &str, value: &T) -> Value {
        self.guarded(|| {
            let safe = Visit::new(self.limits).value(&value.to_log_value(), &format!("$.{key}"), 1);
            redact(key, safe)
        })
    }

    /// Compact JSON text of the serialized value.
    pub fn to_json_string<T: Loggable + ?Sized>(&self, value: &T) -> String {
        let safe = self.serialize_loggable(value);
        serde_json::to_string(&safe).unwrap_or_else(|e| format!("<unserializable: {e}>"))
    }

    fn guarded(&self, run: impl FnOnce() -> Value) -> Value {
        catch_unwind(AssertUnwindSafe(run))
            .unwrap_or_else(|payload| Value::String(format!("<unserializable: {}>", panic_message(&*payload))))
    }
}

/// One serialization pass: the identity map lives only as long as this.
struct Visit {
    limits: SerializerLimits,
    seen: HashMap<usize, String>,
}

impl Visit {
    fn new(limits: SerializerLimits) -> Self {
        Self {
            limits,
            seen: HashMap::new(),
        }
    }

    fn value(&mut self, value: &LogValue, path: &str, depth: usize) -> Value {
        if depth > self.limits.max_depth {
            return Value::String(format!("<max_depth at {path}>"));
        }

        match value {
            LogValue::Null => Value::Null,
            LogValue::Bool(b) => Value::Bool(*b),
            LogValue::Int(i) => Value::from(*i),
            LogValue::UInt(u) => Value::from(*u),
            LogValue::Float(f) => float(*f),
            LogValue::Str(s) => Value::String(self.truncate(s)),

            LogValue::Uuid(u) => Value::String(u.to_string()),
            LogValue::Enum(v) => Value::String(v.clone()),
            LogValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            LogValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            LogValue::Decimal(text) => match text.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => float(f),
                _ => Value::String(text.clone()),
            },
            LogValue::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => Value::String(self.truncate(text)),
                Err(_) => Value::String(hex(bytes)),
            },
            LogValue::Path(p) => Value::String(self.truncate(&p.display().to_string())),

            LogValue::Record { fields, .. } => {
                self.entries(fields, &format!("{path}<record>"), depth + 1)
            }
            LogValue::Response {
                status,
                headers,
                body,
            } => self.response(*status, headers, body, path, depth),
            LogValue::Entity { type_name, fields } => self.entity(type_name, fields, path, depth),
            LogValue::Map(entries) => self.entries(entries, path, depth),
            LogValue::List(items) => self.list(items, path, depth),
            LogValue::Object { type_name, attrs } => self.object(type_name, attrs, path, depth),
            LogValue::Shared(node) => {
                let identity = node.identity();
                if let Some(first) = self.seen.get(&identity) {
                    let mut reference = Map::new();
                    reference.insert("$ref".to_string(), Value::String(first.clone()));
                    return Value::Object(reference);
                }
                self.seen.insert(identity, path.to_string());
                let inner = node.read();
                self.value(&inner, path, depth)
            }
            LogValue::Opaque(repr) => Value::String(self.truncate(repr)),
        }
    }

    fn entries(&mut self, entries: &[(String, LogValue)], path: &str, depth: usize) -> Value {
        let mut out = Map::new();
        for (count, (key, value)) in entries.iter().enumerate() {
            if count >= self.limits.max_items {
                out.insert(
                    TRUNCATED_KEY.to_string(),
                    Value::String(format!("only first {} items logged", self.limits.max_items)),
                );
                break;
            }
            let child_path = format!("{path}.{key}");
            if SUMMARIZE_KEYS.contains(&key.as_str()) {
                if let Some(summary) = self.summarized(value, &child_path, depth) {
                    out.insert(key.clone(), summary);
                    continue;
                }
            }
            let safe = self.value(value, &child_path, depth + 1);
            out.insert(key.clone(), redact(key, safe));
        }
        Value::Object(out)
    }

    fn list(&mut self, items: &[LogValue], path: &str, depth: usize) -> Value {
        let max = self.limits.max_items;
        if items.iter().take(max).any(LogValue::is_entity) {
            return self.summary(items, path, depth);
        }

        let mut out = Vec::with_capacity(items.len().min(max + 1));
        for (idx, item) in items.iter().enumerate() {
            if idx >= max {
                out.push(Value::String(format!("<truncated: first {max} items>")));
                break;
            }
            out.push(self.value(item, &format!("{path}[{idx}]"), depth + 1));
        }
        Value::Array(out)
    }

    /// `{count, sample}` for a collection, looking through shared nodes.
    /// `None` when `value` is not a collection.
    fn summarized(&mut self, value: &LogValue, path: &str, depth: usize) -> Option<Value> {
        match value {
            LogValue::List(items) => Some(self.summary(items, path, depth)),
            LogValue::Shared(node) => {
                let inner = node.read();
                let LogValue::List(items) = &*inner else {
                    return None;
                };
                let identity = node.identity();
                if let Some(first) = self.seen.get(&identity) {
                    let mut reference = Map::new();
                    reference.insert("$ref".to_string(), Value::String(first.clone()));
                    return Some(Value::Object(reference));
                }
                self.seen.insert(identity, path.to_string());
                Some(self.summary(items, path, depth))
            }
            _ => None,
        }
    }

    fn summary(&mut self, items: &[LogValue], path: &str, depth: usize) -> Value {
        let sample = items
            .iter()
            .take(self.limits.sample_items)
            .enumerate()
            .map(|(i, item)| self.value(item, &format!("{path}[{i}]"), depth + 1))
            .collect();

        let mut out = Map::new();
        out.insert("count".to_string(), Value::from(items.len()));
        out.insert("sample".to_string(), Value::Array(sample));
        Value::Object(out)
    }

    fn object(&mut self, type_name: &str, attrs: &[(String, LogValue)], path: &str, depth: usize) -> Value {
        let mut out = Map::new();
        out.insert(TYPE_KEY.to_string(), Value::String(type_name.to_string()));

        let public = attrs.iter().filter(|(name, _)| !name.starts_with('_'));
        for (i, (name, value)) in public.enumerate() {
            if i >= self.limits.max_items {
                out.insert(
                    TRUNCATED_KEY.to_string(),
                    Value::String(format!("only first {} attrs logged", self.limits.max_items)),
                );
                break;
            }
            let safe = self.value(value, &format!("{path}.{name}"), depth + 1);
            out.insert(name.clone(), redact(name, safe));
        }
        Value::Object(out)
    }

    /// Entities render shallowly: their fields sit at the depth cap, so
    /// only scalars come through and nested containers become markers.
    fn entity(&mut self, type_name: &str, fields: &[(String, LogValue)], path: &str, depth: usize) -> Value {
        let mut out = Map::new();
        out.insert(TYPE_KEY.to_string(), Value::String(type_name.to_string()));

        let field_depth = (depth + 1).max(self.limits.max_depth);
        for (name, value) in fields {
            if ENTITY_FIELDS.contains(&name.as_str()) {
                let safe = self.value(value, &format!("{path}.{name}"), field_depth);
                out.insert(name.clone(), safe);
            }
        }
        if !out.contains_key("id") {
            out.insert("id".to_string(), Value::String(format!("<{type_name}>")));
        }
        Value::Object(out)
    }

    fn response(
        &mut self,
        status: u16,
        headers: &[(String, String)],
        body: &[u8],
        path: &str,
        depth: usize,
    ) -> Value {
        let body_value = match std::str::from_utf8(body) {
            Ok(text) => serde_json::from_str::<Value>(text)
                .map(LogValue::from)
                .unwrap_or_else(|_| LogValue::Str(text.to_string())),
            Err(_) => LogValue::Str(hex(body)),
        };
        let path = format!("{path}<response>");

        let header_map: Map<String, Value> = headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(self.truncate(v))))
            .collect();

        let mut out = Map::new();
        out.insert("status".to_string(), Value::from(status));
        out.insert("headers".to_string(), Value::Object(header_map));
        out.insert("body".to_string(), self.value(&body_value, &path, depth + 1));
        Value::Object(out)
    }

    fn truncate(&self, s: &str) -> String {
        match s.char_indices().nth(self.limits.max_string_len) {
            Some((cut, _)) => format!("{}…", &s[..cut]),
            None => s.to_string(),
        }
    }
}

fn redact(key: &str, value: Value) -> Value {
    let lowered = key.to_lowercase();
    if REDACT_KEYS.contains(&lowered.as_str()) {
        Value::String(REDACTED.to_string())
    } else {
        value
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(f.to_string()))
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
