//! Closed value model handed to the serializer.
//!
//! Anything that wants to appear in a log payload converts itself into a
//! [`LogValue`] through [`Loggable`]. Shared, possibly cyclic structures use
//! [`SharedValue`] so the serializer can track identity.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub enum LogValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),

    Uuid(Uuid),
    /// The wire value of an enum variant.
    Enum(String),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    /// Decimal in its textual form; rendered as a float when it parses.
    Decimal(String),
    Bytes(Vec<u8>),
    Path(PathBuf),

    /// A DTO expanded through its field mapping.
    Record {
        type_name: String,
        fields: Vec<(String, LogValue)>,
    },
    /// An HTTP response envelope.
    Response {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    /// A persisted entity; only allow-listed fields are rendered.
    Entity {
        type_name: String,
        fields: Vec<(String, LogValue)>,
    },
    Map(Vec<(String, LogValue)>),
    List(Vec<LogValue>),
    /// Generic attribute bag; names starting with `_` are skipped.
    Object {
        type_name: String,
        attrs: Vec<(String, LogValue)>,
    },
    Shared(SharedValue),
    /// Fallback representation for anything else.
    Opaque(String),
}

impl LogValue {
    /// Expand any serde-serializable DTO into a [`LogValue::Record`].
    ///
    /// Non-object serializations (unit structs, newtypes) become the plain
    /// converted value.
    pub fn record_of<T: Serialize + ?Sized>(type_name: &str, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(serde_json::Value::Object(map)) => LogValue::Record {
                type_name: type_name.to_string(),
                fields: map.into_iter().map(|(k, v)| (k, LogValue::from(v))).collect(),
            },
            Ok(other) => LogValue::from(other),
            Err(e) => LogValue::Opaque(format!("<unserializable: {e}>")),
        }
    }

    pub fn entity<'a>(
        type_name: &str,
        fields: impl IntoIterator<Item = (&'a str, LogValue)>,
    ) -> Self {
        LogValue::Entity {
            type_name: type_name.to_string(),
            fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    pub fn object<'a>(type_name: &str, attrs: impl IntoIterator<Item = (&'a str, LogValue)>) -> Self {
        LogValue::Object {
            type_name: type_name.to_string(),
            attrs: attrs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    pub fn map<'a>(entries: impl IntoIterator<Item = (&'a str, LogValue)>) -> Self {
        LogValue::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    pub fn response(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        LogValue::Response {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, LogValue::Entity { .. })
    }
}

impl From<serde_json::Value> for LogValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => LogValue::Null,
            Value::Bool(b) => LogValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    LogValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    LogValue::UInt(u)
                } else {
                    LogValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => LogValue::Str(s),
            Value::Array(items) => LogValue::List(items.into_iter().map(LogValue::from).collect()),
            Value::Object(map) => {
                LogValue::Map(map.into_iter().map(|(k, v)| (k, LogValue::from(v))).collect())
            }
        }
    }
}

/// Identity-bearing node. Two `LogValue::Shared` holding clones of the same
/// `SharedValue` are the same object to the serializer.
#[derive(Clone, Default)]
pub struct SharedValue(Arc<RwLock<LogValue>>);

impl SharedValue {
    pub fn new(value: LogValue) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Replace the wrapped value (used to close cycles).
    pub fn set(&self, value: LogValue) {
        match self.0.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, LogValue> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl core::fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SharedValue({:#x})", self.identity())
    }
}

/// Conversion into the loggable value model.
pub trait Loggable {
    fn to_log_value(&self) -> LogValue;
}

impl Loggable for LogValue {
    fn to_log_value(&self) -> LogValue {
        self.clone()
    }
}

impl Loggable for SharedValue {
    fn to_log_value(&self) -> LogValue {
        LogValue::Shared(self.clone())
    }
}

impl Loggable for serde_json::Value {
    fn to_log_value(&self) -> LogValue {
        LogValue::from(self.clone())
    }
}

impl Loggable for () {
    fn to_log_value(&self) -> LogValue {
        LogValue::Null
    }
}

impl Loggable for bool {
    fn to_log_value(&self) -> LogValue {
        LogValue::Bool(*self)
    }
}

macro_rules! loggable_int {
    ($variant:ident as $target:ty: $($t:ty),*) => {
        $(impl Loggable for $t {
            fn to_log_value(&self) -> LogValue {
                LogValue::$variant(*self as $target)
            }
        })*
    };
}

loggable_int!(Int as i64: i8, i16, i32, i64, isize);
loggable_int!(UInt as u64: u8, u16, u32, u64, usize);

impl Loggable for f32 {
    fn to_log_value(&self) -> LogValue {
        LogValue::Float(f64::from(*self))
    }
}

impl Loggable for f64 {
    fn to_log_value(&self) -> LogValue {
        LogValue::Float(*self)
    }
}

impl Loggable for str {
    fn to_log_value(&self) -> LogValue {
        LogValue::Str(self.to_string())
    }
}

impl Loggable for String {
    fn to_log_value(&self) -> LogValue {
        LogValue::Str(self.clone())
    }
}

impl Loggable for char {
    fn to_log_value(&self) -> LogValue {
        LogValue::Str(self.to_string())
    }
}

impl Loggable for Uuid {
    fn to_log_value(&self) -> LogValue {
        LogValue::Uuid(*self)
    }
}

impl Loggable for DateTime<Utc> {
    fn to_log_value(&self) -> LogValue {
        LogValue::DateTime(*self)
    }
}

impl Loggable for NaiveDateTime {
    fn to_log_value(&self) -> LogValue {
        LogValue::DateTime(self.and_utc())
    }
}

impl Loggable for NaiveDate {
    fn to_log_value(&self) -> LogValue {
        LogValue::Date(*self)
    }
}

impl Loggable for Path {
    fn to_log_value(&self) -> LogValue {
        LogValue::Path(self.to_path_buf())
    }
}

impl Loggable for PathBuf {
    fn to_log_value(&self) -> LogValue {
        LogValue::Path(self.clone())
    }
}

impl<T: Loggable + ?Sized> Loggable for &T {
    fn to_log_value(&self) -> LogValue {
        (**self).to_log_value()
    }
}

impl<T: Loggable + ?Sized> Loggable for Box<T> {
    fn to_log_value(&self) -> LogValue {
        (**self).to_log_value()
    }
}

impl<T: Loggable + ?Sized> Loggable for Arc<T> {
    fn to_log_value(&self) -> LogValue {
        (**self).to_log_value()
    }
}

impl<T: Loggable> Loggable for Option<T> {
    fn to_log_value(&self) -> LogValue {
        match self {
            Some(v) => v.to_log_value(),
            None => LogValue::Null,
        }
    }
}

impl<T: Loggable> Loggable for [T] {
    fn to_log_value(&self) -> LogValue {
        LogValue::List(self.iter().map(Loggable::to_log_value).collect())
    }
}

impl<T: Loggable> Loggable for Vec<T> {
    fn to_log_value(&self) -> LogValue {
        self.as_slice().to_log_value()
    }
}

impl<T: Loggable> Loggable for HashSet<T> {
    fn to_log_value(&self) -> LogValue {
        LogValue::List(self.iter().map(Loggable::to_log_value).collect())
    }
}

impl<T: Loggable> Loggable for BTreeSet<T> {
    fn to_log_value(&self) -> LogValue {
        LogValue::List(self.iter().map(Loggable::to_log_value).collect())
    }
}

impl<K: core::fmt::Display, V: Loggable> Loggable for HashMap<K, V> {
    fn to_log_value(&self) -> LogValue {
        LogValue::Map(self.iter().map(|(k, v)| (k.to_string(), v.to_log_value())).collect())
    }
}

impl<K: core::fmt::Display, V: Loggable> Loggable for BTreeMap<K, V> {
    fn to_log_value(&self) -> LogValue {
        LogValue::Map(self.iter().map(|(k, v)| (k.to_string(), v.to_log_value())).collect())
    }
}
