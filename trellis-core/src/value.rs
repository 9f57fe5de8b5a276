//! Dynamic value model
//!
//! The engine tracks mutations over dynamic value trees: scalars plus shared,
//! interior-mutable containers. Containers are `Arc`-backed so that two
//! `Value`s can point at the same underlying object, which is what makes
//! identity-keyed wrapping (`reactive(x)` twice yields one node) and
//! multi-parent sharing possible.
//!
//! Two notions of equality coexist:
//!
//! - [`Value::same`] is identity: scalar equality, pointer equality for
//!   containers, node identity for reactive handles. A reactive node and the
//!   plain container it wraps are `same`, so writing a snapshot back over its
//!   own wrapper is recognized as a no-op.
//! - `PartialEq` is deep structural equality with a recursion cap.
//!
//! All container operations (`get`, `set`, `push`, ...) are available on
//! `Value` directly. On a plain container they apply immediately and emit
//! nothing; on a reactive node they are tracked and emit events.

use std::cell::Cell;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::Error;
use crate::reactive::node::Reactive;

/// Recursion cap for deep equality and serialization. Value graphs may be
/// cyclic; traversal beyond this depth short-circuits.
pub(crate) const MAX_DEPTH: usize = 100;

pub type ObjectRef = Arc<RwLock<ObjectData>>;
pub type ArrayRef = Arc<RwLock<Vec<Value>>>;
pub type MapRef = Arc<RwLock<IndexMap<String, Value>>>;
pub type FuncRef = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;
pub type GetterFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// A dynamic value: scalar, shared container, callable, getter body, or a
/// handle to a reactive node wrapping one of the containers.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(ObjectRef),
    Array(ArrayRef),
    Map(MapRef),
    Func(FuncRef),
    /// A getter body. Only meaningful as an object property value; reading
    /// the property evaluates the body under dependency tracking.
    Getter(GetterFn),
    Node(Reactive),
}

/// A property slot of an object: the value plus the descriptor bits the
/// engine honors. Non-writable non-configurable slots pass through reads
/// unwrapped and untracked; non-configurable slots refuse deletion.
#[derive(Clone)]
pub struct Property {
    pub value: Value,
    pub writable: bool,
    pub configurable: bool,
}

impl Property {
    pub fn new(value: Value) -> Self {
        Property {
            value,
            writable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-configurable: reads pass through raw.
    pub fn frozen(value: Value) -> Self {
        Property {
            value,
            writable: false,
            configurable: false,
        }
    }

    /// Writable but not deletable.
    pub fn sealed(value: Value) -> Self {
        Property {
            value,
            writable: true,
            configurable: false,
        }
    }

    pub fn is_frozen(&self) -> bool {
        !self.writable && !self.configurable
    }
}

/// Insertion-ordered property storage for object targets.
#[derive(Default)]
pub struct ObjectData {
    props: IndexMap<String, Property>,
}

impl ObjectData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.props.insert(key.into(), Property::new(value.into()));
    }

    pub fn insert_property(&mut self, key: impl Into<String>, prop: Property) {
        self.props.insert(key.into(), prop);
    }

    pub fn insert_frozen(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.props.insert(key.into(), Property::frozen(value.into()));
    }

    pub fn insert_sealed(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.props.insert(key.into(), Property::sealed(value.into()));
    }

    /// Install a getter-backed property. Getters have no setter, so writes
    /// to the slot are refused; the slot stays configurable (deletable).
    pub fn insert_getter<F>(&mut self, key: impl Into<String>, body: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.props.insert(
            key.into(),
            Property {
                value: Value::Getter(Arc::new(body)),
                writable: false,
                configurable: true,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&Property> {
        self.props.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Property> {
        self.props.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Property> {
        self.props.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.props.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.props.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Property)> {
        self.props.iter()
    }
}

// ----------------------------------------------------------------------------
// Construction
// ----------------------------------------------------------------------------

impl Value {
    pub fn object(data: ObjectData) -> Value {
        Value::Object(Arc::new(RwLock::new(data)))
    }

    pub fn empty_object() -> Value {
        Value::object(ObjectData::new())
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn map(entries: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::Map(Arc::new(RwLock::new(entries.into_iter().collect())))
    }

    pub fn function<F>(f: F) -> Value
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Value::Func(Arc::new(f))
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Func(_) => "function",
            Value::Getter(_) => "getter",
            Value::Node(n) => n.target_kind_name(),
        }
    }
}

// ----------------------------------------------------------------------------
// Identity and equality
// ----------------------------------------------------------------------------

impl Value {
    /// Identity comparison: scalars by value, containers by pointer, nodes
    /// by node identity. A node is `same` as the plain container it wraps.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            (Value::Getter(a), Value::Getter(b)) => Arc::ptr_eq(a, b),
            (Value::Node(a), Value::Node(b)) => a.id() == b.id(),
            (Value::Node(n), v) | (v, Value::Node(n)) => n.same_target(v),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

fn deep_eq(a: &Value, b: &Value, depth: usize) -> bool {
    if depth >= MAX_DEPTH {
        return false;
    }
    if a.same(b) {
        return true;
    }

    // Compare through reactive handles against their underlying targets.
    let a = unwrap_node(a);
    let b = unwrap_node(b);

    match (&a, &b) {
        (Value::Object(x), Value::Object(y)) => {
            let xs = snapshot_object(x);
            let ys = snapshot_object(y);
            if xs.len() != ys.len() {
                return false;
            }
            xs.iter().all(|(k, va)| {
                ys.iter()
                    .find(|(k2, _)| k2 == k)
                    .is_some_and(|(_, vb)| deep_eq(va, vb, depth + 1))
            })
        }
        (Value::Array(x), Value::Array(y)) => {
            let xs = x.read().expect("array lock poisoned").clone();
            let ys = y.read().expect("array lock poisoned").clone();
            xs.len() == ys.len()
                && xs.iter().zip(ys.iter()).all(|(va, vb)| deep_eq(va, vb, depth + 1))
        }
        (Value::Map(x), Value::Map(y)) => {
            let xs: Vec<(String, Value)> = {
                let guard = x.read().expect("map lock poisoned");
                guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            };
            let ys: Vec<(String, Value)> = {
                let guard = y.read().expect("map lock poisoned");
                guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            };
            if xs.len() != ys.len() {
                return false;
            }
            xs.iter().all(|(k, va)| {
                ys.iter()
                    .find(|(k2, _)| k2 == k)
                    .is_some_and(|(_, vb)| deep_eq(va, vb, depth + 1))
            })
        }
        _ => a.same(&b),
    }
}

fn unwrap_node(v: &Value) -> Value {
    match v {
        Value::Node(n) => n.target_value(),
        other => other.clone(),
    }
}

fn snapshot_object(obj: &ObjectRef) -> Vec<(String, Value)> {
    let guard = obj.read().expect("object lock poisoned");
    guard
        .iter()
        .map(|(k, p)| (k.clone(), p.value.clone()))
        .collect()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        deep_eq(self, other, 0)
    }
}

// ----------------------------------------------------------------------------
// Container operations
// ----------------------------------------------------------------------------
//
// Each operation dispatches on the receiver: reactive nodes go through the
// tracked, event-emitting paths; plain containers are touched directly.

impl Value {
    /// Read a property/entry. Returns `Value::Null` for missing keys and
    /// non-container receivers.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Node(n) => n.get(key),
            Value::Object(o) => {
                let prop = {
                    let guard = o.read().expect("object lock poisoned");
                    guard.get(key).map(|p| p.value.clone())
                };
                match prop {
                    Some(Value::Getter(f)) => f(),
                    Some(v) => v,
                    None => Value::Null,
                }
            }
            Value::Map(m) => m
                .read()
                .expect("map lock poisoned")
                .get(key)
                .cloned()
                .unwrap_or(Value::Null),
            Value::Array(a) => {
                if key == "length" {
                    Value::Int(a.read().expect("array lock poisoned").len() as i64)
                } else if let Ok(i) = key.parse::<usize>() {
                    a.read()
                        .expect("array lock poisoned")
                        .get(i)
                        .cloned()
                        .unwrap_or(Value::Null)
                } else {
                    Value::Null
                }
            }
            _ => Value::Null,
        }
    }

    /// Write a property/entry. Returns `false` when the write is refused
    /// (frozen slot with a differing value, getter slot, wrong receiver
    /// kind); a write of an identical value succeeds without any effect.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        match self {
            Value::Node(n) => n.set(key, value),
            Value::Object(o) => {
                let mut guard = o.write().expect("object lock poisoned");
                if let Some(p) = guard.get_mut(key) {
                    if matches!(p.value, Value::Getter(_)) {
                        return false;
                    }
                    if !p.writable {
                        // Unchanged writes to read-only slots succeed silently.
                        return p.value.same(&value);
                    }
                    // Write in place; the slot keeps its descriptor bits.
                    p.value = value;
                    return true;
                }
                guard.insert(key, value);
                true
            }
            Value::Map(m) => {
                m.write().expect("map lock poisoned").insert(key.to_string(), value);
                true
            }
            Value::Array(a) => {
                if key == "length" {
                    if let Some(n) = value.as_int() {
                        let mut guard = a.write().expect("array lock poisoned");
                        guard.resize(n.max(0) as usize, Value::Null);
                        return true;
                    }
                    false
                } else if let Ok(i) = key.parse::<usize>() {
                    let mut guard = a.write().expect("array lock poisoned");
                    if i >= guard.len() {
                        guard.resize(i + 1, Value::Null);
                    }
                    guard[i] = value;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Remove a property/entry. Deleting a missing key succeeds; deleting a
    /// non-configurable slot is refused.
    pub fn delete(&self, key: &str) -> bool {
        match self {
            Value::Node(n) => n.delete(key),
            Value::Object(o) => {
                let mut guard = o.write().expect("object lock poisoned");
                if let Some(p) = guard.get(key) {
                    if !p.configurable {
                        return false;
                    }
                }
                guard.remove(key);
                true
            }
            Value::Map(m) => {
                m.write().expect("map lock poisoned").shift_remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        match self {
            Value::Node(n) => n.has(key),
            Value::Object(o) => o.read().expect("object lock poisoned").contains_key(key),
            Value::Map(m) => m.read().expect("map lock poisoned").contains_key(key),
            Value::Array(a) => key
                .parse::<usize>()
                .map(|i| i < a.read().expect("array lock poisoned").len())
                .unwrap_or(key == "length"),
            _ => false,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Node(n) => n.keys(),
            Value::Object(o) => o.read().expect("object lock poisoned").keys(),
            Value::Map(m) => m.read().expect("map lock poisoned").keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Element/entry/property count.
    pub fn len(&self) -> usize {
        match self {
            Value::Node(n) => n.len(),
            Value::Object(o) => o.read().expect("object lock poisoned").len(),
            Value::Array(a) => a.read().expect("array lock poisoned").len(),
            Value::Map(m) => m.read().expect("map lock poisoned").len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_index(&self, index: usize) -> Value {
        match self {
            Value::Node(n) => n.get_index(index),
            Value::Array(a) => a
                .read()
                .expect("array lock poisoned")
                .get(index)
                .cloned()
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    pub fn set_index(&self, index: usize, value: impl Into<Value>) -> bool {
        let value = value.into();
        match self {
            Value::Node(n) => n.set_index(index, value),
            Value::Array(a) => {
                let mut guard = a.write().expect("array lock poisoned");
                if index >= guard.len() {
                    guard.resize(index + 1, Value::Null);
                }
                guard[index] = value;
                true
            }
            _ => false,
        }
    }

    pub fn set_len(&self, new_len: usize) -> bool {
        match self {
            Value::Node(n) => n.set_len(new_len),
            Value::Array(a) => {
                a.write()
                    .expect("array lock poisoned")
                    .resize(new_len, Value::Null);
                true
            }
            _ => false,
        }
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<usize, Error> {
        let value = value.into();
        match self {
            Value::Node(n) => n.push(value),
            Value::Array(a) => {
                let mut guard = a.write().expect("array lock poisoned");
                guard.push(value);
                Ok(guard.len())
            }
            other => Err(kind_mismatch("push", "array", other)),
        }
    }

    pub fn pop(&self) -> Result<Value, Error> {
        match self {
            Value::Node(n) => n.pop(),
            Value::Array(a) => Ok(a
                .write()
                .expect("array lock poisoned")
                .pop()
                .unwrap_or(Value::Null)),
            other => Err(kind_mismatch("pop", "array", other)),
        }
    }

    pub fn shift(&self) -> Result<Value, Error> {
        match self {
            Value::Node(n) => n.shift(),
            Value::Array(a) => {
                let mut guard = a.write().expect("array lock poisoned");
                if guard.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(guard.remove(0))
                }
            }
            other => Err(kind_mismatch("shift", "array", other)),
        }
    }

    pub fn unshift(&self, values: Vec<Value>) -> Result<usize, Error> {
        match self {
            Value::Node(n) => n.unshift(values),
            Value::Array(a) => {
                let mut guard = a.write().expect("array lock poisoned");
                guard.splice(0..0, values);
                Ok(guard.len())
            }
            other => Err(kind_mismatch("unshift", "array", other)),
        }
    }

    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>, Error> {
        match self {
            Value::Node(n) => n.splice(start, delete_count, items),
            Value::Array(a) => {
                let mut guard = a.write().expect("array lock poisoned");
                let len = guard.len();
                let start = start.min(len);
                let end = (start + delete_count).min(len);
                Ok(guard.splice(start..end, items).collect())
            }
            other => Err(kind_mismatch("splice", "array", other)),
        }
    }

    pub fn reverse(&self) -> Result<(), Error> {
        match self {
            Value::Node(n) => n.reverse(),
            Value::Array(a) => {
                a.write().expect("array lock poisoned").reverse();
                Ok(())
            }
            other => Err(kind_mismatch("reverse", "array", other)),
        }
    }

    pub fn sort_by<F>(&self, cmp: F) -> Result<(), Error>
    where
        F: FnMut(&Value, &Value) -> CmpOrdering,
    {
        match self {
            Value::Node(n) => n.sort_by(cmp),
            Value::Array(a) => {
                // Sort a snapshot so the comparator can read the array.
                let mut vals = a.read().expect("array lock poisoned").clone();
                let mut cmp = cmp;
                vals.sort_by(|x, y| cmp(x, y));
                *a.write().expect("array lock poisoned") = vals;
                Ok(())
            }
            other => Err(kind_mismatch("sort_by", "array", other)),
        }
    }

    /// Remove every entry of a map target.
    pub fn clear(&self) -> Result<(), Error> {
        match self {
            Value::Node(n) => n.clear(),
            Value::Map(m) => {
                m.write().expect("map lock poisoned").clear();
                Ok(())
            }
            other => Err(kind_mismatch("clear", "map", other)),
        }
    }

    /// Snapshot of the element values (array), entry values (map), or
    /// property values (object), in order.
    pub fn iter_values(&self) -> Vec<Value> {
        match self {
            Value::Node(n) => n.iter_values(),
            Value::Array(a) => a.read().expect("array lock poisoned").clone(),
            Value::Map(m) => m.read().expect("map lock poisoned").values().cloned().collect(),
            Value::Object(o) => {
                let guard = o.read().expect("object lock poisoned");
                guard.iter().map(|(_, p)| p.value.clone()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Invoke a function value.
    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        match self {
            Value::Node(n) => n.call(args),
            Value::Func(f) => Ok(f(args)),
            other => Err(Error::NotCallable(other.kind_name())),
        }
    }
}

fn kind_mismatch(op: &'static str, expected: &'static str, found: &Value) -> Error {
    Error::KindMismatch {
        op,
        expected,
        found: found.kind_name(),
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::array(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => {
                let mut data = ObjectData::new();
                for (k, v) in entries {
                    data.insert(k, Value::from(v));
                }
                Value::object(data)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Serialization
// ----------------------------------------------------------------------------

thread_local! {
    static SER_DEPTH: Cell<usize> = Cell::new(0);
}

impl Value {
    /// Deep export to JSON. Functions and getters become null; reactive
    /// handles export their underlying target; cycles are cut at
    /// [`MAX_DEPTH`].
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Func(_) | Value::Getter(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Object(o) => {
                let entries = snapshot_object(o);
                serialize_guarded(serializer, |s| {
                    let mut map = s.serialize_map(Some(entries.len()))?;
                    for (k, v) in &entries {
                        map.serialize_entry(k, v)?;
                    }
                    map.end()
                })
            }
            Value::Array(a) => {
                let items = a.read().expect("array lock poisoned").clone();
                serialize_guarded(serializer, |s| {
                    let mut seq = s.serialize_seq(Some(items.len()))?;
                    for item in &items {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                })
            }
            Value::Map(m) => {
                let entries: Vec<(String, Value)> = {
                    let guard = m.read().expect("map lock poisoned");
                    guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                };
                serialize_guarded(serializer, |s| {
                    let mut map = s.serialize_map(Some(entries.len()))?;
                    for (k, v) in &entries {
                        map.serialize_entry(k, v)?;
                    }
                    map.end()
                })
            }
            Value::Node(n) => n.target_value().serialize(serializer),
        }
    }
}

fn serialize_guarded<S, F>(serializer: S, f: F) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    F: FnOnce(S) -> Result<S::Ok, S::Error>,
{
    let depth = SER_DEPTH.with(|d| {
        let v = d.get();
        d.set(v + 1);
        v
    });
    let out = if depth >= MAX_DEPTH {
        serializer.serialize_unit()
    } else {
        f(serializer)
    };
    SER_DEPTH.with(|d| d.set(d.get() - 1));
    out
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(o) => write!(f, "Object(@{:p})", Arc::as_ptr(o)),
            Value::Array(a) => write!(f, "Array(@{:p})", Arc::as_ptr(a)),
            Value::Map(m) => write!(f, "Map(@{:p})", Arc::as_ptr(m)),
            Value::Func(_) => write!(f, "Func"),
            Value::Getter(_) => write!(f, "Getter"),
            Value::Node(n) => write!(f, "Node(#{})", n.id().raw()),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
