//! Script values
//!
//! Reference types (arrays, objects, functions, elements) are shared through
//! `Arc`; mutable ones sit behind a `parking_lot::Mutex` so that a mounted
//! frame can move between threads.

use crate::env::Env;
use crate::exception::ScriptResult;
use crate::interpreter::Interpreter;
use parking_lot::Mutex;
use sandbox_script::ast::FunctionDef;
use std::fmt;
use std::sync::Arc;

/// Longest string a script may build, in bytes
pub const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

/// Longest array a script may build
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

pub type ObjectRef = Arc<Mutex<Object>>;
pub type ArrayRef = Arc<Mutex<Vec<Value>>>;

/// Signature of a function implemented in Rust
pub type NativeFn = Arc<dyn Fn(&mut Interpreter, &[Value]) -> ScriptResult<Value> + Send + Sync>;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Arc<Function>),
    Element(Arc<Element>),
}

/// Plain object with insertion-ordered properties
#[derive(Default)]
pub struct Object {
    props: Vec<(String, Value)>,
    frozen: bool,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_props(props: Vec<(String, Value)>) -> Self {
        let mut object = Self::new();
        for (key, value) in props {
            object.set(key, value);
        }
        object
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.props.iter().any(|(k, _)| k == key)
    }

    /// Set a property; writes to a frozen object are ignored
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> bool {
        if self.frozen {
            return false;
        }
        let key = key.into();
        match self.props.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.props.push((key, value)),
        }
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if self.frozen {
            return None;
        }
        let index = self.props.iter().position(|(k, _)| k == key)?;
        Some(self.props.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.props.iter().map(|(k, _)| k.as_str())
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.props
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Drop every property, even on frozen objects
    pub(crate) fn clear(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.props)
    }
}

pub enum Function {
    Closure(Closure),
    Native(NativeFunction),
}

pub struct Closure {
    pub def: Arc<FunctionDef>,
    pub env: Arc<Env>,
    /// Declared name, or the name inferred from `const Name = () => ...`
    pub name: String,
}

pub struct NativeFunction {
    pub name: String,
    pub call: NativeFn,
}

impl Function {
    pub fn native<F>(name: impl Into<String>, call: F) -> Arc<Function>
    where
        F: Fn(&mut Interpreter, &[Value]) -> ScriptResult<Value> + Send + Sync + 'static,
    {
        Arc::new(Function::Native(NativeFunction {
            name: name.into(),
            call: Arc::new(call),
        }))
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Closure(closure) => &closure.name,
            Function::Native(native) => &native.name,
        }
    }

    /// Name for stack frames and component labels
    pub fn display_name(&self) -> &str {
        match self.name() {
            "" => "<anonymous>",
            name => name,
        }
    }
}

/// A description of UI produced by JSX or `React.createElement`
pub struct Element {
    pub kind: ElementKind,
    pub props: ObjectRef,
    pub key: Option<String>,
}

#[derive(Clone)]
pub enum ElementKind {
    /// Lower-case tag rendered as a DOM element
    Host(String),
    Component(Arc<Function>),
    Fragment,
}

impl Element {
    pub fn new(kind: ElementKind, props: Object, key: Option<String>) -> Self {
        Self {
            kind,
            props: Arc::new(Mutex::new(props)),
            key,
        }
    }

    pub fn prop(&self, name: &str) -> Option<Value> {
        self.props.lock().get(name)
    }

    pub fn type_name(&self) -> String {
        match &self.kind {
            ElementKind::Host(tag) => tag.clone(),
            ElementKind::Component(func) => func.display_name().to_string(),
            ElementKind::Fragment => "Fragment".to_string(),
        }
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn object(object: Object) -> Value {
        Value::Object(Arc::new(Mutex::new(object)))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(Mutex::new(items)))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Array(_) | Value::Object(_) | Value::Element(_) => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_function(&self) -> Option<&Arc<Function>> {
        match self {
            Value::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(items) => {
                let items = items.lock();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// String conversion as performed by `String(value)` and template literals
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .lock()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) | Value::Element(_) => "[object Object]".to_string(),
            Value::Function(func) => format!("function {}() {{ [code] }}", func.name()),
        }
    }

    /// Property key form of a value used in `obj[key]`
    pub fn to_property_key(&self) -> String {
        self.to_js_string()
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => self.same_reference(other),
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                let (a, b) = (self.to_number(), other.to_number());
                a == b
            }
            _ => self.strict_equals(other),
        }
    }

    /// `Object.is`, used for hook dependency and state comparisons
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b && a.is_sign_negative() == b.is_sign_negative()
                }
            }
            _ => self.strict_equals(other),
        }
    }

    fn same_reference(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Element(a), Value::Element(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.starts_with("0x") || trimmed.starts_with("0X") => {
            i64::from_str_radix(&trimmed[2..], 16)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN)
        }
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => {
            f64::NAN
        }
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Format a number the way JavaScript's `Number.prototype.toString` does
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        return format!("{:.0}", n);
    }
    let abs = n.abs();
    if !(1e-7..1e21).contains(&abs) {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        };
    }
    format!("{}", n)
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", inspect(self))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Arc<Function>> for Value {
    fn from(func: Arc<Function>) -> Self {
        Value::Function(func)
    }
}

/// Developer-facing rendering used by `console.log` and debug output
pub fn inspect(value: &Value) -> String {
    let mut out = String::new();
    inspect_into(value, 0, true, &mut out);
    out
}

fn inspect_into(value: &Value, depth: usize, top: bool, out: &mut String) {
    match value {
        Value::String(s) if top => out.push_str(s),
        Value::String(s) => {
            out.push('\'');
            out.push_str(s);
            out.push('\'');
        }
        Value::Array(_) | Value::Object(_) if depth > 2 => out.push_str("[...]"),
        Value::Array(items) => {
            let items: Vec<Value> = items.lock().clone();
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push_str("[ ");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                inspect_into(item, depth + 1, false, out);
            }
            out.push_str(" ]");
        }
        Value::Object(object) => {
            let entries: Vec<(String, Value)> = object.lock().entries().to_vec();
            if entries.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{ ");
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(": ");
                inspect_into(item, depth + 1, false, out);
            }
            out.push_str(" }");
        }
        Value::Function(func) => {
            out.push_str("[Function: ");
            out.push_str(func.display_name());
            out.push(']');
        }
        Value::Element(element) => {
            out.push('<');
            out.push_str(&element.type_name());
            out.push_str(" />");
        }
        other => out.push_str(&other.to_js_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(1e21), "1e+21");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("0").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
    }

    #[test]
    fn test_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::string("1").loose_equals(&Value::Number(1.0)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
        assert!(!Value::Number(0.0).same_value(&Value::Number(-0.0)));

        let a = Value::array(vec![]);
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&Value::array(vec![])));
    }

    #[test]
    fn test_string_conversion() {
        let items = Value::array(vec![Value::Number(1.0), Value::Null, Value::string("x")]);
        assert_eq!(items.to_js_string(), "1,,x");
        assert_eq!(Value::string(" 12 ").to_number(), 12.0);
        assert!(Value::string("12px").to_number().is_nan());
    }

    #[test]
    fn test_frozen_object_ignores_writes() {
        let mut object = Object::with_props(vec![("a".to_string(), Value::Number(1.0))]);
        object.freeze();
        assert!(!object.set("a", Value::Number(2.0)));
        assert_eq!(object.get("a"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_inspect() {
        let object = Value::object(Object::with_props(vec![
            ("name".to_string(), Value::string("nav")),
            ("tags".to_string(), Value::array(vec![Value::Number(1.0)])),
        ]));
        assert_eq!(inspect(&object), "{ name: 'nav', tags: [ 1 ] }");
    }
}
