//! Script globals and the methods of built-in values
//!
//! Methods are looked up on demand and returned as natives bound to their
//! receiver, so `items.map` is a plain function value.

use crate::exception::{ErrorKind, ScriptResult};
use crate::interpreter::Interpreter;
use crate::value::{
    format_number, inspect, ArrayRef, Function, Object, ObjectRef, Value, MAX_ARRAY_LENGTH, MAX_STRING_LENGTH,
};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn native<F>(name: &str, call: F) -> Value
where
    F: Fn(&mut Interpreter, &[Value]) -> ScriptResult<Value> + Send + Sync + 'static,
{
    Value::Function(Function::native(name, call))
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// Rendering of a value inside an error message
pub(crate) fn describe_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        other => inspect(other),
    }
}

/// Resolve a possibly negative position argument against `len`
fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
    match value {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = value.to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
    }
}

/// Globals every standard scope exposes, in scope order
pub fn globals() -> Vec<(String, Value)> {
    vec![
        ("console".to_string(), console()),
        ("Math".to_string(), math()),
        ("JSON".to_string(), json()),
        ("Object".to_string(), object_namespace()),
        ("Array".to_string(), array_namespace()),
        (
            "String".to_string(),
            native("String", |_, args| {
                Ok(Value::String(args.first().map(Value::to_js_string).unwrap_or_default()))
            }),
        ),
        (
            "Number".to_string(),
            native("Number", |_, args| {
                Ok(Value::Number(args.first().map(Value::to_number).unwrap_or(0.0)))
            }),
        ),
        (
            "Boolean".to_string(),
            native("Boolean", |_, args| Ok(Value::Bool(arg(args, 0).is_truthy()))),
        ),
        ("parseInt".to_string(), native("parseInt", |_, args| Ok(parse_int(args)))),
        ("parseFloat".to_string(), native("parseFloat", |_, args| Ok(parse_float(args)))),
        (
            "isNaN".to_string(),
            native("isNaN", |_, args| Ok(Value::Bool(arg(args, 0).to_number().is_nan()))),
        ),
        ("Error".to_string(), error_constructor(ErrorKind::Error)),
        ("TypeError".to_string(), error_constructor(ErrorKind::TypeError)),
        ("RangeError".to_string(), error_constructor(ErrorKind::RangeError)),
        ("ReferenceError".to_string(), error_constructor(ErrorKind::ReferenceError)),
        ("SyntaxError".to_string(), error_constructor(ErrorKind::SyntaxError)),
    ]
}

fn frozen(props: Vec<(&str, Value)>) -> Value {
    let mut object = Object::with_props(props.into_iter().map(|(k, v)| (k.to_string(), v)).collect());
    object.freeze();
    Value::object(object)
}

// ---- errors ----

fn error_constructor(kind: ErrorKind) -> Value {
    native(kind.name(), move |interp, args| {
        let message = match args.first() {
            None | Some(Value::Undefined) => String::new(),
            Some(value) => value.to_js_string(),
        };
        let header = if message.is_empty() {
            kind.name().to_string()
        } else {
            format!("{}: {}", kind.name(), message)
        };
        let stack = interp.stack_trace(&header);
        Ok(interp.alloc_object(Object::with_props(vec![
            ("name".to_string(), Value::string(kind.name())),
            ("message".to_string(), Value::String(message)),
            ("stack".to_string(), Value::String(stack)),
        ])))
    })
}

// ---- console ----

fn console_line(args: &[Value]) -> String {
    args.iter().map(inspect).collect::<Vec<_>>().join(" ")
}

fn console() -> Value {
    frozen(vec![
        (
            "log",
            native("log", |_, args| {
                tracing::info!(target: "sandbox::console", "{}", console_line(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "info",
            native("info", |_, args| {
                tracing::info!(target: "sandbox::console", "{}", console_line(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "debug",
            native("debug", |_, args| {
                tracing::debug!(target: "sandbox::console", "{}", console_line(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "warn",
            native("warn", |_, args| {
                tracing::warn!(target: "sandbox::console", "{}", console_line(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "error",
            native("error", |_, args| {
                tracing::error!(target: "sandbox::console", "{}", console_line(args));
                Ok(Value::Undefined)
            }),
        ),
    ])
}

// ---- Math ----

static RANDOM_STATE: AtomicU64 = AtomicU64::new(0);

fn next_random() -> f64 {
    let mut state = RANDOM_STATE.load(AtomicOrdering::Relaxed);
    if state == 0 {
        state = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x2545_f491_4f6c_dd1d)
            | 1;
    }
    // xorshift64*
    state ^= state >> 12;
    state ^= state << 25;
    state ^= state >> 27;
    RANDOM_STATE.store(state, AtomicOrdering::Relaxed);
    let bits = state.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 11;
    bits as f64 / (1u64 << 53) as f64
}

fn math_fn(name: &str, f: fn(f64) -> f64) -> (&str, Value) {
    (name, native(name, move |_, args| Ok(Value::Number(f(arg(args, 0).to_number())))))
}

fn math() -> Value {
    frozen(vec![
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        math_fn("floor", f64::floor),
        math_fn("ceil", f64::ceil),
        math_fn("round", |n| (n + 0.5).floor()),
        math_fn("abs", f64::abs),
        math_fn("sqrt", f64::sqrt),
        math_fn("trunc", f64::trunc),
        math_fn("sign", |n| if n.is_nan() || n == 0.0 { n } else { n.signum() }),
        (
            "pow",
            native("pow", |_, args| {
                Ok(Value::Number(arg(args, 0).to_number().powf(arg(args, 1).to_number())))
            }),
        ),
        (
            "min",
            native("min", |_, args| {
                Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::INFINITY, |acc, n| {
                    if acc.is_nan() || n.is_nan() {
                        f64::NAN
                    } else {
                        acc.min(n)
                    }
                })))
            }),
        ),
        (
            "max",
            native("max", |_, args| {
                Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |acc, n| {
                    if acc.is_nan() || n.is_nan() {
                        f64::NAN
                    } else {
                        acc.max(n)
                    }
                })))
            }),
        ),
        ("random", native("random", |_, _| Ok(Value::Number(next_random())))),
    ])
}

// ---- JSON ----

fn json() -> Value {
    frozen(vec![
        (
            "stringify",
            native("stringify", |_, args| {
                let Some(json) = to_json(&arg(args, 0)) else {
                    return Ok(Value::Undefined);
                };
                let indent = match args.get(2) {
                    Some(Value::Number(n)) if *n >= 1.0 => " ".repeat((*n as usize).min(10)),
                    Some(Value::String(s)) => s.chars().take(10).collect(),
                    _ => String::new(),
                };
                let text = if indent.is_empty() {
                    serde_json::to_string(&json)
                } else {
                    pretty_json(&json, &indent)
                };
                Ok(text.map(Value::String).unwrap_or(Value::Undefined))
            }),
        ),
        (
            "parse",
            native("parse", |interp, args| {
                let text = arg(args, 0).to_js_string();
                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(json) => Ok(from_json(interp, json)),
                    Err(_) => Err(interp.error(
                        ErrorKind::SyntaxError,
                        format!("\"{}\" is not valid JSON", text),
                    )),
                }
            }),
        ),
    ])
}

fn pretty_json(json: &serde_json::Value, indent: &str) -> serde_json::Result<String> {
    use serde::Serialize;
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    json.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// JSON form of a value; `None` for values `JSON.stringify` skips
fn to_json(value: &Value) -> Option<serde_json::Value> {
    Some(match value {
        Value::Undefined | Value::Function(_) => return None,
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => json_number(*n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(
            items
                .lock()
                .iter()
                .map(|item| to_json(item).unwrap_or(serde_json::Value::Null))
                .collect(),
        ),
        Value::Object(object) => serde_json::Value::Object(
            object
                .lock()
                .entries()
                .iter()
                .filter_map(|(key, item)| Some((key.clone(), to_json(item)?)))
                .collect(),
        ),
        Value::Element(_) => serde_json::Value::Object(serde_json::Map::new()),
    })
}

fn json_number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn from_json(interp: &mut Interpreter, json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            let items = items.into_iter().map(|item| from_json(interp, item)).collect();
            interp.alloc_array(items)
        }
        serde_json::Value::Object(map) => {
            let props = map
                .into_iter()
                .map(|(key, item)| (key, from_json(interp, item)))
                .collect();
            interp.alloc_object(Object::with_props(props))
        }
    }
}

// ---- Object / Array statics ----

fn object_namespace() -> Value {
    frozen(vec![
        (
            "keys",
            native("keys", |interp, args| {
                let keys = crate::interpreter::own_entries(&arg(args, 0))
                    .into_iter()
                    .map(|(key, _)| Value::String(key))
                    .collect();
                Ok(interp.alloc_array(keys))
            }),
        ),
        (
            "values",
            native("values", |interp, args| {
                let values = crate::interpreter::own_entries(&arg(args, 0))
                    .into_iter()
                    .map(|(_, value)| value)
                    .collect();
                Ok(interp.alloc_array(values))
            }),
        ),
        (
            "entries",
            native("entries", |interp, args| {
                let mut pairs = Vec::new();
                for (key, value) in crate::interpreter::own_entries(&arg(args, 0)) {
                    pairs.push(interp.alloc_array(vec![Value::String(key), value]));
                }
                Ok(interp.alloc_array(pairs))
            }),
        ),
        (
            "assign",
            native("assign", |interp, args| {
                let target = arg(args, 0);
                for source in args.iter().skip(1) {
                    for (key, value) in crate::interpreter::own_entries(source) {
                        interp.set_property(&target, key, value)?;
                    }
                }
                Ok(target)
            }),
        ),
        (
            "freeze",
            native("freeze", |_, args| {
                let target = arg(args, 0);
                if let Value::Object(object) = &target {
                    object.lock().freeze();
                }
                Ok(target)
            }),
        ),
        (
            "fromEntries",
            native("fromEntries", |interp, args| {
                let mut object = Object::new();
                for pair in interp.iterate(&arg(args, 0))? {
                    let key = interp.get_property(&pair, "0")?.to_property_key();
                    let value = interp.get_property(&pair, "1")?;
                    object.set(key, value);
                }
                Ok(interp.alloc_object(object))
            }),
        ),
    ])
}

fn array_namespace() -> Value {
    frozen(vec![
        (
            "isArray",
            native("isArray", |_, args| Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))),
        ),
        ("of", native("of", |interp, args| Ok(interp.alloc_array(args.to_vec())))),
        (
            "from",
            native("from", |interp, args| {
                let source = arg(args, 0);
                let items = match &source {
                    Value::Array(_) | Value::String(_) => interp.iterate(&source)?,
                    Value::Object(_) => {
                        let len = interp.get_property(&source, "length")?.to_number();
                        if len > MAX_ARRAY_LENGTH as f64 {
                            return Err(interp.error(ErrorKind::RangeError, "Invalid array length"));
                        }
                        let len = if len > 0.0 { len as usize } else { 0 };
                        let mut items = Vec::with_capacity(len);
                        for i in 0..len {
                            items.push(interp.get_property(&source, &i.to_string())?);
                        }
                        items
                    }
                    _ => Vec::new(),
                };
                let mapper = arg(args, 1);
                let items = if mapper.is_function() {
                    let mut mapped = Vec::with_capacity(items.len());
                    for (i, item) in items.into_iter().enumerate() {
                        mapped.push(interp.call(&mapper, &[item, Value::Number(i as f64)])?);
                    }
                    mapped
                } else {
                    items
                };
                Ok(interp.alloc_array(items))
            }),
        ),
    ])
}

/// Static members reached through a native constructor, e.g. `Number.isInteger`
pub(crate) fn function_static(func: &Function, key: &str) -> Option<Value> {
    let Function::Native(native_fn) = func else {
        return None;
    };
    match (native_fn.name.as_str(), key) {
        ("Number", "isInteger") => Some(native("isInteger", |_, args| {
            Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)))
        })),
        ("Number", "isFinite") => Some(native("isFinite", |_, args| {
            Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite())))
        })),
        ("Number", "parseFloat") => Some(native("parseFloat", |_, args| Ok(parse_float(args)))),
        ("Number", "parseInt") => Some(native("parseInt", |_, args| Ok(parse_int(args)))),
        _ => None,
    }
}

// ---- number parsing ----

fn parse_int(args: &[Value]) -> Value {
    let text = arg(args, 0).to_js_string();
    let mut text = text.trim();
    let negative = text.starts_with('-');
    if negative || text.starts_with('+') {
        text = &text[1..];
    }
    let mut radix = match args.get(1) {
        None | Some(Value::Undefined) => 10,
        Some(value) => value.to_number() as u32,
    };
    if radix == 0 {
        radix = 10;
    }
    if (radix == 16 || args.len() < 2) && (text.starts_with("0x") || text.starts_with("0X")) {
        text = &text[2..];
        radix = 16;
    }
    if !(2..=36).contains(&radix) {
        return Value::Number(f64::NAN);
    }
    let digits: String = text.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return Value::Number(f64::NAN);
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * radix as f64 + d as f64);
    Value::Number(if negative { -value } else { value })
}

fn parse_float(args: &[Value]) -> Value {
    let text = arg(args, 0).to_js_string();
    let text = text.trim_start();
    if text.starts_with("Infinity") || text.starts_with("+Infinity") {
        return Value::Number(f64::INFINITY);
    }
    if text.starts_with("-Infinity") {
        return Value::Number(f64::NEG_INFINITY);
    }
    if !text.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '.' | '-' | '+')) {
        return Value::Number(f64::NAN);
    }
    let end = (1..=text.len())
        .rev()
        .filter(|&end| text.is_char_boundary(end))
        .find(|&end| text[..end].parse::<f64>().is_ok() && !text[..end].ends_with(['e', 'E']))
        .unwrap_or(0);
    Value::Number(text[..end].parse().unwrap_or(f64::NAN))
}

// ---- object methods ----

pub(crate) fn object_method(object: &ObjectRef, key: &str) -> Option<Value> {
    let object = Arc::clone(object);
    match key {
        "hasOwnProperty" => Some(native("hasOwnProperty", move |_, args| {
            Ok(Value::Bool(object.lock().contains(&arg(args, 0).to_property_key())))
        })),
        "toString" => Some(native("toString", |_, _| Ok(Value::string("[object Object]")))),
        _ => None,
    }
}

// ---- array methods ----

fn callback(interp: &mut Interpreter, f: &Value, item: Value, index: usize, array: &ArrayRef) -> ScriptResult<Value> {
    interp.call(
        f,
        &[item, Value::Number(index as f64), Value::Array(Arc::clone(array))],
    )
}

fn default_compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => Ordering::Equal,
        (Value::Undefined, _) => Ordering::Greater,
        (_, Value::Undefined) => Ordering::Less,
        _ => a.to_js_string().cmp(&b.to_js_string()),
    }
}

/// Stable insertion sort tolerating inconsistent comparators
fn sort_values(
    interp: &mut Interpreter,
    items: &mut [Value],
    compare: &Value,
) -> ScriptResult<()> {
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 {
            let ordering = if compare.is_function() {
                let result = interp.call(compare, &[items[j - 1].clone(), items[j].clone()])?;
                let n = result.to_number();
                if n > 0.0 {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            } else {
                default_compare(&items[j - 1], &items[j])
            };
            if ordering != Ordering::Greater {
                break;
            }
            items.swap(j - 1, j);
            j -= 1;
        }
    }
    Ok(())
}

fn flatten_into(items: &[Value], depth: f64, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth >= 1.0 => {
                let inner = inner.lock().clone();
                flatten_into(&inner, depth - 1.0, out);
            }
            other => out.push(other.clone()),
        }
    }
}

pub(crate) fn array_method(items: &ArrayRef, key: &str) -> Option<Value> {
    let array = Arc::clone(items);
    let method = match key {
        "map" => native("map", move |interp, args| {
            let f = arg(args, 0);
            let snapshot = array.lock().clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for (i, item) in snapshot.into_iter().enumerate() {
                out.push(callback(interp, &f, item, i, &array)?);
            }
            Ok(interp.alloc_array(out))
        }),
        "filter" => native("filter", move |interp, args| {
            let f = arg(args, 0);
            let snapshot = array.lock().clone();
            let mut out = Vec::new();
            for (i, item) in snapshot.into_iter().enumerate() {
                if callback(interp, &f, item.clone(), i, &array)?.is_truthy() {
                    out.push(item);
                }
            }
            Ok(interp.alloc_array(out))
        }),
        "forEach" => native("forEach", move |interp, args| {
            let f = arg(args, 0);
            let snapshot = array.lock().clone();
            for (i, item) in snapshot.into_iter().enumerate() {
                callback(interp, &f, item, i, &array)?;
            }
            Ok(Value::Undefined)
        }),
        "reduce" => native("reduce", move |interp, args| {
            let f = arg(args, 0);
            let snapshot = array.lock().clone();
            let mut iter = snapshot.into_iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match iter.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(interp.error(
                            ErrorKind::TypeError,
                            "Reduce of empty array with no initial value",
                        ))
                    }
                },
            };
            for (i, item) in iter {
                acc = interp.call(
                    &f,
                    &[acc, item, Value::Number(i as f64), Value::Array(Arc::clone(&array))],
                )?;
            }
            Ok(acc)
        }),
        "find" | "findIndex" | "some" | "every" => {
            let name = key.to_string();
            native(key, move |interp, args| {
                let f = arg(args, 0);
                let snapshot = array.lock().clone();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let hit = callback(interp, &f, item.clone(), i, &array)?.is_truthy();
                    match (name.as_str(), hit) {
                        ("find", true) => return Ok(item),
                        ("findIndex", true) => return Ok(Value::Number(i as f64)),
                        ("some", true) => return Ok(Value::Bool(true)),
                        ("every", false) => return Ok(Value::Bool(false)),
                        _ => {}
                    }
                }
                Ok(match name.as_str() {
                    "find" => Value::Undefined,
                    "findIndex" => Value::Number(-1.0),
                    "some" => Value::Bool(false),
                    _ => Value::Bool(true),
                })
            })
        }
        "includes" => native("includes", move |_, args| {
            let needle = arg(args, 0);
            // SameValueZero: NaN finds NaN, +0 finds -0
            let found = array
                .lock()
                .iter()
                .any(|item| item.strict_equals(&needle) || item.same_value(&needle));
            Ok(Value::Bool(found))
        }),
        "indexOf" => native("indexOf", move |_, args| {
            let needle = arg(args, 0);
            let index = array.lock().iter().position(|item| item.strict_equals(&needle));
            Ok(Value::Number(index.map(|i| i as f64).unwrap_or(-1.0)))
        }),
        "join" => native("join", move |_, args| {
            let separator = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(value) => value.to_js_string(),
            };
            let joined = array
                .lock()
                .iter()
                .map(|item| if item.is_nullish() { String::new() } else { item.to_js_string() })
                .collect::<Vec<_>>()
                .join(&separator);
            Ok(Value::String(joined))
        }),
        "slice" => native("slice", move |interp, args| {
            let snapshot = array.lock().clone();
            let start = relative_index(args.first(), snapshot.len(), 0);
            let end = relative_index(args.get(1), snapshot.len(), snapshot.len());
            let slice = if start < end { snapshot[start..end].to_vec() } else { Vec::new() };
            Ok(interp.alloc_array(slice))
        }),
        "at" => native("at", move |_, args| {
            let items = array.lock();
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let index = if n < 0.0 { items.len() as f64 + n } else { n };
            if index < 0.0 {
                return Ok(Value::Undefined);
            }
            Ok(items.get(index as usize).cloned().unwrap_or(Value::Undefined))
        }),
        "concat" => native("concat", move |interp, args| {
            let mut out = array.lock().clone();
            for extra in args {
                match extra {
                    Value::Array(more) => out.extend(more.lock().iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(interp.alloc_array(out))
        }),
        "push" => native("push", move |_, args| {
            let mut items = array.lock();
            items.extend(args.iter().cloned());
            Ok(Value::Number(items.len() as f64))
        }),
        "pop" => native("pop", move |_, _| Ok(array.lock().pop().unwrap_or(Value::Undefined))),
        "shift" => native("shift", move |_, _| {
            let mut items = array.lock();
            if items.is_empty() {
                Ok(Value::Undefined)
            } else {
                Ok(items.remove(0))
            }
        }),
        "unshift" => native("unshift", move |_, args| {
            let mut items = array.lock();
            for (i, value) in args.iter().enumerate() {
                items.insert(i, value.clone());
            }
            Ok(Value::Number(items.len() as f64))
        }),
        "reverse" => native("reverse", move |_, _| {
            array.lock().reverse();
            Ok(Value::Array(Arc::clone(&array)))
        }),
        "sort" => native("sort", move |interp, args| {
            let mut snapshot = array.lock().clone();
            sort_values(interp, &mut snapshot, &arg(args, 0))?;
            *array.lock() = snapshot;
            Ok(Value::Array(Arc::clone(&array)))
        }),
        "fill" => native("fill", move |_, args| {
            let mut items = array.lock();
            let len = items.len();
            let start = relative_index(args.get(1), len, 0);
            let end = relative_index(args.get(2), len, len);
            for item in items.iter_mut().take(end).skip(start) {
                *item = arg(args, 0);
            }
            drop(items);
            Ok(Value::Array(Arc::clone(&array)))
        }),
        "flat" => native("flat", move |interp, args| {
            let depth = match args.first() {
                None | Some(Value::Undefined) => 1.0,
                Some(value) => value.to_number(),
            };
            let snapshot = array.lock().clone();
            let mut out = Vec::new();
            flatten_into(&snapshot, depth, &mut out);
            Ok(interp.alloc_array(out))
        }),
        "flatMap" => native("flatMap", move |interp, args| {
            let f = arg(args, 0);
            let snapshot = array.lock().clone();
            let mut mapped = Vec::with_capacity(snapshot.len());
            for (i, item) in snapshot.into_iter().enumerate() {
                mapped.push(callback(interp, &f, item, i, &array)?);
            }
            let mut out = Vec::new();
            flatten_into(&mapped, 1.0, &mut out);
            Ok(interp.alloc_array(out))
        }),
        "toString" => native("toString", move |_, _| Ok(Value::Array(Arc::clone(&array)).to_js_string().into())),
        _ => return None,
    };
    Some(method)
}

// ---- string methods ----

fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

pub(crate) fn string_method(s: &str, key: &str) -> Option<Value> {
    let text = s.to_string();
    let method = match key {
        "toUpperCase" => native("toUpperCase", move |_, _| Ok(Value::String(text.to_uppercase()))),
        "toLowerCase" => native("toLowerCase", move |_, _| Ok(Value::String(text.to_lowercase()))),
        "trim" => native("trim", move |_, _| Ok(Value::string(text.trim()))),
        "trimStart" => native("trimStart", move |_, _| Ok(Value::string(text.trim_start()))),
        "trimEnd" => native("trimEnd", move |_, _| Ok(Value::string(text.trim_end()))),
        "toString" => native("toString", move |_, _| Ok(Value::string(text.as_str()))),
        "split" => native("split", move |interp, args| {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::string(text.as_str())],
                Some(separator) => {
                    let separator = separator.to_js_string();
                    if separator.is_empty() {
                        text.chars().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        text.split(separator.as_str()).map(Value::string).collect()
                    }
                }
            };
            let parts = match args.get(1) {
                Some(Value::Number(limit)) if *limit >= 0.0 => parts.into_iter().take(*limit as usize).collect(),
                _ => parts,
            };
            Ok(interp.alloc_array(parts))
        }),
        "includes" => native("includes", move |_, args| {
            Ok(Value::Bool(text.contains(arg(args, 0).to_js_string().as_str())))
        }),
        "startsWith" => native("startsWith", move |_, args| {
            Ok(Value::Bool(text.starts_with(arg(args, 0).to_js_string().as_str())))
        }),
        "endsWith" => native("endsWith", move |_, args| {
            Ok(Value::Bool(text.ends_with(arg(args, 0).to_js_string().as_str())))
        }),
        "indexOf" => native("indexOf", move |_, args| {
            let needle = arg(args, 0).to_js_string();
            let index = text
                .find(needle.as_str())
                .map(|byte| text[..byte].chars().count() as f64)
                .unwrap_or(-1.0);
            Ok(Value::Number(index))
        }),
        "slice" => native("slice", move |_, args| {
            let len = text.chars().count();
            let start = relative_index(args.first(), len, 0);
            let end = relative_index(args.get(1), len, len);
            Ok(Value::String(char_slice(&text, start, end)))
        }),
        "substring" => native("substring", move |_, args| {
            let len = text.chars().count();
            let clamp = |value: Option<&Value>, default: usize| match value {
                None | Some(Value::Undefined) => default,
                Some(v) => {
                    let n = v.to_number();
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        (n as usize).min(len)
                    }
                }
            };
            let (a, b) = (clamp(args.first(), 0), clamp(args.get(1), len));
            Ok(Value::String(char_slice(&text, a.min(b), a.max(b))))
        }),
        "charAt" => native("charAt", move |_, args| {
            let index = arg(args, 0).to_number();
            let index = if index.is_nan() { 0 } else { index as usize };
            Ok(Value::String(text.chars().nth(index).map(String::from).unwrap_or_default()))
        }),
        "at" => native("at", move |_, args| {
            let len = text.chars().count() as f64;
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let index = if n < 0.0 { len + n } else { n };
            if index < 0.0 {
                return Ok(Value::Undefined);
            }
            Ok(text
                .chars()
                .nth(index as usize)
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Undefined))
        }),
        "replace" | "replaceAll" => {
            let all = key == "replaceAll";
            native(key, move |interp, args| {
                let pattern = arg(args, 0).to_js_string();
                let replacement = arg(args, 1);
                let mut out = String::new();
                let mut rest = text.as_str();
                while let Some(pos) = rest.find(pattern.as_str()) {
                    out.push_str(&rest[..pos]);
                    let substitute = if replacement.is_function() {
                        interp.call(&replacement, &[Value::string(pattern.as_str())])?.to_js_string()
                    } else {
                        replacement.to_js_string()
                    };
                    out.push_str(&substitute);
                    rest = &rest[pos + pattern.len()..];
                    if !all || pattern.is_empty() {
                        break;
                    }
                }
                out.push_str(rest);
                Ok(Value::String(out))
            })
        }
        "repeat" => native("repeat", move |interp, args| {
            let count = arg(args, 0).to_number();
            if count < 0.0 || count.is_infinite() {
                return Err(interp.error(ErrorKind::RangeError, format!("Invalid count value: {}", format_number(count))));
            }
            let count = if count.is_nan() { 0 } else { count as usize };
            if count > 0 && text.len() > MAX_STRING_LENGTH / count {
                return Err(interp.error(ErrorKind::RangeError, "Invalid string length"));
            }
            Ok(Value::String(text.repeat(count)))
        }),
        "padStart" | "padEnd" => {
            let at_start = key == "padStart";
            native(key, move |interp, args| {
                let target = arg(args, 0).to_number();
                if target > MAX_STRING_LENGTH as f64 {
                    return Err(interp.error(ErrorKind::RangeError, "Invalid string length"));
                }
                let target = if target.is_nan() { 0 } else { target as usize };
                let filler = match args.get(1) {
                    None | Some(Value::Undefined) => " ".to_string(),
                    Some(value) => value.to_js_string(),
                };
                let len = text.chars().count();
                if target <= len || filler.is_empty() {
                    return Ok(Value::string(text.as_str()));
                }
                let padding: String = filler.chars().cycle().take(target - len).collect();
                Ok(Value::String(if at_start {
                    format!("{}{}", padding, text)
                } else {
                    format!("{}{}", text, padding)
                }))
            })
        }
        "concat" => native("concat", move |interp, args| {
            let mut out = text.clone();
            for extra in args {
                let extra = extra.to_js_string();
                if out.len() + extra.len() > MAX_STRING_LENGTH {
                    return Err(interp.error(ErrorKind::RangeError, "Invalid string length"));
                }
                out.push_str(&extra);
            }
            Ok(Value::String(out))
        }),
        _ => return None,
    };
    Some(method)
}

// ---- number methods ----

fn group_thousands(n: f64) -> String {
    let rounded = format!("{:.3}", n);
    let rounded = rounded.trim_end_matches('0').trim_end_matches('.');
    let (sign, digits) = match rounded.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rounded),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (digits, None),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

pub(crate) fn number_method(n: f64, key: &str) -> Option<Value> {
    let method = match key {
        "toFixed" => native("toFixed", move |interp, args| {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0.0 } else { digits };
            if !(0.0..=100.0).contains(&digits) {
                return Err(interp.error(ErrorKind::RangeError, "toFixed() digits argument must be between 0 and 100"));
            }
            if !n.is_finite() {
                return Ok(Value::String(format_number(n)));
            }
            Ok(Value::String(format!("{:.*}", digits as usize, n)))
        }),
        "toString" => native("toString", move |interp, args| {
            let radix = match args.first() {
                None | Some(Value::Undefined) => 10,
                Some(value) => value.to_number() as u32,
            };
            if !(2..=36).contains(&radix) {
                return Err(interp.error(ErrorKind::RangeError, "toString() radix must be between 2 and 36"));
            }
            if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
                return Ok(Value::String(format_number(n)));
            }
            let mut value = n.abs() as u64;
            let mut digits = Vec::new();
            loop {
                let digit = (value % radix as u64) as u32;
                digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
                value /= radix as u64;
                if value == 0 {
                    break;
                }
            }
            if n < 0.0 {
                digits.push('-');
            }
            Ok(Value::String(digits.into_iter().rev().collect()))
        }),
        "toLocaleString" => native("toLocaleString", move |_, _| {
            if !n.is_finite() {
                return Ok(Value::String(format_number(n)));
            }
            Ok(Value::String(group_thousands(n)))
        }),
        _ => return None,
    };
    Some(method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::RuntimeLimits;

    fn call_global(name: &str, args: &[Value]) -> Value {
        let (_, func) = globals().into_iter().find(|(n, _)| n == name).unwrap();
        let mut interp = Interpreter::new(RuntimeLimits::default());
        interp.call(&func, args).unwrap()
    }

    fn member(namespace: &str, key: &str) -> Value {
        let (_, value) = globals().into_iter().find(|(n, _)| n == namespace).unwrap();
        match value {
            Value::Object(object) => object.lock().get(key).unwrap(),
            other => panic!("Expected namespace object, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_int_and_float() {
        assert_eq!(call_global("parseInt", &[Value::string("42px")]), Value::Number(42.0));
        assert_eq!(call_global("parseInt", &[Value::string("-0x1f")]), Value::Number(-31.0));
        assert_eq!(
            call_global("parseInt", &[Value::string("101"), Value::Number(2.0)]),
            Value::Number(5.0)
        );
        assert!(call_global("parseInt", &[Value::string("px")]).to_number().is_nan());
        assert_eq!(call_global("parseFloat", &[Value::string("3.5em")]), Value::Number(3.5));
        assert_eq!(call_global("parseFloat", &[Value::string("1e3")]), Value::Number(1000.0));
    }

    #[test]
    fn test_json_stringify() {
        let stringify = member("JSON", "stringify");
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let value = Value::object(Object::with_props(vec![
            ("a".to_string(), Value::Number(1.0)),
            ("b".to_string(), Value::array(vec![Value::Bool(true), Value::Undefined])),
            ("skip".to_string(), Value::Undefined),
        ]));
        let text = interp.call(&stringify, &[value]).unwrap();
        assert_eq!(text, Value::string(r#"{"a":1,"b":[true,null]}"#));
    }

    #[test]
    fn test_json_parse_invalid() {
        let parse = member("JSON", "parse");
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let err = interp.call(&parse, &[Value::string("{oops")]).unwrap_err();
        assert_eq!(err.name, "SyntaxError");
    }

    #[test]
    fn test_error_constructor_builds_error_object() {
        let error = call_global("TypeError", &[Value::string("bad")]);
        let Value::Object(object) = error else {
            panic!("Expected object");
        };
        let object = object.lock();
        assert_eq!(object.get("name"), Some(Value::string("TypeError")));
        assert_eq!(object.get("message"), Some(Value::string("bad")));
        assert_eq!(object.get("stack"), Some(Value::string("TypeError: bad")));
    }

    #[test]
    fn test_number_methods() {
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let fixed = number_method(3.14159, "toFixed").unwrap();
        assert_eq!(interp.call(&fixed, &[Value::Number(2.0)]).unwrap(), Value::string("3.14"));
        let hex = number_method(255.0, "toString").unwrap();
        assert_eq!(interp.call(&hex, &[Value::Number(16.0)]).unwrap(), Value::string("ff"));
        assert_eq!(group_thousands(1234567.5), "1,234,567.5");
    }

    #[test]
    fn test_string_methods() {
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let replace = string_method("a-b-c", "replaceAll").unwrap();
        assert_eq!(
            interp.call(&replace, &[Value::string("-"), Value::string("+")]).unwrap(),
            Value::string("a+b+c")
        );
        let pad = string_method("7", "padStart").unwrap();
        assert_eq!(
            interp.call(&pad, &[Value::Number(3.0), Value::string("0")]).unwrap(),
            Value::string("007")
        );
        let slice = string_method("sandbox", "slice").unwrap();
        assert_eq!(interp.call(&slice, &[Value::Number(-3.0)]).unwrap(), Value::string("box"));
    }

    #[test]
    fn test_sort_default_and_comparator() {
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let mut items = vec![Value::Number(10.0), Value::Number(9.0), Value::Number(1.0)];
        sort_values(&mut interp, &mut items, &Value::Undefined).unwrap();
        assert_eq!(items, vec![Value::Number(1.0), Value::Number(10.0), Value::Number(9.0)]);

        let descending = native("desc", |_, args| {
            Ok(Value::Number(arg(args, 1).to_number() - arg(args, 0).to_number()))
        });
        sort_values(&mut interp, &mut items, &descending).unwrap();
        assert_eq!(items, vec![Value::Number(10.0), Value::Number(9.0), Value::Number(1.0)]);
    }
}
