//! Thrown script errors

use crate::value::{Object, Value};
use sandbox_types::Failure;
use std::any::Any;
use std::fmt;

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Built-in error constructors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    ReferenceError,
    RangeError,
    SyntaxError,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SyntaxError => "SyntaxError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Error" => ErrorKind::Error,
            "TypeError" => ErrorKind::TypeError,
            "ReferenceError" => ErrorKind::ReferenceError,
            "RangeError" => ErrorKind::RangeError,
            "SyntaxError" => ErrorKind::SyntaxError,
            _ => return None,
        })
    }
}

/// An error propagating out of script code
///
/// Either raised by the interpreter itself (`name` is one of the
/// [`ErrorKind`] names) or produced by a `throw` statement, in which case the
/// thrown value is kept.
#[derive(Clone)]
pub struct Exception {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub thrown: Option<Value>,
}

pub type ScriptResult<T> = Result<T, Exception>;

impl Exception {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            name: kind.name().to_string(),
            message: message.into(),
            stack: None,
            thrown: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Wrap a value passed to `throw`
    ///
    /// Error objects contribute their `name`, `message` and `stack`; any other
    /// value becomes the message through string conversion.
    pub fn thrown(value: Value) -> Self {
        if let Value::Object(object) = &value {
            let object = object.lock();
            if let Some(message) = object.get("message") {
                let name = object
                    .get("name")
                    .map(|n| n.to_js_string())
                    .unwrap_or_else(|| "Error".to_string());
                let stack = object.get("stack").and_then(|s| match s {
                    Value::String(s) => Some(s),
                    _ => None,
                });
                return Self {
                    name,
                    message: message.to_js_string(),
                    stack,
                    thrown: Some(value.clone()),
                };
            }
        }
        Self {
            name: "Uncaught".to_string(),
            message: value.to_js_string(),
            stack: None,
            thrown: Some(value),
        }
    }

    /// Error object exposing `name`, `message` and `stack` to scripts
    pub fn to_value(&self) -> Value {
        if let Some(value) = &self.thrown {
            return value.clone();
        }
        let mut props = vec![
            ("name".to_string(), Value::string(&self.name)),
            ("message".to_string(), Value::string(&self.message)),
        ];
        if let Some(stack) = &self.stack {
            props.push(("stack".to_string(), Value::string(stack)));
        }
        Value::object(Object::with_props(props))
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("name", &self.name)
            .field("message", &self.message)
            .field("stack", &self.stack)
            .finish()
    }
}

impl From<Exception> for Failure {
    fn from(exception: Exception) -> Self {
        Failure {
            message: exception.message,
            stack: exception.stack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thrown_error_object() {
        let value = Value::object(Object::with_props(vec![
            ("name".to_string(), Value::string("TypeError")),
            ("message".to_string(), Value::string("bad input")),
        ]));
        let exception = Exception::thrown(value);
        assert_eq!(exception.name, "TypeError");
        assert_eq!(exception.message, "bad input");
        assert_eq!(exception.to_string(), "TypeError: bad input");
    }

    #[test]
    fn test_thrown_primitive() {
        let exception = Exception::thrown(Value::string("boom"));
        assert_eq!(exception.message, "boom");
        assert!(exception.stack.is_none());
    }

    #[test]
    fn test_into_failure() {
        let failure: Failure = Exception::new(ErrorKind::ReferenceError, "App is not defined")
            .with_stack("ReferenceError: App is not defined")
            .into();
        assert_eq!(failure.message, "App is not defined");
        assert_eq!(
            failure.stack.as_deref(),
            Some("ReferenceError: App is not defined")
        );
    }
}
