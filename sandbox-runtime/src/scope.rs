//! The closed set of names synthesized code can see
//!
//! A [`Scope`] is an ordered table: its keys become the parameters of the
//! synthesized unit and its values are passed positionally. Nothing outside
//! the table is reachable from author code.

use crate::builtins;
use crate::design_system;
use crate::exception::ScriptResult;
use crate::hooks;
use crate::interpreter::{fragment_marker, Interpreter};
use crate::value::{Function, Object, Value};

/// React version reported by `React.version`
pub const REACT_VERSION: &str = "18.2.0";

#[derive(Clone, Default)]
pub struct Scope {
    entries: Vec<(String, Value)>,
    modules: Vec<(String, Value)>,
}

impl Scope {
    /// A scope with no names at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// `React`, `NavDS`, every design-system component, the hooks and the
    /// script globals, in that order
    pub fn standard() -> Self {
        let react = react_namespace();
        let components = design_system::components();
        let navds = frozen(Object::with_props(components.clone()));

        let mut scope = Self::empty()
            .with("React", react.clone())
            .with("NavDS", navds.clone());
        for (name, component) in components {
            scope = scope.with(name, component);
        }
        for (name, hook) in hooks::hook_natives() {
            scope = scope.with(name, hook);
        }
        for (name, value) in builtins::globals() {
            let value = match value {
                Value::Object(object) => {
                    object.lock().freeze();
                    Value::Object(object)
                }
                other => other,
            };
            scope = scope.with(name, value);
        }
        scope
            .with_module("react", react)
            .with_module("@navikt/ds-react", navds)
    }

    /// Add or replace an entry; a replaced entry keeps its position
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.entries.retain(|(existing, _)| existing != name);
        self
    }

    /// Register the value an `import ... from "<specifier>"` resolves to
    pub fn with_module(mut self, specifier: impl Into<String>, namespace: Value) -> Self {
        let specifier = specifier.into();
        self.modules.retain(|(existing, _)| *existing != specifier);
        self.modules.push((specifier, namespace));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve_module(&self, specifier: &str) -> Option<&Value> {
        self.modules
            .iter()
            .find(|(existing, _)| existing == specifier)
            .map(|(_, value)| value)
    }
}

fn frozen(mut object: Object) -> Value {
    object.freeze();
    Value::object(object)
}

fn native<F>(name: &str, call: F) -> Value
where
    F: Fn(&mut Interpreter, &[Value]) -> ScriptResult<Value> + Send + Sync + 'static,
{
    Value::Function(Function::native(name, call))
}

/// `React.createElement(type, props, ...children)`
fn create_element(interp: &mut Interpreter, args: &[Value]) -> ScriptResult<Value> {
    let kind = interp.element_kind(args.first().unwrap_or(&Value::Undefined))?;
    let mut props = Object::new();
    let mut key = None;
    if let Some(Value::Object(config)) = args.get(1) {
        let entries = config.lock().entries().to_vec();
        for (name, value) in entries {
            match name.as_str() {
                "key" if !value.is_nullish() => key = Some(value.to_js_string()),
                "key" | "ref" => {}
                _ => {
                    props.set(name, value);
                }
            }
        }
    }
    let children = args.get(2..).map(<[Value]>::to_vec).unwrap_or_default();
    interp.attach_children(&mut props, children);
    Ok(interp.alloc_element(kind, props, key))
}

fn react_namespace() -> Value {
    let mut entries = vec![
        ("createElement".to_string(), native("createElement", create_element)),
        ("Fragment".to_string(), fragment_marker()),
        (
            "StrictMode".to_string(),
            native("StrictMode", |interp, args| match args.first() {
                Some(props) if !props.is_nullish() => interp.get_property(props, "children"),
                _ => Ok(Value::Undefined),
            }),
        ),
        (
            "memo".to_string(),
            native("memo", |_, args| Ok(args.first().cloned().unwrap_or(Value::Undefined))),
        ),
        ("version".to_string(), Value::string(REACT_VERSION)),
    ];
    for (name, hook) in hooks::hook_natives() {
        entries.push((name.to_string(), hook));
    }
    let namespace = Object::with_props(entries.clone());
    entries.push(("default".to_string(), frozen(namespace)));
    frozen(Object::with_props(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_scope_order() {
        let scope = Scope::standard();
        let names: Vec<&str> = scope.names().collect();
        assert_eq!(&names[..2], &["React", "NavDS"]);
        assert!(names.contains(&"Button"));
        assert!(names.contains(&"useState"));
        assert_eq!(names.last(), Some(&"SyntaxError"));
        let button = names.iter().position(|n| *n == "Button");
        let console = names.iter().position(|n| *n == "console");
        assert!(button < console);
    }

    #[test]
    fn test_with_replaces_in_place() {
        let scope = Scope::empty()
            .with("a", Value::Number(1.0))
            .with("b", Value::Number(2.0))
            .with("a", Value::Number(3.0));
        let names: Vec<&str> = scope.names().collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(scope.get("a"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_without_removes_entry() {
        let scope = Scope::standard().without("Button");
        assert!(!scope.contains("Button"));
        assert!(scope.contains("Alert"));
    }

    #[test]
    fn test_modules_resolve() {
        let scope = Scope::standard();
        assert!(scope.resolve_module("react").is_some());
        assert!(scope.resolve_module("@navikt/ds-react").is_some());
        assert!(scope.resolve_module("lodash").is_none());
    }

    #[test]
    fn test_react_default_export() {
        let scope = Scope::standard();
        let Some(Value::Object(react)) = scope.get("React") else {
            panic!("React is not an object");
        };
        let react = react.lock();
        assert!(react.is_frozen());
        let Some(Value::Object(default)) = react.get("default") else {
            panic!("React.default missing");
        };
        assert!(default.lock().get("useState").is_some());
    }
}
