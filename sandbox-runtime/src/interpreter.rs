//! Tree-walking evaluator for component scripts
//!
//! Each execution gets its own [`Interpreter`]. Every environment, object and
//! array it allocates is registered with its [`Realm`] so the whole heap can
//! be torn down when the mount is replaced.

use crate::abi::RuntimeLimits;
use crate::builtins;
use crate::env::{BindingError, BindingKind, Env, Realm};
use crate::exception::{ErrorKind, Exception, ScriptResult};
use crate::hooks::HookFrame;
use crate::value::{Closure, Element, ElementKind, Function, Object, Value, MAX_ARRAY_LENGTH, MAX_STRING_LENGTH};
use parking_lot::Mutex;
use sandbox_script::ast::*;
use sandbox_script::line_col;
use std::sync::Arc;

/// Marker stored in `React.Fragment`
pub(crate) const FRAGMENT_MARKER: &str = "Symbol(react.fragment)";

/// Source text the interpreter is currently executing
///
/// `origin` is the offset where author code begins; reported positions are
/// relative to it.
#[derive(Clone)]
pub struct UnitSource {
    pub text: Arc<str>,
    pub origin: usize,
    pub file: String,
}

struct CallFrame {
    name: String,
    call_site: usize,
}

pub(crate) enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter {
    realm: Realm,
    limits: RuntimeLimits,
    call_stack: Vec<CallFrame>,
    cursor: usize,
    unit: Option<UnitSource>,
    default_export: Option<Value>,
    pub(crate) render_stack: Vec<HookFrame>,
}

impl Interpreter {
    pub fn new(limits: RuntimeLimits) -> Self {
        Self {
            realm: Realm::new(),
            limits,
            call_stack: Vec::new(),
            cursor: 0,
            unit: None,
            default_export: None,
            render_stack: Vec::new(),
        }
    }

    pub fn limits(&self) -> &RuntimeLimits {
        &self.limits
    }

    pub fn set_unit(&mut self, unit: UnitSource) {
        self.unit = Some(unit);
    }

    pub(crate) fn set_cursor(&mut self, offset: usize) {
        self.cursor = offset;
    }

    pub(crate) fn take_default_export(&mut self) -> Option<Value> {
        self.default_export.take()
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// Break every reference cycle created by this execution
    pub fn dispose(&mut self) {
        self.default_export = None;
        self.realm.dispose();
    }

    // ---- allocation ----

    pub fn new_env(&mut self, parent: &Arc<Env>) -> Arc<Env> {
        let env = Env::child(parent);
        self.realm.track_env(&env);
        env
    }

    pub fn alloc_object(&mut self, object: Object) -> Value {
        let object = Arc::new(Mutex::new(object));
        self.realm.track_object(&object);
        Value::Object(object)
    }

    pub fn alloc_array(&mut self, items: Vec<Value>) -> Value {
        let array = Arc::new(Mutex::new(items));
        self.realm.track_array(&array);
        Value::Array(array)
    }

    pub fn alloc_element(&mut self, kind: ElementKind, props: Object, key: Option<String>) -> Value {
        let element = Element::new(kind, props, key);
        self.realm.track_object(&element.props);
        Value::Element(Arc::new(element))
    }

    fn make_closure(&mut self, def: &Arc<FunctionDef>, env: &Arc<Env>, name: Option<&str>) -> Value {
        let name = def
            .name
            .clone()
            .or_else(|| name.map(str::to_string))
            .unwrap_or_default();
        Value::Function(Arc::new(Function::Closure(Closure {
            def: Arc::clone(def),
            env: Arc::clone(env),
            name,
        })))
    }

    // ---- errors and stack traces ----

    /// Build an exception carrying a stack trace of the current position
    pub fn error(&self, kind: ErrorKind, message: impl Into<String>) -> Exception {
        let message = message.into();
        let stack = self.stack_trace(&format!("{}: {}", kind.name(), message));
        Exception::new(kind, message).with_stack(stack)
    }

    pub fn stack_trace(&self, header: &str) -> String {
        let mut out = header.to_string();
        let mut position = self.cursor;
        for frame in self.call_stack.iter().rev() {
            out.push_str(&format!("\n    at {} ({})", frame.name, self.location(position)));
            position = frame.call_site;
        }
        out
    }

    fn location(&self, offset: usize) -> String {
        match &self.unit {
            Some(unit) => {
                let (line, col) = line_col(&unit.text, offset, unit.origin);
                format!("{}:{}:{}", unit.file, line, col)
            }
            None => "<native>".to_string(),
        }
    }

    /// Run `body` inside a named stack frame
    pub fn with_frame<T>(&mut self, name: &str, body: impl FnOnce(&mut Self) -> T) -> T {
        self.call_stack.push(CallFrame {
            name: name.to_string(),
            call_site: self.cursor,
        });
        let result = body(self);
        if let Some(frame) = self.call_stack.pop() {
            self.cursor = frame.call_site;
        }
        result
    }

    // ---- calls ----

    pub fn call(&mut self, callee: &Value, args: &[Value]) -> ScriptResult<Value> {
        match callee {
            Value::Function(func) => {
                let func = Arc::clone(func);
                self.call_function(&func, args)
            }
            other => Err(self.error(
                ErrorKind::TypeError,
                format!("{} is not a function", builtins::describe_value(other)),
            )),
        }
    }

    pub fn call_function(&mut self, func: &Arc<Function>, args: &[Value]) -> ScriptResult<Value> {
        match func.as_ref() {
            Function::Native(native) => {
                let call = Arc::clone(&native.call);
                call(self, args)
            }
            Function::Closure(closure) => {
                if self.call_stack.len() >= self.limits.max_call_depth {
                    return Err(self.error(ErrorKind::RangeError, "Maximum call stack size exceeded"));
                }
                let env = self.new_env(&closure.env);
                let name = func.display_name().to_string();
                self.with_frame(&name, |interp| interp.invoke_closure(closure, args, &env))
            }
        }
    }

    fn invoke_closure(&mut self, closure: &Closure, args: &[Value], env: &Arc<Env>) -> ScriptResult<Value> {
        let def = &closure.def;
        for (i, param) in def.params.iter().enumerate() {
            let value = if param.rest {
                let rest = args.get(i..).map(<[Value]>::to_vec).unwrap_or_default();
                self.alloc_array(rest)
            } else {
                args.get(i).cloned().unwrap_or(Value::Undefined)
            };
            let value = match (&value, &param.default) {
                (Value::Undefined, Some(default)) => self.eval_named(default, env, pattern_name(&param.pattern))?,
                _ => value,
            };
            self.bind_pattern(&param.pattern, value, env, BindingKind::Param)?;
        }
        match &def.body {
            FunctionBody::Expr(expr) => self.eval_expr(expr, env),
            FunctionBody::Block(stmts) => match self.exec_block(stmts, env)? {
                Flow::Return(value) => Ok(value),
                Flow::Normal => Ok(Value::Undefined),
            },
        }
    }

    // ---- statements ----

    /// Execute top-level statements; `Some` when one of them returned
    pub(crate) fn run_statements(&mut self, stmts: &[Stmt], env: &Arc<Env>) -> ScriptResult<Option<Value>> {
        match self.exec_block(stmts, env)? {
            Flow::Return(value) => Ok(Some(value)),
            Flow::Normal => Ok(None),
        }
    }

    pub(crate) fn exec_block(&mut self, stmts: &[Stmt], env: &Arc<Env>) -> ScriptResult<Flow> {
        self.hoist_functions(stmts, env)?;
        for stmt in stmts {
            if let Flow::Return(value) = self.exec_stmt(stmt, env)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn hoist_functions(&mut self, stmts: &[Stmt], env: &Arc<Env>) -> ScriptResult<()> {
        for stmt in stmts {
            let def = match stmt {
                Stmt::Function(def) => def,
                Stmt::Export { decl, .. } => match decl.as_ref() {
                    Stmt::Function(def) => def,
                    _ => continue,
                },
                _ => continue,
            };
            let Some(name) = def.name.as_deref() else {
                continue;
            };
            let closure = self.make_closure(def, env, None);
            self.cursor = def.span.start;
            self.declare(env, name, closure, BindingKind::Function)?;
        }
        Ok(())
    }

    fn declare(&self, env: &Env, name: &str, value: Value, kind: BindingKind) -> ScriptResult<()> {
        env.declare(name, value, kind).map_err(|_| {
            self.error(
                ErrorKind::SyntaxError,
                format!("Identifier '{}' has already been declared", name),
            )
        })
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Arc<Env>) -> ScriptResult<Flow> {
        match stmt {
            Stmt::Var { kind, decls, span } => {
                self.cursor = span.start;
                for decl in decls {
                    let value = match &decl.init {
                        Some(init) => self.eval_named(init, env, pattern_name(&decl.pattern))?,
                        None => Value::Undefined,
                    };
                    self.bind_pattern(&decl.pattern, value, env, binding_kind(*kind))?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Import(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Return { value, span } => {
                self.cursor = span.start;
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_expr(test, env)?.is_truthy() {
                    self.exec_stmt(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Block(stmts) => {
                let block_env = self.new_env(env);
                self.exec_block(stmts, &block_env)
            }
            Stmt::ForOf {
                kind,
                pattern,
                iterable,
                body,
                span,
            } => {
                let iterable = self.eval_expr(iterable, env)?;
                self.cursor = span.start;
                let items = self.iterate(&iterable)?;
                for item in items {
                    let loop_env = self.new_env(env);
                    self.bind_pattern(pattern, item, &loop_env, binding_kind(*kind))?;
                    if let Flow::Return(value) = self.exec_stmt(body, &loop_env)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Throw { value, span } => {
                let value = self.eval_expr(value, env)?;
                self.cursor = span.start;
                Err(Exception::thrown(value))
            }
            Stmt::Export { default, decl } => {
                let flow = self.exec_stmt(decl, env)?;
                if *default {
                    if let Stmt::Function(def) = decl.as_ref() {
                        if let Some(name) = &def.name {
                            self.default_export = env.lookup(name);
                        }
                    }
                }
                Ok(flow)
            }
            Stmt::ExportDefault(expr) => {
                let value = self.eval_named(expr, env, Some("default"))?;
                self.default_export = Some(value);
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval_expr(expr, env)?;
                Ok(Flow::Normal)
            }
        }
    }

    /// Values produced by iterating `value` (arrays and strings)
    pub(crate) fn iterate(&self, value: &Value) -> ScriptResult<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.lock().clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
            other => Err(self.error(
                ErrorKind::TypeError,
                format!("{} is not iterable", builtins::describe_value(other)),
            )),
        }
    }

    fn bind_pattern(&mut self, pattern: &Pattern, value: Value, env: &Arc<Env>, kind: BindingKind) -> ScriptResult<()> {
        match pattern {
            Pattern::Ident(name, span) => {
                self.cursor = span.start;
                self.declare(env, name, value, kind)
            }
            Pattern::Array { elements, rest } => {
                let items = self.iterate(&value)?;
                for (i, element) in elements.iter().enumerate() {
                    let Some(element) = element else {
                        continue;
                    };
                    let item = items.get(i).cloned().unwrap_or(Value::Undefined);
                    let item = match (&item, &element.default) {
                        (Value::Undefined, Some(default)) => {
                            self.eval_named(default, env, pattern_name(&element.pattern))?
                        }
                        _ => item,
                    };
                    self.bind_pattern(&element.pattern, item, env, kind)?;
                }
                if let Some(rest) = rest {
                    let remaining = items.get(elements.len()..).map(<[Value]>::to_vec).unwrap_or_default();
                    let remaining = self.alloc_array(remaining);
                    self.bind_pattern(rest, remaining, env, kind)?;
                }
                Ok(())
            }
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    let first = props.first().map(|p| p.key.as_str()).unwrap_or("");
                    return Err(self.error(
                        ErrorKind::TypeError,
                        format!(
                            "Cannot destructure property '{}' of '{}' as it is {}.",
                            first,
                            value.to_js_string(),
                            value.to_js_string()
                        ),
                    ));
                }
                for prop in props {
                    let item = self.get_property(&value, &prop.key)?;
                    let item = match (&item, &prop.default) {
                        (Value::Undefined, Some(default)) => {
                            self.eval_named(default, env, pattern_name(&prop.value))?
                        }
                        _ => item,
                    };
                    self.bind_pattern(&prop.value, item, env, kind)?;
                }
                if let Some(rest) = rest {
                    let mut remaining = Object::new();
                    if let Value::Object(object) = &value {
                        for (key, item) in object.lock().entries() {
                            if !props.iter().any(|p| &p.key == key) {
                                remaining.set(key.clone(), item.clone());
                            }
                        }
                    }
                    let remaining = self.alloc_object(remaining);
                    self.declare(env, rest, remaining, kind)?;
                }
                Ok(())
            }
        }
    }

    // ---- expressions ----

    /// Evaluate, naming an anonymous function after the binding it initializes
    fn eval_named(&mut self, expr: &Expr, env: &Arc<Env>, name: Option<&str>) -> ScriptResult<Value> {
        match &expr.kind {
            ExprKind::Function(def) => {
                self.cursor = expr.span.start;
                Ok(self.make_closure(def, env, name))
            }
            _ => self.eval_expr(expr, env),
        }
    }

    pub(crate) fn eval_expr(&mut self, expr: &Expr, env: &Arc<Env>) -> ScriptResult<Value> {
        Ok(self.eval_chain(expr, env)?.unwrap_or(Value::Undefined))
    }

    /// Evaluate a member/call chain; `None` when an optional link short-circuits
    fn eval_chain(&mut self, expr: &Expr, env: &Arc<Env>) -> ScriptResult<Option<Value>> {
        self.cursor = expr.span.start;
        let value = match &expr.kind {
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                self.cursor = expr.span.start;
                self.get_property(&target, property)?
            }
            ExprKind::Index {
                object,
                index,
                optional,
            } => {
                let Some(target) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.eval_expr(index, env)?.to_property_key();
                self.cursor = expr.span.start;
                self.get_property(&target, &key)?
            }
            ExprKind::Call {
                callee,
                args,
                optional,
            } => {
                let Some(func) = self.eval_chain(callee, env)? else {
                    return Ok(None);
                };
                if *optional && func.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_items(args, env)?;
                self.cursor = expr.span.start;
                if !func.is_function() {
                    return Err(self.error(
                        ErrorKind::TypeError,
                        format!("{} is not a function", describe_callee(callee)),
                    ));
                }
                self.call(&func, &args)?
            }
            _ => self.eval_simple(expr, env)?,
        };
        Ok(Some(value))
    }

    fn eval_simple(&mut self, expr: &Expr, env: &Arc<Env>) -> ScriptResult<Value> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Undefined => Ok(Value::Undefined),
            ExprKind::Template { quasis, exprs } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(expr) = exprs.get(i) {
                        out.push_str(&self.eval_expr(expr, env)?.to_js_string());
                    }
                }
                Ok(Value::String(out))
            }
            ExprKind::Ident(name) => self.lookup(env, name),
            ExprKind::Array(items) => {
                let items = self.eval_items(items, env)?;
                Ok(self.alloc_array(items))
            }
            ExprKind::Object(props) => self.eval_object(props, env),
            ExprKind::Function(def) => Ok(self.make_closure(def, env, None)),
            ExprKind::New { callee, args } => {
                let func = self.eval_expr(callee, env)?;
                let args = self.eval_items(args, env)?;
                self.cursor = expr.span.start;
                match &func {
                    Value::Function(f) if matches!(f.as_ref(), Function::Native(_)) => self.call(&func, &args),
                    _ => Err(self.error(
                        ErrorKind::TypeError,
                        format!("{} is not a constructor", describe_callee(callee)),
                    )),
                }
            }
            ExprKind::Unary { op, operand } => {
                if let (UnaryOp::Typeof, ExprKind::Ident(name)) = (op, &operand.kind) {
                    let value = env.lookup(name).unwrap_or(Value::Undefined);
                    return Ok(Value::string(value.type_of()));
                }
                let value = self.eval_expr(operand, env)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Typeof => Value::string(value.type_of()),
                })
            }
            ExprKind::Binary { .. } | ExprKind::Logical { .. } => self.eval_operators(expr, env),
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_expr(test, env)?.is_truthy() {
                    self.eval_expr(consequent, env)
                } else {
                    self.eval_expr(alternate, env)
                }
            }
            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value, env),
            ExprKind::Jsx(element) => self.eval_jsx(element, env),
            ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Call { .. } => self.eval_expr(expr, env),
        }
    }

    fn lookup(&self, env: &Env, name: &str) -> ScriptResult<Value> {
        env.lookup(name)
            .ok_or_else(|| self.error(ErrorKind::ReferenceError, format!("{} is not defined", name)))
    }

    fn eval_items(&mut self, items: &[ArrayItem], env: &Arc<Env>) -> ScriptResult<Vec<Value>> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Expr(expr) => values.push(self.eval_expr(expr, env)?),
                ArrayItem::Spread(expr) => {
                    let spread = self.eval_expr(expr, env)?;
                    values.extend(self.iterate(&spread)?);
                }
            }
        }
        Ok(values)
    }

    fn eval_object(&mut self, props: &[ObjectProp], env: &Arc<Env>) -> ScriptResult<Value> {
        let mut object = Object::new();
        for prop in props {
            match prop {
                ObjectProp::KeyValue(PropKey::Named(key), value) => {
                    let value = self.eval_named(value, env, Some(key))?;
                    object.set(key.clone(), value);
                }
                ObjectProp::KeyValue(PropKey::Computed(key), value) => {
                    let key = self.eval_expr(key, env)?.to_property_key();
                    let value = self.eval_named(value, env, Some(&key))?;
                    object.set(key, value);
                }
                ObjectProp::Shorthand(name, span) => {
                    self.cursor = span.start;
                    let value = self.lookup(env, name)?;
                    object.set(name.clone(), value);
                }
                ObjectProp::Spread(expr) => {
                    let value = self.eval_expr(expr, env)?;
                    for (key, item) in own_entries(&value) {
                        object.set(key, item);
                    }
                }
            }
        }
        Ok(self.alloc_object(object))
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr, env: &Arc<Env>) -> ScriptResult<Value> {
        match &target.kind {
            ExprKind::Ident(name) => {
                let rhs = self.eval_named(value, env, Some(name))?;
                let result = match op {
                    AssignOp::Assign => rhs,
                    AssignOp::AddAssign => binary(BinaryOp::Add, &self.lookup(env, name)?, &rhs),
                    AssignOp::SubAssign => binary(BinaryOp::Sub, &self.lookup(env, name)?, &rhs),
                };
                self.cursor = target.span.start;
                match env.assign(name, result.clone()) {
                    Ok(()) => Ok(result),
                    Err(BindingError::Constant) => {
                        Err(self.error(ErrorKind::TypeError, "Assignment to constant variable."))
                    }
                    Err(_) => Err(self.error(ErrorKind::ReferenceError, format!("{} is not defined", name))),
                }
            }
            ExprKind::Member { object, property, .. } => {
                let object = self.eval_expr(object, env)?;
                let rhs = self.eval_expr(value, env)?;
                self.assign_property(op, &object, property.clone(), rhs, target.span.start)
            }
            ExprKind::Index { object, index, .. } => {
                let object = self.eval_expr(object, env)?;
                let key = self.eval_expr(index, env)?.to_property_key();
                let rhs = self.eval_expr(value, env)?;
                self.assign_property(op, &object, key, rhs, target.span.start)
            }
            _ => Err(self.error(ErrorKind::SyntaxError, "Invalid left-hand side in assignment")),
        }
    }

    fn assign_property(&mut self, op: AssignOp, object: &Value, key: String, rhs: Value, at: usize) -> ScriptResult<Value> {
        self.cursor = at;
        let result = match op {
            AssignOp::Assign => rhs,
            AssignOp::AddAssign => binary(BinaryOp::Add, &self.get_property(object, &key)?, &rhs),
            AssignOp::SubAssign => binary(BinaryOp::Sub, &self.get_property(object, &key)?, &rhs),
        };
        self.set_property(object, key, result.clone())?;
        Ok(result)
    }

    // ---- properties ----

    pub fn get_property(&mut self, target: &Value, key: &str) -> ScriptResult<Value> {
        match target {
            Value::Undefined | Value::Null => Err(self.error(
                ErrorKind::TypeError,
                format!(
                    "Cannot read properties of {} (reading '{}')",
                    target.to_js_string(),
                    key
                ),
            )),
            Value::Object(object) => {
                let own = object.lock().get(key);
                Ok(own
                    .or_else(|| builtins::object_method(object, key))
                    .unwrap_or(Value::Undefined))
            }
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.lock().len() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(items.lock().get(index).cloned().unwrap_or(Value::Undefined));
                }
                Ok(builtins::array_method(items, key).unwrap_or(Value::Undefined))
            }
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map(|c| Value::String(c.to_string()))
                        .unwrap_or(Value::Undefined));
                }
                Ok(builtins::string_method(s, key).unwrap_or(Value::Undefined))
            }
            Value::Number(n) => Ok(builtins::number_method(*n, key).unwrap_or(Value::Undefined)),
            Value::Bool(_) => Ok(Value::Undefined),
            Value::Function(func) => Ok(match key {
                "name" => Value::string(func.name()),
                _ => builtins::function_static(func, key).unwrap_or(Value::Undefined),
            }),
            Value::Element(element) => Ok(match key {
                "props" => Value::Object(Arc::clone(&element.props)),
                "key" => element.key.clone().map(Value::String).unwrap_or(Value::Null),
                "type" => match &element.kind {
                    ElementKind::Host(tag) => Value::string(tag),
                    ElementKind::Component(func) => Value::Function(Arc::clone(func)),
                    ElementKind::Fragment => fragment_marker(),
                },
                _ => Value::Undefined,
            }),
        }
    }

    /// Evaluate a left-nested run of binary and logical operators
    ///
    /// `a + b + c` parses as `(a + b) + c`; the run is walked down its left
    /// spine and applied innermost first, so a long chain costs no stack.
    fn eval_operators(&mut self, expr: &Expr, env: &Arc<Env>) -> ScriptResult<Value> {
        enum Link<'a> {
            Binary(BinaryOp, &'a Expr, usize),
            Logical(LogicalOp, &'a Expr),
        }

        let mut links = Vec::new();
        let mut leftmost = expr;
        loop {
            match &leftmost.kind {
                ExprKind::Binary { op, left, right } => {
                    links.push(Link::Binary(*op, right.as_ref(), leftmost.span.start));
                    leftmost = left;
                }
                ExprKind::Logical { op, left, right } => {
                    links.push(Link::Logical(*op, right.as_ref()));
                    leftmost = left;
                }
                _ => break,
            }
        }

        let mut value = self.eval_expr(leftmost, env)?;
        for link in links.into_iter().rev() {
            value = match link {
                Link::Binary(op, right, start) => {
                    let right = self.eval_expr(right, env)?;
                    let result = binary(op, &value, &right);
                    if matches!(&result, Value::String(s) if s.len() > MAX_STRING_LENGTH) {
                        self.cursor = start;
                        return Err(self.error(ErrorKind::RangeError, "Invalid string length"));
                    }
                    result
                }
                Link::Logical(op, right) => {
                    let short_circuit = match op {
                        LogicalOp::And => !value.is_truthy(),
                        LogicalOp::Or => value.is_truthy(),
                        LogicalOp::Nullish => !value.is_nullish(),
                    };
                    if short_circuit {
                        value
                    } else {
                        self.eval_expr(right, env)?
                    }
                }
            };
        }
        Ok(value)
    }

    pub fn set_property(&mut self, target: &Value, key: String, value: Value) -> ScriptResult<()> {
        match target {
            Value::Undefined | Value::Null => Err(self.error(
                ErrorKind::TypeError,
                format!(
                    "Cannot set properties of {} (setting '{}')",
                    target.to_js_string(),
                    key
                ),
            )),
            Value::Object(object) => {
                object.lock().set(key, value);
                Ok(())
            }
            Value::Array(items) => {
                let mut items = items.lock();
                if key == "length" {
                    let len = value.to_number();
                    if len >= 0.0 && len.fract() == 0.0 && len <= MAX_ARRAY_LENGTH as f64 {
                        items.resize(len as usize, Value::Undefined);
                        return Ok(());
                    }
                    drop(items);
                    return Err(self.error(ErrorKind::RangeError, "Invalid array length"));
                }
                if let Some(index) = array_index(&key) {
                    if index >= MAX_ARRAY_LENGTH {
                        drop(items);
                        return Err(self.error(ErrorKind::RangeError, "Invalid array length"));
                    }
                    if index >= items.len() {
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ---- JSX ----

    fn eval_jsx(&mut self, element: &JsxElement, env: &Arc<Env>) -> ScriptResult<Value> {
        self.cursor = element.span.start;
        let kind = match &element.name {
            JsxName::Fragment => ElementKind::Fragment,
            JsxName::Intrinsic(tag) => ElementKind::Host(tag.clone()),
            JsxName::Component(path) => {
                let mut value = self.lookup(env, &path[0])?;
                for segment in &path[1..] {
                    value = self.get_property(&value, segment)?;
                }
                self.cursor = element.span.start;
                self.element_kind(&value)?
            }
        };

        let mut props = Object::new();
        let mut key = None;
        for attribute in &element.attributes {
            match attribute {
                JsxAttribute::Named { name, value } => {
                    let value = match value {
                        None => Value::Bool(true),
                        Some(JsxAttrValue::Str(s)) => Value::String(s.clone()),
                        Some(JsxAttrValue::Expr(expr)) => self.eval_expr(expr, env)?,
                        Some(JsxAttrValue::Element(child)) => self.eval_jsx(child, env)?,
                    };
                    if name == "key" {
                        key = Some(value.to_js_string());
                    } else {
                        props.set(name.clone(), value);
                    }
                }
                JsxAttribute::Spread(expr) => {
                    let value = self.eval_expr(expr, env)?;
                    for (name, item) in own_entries(&value) {
                        if name == "key" {
                            key = Some(item.to_js_string());
                        } else {
                            props.set(name, item);
                        }
                    }
                }
            }
        }

        let mut children = Vec::with_capacity(element.children.len());
        for child in &element.children {
            children.push(match child {
                JsxChild::Text(text) => Value::String(text.clone()),
                JsxChild::Expr(expr) => self.eval_expr(expr, env)?,
                JsxChild::Element(child) => self.eval_jsx(child, env)?,
            });
        }
        self.attach_children(&mut props, children);
        Ok(self.alloc_element(kind, props, key))
    }

    /// Store children the way `createElement` does: one child as-is, several as an array
    pub(crate) fn attach_children(&mut self, props: &mut Object, mut children: Vec<Value>) {
        match children.len() {
            0 => {}
            1 => {
                if let Some(child) = children.pop() {
                    props.set("children", child);
                }
            }
            _ => {
                let children = self.alloc_array(children);
                props.set("children", children);
            }
        }
    }

    /// Interpret a value used as an element type
    pub(crate) fn element_kind(&self, value: &Value) -> ScriptResult<ElementKind> {
        match value {
            Value::Function(func) => Ok(ElementKind::Component(Arc::clone(func))),
            Value::String(tag) => Ok(ElementKind::Host(tag.clone())),
            Value::Object(object) if is_fragment_marker(object) => Ok(ElementKind::Fragment),
            other => Err(self.error(
                ErrorKind::Error,
                format!(
                    "Element type is invalid: expected a string (for built-in components) or a \
                     class/function (for composite components) but got: {}.",
                    other.type_of()
                ),
            )),
        }
    }
}

/// The value of `React.Fragment`
pub(crate) fn fragment_marker() -> Value {
    let mut object = Object::with_props(vec![("$$typeof".to_string(), Value::string(FRAGMENT_MARKER))]);
    object.freeze();
    Value::object(object)
}

fn is_fragment_marker(object: &Arc<Mutex<Object>>) -> bool {
    matches!(object.lock().get("$$typeof"), Some(Value::String(s)) if s == FRAGMENT_MARKER)
}

fn binding_kind(kind: VarKind) -> BindingKind {
    match kind {
        VarKind::Const => BindingKind::Const,
        VarKind::Let => BindingKind::Let,
        VarKind::Var => BindingKind::Var,
    }
}

fn pattern_name(pattern: &Pattern) -> Option<&str> {
    match pattern {
        Pattern::Ident(name, _) => Some(name),
        _ => None,
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

/// Own enumerable entries, as copied by object spread
pub(crate) fn own_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(object) => object.lock().entries().to_vec(),
        Value::Array(items) => items
            .lock()
            .iter()
            .enumerate()
            .map(|(i, item)| (i.to_string(), item.clone()))
            .collect(),
        Value::String(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::String(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

/// Source-level description of a callee for "is not a function" messages
fn describe_callee(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Ident(name) => name.clone(),
        ExprKind::Member { object, property, .. } => format!("{}.{}", describe_callee(object), property),
        ExprKind::Index { object, .. } => format!("{}[...]", describe_callee(object)),
        ExprKind::Call { callee, .. } => format!("{}(...)", describe_callee(callee)),
        _ => "expression".to_string(),
    }
}

pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let stringy = |v: &Value| {
                matches!(
                    v,
                    Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Element(_) | Value::Function(_)
                )
            };
            if stringy(left) || stringy(right) {
                Value::String(format!("{}{}", left.to_js_string(), right.to_js_string()))
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::Ne => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNe => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let Some(ordering) = ordering else {
                return Value::Bool(false);
            };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}
