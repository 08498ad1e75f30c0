//! Lexical environments and the per-execution realm
//!
//! Closures keep their defining environment alive and environments hold the
//! closures bound in them, so reference cycles are the norm. The [`Realm`]
//! records everything allocated during one execution and severs those
//! cycles when the execution is torn down.

use crate::value::{Object, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Const,
    Let,
    Var,
    Param,
    Function,
    Import,
}

impl BindingKind {
    fn is_mutable(&self) -> bool {
        !matches!(self, BindingKind::Const | BindingKind::Import)
    }

    fn allows_redeclare(&self) -> bool {
        matches!(
            self,
            BindingKind::Var | BindingKind::Param | BindingKind::Function
        )
    }
}

#[derive(Clone)]
struct Binding {
    value: Value,
    kind: BindingKind,
}

/// Reasons a declaration or assignment can be rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingError {
    NotDefined,
    Constant,
    AlreadyDeclared,
}

pub struct Env {
    vars: Mutex<HashMap<String, Binding>>,
    parent: Option<Arc<Env>>,
}

impl Env {
    pub fn root() -> Arc<Env> {
        Arc::new(Env {
            vars: Mutex::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn child(parent: &Arc<Env>) -> Arc<Env> {
        Arc::new(Env {
            vars: Mutex::new(HashMap::new()),
            parent: Some(Arc::clone(parent)),
        })
    }

    /// Declare a binding in this environment
    ///
    /// Fails when a lexical (`let`/`const`/import) binding of the same name
    /// already exists here.
    pub fn declare(&self, name: &str, value: Value, kind: BindingKind) -> Result<(), BindingError> {
        let mut vars = self.vars.lock();
        if let Some(existing) = vars.get(name) {
            let both_redeclarable = existing.kind.allows_redeclare() && kind.allows_redeclare();
            if !both_redeclarable {
                return Err(BindingError::AlreadyDeclared);
            }
        }
        vars.insert(name.to_string(), Binding { value, kind });
        Ok(())
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.vars.lock().contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut env = self;
        loop {
            if let Some(binding) = env.vars.lock().get(name) {
                return Some(binding.value.clone());
            }
            match &env.parent {
                Some(parent) => env = parent,
                None => return None,
            }
        }
    }

    pub fn assign(&self, name: &str, value: Value) -> Result<(), BindingError> {
        let mut env = self;
        loop {
            {
                let mut vars = env.vars.lock();
                if let Some(binding) = vars.get_mut(name) {
                    if !binding.kind.is_mutable() {
                        return Err(BindingError::Constant);
                    }
                    binding.value = value;
                    return Ok(());
                }
            }
            match &env.parent {
                Some(parent) => env = parent,
                None => return Err(BindingError::NotDefined),
            }
        }
    }

    /// Names declared directly in this environment
    pub fn own_names(&self) -> Vec<String> {
        self.vars.lock().keys().cloned().collect()
    }

    fn clear(&self) {
        let drained: HashMap<String, Binding> = std::mem::take(&mut *self.vars.lock());
        drop(drained);
    }
}

const INITIAL_PRUNE_THRESHOLD: usize = 1024;

/// Allocation registry for one execution
pub struct Realm {
    envs: Vec<Weak<Env>>,
    objects: Vec<Weak<Mutex<Object>>>,
    arrays: Vec<Weak<Mutex<Vec<Value>>>>,
    prune_at: usize,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl Realm {
    pub fn new() -> Self {
        Self {
            envs: Vec::new(),
            objects: Vec::new(),
            arrays: Vec::new(),
            prune_at: INITIAL_PRUNE_THRESHOLD,
        }
    }

    pub fn track_env(&mut self, env: &Arc<Env>) {
        self.envs.push(Arc::downgrade(env));
        self.maybe_prune();
    }

    pub fn track_object(&mut self, object: &Arc<Mutex<Object>>) {
        self.objects.push(Arc::downgrade(object));
        self.maybe_prune();
    }

    pub fn track_array(&mut self, array: &Arc<Mutex<Vec<Value>>>) {
        self.arrays.push(Arc::downgrade(array));
        self.maybe_prune();
    }

    /// Number of tracked allocations that are still alive
    pub fn live_count(&self) -> usize {
        self.envs.iter().filter(|w| w.strong_count() > 0).count()
            + self.objects.iter().filter(|w| w.strong_count() > 0).count()
            + self.arrays.iter().filter(|w| w.strong_count() > 0).count()
    }

    fn maybe_prune(&mut self) {
        let total = self.envs.len() + self.objects.len() + self.arrays.len();
        if total < self.prune_at {
            return;
        }
        self.envs.retain(|w| w.strong_count() > 0);
        self.objects.retain(|w| w.strong_count() > 0);
        self.arrays.retain(|w| w.strong_count() > 0);
        let live = self.envs.len() + self.objects.len() + self.arrays.len();
        self.prune_at = (live * 2).max(INITIAL_PRUNE_THRESHOLD);
    }

    /// Clear every live allocation, breaking reference cycles
    pub fn dispose(&mut self) {
        for env in self.envs.drain(..) {
            if let Some(env) = env.upgrade() {
                env.clear();
            }
        }
        for object in self.objects.drain(..) {
            if let Some(object) = object.upgrade() {
                let drained = object.lock().clear();
                drop(drained);
            }
        }
        for array in self.arrays.drain(..) {
            if let Some(array) = array.upgrade() {
                let drained = std::mem::take(&mut *array.lock());
                drop(drained);
            }
        }
        self.prune_at = INITIAL_PRUNE_THRESHOLD;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Closure, Function};
    use sandbox_script::ast::{FunctionBody, FunctionDef};
    use sandbox_script::Span;

    #[test]
    fn test_lookup_walks_parents() {
        let root = Env::root();
        root.declare("a", Value::Number(1.0), BindingKind::Param).unwrap();
        let child = Env::child(&root);
        assert_eq!(child.lookup("a"), Some(Value::Number(1.0)));
        assert!(child.lookup("b").is_none());
    }

    #[test]
    fn test_const_rejects_assignment() {
        let env = Env::root();
        env.declare("x", Value::Number(1.0), BindingKind::Const).unwrap();
        assert_eq!(env.assign("x", Value::Null), Err(BindingError::Constant));
        assert_eq!(env.assign("y", Value::Null), Err(BindingError::NotDefined));
    }

    #[test]
    fn test_lexical_redeclaration_rejected() {
        let env = Env::root();
        env.declare("x", Value::Null, BindingKind::Let).unwrap();
        assert!(env.declare("x", Value::Null, BindingKind::Const).is_err());
        env.declare("f", Value::Null, BindingKind::Function).unwrap();
        assert!(env.declare("f", Value::Null, BindingKind::Function).is_ok());
    }

    #[test]
    fn test_dispose_breaks_closure_cycle() {
        let mut realm = Realm::new();
        let env = Env::root();
        realm.track_env(&env);

        let def = Arc::new(FunctionDef {
            name: Some("App".to_string()),
            params: Vec::new(),
            body: FunctionBody::Block(Vec::new()),
            is_arrow: false,
            span: Span::default(),
        });
        let func = Arc::new(Function::Closure(Closure {
            def,
            env: Arc::clone(&env),
            name: "App".to_string(),
        }));
        env.declare("App", Value::Function(func), BindingKind::Function)
            .unwrap();

        let weak = Arc::downgrade(&env);
        drop(env);
        assert!(weak.upgrade().is_some(), "cycle keeps the env alive");

        realm.dispose();
        assert!(weak.upgrade().is_none());
    }
}
