//! Component hooks
//!
//! While a component renders, its hook slots are moved out of the instance
//! into a [`HookFrame`] on the interpreter's render stack. Hook natives
//! consume those slots in call order, so a component must call the same
//! hooks in the same order on every render.

use crate::exception::{ErrorKind, ScriptResult};
use crate::interpreter::Interpreter;
use crate::value::{Function, Object, Value};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

const INVALID_HOOK_CALL: &str = "Invalid hook call. Hooks can only be called inside of the body of a \
     function component.";

/// Set whenever state owned by a mount changes
#[derive(Debug, Default)]
pub struct MountSignal {
    dirty: AtomicBool,
}

impl MountSignal {
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }
}

/// Storage behind one `useState` / `useReducer` slot
pub struct StateCell {
    value: Mutex<Value>,
    reducer: Mutex<Option<Value>>,
    alive: AtomicBool,
}

impl StateCell {
    fn new(value: Value, reducer: Option<Value>) -> Self {
        Self {
            value: Mutex::new(value),
            reducer: Mutex::new(reducer),
            alive: AtomicBool::new(true),
        }
    }

    pub fn get(&self) -> Value {
        self.value.lock().clone()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark dead and drop the stored value
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let old = std::mem::replace(&mut *self.value.lock(), Value::Undefined);
        let reducer = self.reducer.lock().take();
        drop((old, reducer));
    }
}

pub struct EffectSlot {
    pub deps: Option<Vec<Value>>,
    pub cleanup: Option<Value>,
    /// Effect to run after the next commit
    pub pending: Option<Value>,
}

pub enum Hook {
    State { cell: Arc<StateCell>, setter: Value },
    Effect(EffectSlot),
    Memo { deps: Option<Vec<Value>>, value: Value },
    Ref(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookKind {
    State,
    Effect,
    Memo,
    Ref,
}

impl Hook {
    fn kind(&self) -> HookKind {
        match self {
            Hook::State { .. } => HookKind::State,
            Hook::Effect(_) => HookKind::Effect,
            Hook::Memo { .. } => HookKind::Memo,
            Hook::Ref(_) => HookKind::Ref,
        }
    }
}

/// Hook slots of the component currently rendering
pub struct HookFrame {
    pub hooks: Vec<Hook>,
    pub cursor: usize,
    pub mounting: bool,
    pub component: String,
    pub signal: Weak<MountSignal>,
}

impl HookFrame {
    pub fn new(hooks: Vec<Hook>, mounting: bool, component: String, signal: Weak<MountSignal>) -> Self {
        Self {
            hooks,
            cursor: 0,
            mounting,
            component,
            signal,
        }
    }
}

impl Interpreter {
    /// Claim the next hook slot; `true` when it has to be created
    fn next_hook(&mut self, kind: HookKind) -> ScriptResult<(usize, bool)> {
        let outcome = match self.render_stack.last_mut() {
            None => Err(INVALID_HOOK_CALL.to_string()),
            Some(frame) => {
                let index = frame.cursor;
                frame.cursor += 1;
                match frame.hooks.get(index) {
                    Some(hook) if hook.kind() == kind => Ok((index, false)),
                    Some(_) => Err(format!(
                        "React has detected a change in the order of Hooks called by {}.",
                        frame.component
                    )),
                    None if frame.mounting => Ok((index, true)),
                    None => Err("Rendered more hooks than during the previous render.".to_string()),
                }
            }
        };
        outcome.map_err(|message| self.error(ErrorKind::Error, message))
    }

    fn hook_mut(&mut self, index: usize) -> Option<&mut Hook> {
        self.render_stack.last_mut()?.hooks.get_mut(index)
    }

    fn push_hook(&mut self, hook: Hook) {
        if let Some(frame) = self.render_stack.last_mut() {
            frame.hooks.push(hook);
        }
    }

    fn mount_signal(&self) -> Weak<MountSignal> {
        self.render_stack
            .last()
            .map(|frame| frame.signal.clone())
            .unwrap_or_default()
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

fn deps_from(value: Option<&Value>) -> Option<Vec<Value>> {
    match value {
        Some(Value::Array(items)) => Some(items.lock().clone()),
        _ => None,
    }
}

fn deps_changed(old: &Option<Vec<Value>>, new: &Option<Vec<Value>>) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => old.len() != new.len() || old.iter().zip(new).any(|(a, b)| !a.same_value(b)),
        _ => true,
    }
}

/// The dispatch function handed out by `useState` and `useReducer`
///
/// Holds only a weak reference to its mount: once the mount is gone, or the
/// owning instance unmounted, calls are ignored.
fn make_setter(cell: Arc<StateCell>, signal: Weak<MountSignal>) -> Value {
    Value::Function(Function::native("dispatchSetState", move |interp, args| {
        let Some(signal) = signal.upgrade() else {
            tracing::debug!("Ignoring state update from a replaced mount");
            return Ok(Value::Undefined);
        };
        if !cell.is_alive() {
            tracing::debug!("Ignoring state update on an unmounted component");
            return Ok(Value::Undefined);
        }
        let action = arg(args, 0);
        let previous = cell.get();
        let reducer = cell.reducer.lock().clone();
        let next = match reducer {
            Some(reducer) => interp.call(&reducer, &[previous.clone(), action])?,
            None if action.is_function() => interp.call(&action, &[previous.clone()])?,
            None => action,
        };
        if !next.same_value(&previous) {
            *cell.value.lock() = next;
            signal.mark_dirty();
        }
        Ok(Value::Undefined)
    }))
}

fn state_pair(interp: &mut Interpreter, index: usize) -> Value {
    let pair = match interp.hook_mut(index) {
        Some(Hook::State { cell, setter }) => vec![cell.get(), setter.clone()],
        _ => vec![Value::Undefined, Value::Undefined],
    };
    interp.alloc_array(pair)
}

pub fn use_state(interp: &mut Interpreter, args: &[Value]) -> ScriptResult<Value> {
    let (index, is_new) = interp.next_hook(HookKind::State)?;
    if is_new {
        let initial = arg(args, 0);
        let initial = if initial.is_function() {
            interp.call(&initial, &[])?
        } else {
            initial
        };
        let cell = Arc::new(StateCell::new(initial, None));
        let setter = make_setter(Arc::clone(&cell), interp.mount_signal());
        interp.push_hook(Hook::State { cell, setter });
    }
    Ok(state_pair(interp, index))
}

pub fn use_reducer(interp: &mut Interpreter, args: &[Value]) -> ScriptResult<Value> {
    let (index, is_new) = interp.next_hook(HookKind::State)?;
    let reducer = arg(args, 0);
    if is_new {
        let init = arg(args, 2);
        let initial = if init.is_function() {
            interp.call(&init, &[arg(args, 1)])?
        } else {
            arg(args, 1)
        };
        let cell = Arc::new(StateCell::new(initial, Some(reducer)));
        let setter = make_setter(Arc::clone(&cell), interp.mount_signal());
        interp.push_hook(Hook::State { cell, setter });
    } else if let Some(Hook::State { cell, .. }) = interp.hook_mut(index) {
        *cell.reducer.lock() = Some(reducer);
    }
    Ok(state_pair(interp, index))
}

pub fn use_effect(interp: &mut Interpreter, args: &[Value]) -> ScriptResult<Value> {
    let (index, is_new) = interp.next_hook(HookKind::Effect)?;
    let create = arg(args, 0);
    let deps = deps_from(args.get(1));
    if is_new {
        interp.push_hook(Hook::Effect(EffectSlot {
            deps,
            cleanup: None,
            pending: Some(create),
        }));
    } else if let Some(Hook::Effect(slot)) = interp.hook_mut(index) {
        if deps_changed(&slot.deps, &deps) {
            slot.deps = deps;
            slot.pending = Some(create);
        }
    }
    Ok(Value::Undefined)
}

fn memoize(interp: &mut Interpreter, args: &[Value], compute: bool) -> ScriptResult<Value> {
    let (index, is_new) = interp.next_hook(HookKind::Memo)?;
    let deps = deps_from(args.get(1));
    let stale = match interp.hook_mut(index) {
        Some(Hook::Memo { deps: old, value }) if !deps_changed(old, &deps) => return Ok(value.clone()),
        Some(Hook::Memo { .. }) => true,
        _ => is_new,
    };
    let value = if compute {
        interp.call(&arg(args, 0), &[])?
    } else {
        arg(args, 0)
    };
    if stale && !is_new {
        if let Some(Hook::Memo { deps: old, value: slot }) = interp.hook_mut(index) {
            *old = deps;
            *slot = value.clone();
        }
    } else {
        interp.push_hook(Hook::Memo {
            deps,
            value: value.clone(),
        });
    }
    Ok(value)
}

pub fn use_memo(interp: &mut Interpreter, args: &[Value]) -> ScriptResult<Value> {
    memoize(interp, args, true)
}

pub fn use_callback(interp: &mut Interpreter, args: &[Value]) -> ScriptResult<Value> {
    memoize(interp, args, false)
}

pub fn use_ref(interp: &mut Interpreter, args: &[Value]) -> ScriptResult<Value> {
    let (index, is_new) = interp.next_hook(HookKind::Ref)?;
    if is_new {
        let object = interp.alloc_object(Object::with_props(vec![("current".to_string(), arg(args, 0))]));
        interp.push_hook(Hook::Ref(object));
    }
    Ok(match interp.hook_mut(index) {
        Some(Hook::Ref(object)) => object.clone(),
        _ => Value::Undefined,
    })
}

/// The hooks exposed on `React`, in the order the namespace lists them
pub fn hook_natives() -> Vec<(&'static str, Value)> {
    fn hook(name: &'static str, f: fn(&mut Interpreter, &[Value]) -> ScriptResult<Value>) -> (&'static str, Value) {
        (name, Value::Function(Function::native(name, f)))
    }
    vec![
        hook("useState", use_state),
        hook("useEffect", use_effect),
        hook("useLayoutEffect", use_effect),
        hook("useCallback", use_callback),
        hook("useMemo", use_memo),
        hook("useRef", use_ref),
        hook("useReducer", use_reducer),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::RuntimeLimits;

    fn frame(interp: &mut Interpreter, hooks: Vec<Hook>, mounting: bool, signal: &Arc<MountSignal>) {
        interp
            .render_stack
            .push(HookFrame::new(hooks, mounting, "Test".to_string(), Arc::downgrade(signal)));
    }

    fn finish(interp: &mut Interpreter) -> Vec<Hook> {
        interp.render_stack.pop().unwrap().hooks
    }

    fn pair(value: Value) -> (Value, Value) {
        match value {
            Value::Array(items) => {
                let items = items.lock();
                (items[0].clone(), items[1].clone())
            }
            other => panic!("Expected pair, got {:?}", other),
        }
    }

    #[test]
    fn test_hook_outside_render() {
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let err = use_state(&mut interp, &[Value::Number(0.0)]).unwrap_err();
        assert!(err.message.starts_with("Invalid hook call."));
    }

    #[test]
    fn test_state_persists_and_marks_dirty() {
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let signal = Arc::new(MountSignal::default());

        frame(&mut interp, Vec::new(), true, &signal);
        let (count, set_count) = pair(use_state(&mut interp, &[Value::Number(0.0)]).unwrap());
        assert_eq!(count, Value::Number(0.0));
        let hooks = finish(&mut interp);

        interp.call(&set_count, &[Value::Number(1.0)]).unwrap();
        assert!(signal.take_dirty());

        frame(&mut interp, hooks, false, &signal);
        let (count, _) = pair(use_state(&mut interp, &[Value::Number(0.0)]).unwrap());
        assert_eq!(count, Value::Number(1.0));
        finish(&mut interp);
    }

    #[test]
    fn test_same_value_update_bails_out() {
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let signal = Arc::new(MountSignal::default());
        frame(&mut interp, Vec::new(), true, &signal);
        let (_, set) = pair(use_state(&mut interp, &[Value::string("a")]).unwrap());
        finish(&mut interp);

        interp.call(&set, &[Value::string("a")]).unwrap();
        assert!(!signal.is_dirty());
    }

    #[test]
    fn test_setter_after_mount_dropped_is_ignored() {
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let signal = Arc::new(MountSignal::default());
        frame(&mut interp, Vec::new(), true, &signal);
        let (_, set) = pair(use_state(&mut interp, &[Value::Number(0.0)]).unwrap());
        let hooks = finish(&mut interp);
        drop(signal);

        assert_eq!(interp.call(&set, &[Value::Number(5.0)]).unwrap(), Value::Undefined);
        match &hooks[0] {
            Hook::State { cell, .. } => assert_eq!(cell.get(), Value::Number(0.0)),
            _ => panic!("Expected state hook"),
        }
    }

    #[test]
    fn test_extra_hook_on_update_is_an_error() {
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let signal = Arc::new(MountSignal::default());
        frame(&mut interp, Vec::new(), false, &signal);
        let err = use_ref(&mut interp, &[]).unwrap_err();
        assert_eq!(err.message, "Rendered more hooks than during the previous render.");
    }

    #[test]
    fn test_hook_order_change_detected() {
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let signal = Arc::new(MountSignal::default());
        frame(&mut interp, Vec::new(), true, &signal);
        use_ref(&mut interp, &[]).unwrap();
        let hooks = finish(&mut interp);

        frame(&mut interp, hooks, false, &signal);
        let err = use_state(&mut interp, &[]).unwrap_err();
        assert!(err.message.contains("change in the order of Hooks called by Test"));
    }

    #[test]
    fn test_effect_reschedules_only_on_dep_change() {
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let signal = Arc::new(MountSignal::default());
        let deps = || Value::array(vec![Value::Number(1.0)]);
        let effect = Value::Function(Function::native("effect", |_, _| Ok(Value::Undefined)));

        frame(&mut interp, Vec::new(), true, &signal);
        use_effect(&mut interp, &[effect.clone(), deps()]).unwrap();
        let mut hooks = finish(&mut interp);
        if let Hook::Effect(slot) = &mut hooks[0] {
            assert!(slot.pending.take().is_some());
        }

        frame(&mut interp, hooks, false, &signal);
        use_effect(&mut interp, &[effect, deps()]).unwrap();
        let hooks = finish(&mut interp);
        match &hooks[0] {
            Hook::Effect(slot) => assert!(slot.pending.is_none()),
            _ => panic!("Expected effect hook"),
        }
    }

    #[test]
    fn test_memo_recomputes_on_dep_change() {
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let signal = Arc::new(MountSignal::default());
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory = Value::Function(Function::native("factory", move |_, _| {
            Ok(Value::Number(counter.fetch_add(1, Ordering::SeqCst) as f64))
        }));

        let mut hooks = Vec::new();
        for (dep, mounting) in [(1.0, true), (1.0, false), (2.0, false)] {
            frame(&mut interp, hooks, mounting, &signal);
            use_memo(&mut interp, &[factory.clone(), Value::array(vec![Value::Number(dep)])]).unwrap();
            hooks = finish(&mut interp);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
