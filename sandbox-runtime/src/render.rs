//! Rendering element trees into the document
//!
//! A [`Mount`] owns the component instances of one mounted root. Every pass
//! renders the whole tree from the root, commits the resulting nodes under
//! the anchor in one go, then runs the effects scheduled by that pass.
//! Instances are identified by their position in the tree (keys and
//! indices) plus the component function, so state survives re-renders as
//! long as the tree shape does.

use crate::dom::{style_to_css, Document, NodeId};
use crate::exception::{ErrorKind, Exception, ScriptResult};
use crate::hooks::{Hook, HookFrame, MountSignal};
use crate::interpreter::Interpreter;
use crate::value::{format_number, Element, ElementKind, Function, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const TOO_MANY_RENDERS: &str =
    "Too many re-renders. React limits the number of renders to prevent an infinite loop.";

const MAX_UPDATE_DEPTH: &str = "Maximum update depth exceeded. This can happen when a component \
     calls setState inside useEffect, but useEffect either doesn't have a dependency array, or one \
     of the dependencies changes on every render.";

/// Node produced by a render pass, before it is committed
enum VNode {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        listeners: Vec<(String, Value)>,
        children: Vec<VNode>,
    },
    Text(String),
}

struct Instance {
    hooks: Vec<Hook>,
}

#[derive(Default)]
struct Pass {
    visited: HashSet<String>,
    /// Instances in post-order: children before parents
    order: Vec<String>,
}

pub struct Mount {
    root: Value,
    instances: HashMap<String, Instance>,
    order: Vec<String>,
    signal: Arc<MountSignal>,
}

impl Mount {
    pub fn new(root: Value) -> Self {
        Self {
            root,
            instances: HashMap::new(),
            order: Vec::new(),
            signal: Arc::new(MountSignal::default()),
        }
    }

    /// Whether a state update is waiting to be rendered
    pub fn is_dirty(&self) -> bool {
        self.signal.is_dirty()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Render until no state update is pending
    pub fn render(&mut self, interp: &mut Interpreter, doc: &mut Document, anchor: NodeId) -> ScriptResult<()> {
        let max_passes = interp.limits().max_render_passes;
        let mut passes = 0;
        loop {
            if passes >= max_passes {
                return Err(interp.error(ErrorKind::Error, TOO_MANY_RENDERS));
            }
            passes += 1;
            self.signal.take_dirty();

            let mut pass = Pass::default();
            let mut nodes = Vec::new();
            let root = self.root.clone();
            self.render_value(interp, &root, "", &mut nodes, &mut pass)?;
            let dirty_during_render = self.signal.is_dirty();

            self.unmount_unvisited(interp, &pass.visited)?;
            commit(doc, anchor, nodes);
            self.order = pass.order;
            self.run_effects(interp)?;

            if !self.signal.is_dirty() {
                tracing::debug!(passes, instances = self.instances.len(), "Render committed");
                return Ok(());
            }
            if passes >= max_passes && !dirty_during_render {
                return Err(interp.error(ErrorKind::Error, MAX_UPDATE_DEPTH));
            }
        }
    }

    /// Run every effect cleanup and retire all instances
    ///
    /// Errors thrown by cleanups are logged and otherwise ignored; the mount
    /// is gone either way.
    pub fn unmount(&mut self, interp: &mut Interpreter) {
        let mut ids: Vec<String> = self.order.drain(..).rev().collect();
        let mut leftovers: Vec<String> = self
            .instances
            .keys()
            .filter(|id| !ids.contains(id))
            .cloned()
            .collect();
        leftovers.sort();
        ids.extend(leftovers);
        for id in ids {
            if let Some(instance) = self.instances.remove(&id) {
                if let Err(err) = retire(interp, instance) {
                    tracing::warn!(error = %err, "Effect cleanup failed during unmount");
                }
            }
        }
    }

    fn render_value(
        &mut self,
        interp: &mut Interpreter,
        value: &Value,
        path: &str,
        out: &mut Vec<VNode>,
        pass: &mut Pass,
    ) -> ScriptResult<()> {
        match value {
            Value::Undefined | Value::Null | Value::Bool(_) => Ok(()),
            Value::String(text) => {
                out.push(VNode::Text(text.clone()));
                Ok(())
            }
            Value::Number(n) => {
                out.push(VNode::Text(format_number(*n)));
                Ok(())
            }
            Value::Array(items) => {
                let items = items.lock().clone();
                for (i, item) in items.iter().enumerate() {
                    let segment = match item {
                        Value::Element(element) => match &element.key {
                            Some(key) => format!("{}/k:{}", path, key),
                            None => format!("{}/{}", path, i),
                        },
                        _ => format!("{}/{}", path, i),
                    };
                    self.render_value(interp, item, &segment, out, pass)?;
                }
                Ok(())
            }
            Value::Element(element) => self.render_element(interp, element, path, out, pass),
            Value::Function(func) => {
                tracing::warn!(
                    function = func.display_name(),
                    "Functions are not valid as a React child"
                );
                Ok(())
            }
            Value::Object(object) => {
                let keys = object.lock().keys().collect::<Vec<_>>().join(", ");
                Err(interp.error(
                    ErrorKind::Error,
                    format!(
                        "Objects are not valid as a React child (found: object with keys {{{}}}). \
                         If you meant to render a collection of children, use an array instead.",
                        keys
                    ),
                ))
            }
        }
    }

    fn render_element(
        &mut self,
        interp: &mut Interpreter,
        element: &Arc<Element>,
        path: &str,
        out: &mut Vec<VNode>,
        pass: &mut Pass,
    ) -> ScriptResult<()> {
        match &element.kind {
            ElementKind::Fragment => {
                let children = element.prop("children").unwrap_or(Value::Undefined);
                self.render_value(interp, &children, &format!("{}/#fragment", path), out, pass)
            }
            ElementKind::Host(tag) => {
                let path = format!("{}/{}", path, tag);
                let props = element.props.lock().entries().to_vec();
                let mut attributes = Vec::new();
                let mut listeners = Vec::new();
                let mut children_value = Value::Undefined;
                for (name, value) in props {
                    match name.as_str() {
                        "children" => children_value = value,
                        "ref" | "key" | "dangerouslySetInnerHTML" | "suppressHydrationWarning" => {}
                        _ => {
                            if let Some(event) = event_name(&name) {
                                if value.is_function() {
                                    listeners.push((event, value));
                                }
                                continue;
                            }
                            if let Some(attribute) = host_attribute(&name, &value) {
                                attributes.push(attribute);
                            }
                        }
                    }
                }
                let mut children = Vec::new();
                self.render_value(interp, &children_value, &path, &mut children, pass)?;
                out.push(VNode::Element {
                    tag: tag.clone(),
                    attributes,
                    listeners,
                    children,
                });
                Ok(())
            }
            ElementKind::Component(func) => self.render_component(interp, element, func, path, out, pass),
        }
    }

    fn render_component(
        &mut self,
        interp: &mut Interpreter,
        element: &Arc<Element>,
        func: &Arc<Function>,
        path: &str,
        out: &mut Vec<VNode>,
        pass: &mut Pass,
    ) -> ScriptResult<()> {
        let base = format!("{}/{}@{:p}", path, func.display_name(), Arc::as_ptr(func));
        let mut id = base.clone();
        let mut duplicates = 1;
        while !pass.visited.insert(id.clone()) {
            duplicates += 1;
            id = format!("{}~{}", base, duplicates);
        }
        if duplicates > 1 {
            tracing::warn!(component = func.display_name(), "Encountered two children with the same key");
        }

        let (hooks, mounting) = match self.instances.remove(&id) {
            Some(instance) => (instance.hooks, false),
            None => (Vec::new(), true),
        };
        interp.render_stack.push(HookFrame::new(
            hooks,
            mounting,
            func.display_name().to_string(),
            Arc::downgrade(&self.signal),
        ));
        let result = interp.call_function(func, &[Value::Object(Arc::clone(&element.props))]);
        let frame = interp.render_stack.pop();
        let (hooks, cursor) = frame.map(|f| (f.hooks, f.cursor)).unwrap_or_default();
        let short = !mounting && cursor < hooks.len();
        self.instances.insert(id.clone(), Instance { hooks });

        let rendered = result?;
        if short {
            return Err(interp.error(
                ErrorKind::Error,
                "Rendered fewer hooks than expected. This may be caused by an accidental early return statement.",
            ));
        }
        self.render_value(interp, &rendered, &id, out, pass)?;
        pass.order.push(id);
        Ok(())
    }

    fn unmount_unvisited(&mut self, interp: &mut Interpreter, visited: &HashSet<String>) -> ScriptResult<()> {
        let mut stale: Vec<String> = self
            .instances
            .keys()
            .filter(|id| !visited.contains(*id))
            .cloned()
            .collect();
        stale.sort();
        for id in stale {
            if let Some(instance) = self.instances.remove(&id) {
                retire(interp, instance)?;
            }
        }
        Ok(())
    }

    /// Run effects scheduled by the last pass: all cleanups first, then the effects
    fn run_effects(&mut self, interp: &mut Interpreter) -> ScriptResult<()> {
        let mut scheduled = Vec::new();
        for id in &self.order {
            let Some(instance) = self.instances.get_mut(id) else {
                continue;
            };
            for (index, hook) in instance.hooks.iter_mut().enumerate() {
                if let Hook::Effect(slot) = hook {
                    if let Some(create) = slot.pending.take() {
                        scheduled.push((id.clone(), index, create, slot.cleanup.take()));
                    }
                }
            }
        }

        for (_, _, _, cleanup) in &scheduled {
            if let Some(cleanup) = cleanup {
                interp.call(cleanup, &[])?;
            }
        }
        for (id, index, create, _) in scheduled {
            let result = interp.call(&create, &[])?;
            if result.is_function() {
                if let Some(Hook::Effect(slot)) = self
                    .instances
                    .get_mut(&id)
                    .and_then(|instance| instance.hooks.get_mut(index))
                {
                    slot.cleanup = Some(result);
                }
            }
        }
        Ok(())
    }
}

/// Run an instance's effect cleanups and kill its state cells
fn retire(interp: &mut Interpreter, instance: Instance) -> ScriptResult<()> {
    let mut first_error: Option<Exception> = None;
    for hook in instance.hooks {
        match hook {
            Hook::Effect(slot) => {
                if let Some(cleanup) = slot.cleanup {
                    if let Err(err) = interp.call(&cleanup, &[]) {
                        first_error.get_or_insert(err);
                    }
                }
            }
            Hook::State { cell, .. } => cell.kill(),
            Hook::Memo { .. } | Hook::Ref(_) => {}
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// `onClick` → `click`
fn event_name(prop: &str) -> Option<String> {
    let rest = prop.strip_prefix("on")?;
    if !rest.starts_with(|c: char| c.is_ascii_uppercase()) {
        return None;
    }
    Some(rest.to_ascii_lowercase())
}

/// DOM attribute for a host prop, if it renders one
fn host_attribute(name: &str, value: &Value) -> Option<(String, String)> {
    let attribute = match name {
        "className" => "class",
        "htmlFor" => "for",
        "tabIndex" => "tabindex",
        "readOnly" => "readonly",
        "autoFocus" => "autofocus",
        "defaultValue" => "value",
        "defaultChecked" => "checked",
        other => other,
    };
    let stringly = attribute.starts_with("aria-") || attribute.starts_with("data-");
    let rendered = match value {
        Value::Undefined | Value::Null | Value::Function(_) => return None,
        Value::Bool(b) if stringly => b.to_string(),
        Value::Bool(true) => String::new(),
        Value::Bool(false) => return None,
        Value::Object(style) if attribute == "style" => {
            let css = style_to_css(&style.lock());
            if css.is_empty() {
                return None;
            }
            css
        }
        other => other.to_js_string(),
    };
    Some((attribute.to_string(), rendered))
}

/// Replace everything under `anchor` with freshly built nodes
fn commit(doc: &mut Document, anchor: NodeId, nodes: Vec<VNode>) {
    doc.clear_children(anchor);
    for node in nodes {
        build(doc, anchor, node);
    }
}

fn build(doc: &mut Document, parent: NodeId, node: VNode) {
    match node {
        VNode::Text(text) => {
            let id = doc.create_text(&text);
            doc.append_child(parent, id);
        }
        VNode::Element {
            tag,
            attributes,
            listeners,
            children,
        } => {
            let id = doc.create_element(&tag);
            for (name, value) in &attributes {
                doc.set_attribute(id, name, value);
            }
            for (event, handler) in listeners {
                doc.add_listener(id, &event, handler);
            }
            doc.append_child(parent, id);
            for child in children {
                build(doc, id, child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(event_name("onClick").as_deref(), Some("click"));
        assert_eq!(event_name("onMouseEnter").as_deref(), Some("mouseenter"));
        assert_eq!(event_name("one"), None);
        assert_eq!(event_name("on"), None);
    }

    #[test]
    fn test_host_attributes() {
        assert_eq!(
            host_attribute("className", &Value::string("box")),
            Some(("class".to_string(), "box".to_string()))
        );
        assert_eq!(
            host_attribute("disabled", &Value::Bool(true)),
            Some(("disabled".to_string(), String::new()))
        );
        assert_eq!(host_attribute("disabled", &Value::Bool(false)), None);
        assert_eq!(
            host_attribute("aria-hidden", &Value::Bool(false)),
            Some(("aria-hidden".to_string(), "false".to_string()))
        );
        assert_eq!(
            host_attribute("tabIndex", &Value::Number(0.0)),
            Some(("tabindex".to_string(), "0".to_string()))
        );
    }
}
