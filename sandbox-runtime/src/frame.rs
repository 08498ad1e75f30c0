//! The execution runtime: an isolated document plus the code mounted in it
//!
//! A [`Frame`] owns its own [`Document`] laid out like the preview page: a
//! container holding the error panel (when a failure is shown) followed by
//! the anchor element code is mounted into. Every execution starts from a
//! clean slate: the panel is removed, the previous mount is torn down with
//! its effect cleanups, and a fresh interpreter runs the new code.

use crate::abi::{RuntimeError, RuntimeLimits, RuntimeResult};
use crate::dom::{Document, NodeId};
use crate::exception::{panic_message, ErrorKind, Exception};
use crate::interpreter::Interpreter;
use crate::render::Mount;
use crate::scope::Scope;
use crate::synth;
use crate::value::{Function, Object, Value};
use sandbox_types::{ExecutionOutcome, Failure, DEFAULT_ANCHOR_ID};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

const CONTAINER_STYLE: &str = "width:100%;height:100%;overflow:auto";
const ERROR_PANEL_STYLE: &str =
    "padding:20px;background:#fee;color:#c00;font-family:monospace;white-space:pre-wrap";

/// Frame configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameOptions {
    /// Id of the element code is mounted into (default: `preview-root`)
    pub anchor_id: String,
    pub limits: RuntimeLimits,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            anchor_id: DEFAULT_ANCHOR_ID.to_string(),
            limits: RuntimeLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Ready,
    Executing,
}

/// A DOM event to deliver to mounted listeners
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Lower-case event type, e.g. `click` or `change`
    pub kind: String,
    /// New `target.value`, for input events
    pub value: Option<String>,
    /// New `target.checked`, for checkbox events
    pub checked: Option<bool>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: None,
            checked: None,
        }
    }

    pub fn click() -> Self {
        Self::new("click")
    }

    /// A `change` event carrying the control's new value
    pub fn change(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::new("change")
        }
    }

    pub fn toggle(checked: bool) -> Self {
        Self {
            checked: Some(checked),
            ..Self::new("change")
        }
    }
}

/// Code currently mounted at the anchor
struct Session {
    interp: Interpreter,
    mount: Mount,
    anchor: NodeId,
}

pub struct Frame {
    scope: Scope,
    options: FrameOptions,
    state: RuntimeState,
    document: Document,
    container: NodeId,
    error_panel: Option<NodeId>,
    failure: Option<Failure>,
    session: Option<Session>,
}

impl Frame {
    pub fn new(scope: Scope, options: FrameOptions) -> Self {
        let mut document = Document::new();
        let container = document.create_element("div");
        document.set_attribute(container, "style", CONTAINER_STYLE);
        document.append_child(document.body(), container);
        let anchor = document.create_element("div");
        document.set_attribute(anchor, "id", &options.anchor_id);
        document.append_child(container, anchor);

        Self {
            scope,
            options,
            state: RuntimeState::Uninitialized,
            document,
            container,
            error_panel: None,
            failure: None,
            session: None,
        }
    }

    /// Frame over the standard scope with default options
    pub fn standard() -> Self {
        Self::new(Scope::standard(), FrameOptions::default())
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Move out of `Uninitialized`; returns whether this call did so
    pub fn mark_ready(&mut self) -> bool {
        if self.state == RuntimeState::Uninitialized {
            self.state = RuntimeState::Ready;
            true
        } else {
            false
        }
    }

    /// Run `code` and mount its `App` at the anchor
    ///
    /// Returns the failure to report, if any. A missing anchor is not a
    /// failure: the request is dropped after tearing down the old mount.
    pub fn execute(&mut self, code: &str) -> ExecutionOutcome {
        if self.state == RuntimeState::Uninitialized {
            tracing::debug!("Executing before the frame announced readiness");
        }
        self.state = RuntimeState::Executing;
        self.clear_error();
        self.unmount();

        let outcome = match self.anchor() {
            None => {
                tracing::debug!(anchor = %self.options.anchor_id, "Anchor not found, skipping execution");
                ExecutionOutcome::Success
            }
            Some(anchor) => match self.mount_contained(code, anchor) {
                Ok(session) => {
                    tracing::debug!(instances = session.mount.instance_count(), "Mounted");
                    self.session = Some(session);
                    ExecutionOutcome::Success
                }
                Err(exception) => {
                    tracing::debug!(error = %exception, "Execution failed");
                    let failure = Failure::from(exception);
                    self.show_error(&failure);
                    ExecutionOutcome::Failure(failure)
                }
            },
        };
        self.state = RuntimeState::Ready;
        outcome
    }

    /// [`Frame::mount`], turning a panic into an ordinary failure
    fn mount_contained(&mut self, code: &str, anchor: NodeId) -> Result<Session, Exception> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.mount(code, anchor))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(panic = %message, "Execution panicked");
                self.document.clear_children(anchor);
                Err(Exception::new(ErrorKind::Error, format!("Internal error: {}", message)))
            }
        }
    }

    fn mount(&mut self, code: &str, anchor: NodeId) -> Result<Session, Exception> {
        let limits = self.options.limits.clone();
        if code.len() > limits.max_source_bytes {
            let err = RuntimeError::SourceTooLarge {
                size: code.len(),
                limit: limits.max_source_bytes,
            };
            return Err(Exception::new(ErrorKind::RangeError, err.to_string()));
        }
        let unit = synth::synthesize_nested(code, limits.max_nesting_depth)?;

        let mut interp = Interpreter::new(limits);
        let root = synth::invoke(&mut interp, &self.scope, &unit)
            .and_then(|entry| interp.element_kind(&entry))
            .map(|kind| interp.alloc_element(kind, Object::new(), None));
        let root = match root {
            Ok(root) => root,
            Err(err) => {
                interp.dispose();
                return Err(err);
            }
        };

        let mut mount = Mount::new(root);
        if let Err(err) = mount.render(&mut interp, &mut self.document, anchor) {
            mount.unmount(&mut interp);
            self.document.clear_children(anchor);
            interp.dispose();
            return Err(err);
        }
        Ok(Session { interp, mount, anchor })
    }

    /// Tear down whatever is mounted: effect cleanups, nodes, script heap
    pub fn unmount(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.mount.unmount(&mut session.interp);
        self.document.clear_children(session.anchor);
        session.interp.dispose();
    }

    /// Deliver `event` to `target` and bubble it up to the anchor
    ///
    /// State updates made by the listeners are rendered before returning. A
    /// failure while handling the event unmounts the tree and shows the
    /// error panel, like a failed execution.
    pub fn dispatch_event(&mut self, target: NodeId, event: Event) -> RuntimeResult<ExecutionOutcome> {
        if !self.document.contains(target) {
            return Err(RuntimeError::NodeNotFound(target));
        }
        let mut session = self.session.take().ok_or(RuntimeError::NotMounted)?;
        let path: Vec<NodeId> = self.document.ancestors(target);
        if !path.contains(&session.anchor) {
            self.session = Some(session);
            return Err(RuntimeError::NodeNotFound(target));
        }

        if let Some(value) = &event.value {
            self.document.set_attribute(target, "value", value);
        }
        match self.deliver(&mut session, target, &path, &event) {
            Ok(()) => {
                self.session = Some(session);
                Ok(ExecutionOutcome::Success)
            }
            Err(exception) => {
                tracing::debug!(error = %exception, event = %event.kind, "Update failed");
                self.session = Some(session);
                self.unmount();
                let failure = Failure::from(exception);
                self.show_error(&failure);
                Ok(ExecutionOutcome::Failure(failure))
            }
        }
    }

    fn deliver(&mut self, session: &mut Session, target: NodeId, path: &[NodeId], event: &Event) -> Result<(), Exception> {
        let stopped = Arc::new(AtomicBool::new(false));
        let event_object = event_object(&mut session.interp, event, &stopped);
        for &node in path {
            for handler in self.document.listeners(node, &event.kind) {
                session.interp.call(&handler, std::slice::from_ref(&event_object))?;
            }
            if node == session.anchor || stopped.load(Ordering::Relaxed) {
                break;
            }
        }
        tracing::trace!(target_node = target, event = %event.kind, "Event delivered");
        if session.mount.is_dirty() {
            session.mount.render(&mut session.interp, &mut self.document, session.anchor)?;
        }
        Ok(())
    }

    fn show_error(&mut self, failure: &Failure) {
        let panel = self.document.create_element("div");
        self.document.set_attribute(panel, "style", ERROR_PANEL_STYLE);
        let strong = self.document.create_element("strong");
        let label = self.document.create_text("Error:");
        self.document.append_child(strong, label);
        self.document.append_child(panel, strong);
        let br = self.document.create_element("br");
        self.document.append_child(panel, br);
        let message = self.document.create_text(&failure.message);
        self.document.append_child(panel, message);

        let first = self.document.children(self.container).first().copied();
        self.document.insert_before(self.container, panel, first);
        self.error_panel = Some(panel);
        self.failure = Some(failure.clone());
    }

    fn clear_error(&mut self) {
        if let Some(panel) = self.error_panel.take() {
            self.document.remove(panel);
        }
        self.failure = None;
    }

    pub fn anchor(&self) -> Option<NodeId> {
        self.document.get_element_by_id(&self.options.anchor_id)
    }

    /// Markup currently mounted under the anchor
    pub fn rendered_html(&self) -> String {
        self.anchor()
            .map(|anchor| self.document.inner_html(anchor))
            .unwrap_or_default()
    }

    /// Markup of the whole page, error panel included
    pub fn page_html(&self) -> String {
        self.document.inner_html(self.document.body())
    }

    /// Failure shown in the error panel, if any
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Objects, arrays and environments alive in the mounted session's heap
    pub fn heap_size(&self) -> usize {
        self.session
            .as_ref()
            .map(|session| session.interp.realm().live_count())
            .unwrap_or(0)
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// The synthetic event object handed to listeners
fn event_object(interp: &mut Interpreter, event: &Event, stopped: &Arc<AtomicBool>) -> Value {
    let mut target = Object::new();
    if let Some(value) = &event.value {
        target.set("value", Value::string(value));
    }
    if let Some(checked) = event.checked {
        target.set("checked", Value::Bool(checked));
    }
    let target = interp.alloc_object(target);

    let stop = Arc::clone(stopped);
    let stop_propagation = Function::native("stopPropagation", move |_, _| {
        stop.store(true, Ordering::Relaxed);
        Ok(Value::Undefined)
    });
    let prevent_default = Function::native("preventDefault", |_, _| Ok(Value::Undefined));
    interp.alloc_object(Object::with_props(vec![
        ("type".to_string(), Value::string(&event.kind)),
        ("target".to_string(), target.clone()),
        ("currentTarget".to_string(), target),
        ("stopPropagation".to_string(), Value::Function(stop_propagation)),
        ("preventDefault".to_string(), Value::Function(prevent_default)),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_layout() {
        let frame = Frame::standard();
        assert_eq!(frame.state(), RuntimeState::Uninitialized);
        assert_eq!(
            frame.page_html(),
            "<div style=\"width:100%;height:100%;overflow:auto\"><div id=\"preview-root\"></div></div>"
        );
    }

    #[test]
    fn test_mark_ready_once() {
        let mut frame = Frame::standard();
        assert!(frame.mark_ready());
        assert!(!frame.mark_ready());
        assert_eq!(frame.state(), RuntimeState::Ready);
    }

    #[test]
    fn test_source_limit() {
        let mut frame = Frame::new(
            Scope::standard(),
            FrameOptions {
                limits: RuntimeLimits {
                    max_source_bytes: 16,
                    ..RuntimeLimits::default()
                },
                ..FrameOptions::default()
            },
        );
        let outcome = frame.execute("function App() { return null; }");
        let failure = outcome.failure().unwrap();
        assert!(failure.message.starts_with("Source too large"), "{}", failure.message);
    }

    #[test]
    fn test_error_panel_replaced_on_next_run() {
        let mut frame = Frame::standard();
        frame.execute("function App() { return missing; }");
        assert_eq!(frame.failure().map(|f| f.message.as_str()), Some("missing is not defined"));
        assert!(frame.page_html().contains("<strong>Error:</strong><br>missing is not defined"));

        frame.execute("function App() { return <p>ok</p>; }");
        assert!(frame.failure().is_none());
        assert!(!frame.page_html().contains("Error:"));
        assert_eq!(frame.rendered_html(), "<p>ok</p>");
    }

    #[test]
    fn test_dispatch_without_mount() {
        let mut frame = Frame::standard();
        let anchor = frame.anchor().unwrap();
        assert!(matches!(
            frame.dispatch_event(anchor, Event::click()),
            Err(RuntimeError::NotMounted)
        ));
        assert!(matches!(
            frame.dispatch_event(9999, Event::click()),
            Err(RuntimeError::NodeNotFound(9999))
        ));
    }
}
