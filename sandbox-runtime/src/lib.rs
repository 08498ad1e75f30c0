//! Sandbox Runtime - the isolated side of the component sandbox
//!
//! This crate executes author code and mounts the resulting UI into an
//! in-memory document. It includes:
//!
//! - **Interpreter**: tree-walking evaluator for the component script language
//! - **Hooks**: `useState`, `useEffect` and friends, with per-instance state
//! - **Renderer**: turns element trees into document nodes, re-rendering on
//!   state updates
//! - **Scope**: the closed, ordered set of names author code can reach
//! - **Frame**: the execution runtime proper, with its error panel and anchor
//! - **Listener**: the message loop announcing readiness and serving
//!   `EXECUTE_CODE` requests
//!
//! ## Execution
//!
//! Every request starts from nothing: the previous mount is fully torn down
//! (effect cleanups run, nodes freed, script heap released) before the new
//! code is synthesized, invoked and mounted. Success is silent; any failure
//! is reported once as `EXECUTION_ERROR`.
//!
//! ## Example
//!
//! ```rust
//! use sandbox_runtime::Frame;
//!
//! let mut frame = Frame::standard();
//! frame.mark_ready();
//!
//! let outcome = frame.execute("function App() { return <Heading>Hi</Heading>; }");
//! assert!(outcome.is_success());
//! assert!(frame.rendered_html().contains("navds-heading"));
//! ```

pub mod abi;
pub mod builtins;
pub mod design_system;
pub mod dom;
pub mod env;
pub mod exception;
pub mod frame;
pub mod hooks;
pub mod interpreter;
pub mod listener;
pub mod render;
pub mod scope;
pub mod synth;
pub mod value;

pub use abi::{RuntimeError, RuntimeLimits, RuntimeResult};
pub use dom::{Document, NodeId};
pub use exception::{ErrorKind, Exception, ScriptResult};
pub use frame::{Event, Frame, FrameOptions, RuntimeState};
pub use interpreter::Interpreter;
pub use listener::{install, FrameListener};
pub use scope::Scope;
pub use value::{Function, Object, Value};
