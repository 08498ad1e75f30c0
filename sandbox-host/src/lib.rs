//! Sandbox Host - the editor side of the component sandbox
//!
//! The host keeps the author's source text, debounces edits, and sends the
//! latest text to an execution runtime once that runtime has announced it is
//! ready. Failures reported back are kept and forwarded to an optional hook;
//! they never affect the source or the timer.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sandbox_host::{spawn_in_process, SandboxConfig};
//!
//! # async fn demo() -> Result<(), sandbox_host::HostError> {
//! let sandbox = spawn_in_process("function App() { return null; }", &SandboxConfig::default())?;
//! sandbox.handle.edit("function App() { return <p>edited</p>; }");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;

pub use config::{ConfigError, SandboxConfig, DEFAULT_CONFIG_FILE};
pub use controller::{FailureHook, HostController, HostHandle, HostStatus};

use parking_lot::Mutex;
use sandbox_runtime::{Frame, FrameListener, RuntimeError, Scope};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] RuntimeError),
}

/// A host controller wired to a runtime on a thread of this process
pub struct InProcessSandbox {
    pub handle: HostHandle,
    pub listener: FrameListener,
}

impl InProcessSandbox {
    pub fn frame(&self) -> &Arc<Mutex<Frame>> {
        self.listener.frame()
    }
}

/// Start a runtime over the standard scope and a controller driving it
///
/// Must be called from within a tokio runtime.
pub fn spawn_in_process(source: impl Into<String>, config: &SandboxConfig) -> Result<InProcessSandbox, HostError> {
    let (host_port, runtime_port) = sandbox_types::channel();
    let frame = Arc::new(Mutex::new(Frame::new(Scope::standard(), config.frame_options())));
    let listener = sandbox_runtime::install(frame, runtime_port)?;
    let handle = HostController::new(host_port, source)
        .quiet_period(config.quiet_period())
        .spawn();
    Ok(InProcessSandbox { handle, listener })
}
