//! Message listener connecting a [`Frame`] to its host
//!
//! The listener runs on a dedicated thread with its own single-threaded
//! tokio runtime, since script evaluation recurses deeply and never yields.
//! Right after it starts it announces `FRAME_READY`; from then on every
//! `EXECUTE_CODE` runs to completion before the next message is read.

use crate::abi::RuntimeResult;
use crate::exception::panic_message;
use crate::frame::Frame;
use parking_lot::Mutex;
use sandbox_types::{ExecutionOutcome, Failure, HostMessage, RuntimeMessage, RuntimePort};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;

const THREAD_NAME: &str = "sandbox-frame";
/// Stack size for threads that evaluate scripts
pub const THREAD_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Guard for an installed listener; dropping it stops the listener
pub struct FrameListener {
    frame: Arc<Mutex<Frame>>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// Start listening for host messages on `port`
pub fn install(frame: Arc<Mutex<Frame>>, port: RuntimePort) -> RuntimeResult<FrameListener> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let thread = std::thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .stack_size(THREAD_STACK_SIZE)
        .spawn({
            let frame = Arc::clone(&frame);
            move || runtime.block_on(listen(frame, port, shutdown_rx))
        })?;

    Ok(FrameListener {
        frame,
        shutdown: Some(shutdown_tx),
        thread: Some(thread),
    })
}

async fn listen(frame: Arc<Mutex<Frame>>, mut port: RuntimePort, mut shutdown: oneshot::Receiver<()>) {
    if frame.lock().mark_ready() {
        if port.send(RuntimeMessage::FrameReady).is_err() {
            tracing::debug!("Host went away before the frame became ready");
            return;
        }
        tracing::debug!("Frame ready");
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            message = port.recv() => {
                let Some(message) = message else {
                    tracing::debug!("Host channel closed");
                    break;
                };
                match message {
                    HostMessage::ExecuteCode { code } => {
                        tracing::debug!(bytes = code.len(), "Executing code");
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| frame.lock().execute(&code)))
                            .unwrap_or_else(|payload| {
                                let message = panic_message(payload.as_ref());
                                tracing::error!(panic = %message, "Frame panicked");
                                ExecutionOutcome::Failure(Failure::new(format!("Internal error: {}", message)))
                            });
                        if let Some(reply) = outcome.into_message() {
                            if port.send(reply).is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
    tracing::debug!("Frame listener stopped");
}

impl FrameListener {
    pub fn frame(&self) -> &Arc<Mutex<Frame>> {
        &self.frame
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// Stop listening and wait for the listener thread to exit
    pub fn teardown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Frame listener thread panicked");
            }
        }
    }
}

impl Drop for FrameListener {
    fn drop(&mut self) {
        self.teardown();
    }
}
