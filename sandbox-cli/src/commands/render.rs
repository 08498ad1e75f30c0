//! Render command implementation.

use anyhow::{anyhow, Context, Result};
use sandbox_host::SandboxConfig;
use sandbox_runtime::listener::THREAD_STACK_SIZE;
use sandbox_runtime::{Frame, Scope};
use sandbox_types::ExecutionOutcome;
use std::fs;
use std::path::Path;

/// Execute `file` once and print the markup it mounts
pub fn render_file(config_path: &Path, file: &Path, page: bool) -> Result<()> {
    let config = SandboxConfig::load_or_default(config_path).context("Failed to load configuration")?;
    let code = fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let options = config.frame_options();

    let (outcome, html) = std::thread::Builder::new()
        .name("sandbox-render".to_string())
        .stack_size(THREAD_STACK_SIZE)
        .spawn(move || {
            let mut frame = Frame::new(Scope::standard(), options);
            frame.mark_ready();
            let outcome = frame.execute(&code);
            let html = if page {
                frame.page_html()
            } else {
                frame.rendered_html()
            };
            (outcome, html)
        })
        .context("Failed to spawn render thread")?
        .join()
        .map_err(|_| anyhow!("Render thread panicked"))?;

    if page || outcome.is_success() {
        println!("{}", html);
    }

    match outcome {
        ExecutionOutcome::Success => Ok(()),
        ExecutionOutcome::Failure(failure) => {
            if let Some(stack) = &failure.stack {
                tracing::debug!("{}", stack);
            }
            Err(anyhow!("{}", failure.message))
        }
    }
}
