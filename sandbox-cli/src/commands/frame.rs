//! Frame command implementation.
//!
//! Serves one execution runtime over stdio: each stdin line is a host
//! message, each stdout line a runtime message.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use sandbox_host::SandboxConfig;
use sandbox_runtime::{Frame, Scope};
use sandbox_types::{decode_line, encode_line, HostMessage};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn serve_frame(config_path: &Path) -> Result<()> {
    let config = SandboxConfig::load_or_default(config_path).context("Failed to load configuration")?;
    let (host_port, runtime_port) = sandbox_types::channel();
    let frame = Arc::new(Mutex::new(Frame::new(Scope::standard(), config.frame_options())));
    let mut listener = sandbox_runtime::install(frame, runtime_port).context("Failed to start runtime")?;

    let (to_runtime, mut from_runtime) = host_port.into_parts();
    // Dropped on stdin EOF so the listener drains its queue and stops
    let mut to_runtime = Some(to_runtime);
    // Split on raw bytes so one malformed line cannot end the session
    let mut lines = BufReader::new(tokio::io::stdin()).split(b'\n');
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_segment(), if to_runtime.is_some() => match line.context("Failed to read stdin")? {
                Some(bytes) => match String::from_utf8(bytes) {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => match decode_line::<HostMessage>(&line) {
                        Ok(message) => {
                            if let Some(tx) = &to_runtime {
                                if tx.send(message).is_err() {
                                    break;
                                }
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, "Ignoring message"),
                    },
                    Err(err) => tracing::warn!(error = %err, "Ignoring non-UTF-8 line"),
                },
                None => {
                    tracing::debug!("stdin closed");
                    to_runtime = None;
                }
            },
            reply = from_runtime.recv() => match reply {
                Some(reply) => {
                    stdout.write_all(encode_line(&reply)?.as_bytes()).await?;
                    stdout.flush().await?;
                }
                None => break,
            },
        }
    }

    listener.teardown();
    Ok(())
}
