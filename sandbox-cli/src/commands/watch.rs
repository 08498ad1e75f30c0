//! Watch command implementation.

use anyhow::{anyhow, Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use sandbox_host::{HostController, HostHandle, SandboxConfig};
use sandbox_runtime::{Frame, FrameListener, Scope};
use sandbox_types::{decode_line, encode_line, Failure, RuntimeMessage, RuntimePort};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

pub struct WatchOptions {
    pub file: Option<PathBuf>,
    pub in_process: bool,
    pub verbose: bool,
}

/// Keeps the runtime side alive while watching
enum Runtime {
    Process(Child),
    Thread(FrameListener),
}

/// One runtime and the controller driving it
struct Session {
    handle: HostHandle,
    runtime: Runtime,
}

impl Session {
    fn start(config_path: &Path, config: &SandboxConfig, opts: &WatchOptions, source: String) -> Result<Self> {
        let (host_port, runtime_port) = sandbox_types::channel();
        let runtime = if opts.in_process {
            let frame = Arc::new(Mutex::new(Frame::new(Scope::standard(), config.frame_options())));
            Runtime::Thread(sandbox_runtime::install(frame, runtime_port).context("Failed to start runtime")?)
        } else {
            Runtime::Process(spawn_frame_process(config_path, opts.verbose, runtime_port)?)
        };
        let handle = HostController::new(host_port, source)
            .quiet_period(config.quiet_period())
            .on_failure(report_failure)
            .spawn();
        Ok(Self { handle, runtime })
    }

    async fn stop(self) {
        self.handle.shutdown().await;
        match self.runtime {
            Runtime::Process(mut child) => {
                if let Err(err) = child.kill().await {
                    tracing::debug!("Frame process already gone: {}", err);
                }
            }
            Runtime::Thread(mut listener) => listener.teardown(),
        }
    }
}

pub async fn watch_file(config_path: &Path, opts: WatchOptions) -> Result<()> {
    let config = SandboxConfig::load_or_default(config_path).context("Failed to load configuration")?;
    let file = opts
        .file
        .clone()
        .or_else(|| config.source_path())
        .ok_or_else(|| anyhow!("No component file given and no `source` set in {:?}", config_path))?;
    let source = std::fs::read_to_string(&file).with_context(|| format!("Failed to read {:?}", file))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )
    .context("Failed to initialize watcher")?;
    let dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {:?}", dir))?;

    let mut session = Session::start(config_path, &config, &opts, source.clone())?;
    let mut last = source;
    println!("Watching {:?} (Ctrl+C to stop)...", file);

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                break Ok(());
            }
            _ = session.handle.closed() => {
                // A runtime that never got ready would fail the same way again
                if !session.handle.is_ready() {
                    break Err(anyhow!("Runtime exited before it was ready"));
                }
                eprintln!("Runtime exited, restarting...");
                let text = session.handle.source();
                session.stop().await;
                session = Session::start(config_path, &config, &opts, text)?;
                continue;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    break Ok(());
                };
                match event {
                    Ok(ev) => {
                        if !matches!(ev.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                            continue;
                        }
                        if !ev.paths.iter().any(|path| path.file_name() == file.file_name()) {
                            continue;
                        }
                        match std::fs::read_to_string(&file) {
                            Ok(text) if text != last => {
                                tracing::debug!(bytes = text.len(), "Source changed");
                                last = text.clone();
                                session.handle.edit(text);
                            }
                            Ok(_) => {}
                            Err(err) => tracing::warn!("Failed to read {:?}: {}", file, err),
                        }
                    }
                    Err(err) => eprintln!("Watcher error: {err}"),
                }
            }
        }
    };

    session.stop().await;
    result
}

fn report_failure(failure: &Failure) {
    eprintln!("Error: {}", failure.message);
    if let Some(stack) = &failure.stack {
        tracing::debug!("{}", stack);
    }
}

/// Run `sandbox frame` as a child and bridge its stdio to `port`
fn spawn_frame_process(config_path: &Path, verbose: bool, port: RuntimePort) -> Result<Child> {
    let exe = std::env::current_exe().context("Failed to locate the sandbox executable")?;
    let mut command = Command::new(exe);
    command.arg("--config").arg(config_path);
    if verbose {
        command.arg("--verbose");
    }
    command
        .arg("frame")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = command.spawn().context("Failed to start frame process")?;
    let mut stdin = child.stdin.take().ok_or_else(|| anyhow!("Frame process has no stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| anyhow!("Frame process has no stdout"))?;
    let (to_host, mut from_host) = port.into_parts();

    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match decode_line::<RuntimeMessage>(&line) {
                    Ok(message) => {
                        if to_host.send(message).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "Ignoring frame output"),
                },
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!("Failed to read frame output: {}", err);
                    break;
                }
            }
        }
        tracing::debug!("Frame process output closed");
    });

    tokio::spawn(async move {
        while let Some(message) = from_host.recv().await {
            let line = match encode_line(&message) {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to encode message");
                    continue;
                }
            };
            if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
                tracing::warn!("Frame process stopped accepting input");
                break;
            }
        }
    });

    Ok(child)
}
