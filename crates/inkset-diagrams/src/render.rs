//! The rendering backend seam.
//!
//! The pipeline only needs "diagram source in, SVG text out". [`Renderer`] is
//! that contract; [`CommandRenderer`] fulfils it by running an external
//! program that reads the source on stdin and writes SVG to stdout.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::consts::RENDER_OPTIONS_ENV;

/// Future returned by [`Renderer::render`].
pub type RenderFuture = Pin<Box<dyn Future<Output = Result<String, RenderError>> + Send>>;

/// Options forwarded to every render call.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Let the backend print its own diagnostics.
    pub verbose: bool,
    /// Backend-specific options, passed through untouched.
    pub extra: toml::Table,
}

/// Error from a single render attempt.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("renderer failed ({status}): {stderr}")]
    Exit { status: ExitStatus, stderr: String },
    #[error("renderer produced no output")]
    Empty,
    #[error("invalid renderer options: {0}")]
    Options(#[from] serde_json::Error),
    #[error("render task panicked: {0}")]
    Panicked(String),
    #[error("render queue is closed")]
    QueueClosed,
}

/// Turns diagram source into SVG text.
///
/// The returned future must not start any work until it is first polled, so
/// callers can hand it to the render queue and have it run in queue order.
pub trait Renderer: Send + Sync {
    fn render(&self, source: &str, options: &RenderOptions) -> RenderFuture;
}

/// Renders by piping the source through an external program.
///
/// The program gets the diagram on stdin, backend options as JSON in the
/// `INKSET_RENDER_OPTIONS` environment variable, and must print the SVG on
/// stdout. A non-zero exit status or empty output is an error.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a `[program, args...]` command line.
    ///
    /// Returns `None` for an empty command.
    #[must_use]
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl Renderer for CommandRenderer {
    fn render(&self, source: &str, options: &RenderOptions) -> RenderFuture {
        let program = self.program.clone();
        let args = self.args.clone();
        let source = source.to_owned();
        let options = options.clone();

        Box::pin(async move {
            let extra = serde_json::to_string(&options.extra)?;
            let stderr = if options.verbose {
                Stdio::inherit()
            } else {
                Stdio::piped()
            };

            let mut child = Command::new(&program)
                .args(&args)
                .env(RENDER_OPTIONS_ENV, extra)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(stderr)
                .kill_on_drop(true)
                .spawn()?;

            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| io::Error::other("renderer stdin not captured"))?;
            let write = async move {
                stdin.write_all(source.as_bytes()).await?;
                stdin.shutdown().await
            };

            let (written, output) = tokio::join!(write, child.wait_with_output());
            let output = output?;

            if !output.status.success() {
                return Err(RenderError::Exit {
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                });
            }
            // The program may legitimately stop reading once it has its input.
            if let Err(e) = written
                && e.kind() != io::ErrorKind::BrokenPipe
            {
                return Err(e.into());
            }

            let svg = String::from_utf8_lossy(&output.stdout).trim().to_owned();
            if svg.is_empty() {
                return Err(RenderError::Empty);
            }
            Ok(svg)
        })
    }
}
