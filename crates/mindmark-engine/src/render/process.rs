//! Renderers backed by external commands.
//!
//! The block source is written to the child's stdin and the image is read
//! from its stdout. Arguments may contain `{format}`, replaced with the
//! fence's format hint (`svg` when none is given).

use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::diagrams::DiagramRenderer;
use super::math::MathRenderer;
use super::result::{RenderContext, RenderError, RenderResult};
use super::svg::declared_svg_size;

const FORMAT_PLACEHOLDER: &str = "{format}";

async fn run_piped(command: &str, args: &[String], input: &str) -> Result<Vec<u8>, RenderError> {
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RenderError::Spawn {
            command: command.to_string(),
            source,
        })?;

    // Feed stdin while draining stdout so a chatty child cannot fill its
    // output pipe and stall both sides.
    let stdin = child.stdin.take();
    let feed = async move {
        let Some(mut stdin) = stdin else {
            return Ok(());
        };
        match stdin.write_all(input.as_bytes()).await {
            // The child may exit without reading its input.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("{command} closed stdin early");
                Ok(())
            }
            written => written,
        }
    };
    let (written, output) = tokio::join!(feed, child.wait_with_output());

    let spawn_error = |source| RenderError::Spawn {
        command: command.to_string(),
        source,
    };
    let output = output.map_err(spawn_error)?;
    written.map_err(spawn_error)?;

    if !output.status.success() {
        return Err(RenderError::ProcessExit {
            command: command.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// A diagram renderer that shells out, e.g. `dot -T{format}`.
#[derive(Debug, Clone)]
pub struct ProcessRenderer {
    name: String,
    command: String,
    args: Vec<String>,
}

impl ProcessRenderer {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
        }
    }

    fn args_for(&self, format: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(FORMAT_PLACEHOLDER, format))
            .collect()
    }
}

#[async_trait]
impl DiagramRenderer for ProcessRenderer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn render(
        &self,
        source: &str,
        ctx: RenderContext<'_>,
    ) -> Result<Option<RenderResult>, RenderError> {
        let format = match ctx.format_hint {
            "" => "svg",
            hint => hint,
        };
        debug!("Running {} for block at {} (token {})", self.command, ctx.match_index, ctx.token);
        let stdout = run_piped(&self.command, &self.args_for(format), source).await?;
        if stdout.is_empty() {
            return Ok(None);
        }

        let result = match format {
            "png" => RenderResult {
                mime: "image/png".to_string(),
                data: stdout,
                width: None,
                height: None,
                class_name: None,
                alt: None,
            },
            _ => {
                let svg = String::from_utf8(stdout)?;
                let size = declared_svg_size(&svg);
                let result = RenderResult::svg(svg);
                match size {
                    Some(size) => result.with_size(size.width as f64, size.height as f64),
                    None => result,
                }
            }
        };
        Ok(Some(RenderResult {
            alt: Some(format!("{} diagram", self.name)),
            ..result
        }))
    }
}

/// A math renderer that shells out to a TeX-to-SVG command.
///
/// `{display}` in the arguments becomes `display` or `inline`.
#[derive(Debug, Clone)]
pub struct ProcessMathRenderer {
    command: String,
    args: Vec<String>,
}

impl ProcessMathRenderer {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl MathRenderer for ProcessMathRenderer {
    async fn tex_to_svg(&self, expr: &str, display: bool) -> Result<String, RenderError> {
        let mode = if display { "display" } else { "inline" };
        let args: Vec<String> = self.args.iter().map(|a| a.replace("{display}", mode)).collect();
        let stdout = run_piped(&self.command, &args, expr).await?;
        let svg = String::from_utf8(stdout)?;
        if !svg.contains("<svg") {
            return Err(RenderError::failed(&self.command, "output is not SVG"));
        }
        Ok(svg)
    }
}
