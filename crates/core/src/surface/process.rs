use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::config::SurfaceConfig;
use crate::surface::{FrameImage, RenderSurface, VisualSystem};
use crate::{Choreography, RenderError, Result};

/// Request sent to the surface host, one JSON document per line.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Viewport { width: u32, height: u32 },
    Inject { choreography: &'a Choreography },
    Seek { time: f64 },
    Contexts,
    Capture,
    SwitchSystem { system: VisualSystem },
}

/// Reply header. A capture reply is followed by `bytes` raw RGBA bytes.
#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    contexts: Option<usize>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    bytes: Option<usize>,
}

/// Line-oriented JSON client for a surface host reachable over a byte
/// stream pair.
pub struct SurfaceClient<R, W> {
    reader: R,
    writer: W,
    line: String,
}

impl<R: BufRead, W: Write> SurfaceClient<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            line: String::new(),
        }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    fn call(&mut self, request: &Request<'_>) -> Result<Reply> {
        let mut payload = serde_json::to_vec(request)?;
        payload.push(b'\n');
        self.writer
            .write_all(&payload)
            .and_then(|()| self.writer.flush())
            .map_err(|err| {
                RenderError::surface_unavailable(format!("failed to write to surface host: {err}"))
            })?;

        self.line.clear();
        let read = self.reader.read_line(&mut self.line).map_err(|err| {
            RenderError::surface_unavailable(format!("failed to read from surface host: {err}"))
        })?;
        if read == 0 {
            return Err(RenderError::surface_unavailable(
                "surface host closed its output",
            ));
        }

        let reply: Reply = serde_json::from_str(self.line.trim_end())
            .map_err(|err| RenderError::protocol(format!("malformed reply: {err}")))?;
        if !reply.ok {
            return Err(RenderError::protocol(
                reply
                    .error
                    .unwrap_or_else(|| "request rejected without a reason".to_string()),
            ));
        }
        Ok(reply)
    }
}

impl<R: BufRead, W: Write> RenderSurface for SurfaceClient<R, W> {
    fn set_viewport(&mut self, width: u32, height: u32) -> Result<()> {
        self.call(&Request::Viewport { width, height }).map(drop)
    }

    fn inject(&mut self, choreography: &Choreography) -> Result<()> {
        self.call(&Request::Inject { choreography }).map(drop)
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.call(&Request::Seek { time: seconds }).map(drop)
    }

    fn active_contexts(&mut self) -> Result<usize> {
        self.call(&Request::Contexts)?
            .contexts
            .ok_or_else(|| RenderError::protocol("contexts reply without a count"))
    }

    fn capture_viewport(&mut self) -> Result<FrameImage> {
        let reply = self.call(&Request::Capture)?;
        let (Some(width), Some(height), Some(bytes)) = (reply.width, reply.height, reply.bytes)
        else {
            return Err(RenderError::protocol(
                "capture reply must carry width, height and bytes",
            ));
        };

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4));
        if expected != Some(bytes) {
            return Err(RenderError::protocol(format!(
                "capture of {width}x{height} announced {bytes} payload bytes"
            )));
        }

        let mut pixels = vec![0u8; bytes];
        self.reader.read_exact(&mut pixels).map_err(|err| {
            RenderError::surface_unavailable(format!("truncated capture payload: {err}"))
        })?;
        FrameImage::from_rgba(width, height, pixels)
    }

    fn switch_system(&mut self, system: VisualSystem) -> Result<()> {
        self.call(&Request::SwitchSystem { system }).map(drop)
    }
}

/// Surface hosted by a child process speaking the line protocol on its
/// stdin/stdout.
pub struct ProcessSurface {
    child: Child,
    client: SurfaceClient<BufReader<ChildStdout>, ChildStdin>,
}

impl ProcessSurface {
    pub fn spawn(config: &SurfaceConfig) -> Result<Self> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| {
                RenderError::surface_unavailable(format!(
                    "failed to launch surface host `{}`: {err}",
                    config.command
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::surface_unavailable("surface host stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RenderError::surface_unavailable("surface host stdout unavailable"))?;

        tracing::info!(command = %config.command, pid = child.id(), "surface host started");
        Ok(Self {
            child,
            client: SurfaceClient::new(BufReader::new(stdout), stdin),
        })
    }
}

impl RenderSurface for ProcessSurface {
    fn set_viewport(&mut self, width: u32, height: u32) -> Result<()> {
        self.client.set_viewport(width, height)
    }

    fn inject(&mut self, choreography: &Choreography) -> Result<()> {
        self.client.inject(choreography)
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.client.seek(seconds)
    }

    fn active_contexts(&mut self) -> Result<usize> {
        self.client.active_contexts()
    }

    fn capture_viewport(&mut self) -> Result<FrameImage> {
        self.client.capture_viewport()
    }

    fn switch_system(&mut self, system: VisualSystem) -> Result<()> {
        self.client.switch_system(system)
    }
}

impl Drop for ProcessSurface {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            tracing::debug!(%err, "surface host already exited");
        }
        let _ = self.child.wait();
    }
}
