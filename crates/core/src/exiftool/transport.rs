use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, Result};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Line-oriented channel to the metadata tool.
///
/// The client only ever talks to the tool through this trait, so tests can swap the real
/// subprocess for a scripted stand-in.
pub trait Transport {
    /// Spawn (or respawn) the tool in stay-open mode.
    fn start(&mut self) -> Result<()>;

    /// False once the process has exited or was never started.
    fn is_alive(&mut self) -> bool;

    /// Write one request block, one argument per line, and flush.
    fn send(&mut self, lines: &[String]) -> Result<()>;

    /// Next output line without its terminator, or None at end of stream.
    fn read_line(&mut self) -> Result<Option<String>>;

    /// Ask the tool to exit, wait up to `grace`, then kill it.
    fn terminate(&mut self, grace: Duration) -> Result<()>;
}

/// Real exiftool subprocess driven through `-stay_open True -@ -`.
pub struct ProcessTransport {
    program: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
}

impl ProcessTransport {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            child: None,
            stdin: None,
            stdout: None,
        }
    }

    fn kill(&mut self) {
        self.stdin = None;
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Transport for ProcessTransport {
    fn start(&mut self) -> Result<()> {
        self.kill();

        let mut child = Command::new(&self.program)
            .args(["-stay_open", "True", "-@", "-"])
            .env("LANG", "en_US.UTF-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::ToolNotAvailable {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take().map(BufReader::new);
        debug!(program = %self.program, pid = child.id(), "metadata tool started");
        self.child = Some(child);
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn send(&mut self, lines: &[String]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::ToolIo("tool input stream is closed".into()))?;
        let mut block = lines.join("\n");
        block.push('\n');
        stdin
            .write_all(block.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|e| Error::ToolIo(format!("write failed: {e}")))
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| Error::ToolIo("tool output stream is closed".into()))?;
        let mut line = String::new();
        let n = stdout
            .read_line(&mut line)
            .map_err(|e| Error::ToolIo(format!("read failed: {e}")))?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    fn terminate(&mut self, grace: Duration) -> Result<()> {
        if let Some(stdin) = self.stdin.as_mut() {
            let _ = stdin
                .write_all(b"-stay_open\nFalse\n")
                .and_then(|_| stdin.flush());
        }
        // Closing stdin lets the tool see end of input if it missed the directive.
        self.stdin = None;

        if let Some(child) = self.child.as_mut() {
            let deadline = Instant::now() + grace;
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        debug!(%status, "metadata tool exited");
                        break;
                    }
                    Ok(None) if Instant::now() < deadline => std::thread::sleep(EXIT_POLL_INTERVAL),
                    Ok(None) => {
                        warn!("metadata tool did not exit within {grace:?}, killing it");
                        break;
                    }
                    Err(e) => return Err(Error::ToolIo(format!("wait failed: {e}"))),
                }
            }
        }
        self.kill();
        Ok(())
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        self.kill();
    }
}

/// One-shot `-ver` invocation. Returns the trimmed version string.
pub fn check_installed(program: &str) -> Result<String> {
    let not_available = |message: String| Error::ToolNotAvailable {
        program: program.to_string(),
        message,
    };

    let output = Command::new(program)
        .arg("-ver")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| not_available(e.to_string()))?;

    if !output.status.success() {
        return Err(not_available(format!("exited with {}", output.status)));
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        return Err(not_available("empty version output".into()));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_not_available() {
        let err = check_installed("/nonexistent/exiftool-binary").unwrap_err();
        assert!(matches!(err, Error::ToolNotAvailable { .. }));

        let mut transport = ProcessTransport::new("/nonexistent/exiftool-binary");
        assert!(matches!(transport.start(), Err(Error::ToolNotAvailable { .. })));
        assert!(!transport.is_alive());
    }

    #[test]
    fn test_unstarted_transport_rejects_io() {
        let mut transport = ProcessTransport::new("exiftool");
        assert!(matches!(transport.send(&["-ver".into()]), Err(Error::ToolIo(_))));
        assert!(matches!(transport.read_line(), Err(Error::ToolIo(_))));
        transport.terminate(Duration::from_millis(1)).unwrap();
    }
}
