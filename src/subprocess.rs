//! Subprocess runner (C1): the only component permitted to spawn the external
//! media tool. Silent invocation captures an error tail on failure; the
//! progress variant parses ffmpeg's `-progress` key/value stream into a
//! rate-limited console bar (§4.1).

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;

use tracing::{debug, error, info};

use crate::error::{RenderError, RenderResult};

const ERROR_TAIL_LINES: usize = 50;
const PROGRESS_REDRAW_HZ: f64 = 10.0;

/// One invocation of the external media tool: program name plus an argument vector.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn command_string(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Fails fast if `ffmpeg`/`ffprobe` are not on `PATH`, rather than deferring
/// to the first subprocess spawn (§6).
pub fn probe_tools() -> RenderResult<()> {
    for tool in ["ffmpeg", "ffprobe"] {
        which::which(tool).map_err(|_| RenderError::ExternalToolFailure {
            command: tool.to_string(),
            exit: None,
            tail: "not found on PATH".to_string(),
        })?;
    }
    Ok(())
}

/// Disk-measured media duration via `ffprobe`, kept as a small generic utility
/// independent of any synthesis engine (the asset pipeline is assumed to have
/// already run TTS and stamped `NarrationChunk::duration_seconds`; this is
/// only used to cross-check that value, not to derive it).
pub fn ffprobe_duration(path: &std::path::Path) -> RenderResult<f64> {
    let output = std::process::Command::new("ffprobe")
        .args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"])
        .arg(path.as_os_str())
        .output()
        .map_err(|e| RenderError::ExternalToolFailure {
            command: "ffprobe".to_string(),
            exit: None,
            tail: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(RenderError::ExternalToolFailure {
            command: "ffprobe".to_string(),
            exit: output.status.code(),
            tail: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|e| RenderError::ExternalToolFailure {
            command: "ffprobe".to_string(),
            exit: None,
            tail: format!("failed to parse duration: {e}"),
        })
}

/// Runs silently: suppresses the tool's banner/info logging, capturing only
/// the tail of its error stream on failure (§4.1).
pub async fn invoke_silent(
    invocation: &ToolInvocation,
    timeout_secs: u64,
    cancel: &mut watch::Receiver<bool>,
) -> RenderResult<()> {
    let invocation = with_quiet_flags(invocation);
    let command = invocation.command_string();
    let mut cmd = invocation.build();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    debug!(%command, "invoking tool (silent)");

    let mut child = spawn(cmd, &command)?;
    let stderr = child.stderr.take().expect("stderr piped");
    let tail_handle = tokio::spawn(collect_tail(stderr));

    let status = wait_with_cancel(&mut child, timeout_secs, cancel, &command).await?;
    let tail = tail_handle.await.unwrap_or_default();

    if !status.success() {
        error!(%command, tail = %tail.join("\n"), "tool failed");
        return Err(RenderError::ExternalToolFailure {
            command,
            exit: status.code(),
            tail: tail.join("\n"),
        });
    }
    info!(%command, "tool finished");
    Ok(())
}

/// Runs with progress output (`-progress pipe:1`-equivalent flags baked into
/// `invocation` by the caller), invoking `on_progress(out_time_secs)` for
/// every `out_time_ms=` line and optionally drawing a rate-limited console
/// bar. `draw_bar = false` is used when an outer accumulator owns the bar
/// (§4.1, §9 progress aggregation).
pub async fn invoke_with_progress(
    invocation: &ToolInvocation,
    total_duration_secs: f64,
    timeout_secs: u64,
    cancel: &mut watch::Receiver<bool>,
    mut on_progress: impl FnMut(f64) + Send,
    draw_bar: bool,
) -> RenderResult<()> {
    let invocation = with_quiet_flags(invocation);
    let mut args = invocation.args.clone();
    args.push("-progress".into());
    args.push("pipe:1".into());
    args.push("-nostats".into());
    let invocation = ToolInvocation::new(invocation.program.clone(), args);
    let command = invocation.command_string();

    let mut cmd = invocation.build();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    debug!(%command, "invoking tool (progress)");

    let mut child = spawn(cmd, &command)?;
    let stdout = child.stdout.take().expect("stdout piped");
    let stderr = child.stderr.take().expect("stderr piped");
    let tail_handle = tokio::spawn(collect_tail(stderr));

    let mut bar = ProgressBar::new(total_duration_secs);
    let start = Instant::now();
    let mut lines = BufReader::new(stdout).lines();

    let status: RenderResult<ExitStatus> = loop {
        if start.elapsed().as_secs() >= timeout_secs {
            let _ = child.kill().await;
            break Err(RenderError::ExternalToolTimeout {
                command: command.clone(),
                elapsed_secs: start.elapsed().as_secs(),
            });
        }
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(secs) = parse_progress_line(&line) {
                            on_progress(secs);
                            if draw_bar {
                                bar.maybe_redraw(secs);
                            }
                        }
                    }
                    Ok(None) => {
                        let waited = child.wait().await.map_err(|e| RenderError::ExternalToolFailure {
                            command: command.clone(), exit: None, tail: e.to_string(),
                        });
                        break waited;
                    }
                    Err(_) => {
                        let waited = child.wait().await.map_err(|e| RenderError::ExternalToolFailure {
                            command: command.clone(), exit: None, tail: e.to_string(),
                        });
                        break waited;
                    }
                }
            }
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    let _ = child.kill().await;
                    break Err(RenderError::Cancelled);
                }
            }
        }
    };

    if draw_bar {
        bar.finish();
    }
    let tail = tail_handle.await.unwrap_or_default();
    let status = status?;
    if !status.success() {
        return Err(RenderError::ExternalToolFailure {
            command,
            exit: status.code(),
            tail: tail.join("\n"),
        });
    }
    Ok(())
}

/// Suppresses the banner and non-error logging (§4.1's "silent" contract) by
/// prepending `-hide_banner -loglevel error` ahead of the caller's own args.
fn with_quiet_flags(invocation: &ToolInvocation) -> ToolInvocation {
    let mut args = vec!["-hide_banner".to_string(), "-loglevel".to_string(), "error".to_string()];
    args.extend(invocation.args.iter().cloned());
    ToolInvocation::new(invocation.program.clone(), args)
}

fn spawn(mut cmd: Command, command: &str) -> RenderResult<Child> {
    cmd.spawn().map_err(|e| RenderError::ExternalToolFailure {
        command: command.to_string(),
        exit: None,
        tail: e.to_string(),
    })
}

async fn wait_with_cancel(
    child: &mut Child,
    timeout_secs: u64,
    cancel: &mut watch::Receiver<bool>,
    command: &str,
) -> RenderResult<ExitStatus> {
    let wait_fut = child.wait();
    tokio::pin!(wait_fut);
    loop {
        tokio::select! {
            res = &mut wait_fut => {
                return res.map_err(|e| RenderError::ExternalToolFailure {
                    command: command.to_string(), exit: None, tail: e.to_string(),
                });
            }
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    let _ = child.kill().await;
                    return Err(RenderError::Cancelled);
                }
            }
            _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => {
                let _ = child.kill().await;
                return Err(RenderError::ExternalToolTimeout {
                    command: command.to_string(),
                    elapsed_secs: timeout_secs,
                });
            }
        }
    }
}

async fn collect_tail(stderr: tokio::process::ChildStderr) -> Vec<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut ring: VecDeque<String> = VecDeque::with_capacity(ERROR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if ring.len() == ERROR_TAIL_LINES {
            ring.pop_front();
        }
        ring.push_back(line);
    }
    ring.into_iter().collect()
}

/// Parses one `-progress` line. ffmpeg's `out_time_ms` key is, despite the
/// name, microseconds — dividing by 1e6 yields seconds (§4.1).
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let (key, value) = line.split_once('=')?;
    if key.trim() != "out_time_ms" {
        return None;
    }
    let micros: f64 = value.trim().parse().ok()?;
    Some(micros / 1_000_000.0)
}

struct ProgressBar {
    total_secs: f64,
    start: Instant,
    last_redraw: Option<Instant>,
}

impl ProgressBar {
    fn new(total_secs: f64) -> Self {
        Self {
            total_secs,
            start: Instant::now(),
            last_redraw: None,
        }
    }

    fn maybe_redraw(&mut self, current_secs: f64) {
        let now = Instant::now();
        if let Some(last) = self.last_redraw {
            if now.duration_since(last) < Duration::from_secs_f64(1.0 / PROGRESS_REDRAW_HZ) {
                return;
            }
        }
        self.last_redraw = Some(now);
        self.redraw(current_secs);
    }

    fn redraw(&self, current_secs: f64) {
        let elapsed = self.start.elapsed().as_secs_f64();
        let pct = if self.total_secs > 0.0 {
            (current_secs / self.total_secs).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let eta = if current_secs > 0.1 {
            (elapsed / current_secs) * (self.total_secs - current_secs)
        } else {
            0.0
        };
        eprint!(
            "\r{} {:>5.1}% elapsed {} eta {}   ",
            "render:".cyan().bold(),
            pct * 100.0,
            format_hms(elapsed),
            format_hms(eta.max(0.0)),
        );
        use std::io::Write;
        let _ = std::io::stderr().flush();
    }

    fn finish(&self) {
        eprintln!();
    }
}

fn format_hms(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_out_time_ms_as_seconds() {
        assert_eq!(parse_progress_line("out_time_ms=2500000"), Some(2.5));
        assert_eq!(parse_progress_line("frame=42"), None);
        assert_eq!(parse_progress_line("not a kv line"), None);
    }

    #[test]
    fn format_hms_pads_components() {
        assert_eq!(format_hms(0.0), "00:00:00");
        assert_eq!(format_hms(65.0), "00:01:05");
        assert_eq!(format_hms(3661.0), "01:01:01");
    }

    #[test]
    fn command_string_joins_program_and_args() {
        let invocation = ToolInvocation::new("ffmpeg", vec!["-y".into(), "-i".into(), "in.mp4".into()]);
        assert_eq!(invocation.command_string(), "ffmpeg -y -i in.mp4");
    }
}
