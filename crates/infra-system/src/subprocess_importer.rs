// Subprocess importer
// Runs the external media importer as a child process and reads its progress
// from stdout, one JSON object per line:
//   {"type":"progress","total":5,"processed":2,"imported":2,"errors":0}
//   {"type":"error","message":"..."}
//   {"type":"result","result":{...}}
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use playlist_import_core::domain::{ImportPayload, ImportResult, ProgressUpdate};
use playlist_import_core::port::{PipelineError, PlaylistImporter, ProgressReporter};

/// Environment passed through to the importer when no allowlist is configured
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "LANG", "TMPDIR"];

/// Stderr lines kept for the error message of a failed run
const STDERR_TAIL_LINES: usize = 20;

/// Program and fixed arguments; the playlist URL is appended as the last argument
#[derive(Debug, Clone)]
pub struct ImporterCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ImporterCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ImporterLine {
    Progress {
        #[serde(default)]
        total: u32,
        #[serde(default)]
        processed: u32,
        #[serde(default)]
        imported: u32,
        #[serde(default)]
        errors: u32,
    },
    Error {
        message: String,
    },
    Result {
        result: serde_json::Value,
    },
}

/// What stdout told us by the time the process closed it
#[derive(Debug, Default)]
struct StdoutOutcome {
    result: Option<serde_json::Value>,
    error: Option<String>,
    progress_lines: usize,
}

/// Subprocess importer
/// Spawns the importer with an allowlisted environment
pub struct SubprocessImporter {
    command: ImporterCommand,
    env_allowlist: Vec<String>,
}

impl SubprocessImporter {
    /// # Arguments
    /// * `command` - Importer program and its fixed arguments
    /// * `env_allowlist` - Environment variables the child may see
    pub fn new(command: ImporterCommand, env_allowlist: Vec<String>) -> Self {
        Self {
            command,
            env_allowlist,
        }
    }

    pub fn with_default_env(command: ImporterCommand) -> Self {
        Self::new(
            command,
            DEFAULT_ENV_ALLOWLIST.iter().map(|k| k.to_string()).collect(),
        )
    }

    /// Keep allowlisted variables only
    fn filter_env(&self, vars: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
        vars.filter(|(k, _)| self.env_allowlist.contains(k)).collect()
    }

    fn build_command(&self, playlist_url: &str) -> Command {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .arg(playlist_url)
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Next `\n`-terminated line, decoded lossily; `None` at EOF
///
/// Importers print file names verbatim, which are not always UTF-8.
async fn next_line<R>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(buf).trim_end().to_string()))
}

/// Parse stdout line by line, forwarding progress as it arrives
async fn read_stdout<R>(
    stdout: R,
    progress: &ProgressReporter,
) -> Result<StdoutOutcome, PipelineError>
where
    R: AsyncRead + Unpin,
{
    let mut outcome = StdoutOutcome::default();
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    while let Some(line) = next_line(&mut reader, &mut buf)
        .await
        .map_err(|e| PipelineError::Io(e.to_string()))?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ImporterLine>(line) {
            Ok(ImporterLine::Progress {
                total,
                processed,
                imported,
                errors,
            }) => {
                outcome.progress_lines += 1;
                progress.report(ProgressUpdate::new(total, processed, imported, errors));
            }
            Ok(ImporterLine::Error { message }) => outcome.error = Some(message),
            Ok(ImporterLine::Result { result }) => outcome.result = Some(result),
            // Importers are chatty; anything else is just log output
            Err(_) => debug!(job_id = %progress.job_id(), line, "importer output"),
        }
    }
    Ok(outcome)
}

/// Last `STDERR_TAIL_LINES` lines of stderr
///
/// Drains to EOF even after a read error so the child never hits a closed pipe.
async fn read_stderr_tail<R>(stderr: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "importer stderr read failed, discarding the rest");
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                break;
            }
        }
    }
    tail.into_iter().collect::<Vec<_>>().join("\n").trim().to_string()
}

#[async_trait]
impl PlaylistImporter for SubprocessImporter {
    async fn run(
        &self,
        payload: &ImportPayload,
        progress: ProgressReporter,
    ) -> Result<ImportResult, PipelineError> {
        info!(
            job_id = %progress.job_id(),
            program = %self.command.program,
            playlist_url = %payload.playlist_url,
            "Starting importer process"
        );

        let mut child = self
            .build_command(&payload.playlist_url)
            .spawn()
            .map_err(|e| PipelineError::Spawn(format!("{}: {}", self.command.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Io("importer stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PipelineError::Io("importer stderr not captured".to_string()))?;

        let stderr_task = tokio::spawn(read_stderr_tail(stderr));
        let outcome = read_stdout(stdout, &progress).await?;
        let status = child
            .wait()
            .await
            .map_err(|e| PipelineError::Io(e.to_string()))?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        info!(
            job_id = %progress.job_id(),
            exit_code = ?status.code(),
            progress_lines = outcome.progress_lines,
            "Importer process exited"
        );

        if let Some(message) = outcome.error {
            return Err(PipelineError::Failed(message));
        }

        if !status.success() {
            let exit = status
                .code()
                .map(|code| format!("status {}", code))
                .unwrap_or_else(|| "a signal".to_string());
            let message = if stderr_tail.is_empty() {
                format!("importer exited with {}", exit)
            } else {
                format!("importer exited with {}: {}", exit, stderr_tail)
            };
            warn!(job_id = %progress.job_id(), error = %message, "Importer failed");
            return Err(PipelineError::Failed(message));
        }

        outcome
            .result
            .map(ImportResult::new)
            .ok_or_else(|| {
                PipelineError::InvalidOutput("importer exited without a result line".to_string())
            })
    }
}
