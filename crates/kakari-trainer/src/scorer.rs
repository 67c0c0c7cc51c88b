//! # Attachment Scorer
//!
//! Runs the external CoNLL evaluation script and reads labeled and
//! unlabeled attachment scores from its report. The invocation is
//! `<program> <script> -g <gold> -s <hypothesis>`, plus `-q` for the
//! quiet two-line summary.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{require_file, ScorerConfig};
use crate::error::{ConfigError, ScoringError};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Exit code reported when the scorer was killed on timeout.
pub const TIMEOUT_CODE: i32 = -1;

/// Exit code reported when the scorer died from a signal.
pub const SIGNAL_CODE: i32 = -2;

/// Outcome of one scoring run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutput {
    /// Process exit code; [`TIMEOUT_CODE`] on timeout.
    pub code: i32,
    /// Standard output on success, diagnostics otherwise.
    pub raw: String,
    pub uas: Option<f64>,
    pub las: Option<f64>,
}

impl ScoreOutput {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Scores a system file against a gold file.
pub trait Scorer {
    /// A non-zero exit is an `Ok` output with `is_success() == false`.
    /// Unreadable successful output is [`ScoringError::Parse`].
    fn score(&self, hypothesis: &Path, gold: &Path, verbose: bool) -> Result<ScoreOutput, ScoringError>;
}

/// [`Scorer`] backed by a child process.
#[derive(Debug, Clone)]
pub struct ExternalScorer {
    program: PathBuf,
    script: PathBuf,
    timeout: Option<Duration>,
}

impl ExternalScorer {
    /// Checks that the script exists and, unless `program` is a bare name
    /// looked up on `PATH`, that the program does too.
    pub fn new(program: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let program = program.into();
        let script = script.into();
        if program.components().count() > 1 {
            require_file("scorer program", &program)?;
        }
        require_file("scorer script", &script)?;
        Ok(Self {
            program,
            script,
            timeout: None,
        })
    }

    pub fn from_config(config: &ScorerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(&config.program, &config.script)?.with_timeout(config.timeout()))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, hypothesis: &Path, gold: &Path, verbose: bool) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.script)
            .arg("-g")
            .arg(gold)
            .arg("-s")
            .arg(hypothesis);
        if !verbose {
            cmd.arg("-q");
        }
        cmd
    }
}

impl Scorer for ExternalScorer {
    fn score(&self, hypothesis: &Path, gold: &Path, verbose: bool) -> Result<ScoreOutput, ScoringError> {
        let mut cmd = self.command(hypothesis, gold, verbose);
        debug!(command = ?cmd, "running scorer");

        // Files rather than pipes: the child never blocks on a full buffer.
        let mut stdout = tempfile::tempfile()?;
        let mut stderr = tempfile::tempfile()?;
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(stdout.try_clone()?)
            .stderr(stderr.try_clone()?)
            .spawn()
            .map_err(|source| ScoringError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let Some(status) = wait_with_timeout(&mut child, self.timeout)? else {
            let message = format!(
                "scorer timed out after {:.1}s",
                self.timeout.unwrap_or_default().as_secs_f64()
            );
            return Ok(ScoreOutput {
                code: TIMEOUT_CODE,
                raw: with_captured(message, &mut stderr)?,
                uas: None,
                las: None,
            });
        };

        let Some(code) = status.code() else {
            let message = format!("scorer terminated by {}", termination(&status));
            return Ok(ScoreOutput {
                code: SIGNAL_CODE,
                raw: with_captured(message, &mut stderr)?,
                uas: None,
                las: None,
            });
        };
        if code != 0 {
            return Ok(ScoreOutput {
                code,
                raw: read_captured(&mut stderr)?,
                uas: None,
                las: None,
            });
        }

        let raw = read_captured(&mut stdout)?;
        let (las, uas) = parse_scores(&raw)?;
        Ok(ScoreOutput {
            code,
            raw,
            uas: Some(uas),
            las: Some(las),
        })
    }
}

/// Waits for the child; on timeout kills it and returns `None`.
fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            // The process may have exited between the poll and the kill.
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

#[cfg(unix)]
fn termination(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("signal {signal}"),
        None => "an unknown cause".to_string(),
    }
}

#[cfg(not(unix))]
fn termination(_status: &ExitStatus) -> String {
    "an unknown cause".to_string()
}

/// `message` followed by whatever the child left in `file`.
fn with_captured(mut message: String, file: &mut File) -> io::Result<String> {
    let partial = read_captured(file)?;
    if !partial.trim().is_empty() {
        message.push('\n');
        message.push_str(&partial);
    }
    Ok(message)
}

fn read_captured(file: &mut File) -> io::Result<String> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Reads `(LAS, UAS)` from the first two lines of a quiet report.
///
/// Each score is the second-to-last whitespace token of its line, as in
/// `Labeled attachment score: 4483 / 4983 * 100 = 89.97 %`. When that
/// token is not a number the last token is used instead, which covers
/// `Labeled attachment score: 88.2`.
pub fn parse_scores(raw: &str) -> Result<(f64, f64), ScoringError> {
    let mut lines = raw.lines();
    let mut next_score = |name: &str| -> Result<f64, ScoringError> {
        let line = lines.next().ok_or_else(|| ScoringError::Parse {
            message: format!("missing {name} line"),
            raw: raw.to_string(),
        })?;
        score_of(line).ok_or_else(|| ScoringError::Parse {
            message: format!("no {name} value in {line:?}"),
            raw: raw.to_string(),
        })
    };
    let las = next_score("LAS")?;
    let uas = next_score("UAS")?;
    Ok((las, uas))
}

fn score_of(line: &str) -> Option<f64> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let number = |token: &str| token.trim_end_matches('%').parse::<f64>().ok();
    if tokens.len() >= 2 {
        if let Some(value) = number(tokens[tokens.len() - 2]) {
            return Some(value);
        }
    }
    tokens.last().and_then(|token| number(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_plain_scores() {
        let raw = "Labeled   attachment score: 88.2\nUnlabeled attachment score: 91.4\n";
        assert_eq!(parse_scores(raw).unwrap(), (88.2, 91.4));
    }

    #[test]
    fn parses_quiet_report_format() {
        let raw = "  Labeled   attachment score: 4483 / 4983 * 100 = 89.97 %\n  \
                   Unlabeled attachment score: 4638 / 4983 * 100 = 93.08 %\n";
        assert_eq!(parse_scores(raw).unwrap(), (89.97, 93.08));
    }

    #[test]
    fn unreadable_report_is_a_parse_error() {
        assert!(matches!(parse_scores("garbage\n"), Err(ScoringError::Parse { .. })));
        assert!(matches!(
            parse_scores("score: 1.0\nno number here\n"),
            Err(ScoringError::Parse { .. })
        ));
        assert!(matches!(parse_scores(""), Err(ScoringError::Parse { .. })));
    }

    #[cfg(unix)]
    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("eval.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[cfg(unix)]
    fn sh(script: PathBuf) -> ExternalScorer {
        ExternalScorer::new("/bin/sh", script).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn successful_run_reports_scores() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = sh(script(
            &dir,
            "printf 'Labeled   attachment score: 88.2\\nUnlabeled attachment score: 91.4\\n'\n",
        ));

        let out = scorer
            .score(Path::new("sys.conll"), Path::new("gold.conll"), false)
            .unwrap();
        assert!(out.is_success());
        assert_eq!(out.las, Some(88.2));
        assert_eq!(out.uas, Some(91.4));
    }

    #[cfg(unix)]
    #[test]
    fn failing_run_keeps_stderr_and_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = sh(script(&dir, "echo \"$@\" >&2\nexit 1\n"));

        let out = scorer
            .score(Path::new("sys.conll"), Path::new("gold.conll"), false)
            .unwrap();
        assert_eq!(out.code, 1);
        assert_eq!(out.raw.trim(), "-g gold.conll -s sys.conll -q");
        assert_eq!(out.uas, None);
        assert_eq!(out.las, None);

        let verbose = scorer
            .score(Path::new("sys.conll"), Path::new("gold.conll"), true)
            .unwrap();
        assert_eq!(verbose.raw.trim(), "-g gold.conll -s sys.conll");
    }

    #[cfg(unix)]
    #[test]
    fn slow_run_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = sh(script(&dir, "sleep 5\n")).with_timeout(Some(Duration::from_millis(200)));

        let started = Instant::now();
        let out = scorer
            .score(Path::new("sys.conll"), Path::new("gold.conll"), false)
            .unwrap();
        assert_eq!(out.code, TIMEOUT_CODE);
        assert!(out.raw.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn signal_is_not_reported_as_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = sh(script(&dir, "echo dying >&2\nkill -KILL $$\n"))
            .with_timeout(Some(Duration::from_secs(30)));

        let out = scorer
            .score(Path::new("sys.conll"), Path::new("gold.conll"), false)
            .unwrap();
        assert_eq!(out.code, SIGNAL_CODE);
        assert!(out.raw.starts_with("scorer terminated by signal 9"), "{}", out.raw);
        assert!(out.raw.contains("dying"));
        assert!(!out.is_success());
    }

    #[cfg(unix)]
    #[test]
    fn garbage_on_success_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = sh(script(&dir, "echo nothing useful\n"));
        assert!(matches!(
            scorer.score(Path::new("a"), Path::new("b"), false),
            Err(ScoringError::Parse { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn unknown_program_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = ExternalScorer::new("kakari-no-such-program", script(&dir, "")).unwrap();
        assert!(matches!(
            scorer.score(Path::new("a"), Path::new("b"), false),
            Err(ScoringError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn zero_timeout_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScorerConfig::new()
            .with_program("/bin/sh")
            .with_script(script(&dir, ""))
            .with_timeout(Some(Duration::ZERO));
        assert!(matches!(
            ExternalScorer::from_config(&config),
            Err(ConfigError::Invalid { field: "scorer timeout", .. })
        ));

        let config = config.with_timeout(Some(Duration::from_millis(500)));
        let scorer = ExternalScorer::from_config(&config).unwrap();
        assert_eq!(scorer.timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn missing_script_is_a_config_error() {
        assert!(matches!(
            ExternalScorer::new("perl", "/nonexistent/eval.pl"),
            Err(ConfigError::MissingFile { what: "scorer script", .. })
        ));
    }
}
