//! A single running test process
//!
//! A job owns the child process, the task draining its pipes and the
//! port-seed it was started with.

use futures::future;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{HarnessError, Result};
use crate::models::{JobResult, TestSpec};

/// How long to wait for the pipes to close once the process group is killed
const KILL_DRAIN: Duration = Duration::from_secs(2);

/// Flag telling a test which port range it owns
pub fn port_seed_flag(seed: usize) -> String {
    format!("--portseed={seed}")
}

/// A test process in flight
pub struct Job {
    spec: TestSpec,
    port_seed: usize,
    started: Instant,
    pid: Option<u32>,
    child: Child,
    output: JoinHandle<(Vec<u8>, Vec<u8>)>,
}

impl Job {
    /// Start `<tests_dir>/<identifier> <args> <flags> --portseed=<seed>`.
    ///
    /// The process gets its own process group so a forced kill also reaches
    /// anything it started.
    pub fn spawn(
        spec: TestSpec,
        tests_dir: &Path,
        flags: &[String],
        port_seed: usize,
    ) -> Result<Self> {
        let path = tests_dir.join(&spec.identifier);

        let mut cmd = Command::new(&path);
        cmd.args(&spec.args)
            .args(flags)
            .arg(port_seed_flag(port_seed))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| HarnessError::spawn(&spec.identifier, &path, e))?;

        let pid = child.id();
        let output = capture(child.stdout.take(), child.stderr.take());

        debug!(
            "Spawned {} (pid {:?}, port seed {})",
            spec, pid, port_seed
        );

        Ok(Self {
            spec,
            port_seed,
            started: Instant::now(),
            pid,
            child,
            output,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.identifier
    }

    pub fn port_seed(&self) -> usize {
        self.port_seed
    }

    /// Non-blocking exit check
    pub fn try_exited(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(|source| HarnessError::Wait {
            test: self.spec.identifier.clone(),
            source,
        })
    }

    /// Collect the output of an exited job and turn it into a result.
    ///
    /// If the pipes are still open after `grace` (something inherited them and
    /// kept running), the process group is killed, whatever was read is kept
    /// and the job fails.
    pub async fn finish(mut self, status: ExitStatus, grace: Duration) -> JobResult {
        let mut notes = Vec::new();
        let (stdout, stderr, timed_out) = match timeout(grace, &mut self.output).await {
            Ok(joined) => {
                let (stdout, stderr, note) = unpack(&self.spec.identifier, joined);
                notes.extend(note);
                (stdout, stderr, false)
            }
            Err(_) => {
                warn!(
                    "Output of {} still open {}s after exit, killing it",
                    self.spec.identifier,
                    grace.as_secs_f64()
                );
                self.kill();
                let (stdout, stderr) = match timeout(KILL_DRAIN, &mut self.output).await {
                    Ok(joined) => {
                        let (stdout, stderr, note) = unpack(&self.spec.identifier, joined);
                        notes.extend(note);
                        (stdout, stderr)
                    }
                    Err(_) => {
                        self.output.abort();
                        Default::default()
                    }
                };
                notes.push(format!(
                    "output capture timed out after {:.1}s, job was killed\n",
                    grace.as_secs_f64()
                ));
                (stdout, stderr, true)
            }
        };

        // Any note makes stderr non-empty, which fails the job
        let mut stderr = String::from_utf8_lossy(&stderr).into_owned();
        for note in notes {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&note);
        }

        JobResult::from_exit(
            self.spec.identifier,
            String::from_utf8_lossy(&stdout).into_owned(),
            stderr,
            status.success(),
            self.started.elapsed(),
            self.port_seed,
            timed_out,
        )
    }

    fn kill(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid {
                // The group id equals the leader pid, see process_group(0) in spawn
                if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                    debug!("killpg({}) failed: {}", pid, e);
                }
            }
        }
        if let Err(e) = self.child.start_kill() {
            debug!("kill {} failed: {}", self.spec.identifier, e);
        }
    }
}

/// Output of the capture task, or a note for stderr if the task itself failed
fn unpack(
    name: &str,
    joined: std::result::Result<(Vec<u8>, Vec<u8>), JoinError>,
) -> (Vec<u8>, Vec<u8>, Option<String>) {
    match joined {
        Ok((stdout, stderr)) => (stdout, stderr, None),
        Err(e) => {
            warn!("Output capture of {} failed: {}", name, e);
            (
                Vec::new(),
                Vec::new(),
                Some(format!("output capture failed: {e}\n")),
            )
        }
    }
}

/// Drain both pipes on a helper task so a chatty child never blocks on a full pipe
fn capture<O, E>(stdout: Option<O>, stderr: Option<E>) -> JoinHandle<(Vec<u8>, Vec<u8>)>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move { future::join(read_pipe(stdout), read_pipe(stderr)).await })
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("pipe read ended early: {}", e);
        }
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::executor::testutil::write_script;
    use tempfile::tempdir;

    async fn run_to_exit(mut job: Job, grace: Duration) -> JobResult {
        loop {
            if let Some(status) = job.try_exited().unwrap() {
                return job.finish(status, grace).await;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_job_receives_args_flags_and_port_seed() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "echo.sh", "echo \"$@\"");

        let spec = TestSpec::new("echo.sh").with_arg("--mineblock");
        let flags = vec!["--srcdir=/build/src".to_string(), "--tracerpc".to_string()];
        let job = Job::spawn(spec, dir.path(), &flags, 7).unwrap();
        assert_eq!(job.port_seed(), 7);

        let result = run_to_exit(job, Duration::from_secs(5)).await;
        assert!(result.passed);
        assert_eq!(
            result.stdout.trim(),
            "--mineblock --srcdir=/build/src --tracerpc --portseed=7"
        );
    }

    #[tokio::test]
    async fn test_failed_capture_task_fails_job() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            (Vec::new(), Vec::new())
        });
        handle.abort();

        let (stdout, stderr, note) = unpack("wallet.py", handle.await);
        assert!(stdout.is_empty() && stderr.is_empty());
        let note = note.unwrap();
        assert!(note.starts_with("output capture failed"));

        let result = JobResult::from_exit(
            "wallet.py",
            String::new(),
            note,
            true,
            Duration::ZERO,
            0,
            false,
        );
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn test_stderr_output_fails_job() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "warn.sh", "echo oops >&2\nexit 0");

        let job = Job::spawn(TestSpec::new("warn.sh"), dir.path(), &[], 0).unwrap();
        let result = run_to_exit(job, Duration::from_secs(5)).await;
        assert!(!result.passed);
        assert_eq!(result.stderr, "oops\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_job() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "fail.sh", "exit 3");

        let job = Job::spawn(TestSpec::new("fail.sh"), dir.path(), &[], 0).unwrap();
        let result = run_to_exit(job, Duration::from_secs(5)).await;
        assert!(!result.passed);
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let dir = tempdir().unwrap();
        let err = Job::spawn(TestSpec::new("missing.sh"), dir.path(), &[], 0)
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::Spawn { ref test, .. } if test == "missing.sh"));
    }

    #[tokio::test]
    async fn test_large_output_does_not_block_child() {
        let dir = tempdir().unwrap();
        // Well over a pipe buffer
        write_script(
            dir.path(),
            "chatty.sh",
            "i=0\nwhile [ $i -lt 4000 ]; do echo \"line $i of chatty output\"; i=$((i+1)); done",
        );

        let job = Job::spawn(TestSpec::new("chatty.sh"), dir.path(), &[], 0).unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(20),
            run_to_exit(job, Duration::from_secs(5)),
        )
        .await
        .unwrap();
        assert!(result.passed);
        assert_eq!(result.stdout.lines().count(), 4000);
    }
}
