//! Parallel job scheduler
//!
//! Keeps at most `width` test processes running and hands back results one
//! at a time, in the order they are found finished.

use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use super::job::Job;
use crate::error::{HarnessError, Result};
use crate::models::{JobResult, TestSpec};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_CAPTURE_GRACE: Duration = Duration::from_secs(10);

/// Bounded pool of running test processes
///
/// All state is owned by the task calling `next_result`; parallelism comes
/// from the child processes, not from threads.
pub struct JobScheduler {
    width: usize,
    tests_dir: PathBuf,
    queue: VecDeque<TestSpec>,
    flags: Vec<String>,
    jobs: Vec<Job>,
    poll_interval: Duration,
    capture_grace: Duration,
    show_progress: bool,
    peak_running: usize,
}

impl JobScheduler {
    pub fn new(width: usize, tests_dir: impl Into<PathBuf>) -> Result<Self> {
        if width == 0 {
            return Err(HarnessError::InvalidWidth(width));
        }
        Ok(Self {
            width,
            tests_dir: tests_dir.into(),
            queue: VecDeque::new(),
            flags: Vec::new(),
            jobs: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            capture_grace: DEFAULT_CAPTURE_GRACE,
            show_progress: true,
            peak_running: 0,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_capture_grace(mut self, grace: Duration) -> Self {
        self.capture_grace = grace;
        self
    }

    /// Print a dot for every poll that finds nothing finished
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Queue tests and set the flags shared by every job spawned from now on
    pub fn submit(&mut self, queue: impl IntoIterator<Item = TestSpec>, flags: Vec<String>) {
        self.queue.extend(queue);
        self.flags = flags;
        debug!("{} test(s) queued", self.queue.len());
    }

    pub fn running(&self) -> usize {
        self.jobs.len()
    }

    #[cfg(test)]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Highest number of jobs that were in flight at once
    pub fn peak_running(&self) -> usize {
        self.peak_running
    }

    /// Port-seeds of the jobs currently in flight
    #[cfg(test)]
    pub fn in_flight_seeds(&self) -> Vec<usize> {
        self.jobs.iter().map(Job::port_seed).collect()
    }

    /// Fill free slots from the head of the queue.
    ///
    /// The seed is the queue length left after the pop. It strictly decreases
    /// within one submission; a later submission can land on a seed that is
    /// still running, so it is bumped past any seed in flight.
    fn launch(&mut self) -> Result<()> {
        while self.jobs.len() < self.width {
            let Some(spec) = self.queue.pop_front() else {
                break;
            };
            let mut port_seed = self.queue.len();
            while self.jobs.iter().any(|job| job.port_seed() == port_seed) {
                port_seed += 1;
            }
            let job = Job::spawn(spec, &self.tests_dir, &self.flags, port_seed)?;
            debug!("Launched {} with port seed {}", job.name(), port_seed);
            self.jobs.push(job);
            self.peak_running = self.peak_running.max(self.jobs.len());
        }
        Ok(())
    }

    /// Wait for the next job to finish and return its result.
    ///
    /// Calling this more times than tests were submitted is a caller bug and
    /// returns `NoJobs`.
    pub async fn next_result(&mut self) -> Result<JobResult> {
        self.launch()?;

        if self.jobs.is_empty() {
            return Err(HarnessError::NoJobs);
        }

        loop {
            tokio::time::sleep(self.poll_interval).await;

            let mut finished = None;
            for (index, job) in self.jobs.iter_mut().enumerate() {
                if let Some(status) = job.try_exited()? {
                    finished = Some((index, status));
                    break;
                }
            }

            if let Some((index, status)) = finished {
                let job = self.jobs.remove(index);
                let result = job.finish(status, self.capture_grace).await;
                info!(
                    "{} finished: passed={} ({} running, {} queued)",
                    result.name,
                    result.passed,
                    self.jobs.len(),
                    self.queue.len()
                );
                return Ok(result);
            }

            if self.show_progress {
                print!(".");
                let _ = std::io::stdout().flush();
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::executor::testutil::write_script;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn scheduler(width: usize, dir: &std::path::Path) -> JobScheduler {
        JobScheduler::new(width, dir)
            .unwrap()
            .with_poll_interval(Duration::from_millis(20))
            .with_capture_grace(Duration::from_secs(5))
            .with_progress(false)
    }

    #[test]
    fn test_zero_width_rejected() {
        let err = JobScheduler::new(0, "/tmp").err().unwrap();
        assert!(matches!(err, HarnessError::InvalidWidth(0)));
    }

    #[tokio::test]
    async fn test_next_result_without_jobs() {
        let dir = tempdir().unwrap();
        let mut sched = scheduler(4, dir.path());
        let err = sched.next_result().await.err().unwrap();
        assert!(matches!(err, HarnessError::NoJobs));
    }

    #[tokio::test]
    async fn test_every_job_delivered_once_for_all_widths() {
        let dir = tempdir().unwrap();
        let count = 10;
        let specs: Vec<TestSpec> = (0..count)
            .map(|i| {
                let name = format!("t{i}.sh");
                write_script(dir.path(), &name, "exit 0");
                TestSpec::new(name)
            })
            .collect();

        for width in [1, 2, 4, 8] {
            let mut sched = scheduler(width, dir.path());
            sched.submit(specs.clone(), vec![]);

            let mut seen = HashSet::new();
            for _ in 0..count {
                let result = sched.next_result().await.unwrap();
                assert!(result.passed, "{} failed: {}", result.name, result.stderr);
                assert!(seen.insert(result.name.clone()), "duplicate {}", result.name);
                assert!(sched.running() <= width);

                let seeds = sched.in_flight_seeds();
                let distinct: HashSet<_> = seeds.iter().collect();
                assert_eq!(distinct.len(), seeds.len());
            }

            assert_eq!(seen.len(), count);
            assert!(sched.peak_running() <= width);
            assert!(matches!(
                sched.next_result().await.err().unwrap(),
                HarnessError::NoJobs
            ));
        }
    }

    #[tokio::test]
    async fn test_pool_fills_to_width() {
        let dir = tempdir().unwrap();
        let specs: Vec<TestSpec> = (0..6)
            .map(|i| {
                let name = format!("slow{i}.sh");
                write_script(dir.path(), &name, "sleep 0.3");
                TestSpec::new(name)
            })
            .collect();

        let mut sched = scheduler(3, dir.path());
        sched.submit(specs, vec![]);

        for _ in 0..6 {
            sched.next_result().await.unwrap();
            assert!(sched.running() <= 3);
        }
        assert_eq!(sched.peak_running(), 3);
        assert_eq!(sched.queued(), 0);
    }

    #[tokio::test]
    async fn test_second_submit_keeps_seeds_distinct() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "a.sh", "sleep 1");
        write_script(dir.path(), "b.sh", "exit 0");
        write_script(dir.path(), "c.sh", "sleep 1");
        write_script(dir.path(), "d.sh", "exit 0");

        let mut sched = scheduler(2, dir.path());
        sched.submit(vec![TestSpec::new("a.sh"), TestSpec::new("b.sh")], vec![]);

        let first = sched.next_result().await.unwrap();
        assert_eq!(first.name, "b.sh");
        assert_eq!(first.port_seed, 0);
        assert_eq!(sched.in_flight_seeds(), vec![1]);

        sched.submit(vec![TestSpec::new("c.sh"), TestSpec::new("d.sh")], vec![]);
        sched.launch().unwrap();

        let seeds = sched.in_flight_seeds();
        assert_eq!(seeds.len(), 2);
        assert_ne!(seeds[0], seeds[1], "seeds in flight: {seeds:?}");
        assert_eq!(sched.queued(), 1);

        let mut names = HashSet::new();
        for _ in 0..3 {
            names.insert(sched.next_result().await.unwrap().name);
        }
        assert_eq!(names.len(), 3);
    }

    #[tokio::test]
    async fn test_port_seed_is_remaining_queue_length() {
        let dir = tempdir().unwrap();
        let specs: Vec<TestSpec> = (0..3)
            .map(|i| {
                let name = format!("seed{i}.sh");
                write_script(dir.path(), &name, "echo \"$@\"");
                TestSpec::new(name)
            })
            .collect();

        let mut sched = scheduler(1, dir.path());
        sched.submit(specs, vec!["--srcdir=/b/src".into()]);

        let mut seeds = Vec::new();
        for _ in 0..3 {
            let result = sched.next_result().await.unwrap();
            assert!(result.stdout.contains("--srcdir=/b/src --portseed="));
            seeds.push((result.name, result.port_seed));
        }
        assert_eq!(
            seeds,
            vec![
                ("seed0.sh".to_string(), 2),
                ("seed1.sh".to_string(), 1),
                ("seed2.sh".to_string(), 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_results_arrive_in_completion_order() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "long.sh", "sleep 1");
        write_script(dir.path(), "short.sh", "exit 0");

        let mut sched = scheduler(2, dir.path());
        sched.submit(
            vec![TestSpec::new("long.sh"), TestSpec::new("short.sh")],
            vec![],
        );

        assert_eq!(sched.next_result().await.unwrap().name, "short.sh");
        assert_eq!(sched.next_result().await.unwrap().name, "long.sh");
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_scheduling() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "bad.sh", "echo broken >&2\nexit 1");
        write_script(dir.path(), "good.sh", "exit 0");

        let mut sched = scheduler(1, dir.path());
        sched.submit(vec![TestSpec::new("bad.sh"), TestSpec::new("good.sh")], vec![]);

        let first = sched.next_result().await.unwrap();
        assert!(!first.passed);
        assert_eq!(first.stderr, "broken\n");
        assert!(sched.next_result().await.unwrap().passed);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_fatal_error() {
        let dir = tempdir().unwrap();
        let mut sched = scheduler(2, dir.path());
        sched.submit(vec![TestSpec::new("does-not-exist.py")], vec![]);

        let err = sched.next_result().await.err().unwrap();
        assert!(err.is_environment());
        assert!(matches!(err, HarnessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_open_pipes_past_grace_window_are_killed() {
        let dir = tempdir().unwrap();
        // Exits at once but leaves a child holding stdout and stderr
        write_script(dir.path(), "linger.sh", "sleep 30 &\nexit 0");

        let mut sched = JobScheduler::new(1, dir.path())
            .unwrap()
            .with_poll_interval(Duration::from_millis(20))
            .with_capture_grace(Duration::from_millis(200))
            .with_progress(false);
        sched.submit(vec![TestSpec::new("linger.sh")], vec![]);

        let result = tokio::time::timeout(Duration::from_secs(10), sched.next_result())
            .await
            .unwrap()
            .unwrap();
        assert!(!result.passed);
        assert!(result.capture_timed_out);
        assert!(result.stderr.contains("output capture timed out"));
        assert_eq!(sched.running(), 0);
    }
}
