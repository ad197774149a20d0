//! Fan-out of one range across worker processes.
//!
//! The supervisor enforces a fixed order: release the primary session, make
//! sure every worker's profile exists, launch all workers, wait for every one
//! of them, then reopen the primary whatever happened in between. Cloning
//! copies the base profile, which is only safe while no browser holds it.

use crate::error::{Result, ScrapeError};
use crate::partition::ProcessAssignment;
use crate::profiles::ProfileManager;
use crate::worker::{WorkerOutcome, WorkerSpec, WorkerTemplate};
use async_trait::async_trait;
use futures::future::join_all;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Starts one worker and waits for it to finish.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Run the worker described by `spec` to completion. Failures to start
    /// or run it come back as `WorkerOutcome::Failed`.
    async fn launch(&self, spec: WorkerSpec) -> WorkerOutcome;
}

/// The long-lived session on the base profile.
#[async_trait]
pub trait PrimarySession: Send {
    /// Close the browser so the base profile can be copied.
    async fn release(&mut self) -> Result<()>;

    /// Open and authenticate a new browser on the base profile.
    async fn reopen(&mut self) -> Result<()>;
}

/// Runs each worker as a child process of this executable.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Launcher running `program args..`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-execute the running binary with the hidden `worker` subcommand.
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?, vec!["worker".to_string()]))
    }

    async fn spawn_and_wait(&self, spec: &WorkerSpec) -> Result<WorkerOutcome> {
        let payload = serde_json::to_vec(spec)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        debug!(
            worker = spec.assignment.worker_index(),
            pid = child.id(),
            "Worker process spawned"
        );

        if let Some(mut stdin) = child.stdin.take() {
            let fed = async {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await
            };
            if let Err(e) = fed.await {
                warn!(
                    worker = spec.assignment.worker_index(),
                    "Could not send the worker its assignment, stopping it: {}", e
                );
                // Reap the child so nothing outlives the supervisor's wait.
                if let Err(kill) = child.kill().await {
                    warn!("Failed to stop worker process: {}", kill);
                }
                return Err(e.into());
            }
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let reported = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str::<WorkerOutcome>(line).ok());

        Ok(reported.unwrap_or_else(|| WorkerOutcome::from_exit_code(output.status.code())))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, spec: WorkerSpec) -> WorkerOutcome {
        let index = spec.assignment.worker_index();
        match self.spawn_and_wait(&spec).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(worker = index, "Worker process failed: {}", e);
                WorkerOutcome::Failed(e.to_string())
            }
        }
    }
}

/// What one worker was given and how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    /// Worker index, 0 for the primary
    pub worker_index: u32,
    /// Items in the worker's bucket
    pub assigned: usize,
    /// How the worker ended
    pub outcome: WorkerOutcome,
}

/// Clones profiles for and waits on a fixed set of workers.
pub struct WorkerSupervisor<L: WorkerLauncher> {
    profiles: ProfileManager,
    launcher: L,
}

impl<L: WorkerLauncher> WorkerSupervisor<L> {
    /// Supervisor cloning under `profiles` and starting workers with `launcher`.
    pub fn new(profiles: ProfileManager, launcher: L) -> Self {
        Self { profiles, launcher }
    }

    /// Profiles the workers run on.
    pub fn profiles(&self) -> &ProfileManager {
        &self.profiles
    }

    /// Run every non-empty assignment in its own worker and wait for all.
    ///
    /// A failing worker never stops its siblings. The primary is reopened
    /// even when cloning or launching failed.
    ///
    /// # Errors
    /// `PrimaryUnavailable` when the primary cannot be released (no worker
    /// is started) or reopened; profile errors from cloning.
    pub async fn supervise<P: PrimarySession + ?Sized>(
        &self,
        primary: &mut P,
        assignments: Vec<ProcessAssignment>,
        template: &WorkerTemplate,
    ) -> Result<Vec<WorkerReport>> {
        if assignments.iter().any(|a| a.worker_index() == 0) {
            return Err(ScrapeError::Configuration(
                "worker index 0 is reserved for the primary session".to_string(),
            ));
        }

        primary
            .release()
            .await
            .map_err(|e| ScrapeError::PrimaryUnavailable(format!("release failed: {e}")))?;

        let outcome = self.fan_out(assignments, template).await;

        let reopened = primary.reopen().await;
        if let Err(e) = &reopened {
            error!("Could not reopen the primary session: {}", e);
        }

        let reports = outcome?;
        reopened.map_err(|e| ScrapeError::PrimaryUnavailable(format!("reopen failed: {e}")))?;
        Ok(reports)
    }

    async fn fan_out(
        &self,
        assignments: Vec<ProcessAssignment>,
        template: &WorkerTemplate,
    ) -> Result<Vec<WorkerReport>> {
        let (active, idle): (Vec<_>, Vec<_>) =
            assignments.into_iter().partition(|a| !a.is_empty());
        for assignment in &idle {
            debug!(worker = assignment.worker_index(), "Empty bucket, no worker launched");
        }

        let hash = template.identity.hash();
        for assignment in &active {
            let profiles = self.profiles.clone();
            let hash = hash.clone();
            let index = assignment.worker_index();
            tokio::task::spawn_blocking(move || profiles.ensure_clone(&hash, index))
                .await
                .map_err(|e| ScrapeError::Process(e.to_string()))??;
        }

        info!(workers = active.len(), "Launching workers");
        let launches = active.into_iter().map(|assignment| {
            let worker_index = assignment.worker_index();
            let assigned = assignment.len();
            let spec = template.spec_for(assignment);
            async move {
                let outcome = self.launcher.launch(spec).await;
                match &outcome {
                    WorkerOutcome::Completed(report) => {
                        info!(worker = worker_index, found = report.found, "Worker finished");
                    }
                    other => warn!(worker = worker_index, "Worker ended early: {:?}", other),
                }
                WorkerReport {
                    worker_index,
                    assigned,
                    outcome,
                }
            }
        });

        Ok(join_all(launches).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{partition, RangeRequest};
    use crate::testing::{test_template, FakeFactory, InProcessLauncher, LoginBehavior, MemorySink};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use wosync_core::WorkItem;

    struct RecordingPrimary {
        events: Arc<Mutex<Vec<String>>>,
        fail_release: bool,
    }

    #[async_trait]
    impl PrimarySession for RecordingPrimary {
        async fn release(&mut self) -> Result<()> {
            if self.fail_release {
                return Err(ScrapeError::PrimaryUnavailable("browser gone".to_string()));
            }
            self.events.lock().expect("events").push("release".to_string());
            Ok(())
        }

        async fn reopen(&mut self) -> Result<()> {
            self.events.lock().expect("events").push("reopen".to_string());
            Ok(())
        }
    }

    fn setup(factory: &FakeFactory) -> (TempDir, WorkerSupervisor<InProcessLauncher>, Arc<MemorySink>) {
        let dir = TempDir::new().expect("create temp dir");
        let profiles = ProfileManager::new(dir.path());
        profiles
            .ensure_base(&test_template().identity.hash())
            .expect("base profile");
        let sink = Arc::new(MemorySink::default());
        let launcher = InProcessLauncher::new(factory.clone(), sink.clone());
        (dir, WorkerSupervisor::new(profiles, launcher), sink)
    }

    #[tokio::test]
    async fn test_release_clone_launch_reopen_order() {
        let factory = FakeFactory::new();
        let (_dir, supervisor, _sink) = setup(&factory);
        let mut primary = RecordingPrimary {
            events: factory.event_log(),
            fail_release: false,
        };

        let assignments = partition(&RangeRequest::orders("WO", 0, 9), 3).expect("partition");
        let reports = supervisor
            .supervise(&mut primary, assignments, &test_template())
            .await
            .expect("supervise");

        assert_eq!(reports.len(), 3);
        let events = factory.events();
        assert_eq!(events.first().map(String::as_str), Some("release"));
        assert_eq!(events.last().map(String::as_str), Some("reopen"));
        for index in 1..=3 {
            assert!(events.contains(&format!("launch {index}")));
            assert!(events.contains(&format!("close {index}")));
            assert!(supervisor
                .profiles()
                .instance_path(&test_template().identity.hash(), index)
                .is_dir());
        }
    }

    #[tokio::test]
    async fn test_failed_worker_does_not_affect_siblings() {
        let factory = FakeFactory::new()
            .with_behavior(2, LoginBehavior::RejectCredentials)
            .with_order(2, &[("trade", "ROOFING")]);
        let (_dir, supervisor, sink) = setup(&factory);
        let mut primary = RecordingPrimary {
            events: factory.event_log(),
            fail_release: false,
        };

        let assignments = partition(&RangeRequest::orders("WO", 0, 6), 2).expect("partition");
        let reports = supervisor
            .supervise(&mut primary, assignments, &test_template())
            .await
            .expect("supervise");

        let first = reports.iter().find(|r| r.worker_index == 1).expect("worker 1");
        let second = reports.iter().find(|r| r.worker_index == 2).expect("worker 2");
        assert!(first.outcome.is_success());
        assert!(matches!(second.outcome, WorkerOutcome::AuthenticationFailed(_)));

        let mut ids = sink.ids();
        ids.sort();
        assert_eq!(ids, vec!["WO0", "WO2", "WO4"]);
        assert_eq!(first.outcome.report().map(|r| r.found), Some(1));
        assert_eq!(factory.events().last().map(String::as_str), Some("reopen"));
    }

    #[tokio::test]
    async fn test_empty_buckets_launch_nothing() {
        let factory = FakeFactory::new();
        let (_dir, supervisor, _sink) = setup(&factory);
        let mut primary = RecordingPrimary {
            events: factory.event_log(),
            fail_release: false,
        };

        // One id, three workers: only worker 2 has work.
        let assignments = partition(&RangeRequest::orders("WO", 4, 5), 3).expect("partition");
        let reports = supervisor
            .supervise(&mut primary, assignments, &test_template())
            .await
            .expect("supervise");

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].worker_index, 2);
        assert_eq!(factory.opened(), vec![(2, true)]);
    }

    #[tokio::test]
    async fn test_release_failure_starts_no_worker() {
        let factory = FakeFactory::new();
        let (_dir, supervisor, _sink) = setup(&factory);
        let mut primary = RecordingPrimary {
            events: factory.event_log(),
            fail_release: true,
        };

        let assignments = partition(&RangeRequest::orders("WO", 0, 4), 2).expect("partition");
        let err = supervisor
            .supervise(&mut primary, assignments, &test_template())
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::PrimaryUnavailable(_)));
        assert!(factory.events().is_empty());
    }

    #[tokio::test]
    async fn test_missing_base_still_reopens_primary() {
        let factory = FakeFactory::new();
        let dir = TempDir::new().expect("create temp dir");
        let launcher = InProcessLauncher::new(factory.clone(), Arc::new(MemorySink::default()));
        let supervisor = WorkerSupervisor::new(ProfileManager::new(dir.path()), launcher);
        let mut primary = RecordingPrimary {
            events: factory.event_log(),
            fail_release: false,
        };

        let assignments = partition(&RangeRequest::orders("WO", 0, 4), 2).expect("partition");
        let err = supervisor
            .supervise(&mut primary, assignments, &test_template())
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::BaseProfileMissing(_)));
        assert_eq!(factory.events(), vec!["release", "reopen"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_launcher_reads_outcome_from_stdout() {
        let launcher = ProcessLauncher::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"cat > /dev/null; echo '{"status":"failed","detail":"no chrome"}'"#.to_string(),
            ],
        );
        let spec = test_template().spec_for(ProcessAssignment::new(1, Vec::new()));

        let outcome = launcher.launch(spec).await;
        assert_eq!(outcome, WorkerOutcome::Failed("no chrome".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_launcher_falls_back_to_exit_code() {
        let launcher = ProcessLauncher::new(
            "sh",
            vec!["-c".to_string(), "cat > /dev/null; exit 3".to_string()],
        );
        let spec = test_template().spec_for(ProcessAssignment::new(1, Vec::new()));

        let outcome = launcher.launch(spec).await;
        assert!(matches!(outcome, WorkerOutcome::AuthenticationFailed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_that_refuses_its_assignment_is_stopped() {
        let dir = TempDir::new().expect("create temp dir");
        let marker = dir.path().join("still-running");
        // Closes stdin at once, then would leave a marker behind if not stopped.
        let launcher = ProcessLauncher::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"exec 0<&-; sleep 1; touch "$0""#.to_string(),
                marker.display().to_string(),
            ],
        );
        // Larger than a pipe buffer, so the write cannot complete unread.
        let items = (0..20_000).map(|id| WorkItem::order("WO", id)).collect();
        let spec = test_template().spec_for(ProcessAssignment::new(1, items));

        let outcome = launcher.launch(spec).await;
        assert!(matches!(outcome, WorkerOutcome::Failed(_)));

        tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
        assert!(!marker.exists());
    }
}
