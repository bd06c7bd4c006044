//! Tests for queued update jobs

use std::sync::Arc;

use module_resolver::Environment;
use module_test_utils::{ModuleFixture, ScriptedSteps, StaticReleaseChecker, TestSite, release};
use module_update::config::UpdateConfig;
use module_update::{
    CheckUpdatesJob, Error, Job, JobQueue, MemoryHistoryStore, UpdateChecker, UpdateModuleJob,
    UpdateOrchestrator, shared_registry,
};

#[tokio::test]
async fn test_update_job_runs_orchestrator() {
    let site = TestSite::new();
    site.install(&ModuleFixture::new("forum", "1.0.0"));
    let registry = shared_registry(site.registry());
    let checker = Arc::new(UpdateChecker::new(
        registry.clone(),
        Arc::new(StaticReleaseChecker::new().with_release("acme/forum", release("1.0.1"))),
    ));
    let orchestrator = Arc::new(UpdateOrchestrator::new(
        registry,
        checker,
        Arc::new(ScriptedSteps::new()),
        Arc::new(MemoryHistoryStore::new()),
        Environment::new("8.3.0"),
    ));
    let job = UpdateModuleJob::new(orchestrator, "forum", &UpdateConfig::default());
    assert_eq!(job.spec().unique_key.as_deref(), Some("module-update:forum"));

    let queue = JobQueue::new();
    let result = queue.dispatch(&job).await.unwrap();

    assert!(result.is_success());
    assert!(!queue.is_held("module-update:forum"));
}

#[tokio::test(start_paused = true)]
async fn test_check_job_retries_transient_failures() {
    let site = TestSite::new();
    site.install(&ModuleFixture::new("forum", "1.0.0"));
    let releases = Arc::new(StaticReleaseChecker::new().with_host_error("acme/forum", 502));
    let checker = Arc::new(UpdateChecker::new(
        shared_registry(site.registry()),
        releases.clone(),
    ));
    let config = UpdateConfig {
        check_tries: 3,
        ..UpdateConfig::default()
    };

    let err = JobQueue::new()
        .dispatch(&CheckUpdatesJob::new(checker, true, &config))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ReleaseHost { status: 502, .. }));
    assert_eq!(releases.lookups(), 3);
}
