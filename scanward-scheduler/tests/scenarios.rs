//! End to end scheduler scenarios against the in-memory store and a
//! scripted product delegate.

mod common;

use common::*;
use scanward_core::cleanup::CleanupConfig;
use scanward_core::domain::event::{EventPayload, MessageId};
use scanward_core::domain::executor::{DelegateState, ResultFormat};
use scanward_core::domain::job::JobState;
use scanward_core::domain::message::MessageLevel;
use scanward_scheduler::repository::{InMemoryJobStore, InMemorySchedulerConfigStore, JobStore, SchedulerConfigStore};
use scanward_scheduler::service::coordinator::RESTART_JOB_NOT_FOUND;
use scanward_scheduler::service::state_machine::CANCELED_BY_USER;
use scanward_scheduler::service::{CleanupService, EventBus, SystemLoad, TransitionError, UploadStore};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_job_runs_to_done_through_valid_states() {
    let dir = tempfile::tempdir().unwrap();
    let delegate = FakeDelegate::new(DelegateState::Done);
    let scheduler = single_scheduler(
        config("node-1", dir.path()),
        profiles(vec![executor("code", ResultFormat::KeyValue)]),
        Arc::clone(&delegate),
    );
    let mut events = scheduler.events.subscribe();

    let job = ready_job(&scheduler).await;
    assert_eq!(scheduler.dispatcher.trigger_once().await.unwrap(), 1);
    let done = wait_for_state(&scheduler, job.id, JobState::Done).await;

    assert!(done.started_at.unwrap() <= done.ended_at.unwrap());
    assert_eq!(done.executor_jobs.len(), 1);
    assert_eq!(done.result.as_ref().unwrap().findings.len(), 1);
    assert_eq!(done.executed_by.as_deref(), Some("node-1"));

    let mut path = vec![JobState::Created];
    while let Ok(message) = events.try_recv() {
        if let EventPayload::JobState { job_id, from, to, .. } = message.payload {
            if job_id == job.id {
                assert_eq!(Some(&from), path.last());
                assert!(from.can_transition_to(to), "{from} -> {to}");
                path.push(to);
            }
        }
    }
    assert_eq!(
        path,
        vec![
            JobState::Created,
            JobState::ReadyToStart,
            JobState::Queued,
            JobState::Running,
            JobState::Done,
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_dispatchers_start_job_once() {
    let dir = tempfile::tempdir().unwrap();
    let delegate = FakeDelegate::new(DelegateState::Running);
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let settings: Arc<dyn SchedulerConfigStore> = Arc::new(InMemorySchedulerConfigStore::default());
    let executors = vec![executor("code", ResultFormat::KeyValue)];

    let first = Arc::new(scheduler(
        config("node-1", dir.path()),
        Arc::clone(&store),
        Arc::clone(&settings),
        profiles(executors.clone()),
        Arc::clone(&delegate),
    ));
    let second = Arc::new(scheduler(
        config("node-2", dir.path()),
        Arc::clone(&store),
        Arc::clone(&settings),
        profiles(executors),
        Arc::clone(&delegate),
    ));

    let job = ready_job(&first).await;

    let a = {
        let first = Arc::clone(&first);
        tokio::spawn(async move { first.dispatcher.trigger_once().await.unwrap() })
    };
    let b = {
        let second = Arc::clone(&second);
        tokio::spawn(async move { second.dispatcher.trigger_once().await.unwrap() })
    };
    let launched = a.await.unwrap() + b.await.unwrap();
    assert_eq!(launched, 1);

    let running = wait_for(&first, job.id, |job| !job.executor_jobs.is_empty()).await;
    assert_eq!(running.state, JobState::Running);

    delegate.set_all(DelegateState::Done);
    let done = wait_for_state(&first, job.id, JobState::Done).await;
    assert_eq!(done.executor_jobs.len(), 1);
    assert_eq!(delegate.starts(), 1);
}

#[tokio::test]
async fn test_confirmed_cancel_leaves_two_messages() {
    let dir = tempfile::tempdir().unwrap();
    let delegate = FakeDelegate::new(DelegateState::Running);
    let scheduler = single_scheduler(
        config("node-1", dir.path()),
        profiles(vec![executor("code", ResultFormat::KeyValue)]),
        Arc::clone(&delegate),
    );

    let job = ready_job(&scheduler).await;
    scheduler.dispatcher.trigger_once().await.unwrap();
    wait_for(&scheduler, job.id, |job| !job.executor_jobs.is_empty()).await;

    let requested = scheduler.coordinator.cancel_job(job.id).await.unwrap();
    assert_eq!(requested.state, JobState::CancelRequested);

    let canceled = wait_for_state(&scheduler, job.id, JobState::Canceled).await;
    let texts: Vec<&str> = canceled.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(canceled.messages.len(), 2);
    assert_eq!(texts[0], CANCELED_BY_USER);
    assert_eq!(canceled.messages[1].level, MessageLevel::Info);
    assert_eq!(delegate.cancels(), 1);
    assert!(canceled.ended_at.is_some());
}

#[tokio::test]
async fn test_unconfirmed_cancel_is_forced_after_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let delegate = FakeDelegate::ignoring_cancel(DelegateState::Running);
    let mut config = config("node-1", dir.path());
    config.cancel_timeout = Duration::from_millis(100);
    let scheduler = single_scheduler(
        config,
        profiles(vec![executor("code", ResultFormat::KeyValue)]),
        Arc::clone(&delegate),
    );

    let job = ready_job(&scheduler).await;
    scheduler.dispatcher.trigger_once().await.unwrap();
    wait_for(&scheduler, job.id, |job| !job.executor_jobs.is_empty()).await;
    scheduler.coordinator.cancel_job(job.id).await.unwrap();

    let canceled = wait_for_state(&scheduler, job.id, JobState::Canceled).await;
    assert_eq!(canceled.messages.len(), 2);
    assert_eq!(canceled.messages[1].level, MessageLevel::Warning);
}

#[tokio::test]
async fn test_cancel_of_waiting_job_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = single_scheduler(
        config("node-1", dir.path()),
        profiles(vec![executor("code", ResultFormat::KeyValue)]),
        FakeDelegate::new(DelegateState::Running),
    );

    let job = ready_job(&scheduler).await;
    assert!(scheduler.coordinator.cancel_job(job.id).await.is_err());
}

#[tokio::test]
async fn test_suspend_on_shutdown_and_resume_elsewhere_reattaches() {
    let dir = tempfile::tempdir().unwrap();
    let delegate = FakeDelegate::new(DelegateState::Running);
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let settings: Arc<dyn SchedulerConfigStore> = Arc::new(InMemorySchedulerConfigStore::default());
    let executors = vec![executor("code", ResultFormat::KeyValue)];

    let leaving = scheduler(
        config("node-1", dir.path()),
        Arc::clone(&store),
        Arc::clone(&settings),
        profiles(executors.clone()),
        Arc::clone(&delegate),
    );
    let staying = scheduler(
        config("node-2", dir.path()),
        Arc::clone(&store),
        Arc::clone(&settings),
        profiles(executors),
        Arc::clone(&delegate),
    );

    let job = ready_job(&leaving).await;
    leaving.dispatcher.trigger_once().await.unwrap();
    wait_for(&leaving, job.id, |job| !job.executor_jobs.is_empty()).await;

    leaving.shutdown().await;
    let suspended = leaving.jobs.get_job(job.id).await.unwrap();
    assert_eq!(suspended.state, JobState::Suspended);
    assert_eq!(suspended.suspend_count, 1);
    assert!(leaving.local_jobs.is_empty());
    // a terminating instance does not pick up work
    assert_eq!(leaving.dispatcher.trigger_once().await.unwrap(), 0);

    assert_eq!(staying.coordinator.resume_suspended().await.unwrap(), 1);
    let queued = staying.jobs.get_job(job.id).await.unwrap();
    assert_eq!(queued.state, JobState::Queued);
    assert_eq!(queued.executor_jobs.len(), 1);

    assert_eq!(staying.dispatcher.trigger_once().await.unwrap(), 1);
    delegate.set_all(DelegateState::Done);
    let done = wait_for_state(&staying, job.id, JobState::Done).await;

    assert_eq!(done.executor_jobs.len(), 1);
    assert_eq!(done.executed_by.as_deref(), Some("node-2"));
    assert_eq!(delegate.starts(), 1);
}

#[tokio::test]
async fn test_soft_restart_reattaches_and_hard_restart_starts_again() {
    let dir = tempfile::tempdir().unwrap();
    let delegate = FakeDelegate::new(DelegateState::Running);
    let scheduler = single_scheduler(
        config("node-1", dir.path()),
        profiles(vec![executor("code", ResultFormat::KeyValue)]),
        Arc::clone(&delegate),
    );

    let job = ready_job(&scheduler).await;
    scheduler.dispatcher.trigger_once().await.unwrap();
    wait_for(&scheduler, job.id, |job| !job.executor_jobs.is_empty()).await;

    let restarted = scheduler.coordinator.restart_job(job.id, false).await.unwrap();
    assert_eq!(restarted.state, JobState::Queued);
    assert_eq!(restarted.executor_jobs.len(), 1);

    scheduler.dispatcher.trigger_once().await.unwrap();
    wait_for_state(&scheduler, job.id, JobState::Running).await;
    assert_eq!(delegate.starts(), 1);

    let restarted = scheduler.coordinator.restart_job(job.id, true).await.unwrap();
    assert!(restarted.executor_jobs.is_empty());
    assert_eq!(delegate.cancels(), 1);

    scheduler.dispatcher.trigger_once().await.unwrap();
    wait_for(&scheduler, job.id, |job| !job.executor_jobs.is_empty()).await;
    assert_eq!(delegate.starts(), 2);

    delegate.set_all(DelegateState::Done);
    wait_for_state(&scheduler, job.id, JobState::Done).await;
    assert!(scheduler.coordinator.restart_job(job.id, false).await.is_err());
}

#[tokio::test]
async fn test_project_without_executors_fails() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = single_scheduler(
        config("node-1", dir.path()),
        profiles(Vec::new()),
        FakeDelegate::new(DelegateState::Done),
    );

    let job = ready_job(&scheduler).await;
    scheduler.dispatcher.trigger_once().await.unwrap();
    let failed = wait_for_state(&scheduler, job.id, JobState::Failed).await;

    assert_eq!(failed.messages.len(), 1);
    assert_eq!(failed.messages[0].level, MessageLevel::Error);
    assert!(failed.messages[0].text.contains("No executors"));
}

#[tokio::test]
async fn test_unusable_result_of_one_executor_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let delegate = FakeDelegate::new(DelegateState::Done);
    delegate.set_result("broken", "this is not sarif");
    let scheduler = single_scheduler(
        config("node-1", dir.path()),
        profiles(vec![
            executor("code", ResultFormat::KeyValue),
            executor("broken", ResultFormat::Sarif),
        ]),
        Arc::clone(&delegate),
    );

    let job = ready_job(&scheduler).await;
    scheduler.dispatcher.trigger_once().await.unwrap();
    let done = wait_for_state(&scheduler, job.id, JobState::Done).await;

    let result = done.result.unwrap();
    assert_eq!(result.imported_executors, 1);
    assert_eq!(result.findings.len(), 1);
    assert!(done
        .messages
        .iter()
        .any(|m| m.level == MessageLevel::Warning && m.text.contains("broken")));
}

#[tokio::test]
async fn test_no_usable_result_fails_job() {
    let dir = tempfile::tempdir().unwrap();
    let delegate = FakeDelegate::new(DelegateState::Done);
    delegate.set_result("broken", "{}");
    let scheduler = single_scheduler(
        config("node-1", dir.path()),
        profiles(vec![executor("broken", ResultFormat::JsonFindings)]),
        Arc::clone(&delegate),
    );

    let job = ready_job(&scheduler).await;
    scheduler.dispatcher.trigger_once().await.unwrap();
    let failed = wait_for_state(&scheduler, job.id, JobState::Failed).await;

    assert!(failed.result.is_none());
    assert!(failed.messages[0].text.contains("aggregation"));
}

#[tokio::test]
async fn test_failed_delegate_fails_job() {
    let dir = tempfile::tempdir().unwrap();
    let delegate = FakeDelegate::new(DelegateState::Failed);
    let scheduler = single_scheduler(
        config("node-1", dir.path()),
        profiles(vec![executor("code", ResultFormat::KeyValue)]),
        delegate,
    );

    let job = ready_job(&scheduler).await;
    scheduler.dispatcher.trigger_once().await.unwrap();
    let failed = wait_for_state(&scheduler, job.id, JobState::Failed).await;

    assert!(failed.messages[0].text.contains("FAILED"));
}

#[tokio::test]
async fn test_poll_timeout_fails_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config("node-1", dir.path());
    config.poll_timeout = Duration::from_millis(150);
    let scheduler = single_scheduler(
        config,
        profiles(vec![executor("code", ResultFormat::KeyValue)]),
        FakeDelegate::new(DelegateState::Running),
    );

    let job = ready_job(&scheduler).await;
    scheduler.dispatcher.trigger_once().await.unwrap();
    let failed = wait_for_state(&scheduler, job.id, JobState::Failed).await;

    assert!(failed.messages[0].text.contains("did not finish"));
    assert!(failed.ended_at.is_some());
}

#[tokio::test]
async fn test_disabled_processing_and_parallel_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config("node-1", dir.path());
    config.max_parallel_jobs = 1;
    let scheduler = single_scheduler(
        config,
        profiles(vec![executor("code", ResultFormat::KeyValue)]),
        FakeDelegate::new(DelegateState::Running),
    );
    let first = ready_job(&scheduler).await;
    let second = ready_job(&scheduler).await;

    scheduler.status.set_job_processing_enabled(false).await.unwrap();
    assert_eq!(scheduler.dispatcher.trigger_once().await.unwrap(), 0);

    scheduler.status.set_job_processing_enabled(true).await.unwrap();
    assert_eq!(scheduler.dispatcher.trigger_once().await.unwrap(), 1);

    // oldest job first, the second waits for a free slot
    wait_for_state(&scheduler, first.id, JobState::Running).await;
    let waiting = scheduler.jobs.get_job(second.id).await.unwrap();
    assert_eq!(waiting.state, JobState::ReadyToStart);

    let snapshot = scheduler.status.snapshot().await.unwrap();
    assert_eq!(snapshot.running, 1);
    assert_eq!(snapshot.waiting(), 1);
    assert_eq!(snapshot.local_jobs, vec![first.id]);
}

#[tokio::test]
async fn test_orphaned_cancel_request_is_forced() {
    let dir = tempfile::tempdir().unwrap();
    let delegate = FakeDelegate::ignoring_cancel(DelegateState::Running);
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let settings: Arc<dyn SchedulerConfigStore> = Arc::new(InMemorySchedulerConfigStore::default());
    let executors = vec![executor("code", ResultFormat::KeyValue)];

    let mut owner_config = config("node-1", dir.path());
    owner_config.poll_interval = Duration::from_secs(3600);
    let owner = scheduler(
        owner_config,
        Arc::clone(&store),
        Arc::clone(&settings),
        profiles(executors.clone()),
        Arc::clone(&delegate),
    );
    let mut sweeper_config = config("node-2", dir.path());
    sweeper_config.cancel_timeout = Duration::ZERO;
    let sweeper = scheduler(
        sweeper_config,
        Arc::clone(&store),
        Arc::clone(&settings),
        profiles(executors),
        Arc::clone(&delegate),
    );

    let job = ready_job(&owner).await;
    owner.dispatcher.trigger_once().await.unwrap();
    wait_for(&owner, job.id, |job| !job.executor_jobs.is_empty()).await;
    owner.coordinator.cancel_job(job.id).await.unwrap();

    assert_eq!(sweeper.coordinator.sweep_orphaned_cancels().await.unwrap(), 1);
    let canceled = sweeper.jobs.get_job(job.id).await.unwrap();
    assert_eq!(canceled.state, JobState::Canceled);
    assert_eq!(canceled.messages[1].level, MessageLevel::Warning);
    // the owner may have seen the request on its first poll as well
    assert!(delegate.cancels() >= 1);
}

#[tokio::test]
async fn test_cleanup_with_zero_days_never_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CountingStore::default());
    let cleanup = CleanupService::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        UploadStore::new(dir.path()),
        Arc::new(EventBus::default()),
        Some(CleanupConfig::new(0, "days").unwrap()),
        Duration::from_secs(3600),
    );

    assert_eq!(cleanup.cleanup_once().await.unwrap(), 0);
    assert_eq!(store.deletes.load(Ordering::SeqCst), 0);

    let cleanup = CleanupService::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        UploadStore::new(dir.path()),
        Arc::new(EventBus::default()),
        None,
        Duration::from_secs(3600),
    );
    cleanup.cleanup_once().await.unwrap();
    assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cleanup_with_unrepresentable_retention_deletes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CountingStore::default());
    let cleanup = CleanupService::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        UploadStore::new(dir.path()),
        Arc::new(EventBus::default()),
        Some(CleanupConfig::new(1_000_000, "years").unwrap()),
        Duration::from_secs(3600),
    );

    assert_eq!(cleanup.cleanup_once().await.unwrap(), 0);
    assert_eq!(store.deletes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_claim_finishing_after_shutdown_suspends_job() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(GatedStore::default());
    let scheduler = scheduler(
        config("node-1", dir.path()),
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(InMemorySchedulerConfigStore::default()),
        profiles(vec![executor("code", ResultFormat::KeyValue)]),
        FakeDelegate::new(DelegateState::Running),
    );
    let job = ready_job(&scheduler).await;

    store.arm();
    let dispatcher = Arc::clone(&scheduler.dispatcher);
    let trigger = tokio::spawn(async move { dispatcher.trigger_once().await });

    // shutdown runs while the claim is held inside the store
    store.entered.notified().await;
    assert_eq!(scheduler.coordinator.shutdown().await, 0);
    store.release.notify_one();

    assert_eq!(trigger.await.unwrap().unwrap(), 0);
    let job = scheduler.jobs.get_job(job.id).await.unwrap();
    assert_eq!(job.state, JobState::Suspended);
    assert_eq!(job.executed_by, None);
    assert_eq!(job.suspend_count, 1);
    assert!(scheduler.local_jobs.is_empty());
}

#[tokio::test]
async fn test_serve_suspends_local_jobs_when_it_returns() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = single_scheduler(
        config("node-1", dir.path()),
        profiles(vec![executor("code", ResultFormat::KeyValue)]),
        FakeDelegate::new(DelegateState::Running),
    );

    let job = ready_job(&scheduler).await;
    scheduler.dispatcher.trigger_once().await.unwrap();
    wait_for(&scheduler, job.id, |job| !job.executor_jobs.is_empty()).await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    scheduler
        .serve(listener, std::future::ready(()))
        .await
        .unwrap();

    assert!(scheduler.is_terminating());
    assert!(scheduler.local_jobs.is_empty());
    let suspended = scheduler.jobs.get_job(job.id).await.unwrap();
    assert_eq!(suspended.state, JobState::Suspended);
}

#[tokio::test]
async fn test_overloaded_instance_skips_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let delegate = FakeDelegate::new(DelegateState::Running);
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let settings: Arc<dyn SchedulerConfigStore> = Arc::new(InMemorySchedulerConfigStore::default());
    let executors = vec![executor("code", ResultFormat::KeyValue)];
    let overloaded = SystemLoad {
        cpu_load: 0.2,
        memory_percent: 97.0,
    };

    let busy = scheduler_with_monitor(
        config("node-1", dir.path()),
        Arc::clone(&store),
        Arc::clone(&settings),
        profiles(executors.clone()),
        Arc::clone(&delegate),
        FixedLoad(overloaded),
    );
    let job = ready_job(&busy).await;

    assert_eq!(busy.dispatcher.trigger_once().await.unwrap(), 0);
    let waiting = busy.jobs.get_job(job.id).await.unwrap();
    assert_eq!(waiting.state, JobState::ReadyToStart);

    let mut unchecked = config("node-2", dir.path());
    unchecked.health_check_enabled = false;
    let unchecked = scheduler_with_monitor(
        unchecked,
        store,
        settings,
        profiles(executors),
        delegate,
        FixedLoad(overloaded),
    );
    assert_eq!(unchecked.dispatcher.trigger_once().await.unwrap(), 1);
    wait_for_state(&unchecked, job.id, JobState::Running).await;
}

#[tokio::test]
async fn test_restart_of_unknown_job_publishes_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = single_scheduler(
        config("node-1", dir.path()),
        profiles(vec![executor("code", ResultFormat::KeyValue)]),
        FakeDelegate::new(DelegateState::Running),
    );
    let mut events = scheduler.events.subscribe();
    let job_id = uuid::Uuid::new_v4();

    let err = scheduler.coordinator.restart_job(job_id, true).await.unwrap_err();
    assert!(matches!(err, TransitionError::NotFound(id) if id == job_id));

    let message = events.try_recv().unwrap();
    assert_eq!(message.message_id, MessageId::JobRestartCanceled);
    match message.payload {
        EventPayload::JobRestart { job_id: id, info, .. } => {
            assert_eq!(id, job_id);
            assert_eq!(info.as_deref(), Some(RESTART_JOB_NOT_FOUND));
        }
        other => panic!("unexpected payload {:?}", other),
    }
}
