//! End-to-end lifecycle tests against a recording provider.

use std::sync::Arc;
use std::time::Duration;

use app_orchestrator::container::Container;
use app_orchestrator::error::{AppError, InitError, TeardownError, UsageError};
use app_orchestrator::lifecycle::{DrainOutcome, LifecycleState, ShutdownSignal};
use app_orchestrator::subsystem::SubsystemKind;
use app_orchestrator::App;
use parking_lot::Mutex;

mod common;

use common::{test_settings, Faults, RecordingProvider};

async fn new_app(settings: app_orchestrator::AppSettings, provider: &RecordingProvider) -> Result<App, AppError> {
    App::new(settings, Arc::new(provider.clone())).await
}

#[tokio::test]
async fn disabled_flags_skip_init_entirely() {
    let provider = RecordingProvider::new();
    let app = new_app(test_settings(), &provider).await.unwrap();
    let ctx = app.context();

    assert!(ctx.document_store().unwrap().is_none());
    assert!(ctx.search().unwrap().is_none());
    assert!(ctx.mailer().unwrap().is_none());
    assert!(ctx.broker().unwrap().is_none());

    assert_eq!(
        provider.log.with_prefix("init:"),
        vec!["init:queue", "init:cache", "init:scheduler"]
    );
}

#[tokio::test]
async fn enabled_flags_fill_every_accessor() {
    let mut settings = test_settings();
    settings.features.document_store = true;
    settings.features.search = true;
    settings.features.search_sync = true;
    settings.features.mailer = true;
    settings.features.broker = true;
    settings.document_store.uri = "mongodb://localhost:27017".to_string();
    settings.document_store.database = "app".to_string();
    settings.search.endpoint = "http://localhost:7700".to_string();
    settings.search.api_key = "master".to_string();
    settings.mailer.from_email = "noreply@example.com".to_string();
    settings.mailer.smtp.host = "smtp.example.com".to_string();

    let provider = RecordingProvider::new();
    let app = new_app(settings, &provider).await.unwrap();
    let ctx = app.context();

    assert!(ctx.document_store().unwrap().is_some());
    assert!(ctx.search().unwrap().is_some());
    assert!(ctx.queue().unwrap().is_some());
    assert!(ctx.cache().unwrap().is_some());
    assert!(ctx.mailer().unwrap().is_some());
    assert!(ctx.listener().unwrap().is_some());
    assert!(ctx.scheduler().unwrap().is_some());
    assert!(ctx.broker().unwrap().is_some());

    assert_eq!(
        provider.log.events(),
        vec![
            "init:document_store",
            "init:queue",
            "init:search",
            "bind:search_sync",
            "init:cache",
            "init:mailer",
            "init:scheduler",
            "init:broker",
        ]
    );
}

#[tokio::test]
async fn accessors_before_ready_are_usage_errors() {
    let provider = RecordingProvider::new();
    let mut container = Container::new(Arc::new(test_settings()), Arc::new(provider));
    container.init_mandatory().await.unwrap();

    assert_eq!(container.queue().err(), Some(UsageError::NotReady));
    assert_eq!(container.listener().err(), Some(UsageError::NotReady));
}

#[tokio::test]
async fn scenario_a_document_store_only() {
    let mut settings = test_settings();
    settings.features.document_store = true;
    settings.document_store.uri = "mongodb://localhost:27017".to_string();
    settings.document_store.database = "app".to_string();

    let provider = RecordingProvider::new();
    let app = Arc::new(new_app(settings, &provider).await.unwrap());
    let runner = tokio::spawn({
        let app = app.clone();
        async move { app.run().await }
    });

    common::wait_live(&app).await;
    assert_eq!(app.state(), LifecycleState::Running);
    assert!(app.context().document_store().unwrap().is_some());
    assert!(app.context().mailer().unwrap().is_none());

    app.shutdown_handle().trigger();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn scenario_b_mailer_without_queue_never_runs() {
    let mut settings = test_settings();
    settings.features.mailer = true;
    settings.mailer.from_email = "noreply@example.com".to_string();
    settings.mailer.smtp.host = "smtp.example.com".to_string();

    let provider = RecordingProvider::with_faults(Faults {
        fail_init: Some(SubsystemKind::Queue),
        ..Default::default()
    });

    let err = new_app(settings.clone(), &provider).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        AppError::Init(InitError::Subsystem {
            subsystem: SubsystemKind::Queue,
            ..
        })
    ));
    assert_eq!(provider.log.count("init:mailer"), 0);

    // Without the mandatory phase the mailer's dependency is missing.
    let mut container = Container::new(Arc::new(settings), Arc::new(RecordingProvider::new()));
    let err = container.init_optional().await.unwrap_err();
    assert!(matches!(
        err,
        InitError::MissingDependency {
            subsystem: SubsystemKind::Mailer,
            requires: SubsystemKind::Queue,
        }
    ));
}

#[tokio::test]
async fn failed_init_closes_what_was_opened() {
    let mut settings = test_settings();
    settings.features.broker = true;

    let provider = RecordingProvider::with_faults(Faults {
        fail_init: Some(SubsystemKind::Broker),
        ..Default::default()
    });

    assert!(new_app(settings, &provider).await.is_err());
    assert_eq!(
        provider.log.with_prefix("close:"),
        vec!["close:scheduler", "close:cache", "close:queue"]
    );
}

#[tokio::test]
async fn invalid_broker_settings_fail_before_connecting() {
    let mut settings = test_settings();
    settings.features.broker = true;
    settings.broker.addr = "not a url".to_string();

    let provider = RecordingProvider::new();
    let err = new_app(settings, &provider).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Init(InitError::InvalidSettings {
            subsystem: SubsystemKind::Broker,
            ..
        })
    ));
    assert_eq!(provider.log.count("init:broker"), 0);
}

#[tokio::test]
async fn scenario_c_second_run_is_rejected() {
    let provider = RecordingProvider::new();
    let app = Arc::new(new_app(test_settings(), &provider).await.unwrap());
    let runner = tokio::spawn({
        let app = app.clone();
        async move { app.run().await }
    });
    common::wait_live(&app).await;

    let err = app.run().await.unwrap_err();
    assert!(matches!(err, AppError::Usage(UsageError::AlreadyRunning)));

    app.shutdown_handle().trigger();
    runner.await.unwrap().unwrap();

    assert_eq!(provider.log.count("start:queue"), 1);
    assert_eq!(provider.log.count("start:scheduler"), 1);

    let err = app.run().await.unwrap_err();
    assert!(matches!(err, AppError::Usage(UsageError::AlreadyStopped)));
}

#[tokio::test]
async fn scenario_d_signal_drains_runs_hooks_and_stops() {
    let provider = RecordingProvider::new();
    let app = Arc::new(new_app(test_settings(), &provider).await.unwrap());

    let order = Arc::new(Mutex::new(Vec::new()));
    for id in 1..=3 {
        let order = order.clone();
        app.add_shutdown_hook(move || async move {
            order.lock().push(id);
        })
        .unwrap();
    }

    let runner = tokio::spawn({
        let app = app.clone();
        async move { app.run().await }
    });
    common::wait_live(&app).await;

    assert!(order.lock().is_empty());
    assert_eq!(app.add_shutdown_hook(|| async {}), Err(UsageError::HooksFrozen));

    app.shutdown_handle().deliver(ShutdownSignal::Terminate);
    let report = runner.await.unwrap().unwrap();

    assert_eq!(report.signal, ShutdownSignal::Terminate);
    assert_eq!(report.drain, DrainOutcome::Drained);
    assert_eq!(*order.lock(), vec![1, 2, 3]);
    assert_eq!(app.state(), LifecycleState::Stopped);

    // A second signal after shutdown changes nothing.
    app.shutdown_handle().trigger();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*order.lock(), vec![1, 2, 3]);
}

#[tokio::test]
async fn scenario_e_close_failure_does_not_stop_teardown() {
    let provider = RecordingProvider::with_faults(Faults {
        fail_close: Some(SubsystemKind::Cache),
        ..Default::default()
    });
    let app = new_app(test_settings(), &provider).await.unwrap();

    app.shutdown_handle().trigger();
    let report = app.run().await.unwrap();

    assert_eq!(
        provider.log.with_prefix("close:"),
        vec!["close:scheduler", "close:cache", "close:queue"]
    );
    assert_eq!(report.teardown.failures.len(), 1);
    assert!(matches!(
        report.teardown.failures[0],
        (SubsystemKind::Cache, TeardownError::Failed(_))
    ));
    assert!(report.teardown.closed.contains(&SubsystemKind::Queue));
    assert_eq!(app.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn hung_close_is_bounded() {
    let provider = RecordingProvider::with_faults(Faults {
        hang_close: Some(SubsystemKind::Scheduler),
        ..Default::default()
    });
    let app = new_app(test_settings(), &provider).await.unwrap();

    app.shutdown_handle().trigger();
    let report = tokio::time::timeout(Duration::from_secs(10), app.run())
        .await
        .expect("teardown must not hang")
        .unwrap();

    assert!(matches!(
        report.teardown.failures[0],
        (SubsystemKind::Scheduler, TeardownError::TimedOut(_))
    ));
    assert_eq!(provider.log.count("close:queue"), 1);
}

#[tokio::test]
async fn start_failure_is_fatal_but_still_tears_down() {
    let provider = RecordingProvider::with_faults(Faults {
        fail_start: Some(SubsystemKind::Queue),
        ..Default::default()
    });
    let app = new_app(test_settings(), &provider).await.unwrap();
    let hook_ran = Arc::new(Mutex::new(false));
    let flag = hook_ran.clone();
    app.add_shutdown_hook(move || async move {
        *flag.lock() = true;
    })
    .unwrap();

    let err = app.run().await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Start {
            subsystem: SubsystemKind::Queue,
            ..
        }
    ));
    assert_eq!(provider.log.count("start:scheduler"), 0);
    assert_eq!(provider.log.count("close:queue"), 1);
    assert!(*hook_ran.lock());
    assert_eq!(app.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn bind_failure_is_fatal() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut settings = test_settings();
    settings.http.port = blocker.local_addr().unwrap().port();

    let provider = RecordingProvider::new();
    let app = new_app(settings, &provider).await.unwrap();

    let err = app.run().await.unwrap_err();

    assert!(matches!(err, AppError::Listener(_)));
    assert_eq!(provider.log.count("start:queue"), 0);
    assert_eq!(provider.log.count("close:queue"), 1);
}

#[tokio::test]
async fn close_with_nothing_initialized_is_a_no_op() {
    let container = Container::new(Arc::new(test_settings()), Arc::new(RecordingProvider::new()));
    let report = container.close().await;
    assert!(report.is_clean());
    assert_eq!(report.attempted(), 0);
}
