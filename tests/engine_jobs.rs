mod common;

use common::{engine_with, init_tracing, new_model, range_of, zigzag_bars};
use model_lifecycle::config::EngineConfig;
use model_lifecycle::domain::errors::LifecycleError;
use model_lifecycle::domain::events::LifecycleEvent;
use model_lifecycle::domain::market::Timeframe;
use model_lifecycle::domain::model::{
    AlgorithmKind, Hyperparameters, ModelStatus, NewModel, RunPurpose, RunStatus,
};

fn slow_neural() -> NewModel {
    NewModel {
        hyperparameters: Hyperparameters::new()
            .with("epochs", 200_000)
            .with("hidden_units", 32),
        ..new_model("slow", AlgorithmKind::Neural)
    }
}

#[tokio::test]
async fn test_concurrent_jobs_conflict_and_cancel() -> anyhow::Result<()> {
    init_tracing();
    let fx = engine_with(zigzag_bars(2_000), EngineConfig::default()).await;
    let model_id = fx.engine.create_model(slow_neural()).await?;

    let job = fx.engine.train_model(model_id, fx.range).await?;
    assert_eq!(job.model_id(), model_id);

    let second = fx.engine.train_model(model_id, fx.range).await;
    assert!(matches!(second, Err(LifecycleError::Conflict { .. })));
    let delete = fx.engine.delete_model(model_id).await;
    assert!(matches!(delete, Err(LifecycleError::Conflict { .. })));

    let run_id = job.id();
    job.cancel();
    let result = job.wait().await;
    assert!(matches!(result, Err(LifecycleError::Cancelled { .. })));

    let model = fx.engine.registry().get_model(model_id).await?;
    assert_eq!(model.status, ModelStatus::Failed);

    let run = fx.engine.registry().get_run(run_id).await?;
    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.failure_reason.as_deref(), Some("cancelled"));
    assert!(run.completed_at.is_some());

    let events = fx.events.events();
    assert!(matches!(
        events.first(),
        Some(LifecycleEvent::TrainingStarted { run_id: id, .. }) if *id == run_id
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        LifecycleEvent::TrainingFailed {
            run_id: Some(id),
            reason,
            status: ModelStatus::Failed,
            ..
        } if *id == run_id && reason == "cancelled"
    )));

    // Failed models can be retrained.
    let retry = fx.engine.create_model(new_model("retry", AlgorithmKind::Linear)).await?;
    fx.engine.train_model(retry, fx.range).await?.wait().await?;
    Ok(())
}

#[tokio::test]
async fn test_each_algorithm_trains() -> anyhow::Result<()> {
    let fx = engine_with(zigzag_bars(250), EngineConfig::default()).await;
    let algorithms = [
        (AlgorithmKind::Linear, Hyperparameters::new()),
        (
            AlgorithmKind::TreeEnsemble,
            Hyperparameters::new().with("n_trees", 15).with("max_depth", 6),
        ),
        (
            AlgorithmKind::Neural,
            Hyperparameters::new().with("epochs", 150).with("hidden_units", 8),
        ),
    ];

    for (algorithm, hyperparameters) in algorithms {
        let id = fx
            .engine
            .create_model(NewModel {
                hyperparameters,
                ..new_model(algorithm.as_str(), algorithm)
            })
            .await?;
        let run_id = fx.engine.train_model(id, fx.range).await?.wait().await?;

        let run = fx.engine.registry().get_run(run_id).await?;
        assert_eq!(run.status, RunStatus::Completed, "{}", algorithm);
        assert_eq!(run.purpose, RunPurpose::Holdout);
        assert!(run.artifact_checksum.is_some());
        let data_range = run.data_range.expect("run records its bar span");
        assert_eq!(data_range, fx.range);
        assert!(run.duration_ms.is_some());

        let status = fx.engine.get_model_status(id).await?;
        assert_eq!(status.model.status, ModelStatus::Validated);
        assert_eq!(status.latest_run.map(|r| r.run_id), Some(run_id));
    }

    let events = fx.events.events();
    let completed = events
        .iter()
        .filter(|e| matches!(e, LifecycleEvent::TrainingCompleted { .. }))
        .count();
    assert_eq!(completed, 3);
    Ok(())
}

#[tokio::test]
async fn test_predict_before_promotion_is_rejected() -> anyhow::Result<()> {
    let bars = zigzag_bars(200);
    let fx = engine_with(bars.clone(), EngineConfig::default()).await;
    let id = fx.engine.create_model(new_model("unready", AlgorithmKind::Linear)).await?;
    fx.engine.train_model(id, fx.range).await?.wait().await?;

    let err = fx.engine.predict(id, &bars).await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::ModelNotReady {
            status: ModelStatus::Validated,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn test_feature_importance_ranks_every_feature() -> anyhow::Result<()> {
    let fx = engine_with(zigzag_bars(300), EngineConfig::default()).await;
    let id = fx.engine.create_model(new_model("importance", AlgorithmKind::Linear)).await?;
    let run_id = fx.engine.train_model(id, fx.range).await?.wait().await?;

    let importances = fx
        .engine
        .compute_feature_importance(id, run_id, fx.range)
        .await?;
    assert!(!importances.is_empty());
    let ranks: Vec<usize> = importances.iter().map(|i| i.rank).collect();
    assert_eq!(ranks, (1..=importances.len()).collect::<Vec<_>>());
    assert!(importances.iter().all(|i| i.importance >= 0.0));
    assert!(
        importances
            .windows(2)
            .all(|p| p[0].importance >= p[1].importance)
    );
    assert_eq!(fx.engine.feature_importances(run_id).await?, importances);

    // Recomputing replaces the stored set.
    let again = fx
        .engine
        .compute_feature_importance(id, run_id, fx.range)
        .await?;
    assert_eq!(fx.engine.feature_importances(run_id).await?.len(), again.len());
    Ok(())
}

#[tokio::test]
async fn test_importance_rejects_rows_the_fit_saw() -> anyhow::Result<()> {
    let bars = zigzag_bars(300);
    let fx = engine_with(bars.clone(), EngineConfig::default()).await;
    let id = fx.engine.create_model(new_model("in-sample", AlgorithmKind::Linear)).await?;
    let run_id = fx.engine.train_model(id, fx.range).await?.wait().await?;

    let run = fx.engine.registry().get_run(run_id).await?;
    let train_end = run.splits.train.last_timestamp.expect("train rows recorded");
    assert!(bars[149].timestamp < train_end);

    let err = fx
        .engine
        .compute_feature_importance(id, run_id, range_of(&bars[..150]))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InsufficientData { .. }));
    assert!(fx.engine.feature_importances(run_id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_diverging_fit_fails_run_and_keeps_model_status() -> anyhow::Result<()> {
    let fx = engine_with(zigzag_bars(300), EngineConfig::default()).await;
    let id = fx
        .engine
        .create_model(NewModel {
            hyperparameters: Hyperparameters::new()
                .with("l2", 1000.0)
                .with("learning_rate", 1.0),
            ..new_model("diverging", AlgorithmKind::Linear)
        })
        .await?;

    let job = fx.engine.train_model(id, fx.range).await?;
    let run_id = job.id();
    let err = job.wait().await.unwrap_err();
    assert!(matches!(err, LifecycleError::ConvergenceFailure { .. }));

    let model = fx.engine.registry().get_model(id).await?;
    assert_eq!(model.status, ModelStatus::Draft);
    assert!(model.active_run_id.is_none());

    let run = fx.engine.registry().get_run(run_id).await?;
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.artifact_checksum.is_none());
    assert!(run.completed_at.is_some());
    assert!(!run.loss_trace.is_empty());
    assert!(
        run.failure_reason
            .as_deref()
            .is_some_and(|r| r.contains("did not converge"))
    );

    assert!(fx.events.events().iter().any(|e| matches!(
        e,
        LifecycleEvent::TrainingFailed {
            run_id: Some(rid),
            status: ModelStatus::Draft,
            ..
        } if *rid == run_id
    )));
    Ok(())
}

#[tokio::test]
async fn test_bars_of_another_interval_are_rejected() -> anyhow::Result<()> {
    let fx = engine_with(zigzag_bars(200), EngineConfig::default()).await;
    let id = fx
        .engine
        .create_model(NewModel {
            timeframe: Timeframe::FourHour,
            ..new_model("four-hour", AlgorithmKind::Linear)
        })
        .await?;

    let result = fx.engine.train_model(id, fx.range).await?.wait().await;
    assert!(matches!(result, Err(LifecycleError::DataQuality { .. })));
    assert_eq!(
        fx.engine.registry().get_model(id).await?.status,
        ModelStatus::Draft
    );
    assert!(fx.engine.runs(id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unknown_model_is_not_found() -> anyhow::Result<()> {
    let fx = engine_with(zigzag_bars(60), EngineConfig::default()).await;
    let missing = uuid::Uuid::new_v4();
    assert!(matches!(
        fx.engine.train_model(missing, fx.range).await,
        Err(LifecycleError::NotFound { .. })
    ));
    assert!(matches!(
        fx.engine.get_model_status(missing).await,
        Err(LifecycleError::NotFound { .. })
    ));
    Ok(())
}
