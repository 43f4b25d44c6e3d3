mod common;

use common::{engine_with, init_tracing, new_model, random_walk_bars, zigzag_bars};
use model_lifecycle::application::engine::PredictionAction;
use model_lifecycle::config::EngineConfig;
use model_lifecycle::domain::errors::LifecycleError;
use model_lifecycle::domain::events::LifecycleEvent;
use model_lifecycle::domain::model::{
    AlgorithmKind, ChildModelSpec, Hyperparameters, ModelStatus, WindowConfig,
};

#[tokio::test]
async fn test_promotion_requires_walk_forward_report() -> anyhow::Result<()> {
    init_tracing();
    let bars = zigzag_bars(300);
    let fx = engine_with(bars.clone(), EngineConfig::default()).await;
    let model_id = fx
        .engine
        .create_model(new_model("gated", AlgorithmKind::Linear))
        .await?;

    let run_id = fx.engine.train_model(model_id, fx.range).await?.wait().await?;

    let err = fx.engine.promote(model_id, run_id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidPromotion { .. }));
    let model = fx.engine.registry().get_model(model_id).await?;
    assert_eq!(model.status, ModelStatus::Validated);
    assert!(model.active_run_id.is_none());

    fx.engine
        .validate_model(model_id, fx.range, WindowConfig::default())
        .await?
        .wait()
        .await?;
    let promoted = fx.engine.promote(model_id, run_id).await?;
    assert_eq!(promoted.status, ModelStatus::Active);
    assert_eq!(promoted.active_run_id, Some(run_id));
    let run = fx.engine.registry().get_run(run_id).await?;
    assert_eq!(promoted.baseline_accuracy, run.test_accuracy());
    assert_eq!(promoted.active_artifact, run.artifact_checksum);

    let prediction = fx.engine.predict(model_id, &bars[..120]).await?;
    assert!((0.0..=1.0).contains(&prediction.probability_up));
    assert!((0.0..=1.0).contains(&prediction.confidence));
    assert_eq!(prediction.bar_timestamp, bars[119].timestamp);
    // Bar 119 closes below 118, so the next zigzag bar is up.
    assert_eq!(prediction.action, PredictionAction::Buy);

    assert!(fx.events.events().iter().any(|e| matches!(
        e,
        LifecycleEvent::ModelPromoted { run_id: id, .. } if *id == run_id
    )));
    Ok(())
}

#[tokio::test]
async fn test_promotion_rejects_low_accuracy() -> anyhow::Result<()> {
    let mut config = EngineConfig::default();
    config.registry.min_test_accuracy = 1.0;
    let fx = engine_with(random_walk_bars(300, 5), config).await;
    let model_id = fx
        .engine
        .create_model(new_model("noise", AlgorithmKind::Linear))
        .await?;

    fx.engine
        .validate_model(model_id, fx.range, WindowConfig::default())
        .await?
        .wait()
        .await?;
    let run_id = fx.engine.train_model(model_id, fx.range).await?.wait().await?;

    let err = fx.engine.promote(model_id, run_id).await.unwrap_err();
    match err {
        LifecycleError::InvalidPromotion { reason, .. } => {
            assert!(reason.contains("accuracy"), "{}", reason)
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(
        fx.engine.registry().get_model(model_id).await?.status,
        ModelStatus::Validated
    );
    Ok(())
}

#[tokio::test]
async fn test_promotion_rejects_foreign_run() -> anyhow::Result<()> {
    let fx = engine_with(zigzag_bars(300), EngineConfig::default()).await;
    let a = fx.engine.create_model(new_model("a", AlgorithmKind::Linear)).await?;
    let b = fx.engine.create_model(new_model("b", AlgorithmKind::Linear)).await?;

    let run_of_a = fx.engine.train_model(a, fx.range).await?.wait().await?;
    fx.engine
        .validate_model(b, fx.range, WindowConfig::default())
        .await?
        .wait()
        .await?;

    let err = fx.engine.promote(b, run_of_a).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidPromotion { .. }));
    Ok(())
}

#[tokio::test]
async fn test_archive_and_lineage() -> anyhow::Result<()> {
    let fx = engine_with(zigzag_bars(120), EngineConfig::default()).await;
    let root = fx.engine.create_model(new_model("root", AlgorithmKind::Linear)).await?;
    let child = fx
        .engine
        .create_child(
            root,
            ChildModelSpec {
                name: Some("child".to_string()),
                algorithm: Some(AlgorithmKind::TreeEnsemble),
                hyperparameters: Hyperparameters::new().with("n_trees", 10),
            },
        )
        .await?;
    let grandchild = fx
        .engine
        .create_child(child, ChildModelSpec::default())
        .await?;

    let lineage = fx.engine.lineage(grandchild).await?;
    let ids: Vec<_> = lineage.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![child, root]);
    assert_eq!(lineage[0].algorithm, AlgorithmKind::TreeEnsemble);

    let archived = fx.engine.archive(child).await?;
    assert_eq!(archived.status, ModelStatus::Archived);
    let err = fx.engine.train_model(child, fx.range).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));

    fx.engine.delete_model(root).await?;
    // Dangling parent ends the chain.
    let lineage = fx.engine.lineage(grandchild).await?;
    assert_eq!(lineage.len(), 1);
    Ok(())
}
