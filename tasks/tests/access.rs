use std::{fs, sync::Arc};

use machine_learning::{Example, ModelType};
use tasks::{
    AccessErr, Dispatcher, ImmediateDispatcher, ModelRegistry, OwnerId, Task,
    config::RegistryConfig,
};

fn gestures() -> Vec<Example> {
    vec![
        Example::new(vec![0.0, 0.0], vec![0.0]),
        Example::new(vec![1.0, 1.0], vec![1.0]),
    ]
}

#[test]
fn missing_file_gives_untrained_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ModelRegistry::new(dir.path());

    let access = registry
        .get_model(OwnerId(1), "poses", ModelType::Classification, "node-a")
        .unwrap();

    assert!(!access.is_trained);
    assert_eq!(access.model.model_type(), ModelType::Classification);
    assert!(!dir.path().join("poses.classification.json").exists());
}

#[test]
fn call_sites_share_model_but_not_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ModelRegistry::new(dir.path());

    let a = registry
        .get_model(OwnerId(1), "poses", ModelType::Classification, "node-a")
        .unwrap();
    let b = registry
        .get_model(OwnerId(1), "poses", ModelType::Classification, "node-b")
        .unwrap();
    let c = registry
        .get_model(OwnerId(2), "poses", ModelType::Classification, "node-a")
        .unwrap();
    let again = registry
        .get_model(OwnerId(1), "poses", ModelType::Classification, "node-a")
        .unwrap();

    assert!(a.model.ptr_eq(&b.model));
    assert!(a.model.ptr_eq(&c.model));
    assert!(!Arc::ptr_eq(&a.context, &b.context));
    assert!(!Arc::ptr_eq(&a.context, &c.context));
    assert!(Arc::ptr_eq(&a.context, &again.context));
}

#[test]
fn types_on_one_path_are_separate_models() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ModelRegistry::new(dir.path());

    let knn = registry
        .get_model(OwnerId(1), "poses", ModelType::Classification, "node")
        .unwrap();
    let mlp = registry
        .get_model(OwnerId(1), "poses", ModelType::Regression, "node")
        .unwrap();

    assert!(!knn.model.ptr_eq(&mlp.model));
}

#[test]
fn saved_model_is_loaded_trained() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ModelRegistry::new(dir.path());
    let access = registry
        .get_model(OwnerId(1), "sets/poses", ModelType::Classification, "node")
        .unwrap();

    let mut dispatcher = ImmediateDispatcher::new();
    dispatcher
        .submit(Task::training(&access.model, gestures()).unwrap())
        .unwrap();
    assert!(dispatcher.pump()[0].success);

    let file = registry.save(&access.model).unwrap();
    assert_eq!(file, dir.path().join("sets/poses.classification.json"));

    let mut fresh = ModelRegistry::new(dir.path());
    let reloaded = fresh
        .get_model(OwnerId(9), "sets/poses", ModelType::Classification, "other")
        .unwrap();
    assert!(reloaded.is_trained);

    dispatcher
        .submit(
            Task::sampling(&reloaded.model, vec![0.9, 0.8])
                .unwrap()
                .with_context(&reloaded.context),
        )
        .unwrap();
    assert_eq!(dispatcher.pump()[0].outputs, vec![vec![1.0]]);
}

#[test]
fn persisted_type_must_match_request() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ModelRegistry::new(dir.path());
    let access = registry
        .get_model(OwnerId(1), "poses", ModelType::Regression, "node")
        .unwrap();
    let file = registry.save(&access.model).unwrap();

    // A regression model stored under the classification name.
    fs::rename(&file, dir.path().join("poses.classification.json")).unwrap();

    let mut fresh = ModelRegistry::new(dir.path());
    assert!(matches!(
        fresh.get_model(OwnerId(1), "poses", ModelType::Classification, "node"),
        Err(AccessErr::TypeMismatch {
            expected: ModelType::Classification,
            found: ModelType::Regression,
            ..
        })
    ));
}

#[test]
fn corrupt_file_is_a_format_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("poses.dtw.json"), "{ not json").unwrap();

    let mut registry = ModelRegistry::new(dir.path());
    assert!(matches!(
        registry.get_model(OwnerId(1), "poses", ModelType::DynamicTimewarp, "node"),
        Err(AccessErr::Format { .. })
    ));
}

#[test]
fn unknown_handle_cannot_be_saved() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ModelRegistry::new(dir.path());
    let access = registry
        .get_model(OwnerId(1), "poses", ModelType::Regression, "node")
        .unwrap();

    let other = ModelRegistry::new(dir.path());
    assert!(matches!(
        other.save(&access.model),
        Err(AccessErr::Unregistered { .. })
    ));
}

#[test]
fn forget_drops_owner_states() {
    let dir = tempfile::tempdir().unwrap();
    let config = RegistryConfig {
        data_dir: dir.path().to_path_buf(),
        smoothing: Some(0.5),
        ..RegistryConfig::default()
    };
    let mut registry = ModelRegistry::from_config(&config);

    let before = registry
        .get_model(OwnerId(1), "poses", ModelType::Regression, "node")
        .unwrap();
    let kept = registry
        .get_model(OwnerId(2), "poses", ModelType::Regression, "node")
        .unwrap();

    registry.forget(OwnerId(1));

    let after = registry
        .get_model(OwnerId(1), "poses", ModelType::Regression, "node")
        .unwrap();
    let still = registry
        .get_model(OwnerId(2), "poses", ModelType::Regression, "node")
        .unwrap();

    assert!(!Arc::ptr_eq(&before.context, &after.context));
    assert!(Arc::ptr_eq(&kept.context, &still.context));
    assert_eq!(after.context.lock().window(), 32);
}
