//! Integration tests for saving, reloading, and the auto-save regime.

use config_tree::{
    ConfigSource, ConfigTree, ConfigValue, Document, Regime, Schema, Transform,
};
use std::fs;
use tempfile::TempDir;

fn doc(pairs: &[(&str, ConfigValue)]) -> Document {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn build_from_yaml(temp: &TempDir, yaml: &str, regime: Regime) -> ConfigTree {
    let path = temp.path().join("default.yaml");
    fs::write(&path, yaml).unwrap();
    ConfigTree::from_sources(ConfigSource::Path(path), &[], Schema::new(), regime)
        .expect("failed to build config")
}

#[test]
fn a_save_reloads_to_an_equal_tree() {
    let temp = TempDir::new().unwrap();
    let mut tree = build_from_yaml(
        &temp,
        "a: 1\nrate: 0.5\nwords: [x, y]\ntable:\n  k: 1\nsub: !sub\n  b: 2\n  deeper: !deeper\n    c: 3\n",
        Regime::AutoSave,
    );
    tree.merge(doc(&[("a", ConfigValue::Int(9))])).unwrap();
    let saved = tree.save(temp.path().join("run.yaml")).unwrap();

    let reloaded = ConfigTree::from_sources(
        ConfigSource::Path(saved),
        &[],
        Schema::new(),
        Regime::AutoSave,
    )
    .unwrap();
    assert_eq!(reloaded, tree);
    assert_eq!(reloaded.value("sub.deeper.c"), Some(&ConfigValue::Int(3)));
}

#[test]
fn reloading_restores_the_saved_regime() {
    let temp = TempDir::new().unwrap();
    let mut tree = build_from_yaml(&temp, "a: 1\n", Regime::Locked);
    let saved = tree.save(temp.path().join("locked.yaml")).unwrap();

    // Built as auto-save, but the metadata marker restores locked.
    let reloaded = ConfigTree::from_sources(
        ConfigSource::Path(saved),
        &[],
        Schema::new(),
        Regime::AutoSave,
    )
    .unwrap();
    assert_eq!(reloaded.regime(), Regime::Locked);
    assert!(reloaded.former_saving_time().is_some());
}

#[test]
fn reloading_does_not_rerun_pre_processing() {
    let temp = TempDir::new().unwrap();
    let experiment_root = temp.path().join("experiments");
    let default_path = temp.path().join("default.yaml");
    fs::write(
        &default_path,
        format!(
            "experiment_path: {}\na: 1\n",
            experiment_root.join("run").display()
        ),
    )
    .unwrap();
    let schema = Schema::with_default(default_path)
        .rule("*experiment_path*", Transform::ExperimentPath);

    let mut tree = ConfigTree::load(schema.clone(), Regime::AutoSave, &[]).unwrap();
    let allocated = tree.value("experiment_path").unwrap().clone();
    assert!(allocated.as_str().unwrap().ends_with("run_0"));

    let saved = tree.save(temp.path().join("save.yaml")).unwrap();
    let reloaded = ConfigTree::from_sources(
        ConfigSource::Path(saved),
        &[],
        schema,
        Regime::AutoSave,
    )
    .unwrap();

    // The transform did not fire again: the stored path is unchanged and no
    // run_1 directory appeared.
    assert_eq!(reloaded.value("experiment_path"), Some(&allocated));
    assert!(experiment_root.join("run_0").is_dir());
    assert!(!experiment_root.join("run_1").exists());
}

#[test]
fn the_hierarchy_artifact_lists_every_source() {
    let temp = TempDir::new().unwrap();
    let mut tree = build_from_yaml(&temp, "a: 1\n", Regime::AutoSave);
    tree.merge(doc(&[("a", ConfigValue::Int(2))])).unwrap();
    tree.save(temp.path().join("state.yaml")).unwrap();

    let artifact = fs::read_to_string(temp.path().join("state_hierarchy.yaml")).unwrap();
    assert!(artifact.contains("config_hierarchy"), "{artifact}");
    assert!(artifact.contains("default.yaml"), "{artifact}");
    assert!(artifact.contains("a: 2"), "{artifact}");
}

#[test]
fn auto_save_keeps_the_file_in_sync_with_writes() {
    let temp = TempDir::new().unwrap();
    let mut tree = build_from_yaml(&temp, "a: 1\n", Regime::AutoSave);
    let saved = tree.save(temp.path().join("live.yaml")).unwrap();

    tree.set("a", 5i64).unwrap();

    let on_disk = ConfigTree::from_sources(
        ConfigSource::Path(saved),
        &[],
        Schema::new(),
        Regime::AutoSave,
    )
    .unwrap();
    assert_eq!(on_disk.value("a"), Some(&ConfigValue::Int(5)));
}

#[test]
fn merges_after_a_save_also_resave() {
    let temp = TempDir::new().unwrap();
    let mut tree = build_from_yaml(&temp, "a: 1\nb: 2\n", Regime::AutoSave);
    let saved = tree.save(temp.path().join("live.yaml")).unwrap();

    tree.merge(doc(&[("b", ConfigValue::Int(7))])).unwrap();

    let text = fs::read_to_string(&saved).unwrap();
    assert!(text.contains("b: 7"), "{text}");
}

#[test]
fn a_save_without_header_merges_as_raw_input() {
    let temp = TempDir::new().unwrap();
    let mut tree = build_from_yaml(&temp, "a: 1\n", Regime::Locked);
    let bare = temp.path().join("bare.yaml");
    tree.save_with(Some(bare.as_path()), false, false).unwrap();

    let text = fs::read_to_string(&bare).unwrap();
    assert!(!text.contains("config_metadata"), "{text}");
    // Without the marker, reloading does not restore the regime.
    let reloaded = ConfigTree::from_sources(
        ConfigSource::Path(bare),
        &[],
        Schema::new(),
        Regime::AutoSave,
    )
    .unwrap();
    assert_eq!(reloaded.regime(), Regime::AutoSave);
}

#[test]
fn extensionless_saves_get_a_yaml_extension() {
    let temp = TempDir::new().unwrap();
    let mut tree = build_from_yaml(&temp, "a: 1\n", Regime::AutoSave);
    let saved = tree.save(temp.path().join("plain")).unwrap();
    assert_eq!(saved.extension().and_then(|e| e.to_str()), Some("yaml"));
    assert!(saved.exists());
}
