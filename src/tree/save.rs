//! Saving a tree to YAML and the companion hierarchy artifact.
//!
//! A save starts with the `config_metadata` marker so the engine recognizes
//! the file as a reload on the way back in (restoring the regime and
//! suppressing pre-processing), then lists every parameter in insertion
//! order, with sub-configs as `!name`-tagged mappings. The hierarchy
//! artifact records the ordered sources behind the current state so it can
//! be replayed exactly.

use super::engine::{ConfigTree, METADATA_KEY};
use super::node::{ConfigNode, Param};
use crate::error::{ConfigError, Result};
use crate::value::{ConfigSource, ConfigValue};
use chrono::Local;
use serde_yaml::value::{Tag, TaggedValue};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

impl ConfigTree {
    /// Saves to `filename` (extension defaults to `.yaml`). The file can be
    /// merged or loaded later to recover this exact configuration.
    pub fn save(&mut self, filename: impl AsRef<Path>) -> Result<PathBuf> {
        self.save_with(Some(filename.as_ref()), true, true)
    }

    /// Overwrites the previous save.
    pub fn resave(&mut self) -> Result<PathBuf> {
        self.save_with(None, true, true)
    }

    /// Full-control save: `save_header` controls the metadata marker (a file
    /// without it is treated as raw user input when merged back),
    /// `save_hierarchy` the companion `*_hierarchy` artifact.
    pub fn save_with(
        &mut self,
        filename: Option<&Path>,
        save_header: bool,
        save_hierarchy: bool,
    ) -> Result<PathBuf> {
        let target = match filename {
            Some(path) => path.to_path_buf(),
            None => self
                .state
                .was_last_saved_as
                .clone()
                .ok_or(ConfigError::NoPreviousSave)?,
        };
        let target = if target.extension().is_some() {
            target
        } else {
            target.with_extension("yaml")
        };

        let mut mapping = serde_yaml::Mapping::new();
        if save_header {
            mapping.insert(
                serde_yaml::Value::String(METADATA_KEY.to_string()),
                serde_yaml::Value::String(self.format_metadata()),
            );
        }
        for (key, param) in self.root.entries() {
            mapping.insert(serde_yaml::Value::String(key.clone()), param_to_yaml(param));
        }
        fs::write(
            &target,
            serde_yaml::to_string(&serde_yaml::Value::Mapping(mapping))?,
        )?;

        if save_hierarchy {
            let mut hierarchy = serde_yaml::Mapping::new();
            hierarchy.insert(
                serde_yaml::Value::String("config_hierarchy".to_string()),
                serde_yaml::Value::Sequence(
                    self.root.hierarchy().iter().map(source_to_yaml).collect(),
                ),
            );
            fs::write(
                hierarchy_path_for(&target),
                serde_yaml::to_string(&serde_yaml::Value::Mapping(hierarchy))?,
            )?;
        }

        self.state.was_last_saved_as = Some(target.clone());
        info!(
            "configuration saved in : {}",
            std::path::absolute(&target)?.display()
        );
        Ok(target)
    }

    fn format_metadata(&self) -> String {
        let now = Local::now();
        let epoch = now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6;
        format!(
            "Saving time : {} ({epoch}) ; Regime : {}",
            now.format("%a %b %e %H:%M:%S %Y"),
            self.state.regime
        )
    }
}

fn param_to_yaml(param: &Param) -> serde_yaml::Value {
    match param {
        Param::Value(value) => value.to_yaml(),
        Param::Node(node) => serde_yaml::Value::Tagged(Box::new(TaggedValue {
            tag: Tag::new(node.name().to_string()),
            value: serde_yaml::Value::Mapping(node_to_mapping(node)),
        })),
    }
}

fn node_to_mapping(node: &ConfigNode) -> serde_yaml::Mapping {
    let mut mapping = serde_yaml::Mapping::new();
    for (key, param) in node.entries() {
        mapping.insert(serde_yaml::Value::String(key.clone()), param_to_yaml(param));
    }
    mapping
}

fn source_to_yaml(source: &ConfigSource) -> serde_yaml::Value {
    match source {
        ConfigSource::Path(path) => serde_yaml::Value::String(path.display().to_string()),
        ConfigSource::Doc(document) => ConfigValue::Dict(document.clone()).to_yaml(),
    }
}

fn hierarchy_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_hierarchy{extension}"))
}
