//! Pre-processing pipeline: pattern-bound transforms applied to parameter
//! values as they enter the tree.
//!
//! The schema binds wildcard patterns to a closed set of operations plus an
//! escape hatch for project-specific transforms. Matching rules compose in
//! table order against the parameter's full dotted name. The pipeline only
//! runs while the root's master switch is on; reloading a saved
//! configuration turns it off so transforms with side effects never fire
//! twice for the same logical build.

use super::engine::{apply_document, apply_source, resolve_path};
use super::node::ConfigNode;
use super::state::{Mode, RootState};
use crate::error::{ConfigError, Result};
use crate::pattern::matches;
use crate::value::{ConfigSource, ConfigValue};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;

/// Project-specific transform: receives the incoming value, returns the
/// value to store.
pub type CustomTransform = Arc<dyn Fn(ConfigValue) -> anyhow::Result<ConfigValue> + Send + Sync>;

/// One pre-processing operation.
#[derive(Clone)]
pub enum Transform {
    /// Treat the value as a path (or list of paths/documents) to further
    /// config sources, merged into the current node on the spot; stores the
    /// resolved absolute path(s).
    AdditionalConfigFile,
    /// Record the value as variation candidates for the declaring parameter.
    /// Root only.
    Variation,
    /// Record the value as an ordered list of variation dimension names.
    Grid,
    /// Allocate a fresh `<base>_<n>` experiment directory and store its path.
    ExperimentPath,
    /// Arbitrary project-specific transform, named for diagnostics.
    Custom(String, CustomTransform),
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::AdditionalConfigFile => write!(f, "AdditionalConfigFile"),
            Transform::Variation => write!(f, "Variation"),
            Transform::Grid => write!(f, "Grid"),
            Transform::ExperimentPath => write!(f, "ExperimentPath"),
            Transform::Custom(name, _) => write!(f, "Custom({name})"),
        }
    }
}

/// The concrete configuration schema: where defaults come from and which
/// patterns are pre-processed how.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    default_source: Option<ConfigSource>,
    rules: Vec<(String, Transform)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// A schema whose default layer comes from the given source.
    pub fn with_default(source: impl Into<ConfigSource>) -> Self {
        Self {
            default_source: Some(source.into()),
            rules: Vec::new(),
        }
    }

    /// Appends a pre-processing rule; rules apply in insertion order.
    pub fn rule(mut self, pattern: impl Into<String>, transform: Transform) -> Self {
        self.rules.push((pattern.into(), transform));
        self
    }

    /// Appends a project-specific transform under a diagnostic name.
    pub fn custom_rule(
        self,
        pattern: impl Into<String>,
        name: impl Into<String>,
        transform: impl Fn(ConfigValue) -> anyhow::Result<ConfigValue> + Send + Sync + 'static,
    ) -> Self {
        self.rule(
            pattern,
            Transform::Custom(name.into(), Arc::new(transform)),
        )
    }

    pub fn default_source(&self) -> Option<&ConfigSource> {
        self.default_source.as_ref()
    }

    pub(crate) fn rules(&self) -> &[(String, Transform)] {
        &self.rules
    }
}

/// Runs the pipeline for one incoming parameter value.
pub(crate) fn pre_process(
    node: &mut ConfigNode,
    key: &str,
    mut value: ConfigValue,
    mode: Mode,
    state: &mut RootState,
    schema: &Schema,
) -> Result<ConfigValue> {
    if !state.pre_processing_enabled {
        return Ok(value);
    }
    let full_name = full_dotted_name(node, key);
    for (pattern, transform) in schema.rules() {
        if !matches(&full_name, pattern) {
            continue;
        }
        let incoming = std::mem::replace(&mut value, ConfigValue::Null);
        let outcome = state.with_frame(
            format!("pre_processing;{};{full_name}", node.name()),
            |state| apply_transform(transform, pattern, node, &full_name, incoming, mode, state, schema),
        );
        match outcome {
            Ok(transformed) => value = transformed,
            Err(source) => {
                error!("error while pre-processing param matching '{pattern}'");
                return Err(source);
            }
        }
    }
    Ok(value)
}

fn full_dotted_name(node: &ConfigNode, key: &str) -> String {
    if node.nesting_hierarchy().is_empty() {
        key.to_string()
    } else {
        format!("{}.{key}", node.nesting_hierarchy().join("."))
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_transform(
    transform: &Transform,
    pattern: &str,
    node: &mut ConfigNode,
    full_name: &str,
    value: ConfigValue,
    mode: Mode,
    state: &mut RootState,
    schema: &Schema,
) -> Result<ConfigValue> {
    match transform {
        Transform::AdditionalConfigFile => {
            register_additional_config(node, full_name, value, mode, state, schema)
        }
        Transform::Variation => register_variation(node, full_name, value, state),
        Transform::Grid => register_grid(full_name, value, state),
        Transform::ExperimentPath => register_experiment_path(full_name, value),
        Transform::Custom(_, function) => {
            function(value).map_err(|cause| ConfigError::PreProcessing {
                pattern: pattern.to_string(),
                cause,
            })
        }
    }
}

/// Merges the referenced source(s) into `node` right away and resolves path
/// values to absolute form.
fn register_additional_config(
    node: &mut ConfigNode,
    full_name: &str,
    value: ConfigValue,
    mode: Mode,
    state: &mut RootState,
    schema: &Schema,
) -> Result<ConfigValue> {
    match value {
        ConfigValue::Null => Ok(ConfigValue::Null),
        ConfigValue::Str(path) => {
            let resolved = resolve_path(Path::new(&path), state)?;
            apply_source(node, &ConfigSource::Path(resolved.clone()), mode, state, schema)?;
            Ok(ConfigValue::Str(resolved.to_string_lossy().into_owned()))
        }
        ConfigValue::Dict(document) => {
            apply_document(node, &document, mode, state, schema)?;
            Ok(ConfigValue::Dict(document))
        }
        ConfigValue::List(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(register_additional_config(
                    node, full_name, item, mode, state, schema,
                )?);
            }
            Ok(ConfigValue::List(resolved))
        }
        other => Err(ConfigError::BadTransformValue {
            name: full_name.to_string(),
            reason: format!(
                "cannot treat a {} as an additional config file",
                other.type_name()
            ),
        }),
    }
}

fn is_single_candidate(value: &ConfigValue) -> bool {
    matches!(value, ConfigValue::Str(_) | ConfigValue::Dict(_))
}

fn candidate_source(value: &ConfigValue) -> ConfigSource {
    match value {
        ConfigValue::Str(path) => ConfigSource::Path(PathBuf::from(path)),
        ConfigValue::Dict(document) => ConfigSource::Doc(document.clone()),
        _ => unreachable!("checked by is_single_candidate"),
    }
}

/// Records the value as variation candidates for this parameter. A dict maps
/// labels to candidates; a list labels its candidates by index.
fn register_variation(
    node: &ConfigNode,
    full_name: &str,
    value: ConfigValue,
    state: &mut RootState,
) -> Result<ConfigValue> {
    if !node.nesting_hierarchy().is_empty() {
        return Err(ConfigError::VariationOutsideRoot(full_name.to_string()));
    }
    match &value {
        ConfigValue::Null => {}
        ConfigValue::Dict(map) if map.values().all(is_single_candidate) => {
            let candidates = map
                .iter()
                .map(|(label, candidate)| (candidate_source(candidate), label.clone()))
                .collect();
            state.register_variation(full_name, candidates);
        }
        ConfigValue::List(items) if items.iter().all(is_single_candidate) => {
            let candidates = items
                .iter()
                .enumerate()
                .map(|(index, candidate)| (candidate_source(candidate), index.to_string()))
                .collect();
            state.register_variation(full_name, candidates);
        }
        _ => return Err(ConfigError::InvalidVariation(full_name.to_string())),
    }
    Ok(value)
}

fn register_grid(full_name: &str, value: ConfigValue, state: &mut RootState) -> Result<ConfigValue> {
    match &value {
        ConfigValue::Null => {}
        ConfigValue::List(items)
            if items.iter().all(|item| matches!(item, ConfigValue::Str(_))) =>
        {
            let dimensions = items
                .iter()
                .filter_map(ConfigValue::as_str)
                .map(str::to_string)
                .collect();
            state.grids.push(dimensions);
        }
        _ => return Err(ConfigError::InvalidGrid(full_name.to_string())),
    }
    Ok(value)
}

/// Allocates the next free `<base>_<n>` directory next to its siblings so
/// two runs never collide on disk.
fn register_experiment_path(full_name: &str, value: ConfigValue) -> Result<ConfigValue> {
    let path = match &value {
        ConfigValue::Null => return Ok(value),
        ConfigValue::Str(path) if path.is_empty() => return Ok(value),
        ConfigValue::Str(path) => Path::new(path),
        other => {
            return Err(ConfigError::BadTransformValue {
                name: full_name.to_string(),
                reason: format!("experiment path must be a string, got {}", other.type_name()),
            });
        }
    };
    let folder = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let base = match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => {
            return Err(ConfigError::BadTransformValue {
                name: full_name.to_string(),
                reason: "experiment path has no basename".to_string(),
            });
        }
    };
    fs::create_dir_all(&folder)?;
    let mut next_id: i64 = 0;
    for entry in fs::read_dir(&folder)? {
        let file_name = entry?.file_name().to_string_lossy().into_owned();
        if file_name.starts_with(&base)
            && let Some(id) = file_name.rsplit('_').next().and_then(|t| t.parse::<i64>().ok())
        {
            next_id = next_id.max(id + 1);
        }
    }
    let allocated = folder.join(format!("{base}_{next_id}"));
    fs::create_dir_all(&allocated)?;
    Ok(ConfigValue::Str(allocated.to_string_lossy().into_owned()))
}
