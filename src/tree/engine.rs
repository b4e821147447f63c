//! The merge/load engine.
//!
//! Turns documents into tree mutations. All recursion threads the root's
//! `RootState` explicitly; whether an entry is being declared or merged is
//! an explicit `Mode`, never inferred from surrounding state.

use super::node::{ConfigNode, Param};
use super::preprocess::{Schema, pre_process};
use super::state::{Mode, Regime, RootState, VariationDimension};
use crate::error::{ConfigError, Result};
use crate::pattern::matches;
use crate::value::{
    ConfigSource, ConfigValue, Document, embedded_section_names, parse_documents,
};
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The reserved metadata key written by [`ConfigTree::save`]. Its presence in
/// a merged document marks the source as a reload of a previous save.
pub const METADATA_KEY: &str = "config_metadata";

/// A built configuration tree: the root node, the shared root state, and the
/// schema it was built against.
///
/// Mutation goes through [`ConfigTree::merge`] and [`ConfigTree::set`]; the
/// overwrite regime decides what `set` is allowed to do.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    pub(crate) root: ConfigNode,
    pub(crate) state: RootState,
    pub(crate) schema: Schema,
}

impl ConfigTree {
    /// Builds from the schema's default source, then merges each override in
    /// order.
    pub fn load(schema: Schema, regime: Regime, overrides: &[ConfigSource]) -> Result<Self> {
        let default = schema
            .default_source()
            .cloned()
            .ok_or(ConfigError::NoDefaultSource)?;
        Self::from_sources(default, overrides, schema, regime)
    }

    /// Builds from an explicit default source, then merges each override in
    /// order.
    pub fn from_sources(
        default: ConfigSource,
        overrides: &[ConfigSource],
        schema: Schema,
        regime: Regime,
    ) -> Result<Self> {
        info!("building config from default : {default}");
        let mut tree = Self {
            root: ConfigNode::new("main", Vec::new()),
            state: RootState::new(regime),
            schema,
        };
        tree.apply_top_level(&default, Mode::Construct)?;
        for source in overrides {
            tree.merge_source(source, false)?;
        }
        Ok(tree)
    }

    /// Builds from the sources named by a `--config [p1,p2,...]` argument
    /// (brackets optional), falling back to `fallback` when the flag is
    /// absent, then merges the remaining engine-protocol tokens.
    pub fn from_argv(
        schema: Schema,
        regime: Regime,
        args: &[String],
        fallback: Option<&[ConfigSource]>,
    ) -> Result<Self> {
        let sources: Vec<ConfigSource> =
            if let Some(index) = args.iter().position(|arg| arg == "--config") {
                let list = args.get(index + 1).ok_or(ConfigError::MissingConfigList)?;
                list.trim_start_matches('[')
                    .trim_end_matches(']')
                    .split(',')
                    .map(|part| ConfigSource::from(part.trim()))
                    .collect()
            } else {
                fallback.ok_or(ConfigError::NoConfigFlag)?.to_vec()
            };
        let default = schema
            .default_source()
            .cloned()
            .ok_or(ConfigError::NoDefaultSource)?;
        let mut tree = Self::from_sources(default, &sources, schema, regime)?;
        tree.merge_command_line(args, true)?;
        Ok(tree)
    }

    /// Merges a source into the tree. Unknown parameter names are fatal;
    /// wildcard keys fan out over existing parameters.
    pub fn merge(&mut self, source: impl Into<ConfigSource>) -> Result<()> {
        let source = source.into();
        self.merge_source(&source, false)
    }

    pub(crate) fn merge_source(&mut self, source: &ConfigSource, from_code: bool) -> Result<()> {
        if from_code {
            info!("merging from code : {source}");
        } else {
            info!("merging from new config : {source}");
        }
        self.apply_top_level(source, Mode::Merge)?;
        if self.state.regime == Regime::AutoSave && self.state.was_last_saved_as.is_some() {
            self.resave()?;
        }
        Ok(())
    }

    /// Sets one (possibly dotted) parameter, subject to the overwrite
    /// regime: `unsafe` writes directly, `auto-save` turns the write into a
    /// single-key merge (and re-saves a previously saved tree), `locked`
    /// refuses.
    pub fn set(&mut self, name: &str, value: impl Into<ConfigValue>) -> Result<()> {
        let value = value.into();
        if self.state.in_build || self.state.regime == Regime::Unsafe {
            return self.force_set(name, value);
        }
        match self.state.regime {
            Regime::AutoSave => {
                let mut document = Document::new();
                document.insert(name.to_string(), value);
                self.merge_source(&ConfigSource::Doc(document), true)
            }
            Regime::Locked => Err(ConfigError::Locked),
            Regime::Unsafe => unreachable!("handled above"),
        }
    }

    /// Direct write bypassing pre-processing and hierarchy tracking. The
    /// dotted path must traverse existing sub-configs; the leaf itself may
    /// be new.
    fn force_set(&mut self, name: &str, value: ConfigValue) -> Result<()> {
        let mut current = &mut self.root;
        let mut rest = name;
        while let Some((head, tail)) = rest.split_once('.') {
            match current.local(head) {
                Some(Param::Node(_)) => {}
                Some(Param::Value(_)) => return Err(current.not_a_sub_config(name, head, tail)),
                None => return Err(current.unknown_parameter(name)),
            }
            let node = current;
            let Some(Param::Node(sub)) = node.entry_mut(head) else {
                unreachable!("checked above")
            };
            current = sub;
            rest = tail;
        }
        current.insert(rest, Param::Value(value));
        Ok(())
    }

    fn apply_top_level(&mut self, source: &ConfigSource, mode: Mode) -> Result<()> {
        let Self { root, state, schema } = self;
        let frame = match mode {
            Mode::Construct => format!("setup;{}", root.name()),
            Mode::Merge => format!("merging;{}", root.name()),
        };
        state.with_build_window(|state| {
            state.with_frame(frame, |state| apply_source(root, source, mode, state, schema))
        })?;
        self.root.push_hierarchy(source.clone());
        self.state.check_unlinked()
    }

    // ----- read access -----

    pub fn root(&self) -> &ConfigNode {
        &self.root
    }

    pub fn regime(&self) -> Regime {
        self.state.regime
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Display name of the tree (root name plus variation marker).
    pub fn name(&self) -> String {
        self.root.display_name()
    }

    /// The ordered sources merged to produce the current state.
    pub fn hierarchy(&self) -> &[ConfigSource] {
        self.root.hierarchy()
    }

    pub fn parameter_names(&self, deep: bool) -> Vec<String> {
        self.root.parameter_names(deep)
    }

    pub fn param(&self, name: &str) -> Result<&Param> {
        self.root.param(name)
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.root.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&ConfigValue> {
        self.root.value(name)
    }

    pub fn node(&self, name: &str) -> Option<&ConfigNode> {
        self.root.node(name)
    }

    pub fn to_dict(&self) -> IndexMap<String, ConfigValue> {
        self.root.to_dict()
    }

    pub fn compare(&self, other: &ConfigTree, reduce: bool) -> Vec<(String, Option<ConfigValue>)> {
        self.root.compare(&other.root, reduce)
    }

    pub fn details(&self) -> String {
        self.root.details()
    }

    /// The variation dimensions registered while building this tree.
    pub fn variation_dimensions(&self) -> &[VariationDimension] {
        &self.state.variations
    }

    /// The registered grids, as lists of dimension names.
    pub fn grids(&self) -> &[Vec<String>] {
        &self.state.grids
    }

    /// Epoch seconds recorded in the metadata marker of the most recently
    /// merged save, if any.
    pub fn former_saving_time(&self) -> Option<f64> {
        self.state.former_saving_time
    }

    /// Epoch seconds at which this tree was created.
    pub fn created_at(&self) -> f64 {
        self.state.created_at
    }

    pub fn last_saved_as(&self) -> Option<&Path> {
        self.state.was_last_saved_as.as_deref()
    }

    pub(crate) fn set_variation_name(&mut self, variation: &str) {
        self.root.set_variation_name_deep(variation);
    }
}

/// Trees compare by their parameters, in both directions.
impl PartialEq for ConfigTree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

/// Applies one source (file or literal document) to a node.
pub(crate) fn apply_source(
    node: &mut ConfigNode,
    source: &ConfigSource,
    mode: Mode,
    state: &mut RootState,
    schema: &Schema,
) -> Result<()> {
    match source {
        ConfigSource::Path(path) => {
            let resolved = resolve_path(path, state)?;
            let text = fs::read_to_string(&resolved)?;
            for document in parse_documents(&text)? {
                apply_document(node, &document, mode, state, schema)?;
            }
            Ok(())
        }
        ConfigSource::Doc(document) => apply_document(node, document, mode, state, schema),
    }
}

pub(crate) fn apply_document(
    node: &mut ConfigNode,
    document: &Document,
    mode: Mode,
    state: &mut RootState,
    schema: &Schema,
) -> Result<()> {
    for (key, value) in document {
        process_entry(node, key, value.clone(), mode, state, schema)?;
    }
    Ok(())
}

/// Dispatches one `(key, value)` pair: metadata marker, then wildcard,
/// dotted, or leaf handling under the current mode.
fn process_entry(
    node: &mut ConfigNode,
    key: &str,
    value: ConfigValue,
    mode: Mode,
    state: &mut RootState,
    schema: &Schema,
) -> Result<()> {
    state.with_frame(format!("working_on;{};{key}", node.name()), |state| {
        if key == METADATA_KEY {
            return handle_metadata(node, value, state);
        }
        match mode {
            Mode::Construct => add_entry(node, key, value, state, schema),
            Mode::Merge => merge_entry(node, key, value, state, schema),
        }
    })
}

/// Validates and applies the serialized metadata marker: restores the saved
/// regime and switches pre-processing off for the remainder of this merge,
/// so reloading a save is side-effect free.
fn handle_metadata(node: &ConfigNode, value: ConfigValue, state: &mut RootState) -> Result<()> {
    if !node.nesting_hierarchy().is_empty() {
        return Err(ConfigError::ProtectedName(METADATA_KEY.to_string()));
    }
    let ConfigValue::Str(marker) = value else {
        return Err(ConfigError::BadMetadata);
    };
    if !matches(&marker, "Saving time : * (*) ; Regime : *") {
        return Err(ConfigError::BadMetadata);
    }
    let regime: Regime = marker
        .rsplit(" : ")
        .next()
        .unwrap_or_default()
        .parse()?;
    if regime == Regime::Unsafe {
        warn!(
            "you are loading an unsafe config file; reproducibility with the \
             corresponding experiment is not ensured"
        );
    }
    state.regime = regime;
    let epoch = marker
        .rsplit('(')
        .next()
        .and_then(|tail| tail.split(')').next())
        .and_then(|raw| raw.parse::<f64>().ok())
        .ok_or(ConfigError::BadMetadata)?;
    state.former_saving_time = Some(epoch);
    state.pre_processing_enabled = false;
    Ok(())
}

/// Declares a new entry. Wildcards are schema violations here; dotted keys
/// create intermediate sub-configs; duplicate names are fatal.
fn add_entry(
    node: &mut ConfigNode,
    key: &str,
    value: ConfigValue,
    state: &mut RootState,
    schema: &Schema,
) -> Result<()> {
    if key.contains('*') {
        return Err(ConfigError::WildcardInSchema(key.to_string()));
    }
    if let Some((head, rest)) = key.split_once('.') {
        match node.local(head) {
            Some(Param::Node(_)) => {}
            Some(Param::Value(_)) => return Err(node.not_a_sub_config(key, head, rest)),
            None => {
                let mut nesting = node.nesting_hierarchy().to_vec();
                nesting.push(head.to_string());
                let mut sub = ConfigNode::new(head, nesting);
                process_entry(&mut sub, rest, value.clone(), Mode::Construct, state, schema)?;
                let mut declared = Document::new();
                declared.insert(rest.to_string(), value);
                sub.push_hierarchy(ConfigSource::Doc(declared));
                node.insert(head, Param::Node(sub));
                return Ok(());
            }
        }
        let Some(Param::Node(sub)) = node.entry_mut(head) else {
            unreachable!("checked above")
        };
        return process_entry(sub, rest, value, Mode::Construct, state, schema);
    }
    if node.contains(key) {
        return Err(ConfigError::DuplicateParameter(key.to_string()));
    }
    match value {
        ConfigValue::Section(section) => {
            let mut nesting = node.nesting_hierarchy().to_vec();
            nesting.push(key.to_string());
            let mut sub = ConfigNode::new(section.name.clone(), nesting);
            apply_document(&mut sub, &section.body, Mode::Construct, state, schema)?;
            sub.push_hierarchy(ConfigSource::Doc(section.body));
            node.insert(key, Param::Node(sub));
        }
        other => {
            let processed = pre_process(node, key, other, Mode::Construct, state, schema)?;
            embedded_section_names(&processed, &mut state.unlinked);
            node.insert(key, Param::Value(processed));
        }
    }
    Ok(())
}

/// Merges into an existing entry. Wildcards fan out (zero matches is a
/// warning), dotted keys must traverse existing sub-configs, unknown leaves
/// are fatal with suggestions.
fn merge_entry(
    node: &mut ConfigNode,
    key: &str,
    value: ConfigValue,
    state: &mut RootState,
    schema: &Schema,
) -> Result<()> {
    if key.contains('*') {
        let matched: Vec<String> = node
            .parameter_names(true)
            .into_iter()
            .filter(|name| matches(name, key))
            .collect();
        if matched.is_empty() {
            warn!("parameter '{key}' will be ignored : it does not match any existing parameter");
            return Ok(());
        }
        info!(
            "pattern parameter '{key}' will be merged into the following matched parameters : {matched:?}"
        );
        for name in matched {
            merge_entry(node, &name, value.clone(), state, schema)?;
        }
        return Ok(());
    }
    if let Some((head, rest)) = key.split_once('.') {
        match node.local(head) {
            Some(Param::Node(_)) => {}
            Some(Param::Value(_)) => return Err(node.not_a_sub_config(key, head, rest)),
            None => return Err(node.unknown_parameter(key)),
        }
        let Some(Param::Node(sub)) = node.entry_mut(head) else {
            unreachable!("checked above")
        };
        return process_entry(sub, rest, value, Mode::Merge, state, schema);
    }
    match node.local(key) {
        None => Err(node.unknown_parameter(key)),
        Some(Param::Node(_)) => match value {
            ConfigValue::Section(section) => {
                let Some(Param::Node(sub)) = node.entry_mut(key) else {
                    unreachable!("checked above")
                };
                apply_document(sub, &section.body, Mode::Merge, state, schema)
            }
            _ => Err(ConfigError::SubConfigReplacement(key.to_string())),
        },
        Some(Param::Value(old)) => match value {
            ConfigValue::Section(_) => Err(ConfigError::SectionReplacement(key.to_string())),
            other => {
                debug!("setting {key} : old : {old} ; new : {other}");
                let processed = pre_process(node, key, other, Mode::Merge, state, schema)?;
                embedded_section_names(&processed, &mut state.unlinked);
                node.insert(key, Param::Value(processed));
                Ok(())
            }
        },
    }
}

/// Locates a source path: absolute paths must exist; relative paths resolve
/// against the reference folder of the last located source, then the
/// current directory.
pub(crate) fn resolve_path(path: &Path, state: &mut RootState) -> Result<PathBuf> {
    if path.is_absolute() {
        if path.exists() {
            if let Some(parent) = path.parent() {
                state.reference_folder = Some(parent.to_path_buf());
            }
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::PathNotFound(path.display().to_string()));
    }
    if let Some(reference) = &state.reference_folder {
        let candidate = reference.join(path);
        if candidate.exists() {
            return Ok(std::path::absolute(candidate)?);
        }
    }
    if path.exists() {
        let resolved = std::path::absolute(path)?;
        if let Some(parent) = resolved.parent() {
            state.reference_folder = Some(parent.to_path_buf());
        }
        return Ok(resolved);
    }
    Err(ConfigError::PathNotFound(path.display().to_string()))
}
