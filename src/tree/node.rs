//! The recursive configuration node.
//!
//! A node owns an ordered table of parameters, each either a plain value or
//! a child node. Children are exclusively owned by their parameter slot;
//! copying a node is a deep copy and there is no aliasing across the tree.

use crate::error::{ConfigError, Result};
use crate::pattern::{did_you_mean, matches};
use crate::value::{ConfigSource, ConfigValue};
use indexmap::IndexMap;

/// One parameter slot: a plain value or an owned sub-config.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(ConfigValue),
    Node(ConfigNode),
}

impl Param {
    pub fn as_value(&self) -> Option<&ConfigValue> {
        match self {
            Param::Value(value) => Some(value),
            Param::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&ConfigNode> {
        match self {
            Param::Node(node) => Some(node),
            Param::Value(_) => None,
        }
    }

    /// Flattens to a plain value; sub-configs become dicts.
    pub fn to_value(&self) -> ConfigValue {
        match self {
            Param::Value(value) => value.clone(),
            Param::Node(node) => ConfigValue::Dict(node.to_dict()),
        }
    }
}

/// A configuration node: the root or any sub-config.
#[derive(Debug, Clone)]
pub struct ConfigNode {
    name: String,
    variation_name: Option<String>,
    nesting_hierarchy: Vec<String>,
    entries: IndexMap<String, Param>,
    hierarchy: Vec<ConfigSource>,
}

impl ConfigNode {
    pub(crate) fn new(name: impl Into<String>, nesting_hierarchy: Vec<String>) -> Self {
        Self {
            name: name.into(),
            variation_name: None,
            nesting_hierarchy,
            entries: IndexMap::new(),
            hierarchy: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The display name: the node name, suffixed with the variation marker
    /// when this tree was derived from a variation.
    pub fn display_name(&self) -> String {
        match &self.variation_name {
            Some(variation) => format!("{}_VARIATION_{variation}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn variation_name(&self) -> Option<&str> {
        self.variation_name.as_deref()
    }

    pub fn nesting_hierarchy(&self) -> &[String] {
        &self.nesting_hierarchy
    }

    /// The ordered sources merged into this node so far.
    pub fn hierarchy(&self) -> &[ConfigSource] {
        &self.hierarchy
    }

    pub(crate) fn push_hierarchy(&mut self, source: ConfigSource) {
        self.hierarchy.push(source);
    }

    pub(crate) fn set_variation_name_deep(&mut self, variation: &str) {
        self.variation_name = Some(variation.to_string());
        for param in self.entries.values_mut() {
            if let Param::Node(node) = param {
                node.set_variation_name_deep(variation);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Param)> {
        self.entries.iter()
    }

    pub(crate) fn entry_mut(&mut self, key: &str) -> Option<&mut Param> {
        self.entries.get_mut(key)
    }

    pub(crate) fn local(&self, key: &str) -> Option<&Param> {
        self.entries.get(key)
    }

    pub(crate) fn insert(&mut self, key: impl Into<String>, param: Param) {
        self.entries.insert(key.into(), param);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All parameter names of this node, in declaration order. With `deep`,
    /// each sub-config contributes its own names dotted under its key,
    /// grouped pre-order.
    pub fn parameter_names(&self, deep: bool) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        if deep {
            for (key, param) in &self.entries {
                if let Param::Node(node) = param {
                    for sub_name in node.parameter_names(true) {
                        names.push(format!("{key}.{sub_name}"));
                    }
                }
            }
        }
        names
    }

    /// Resolves a (possibly dotted) parameter name.
    ///
    /// A missing name is an addressing failure carrying suggestions over all
    /// deep names; traversing through a non-node value is a type failure
    /// carrying sub-config-only suggestions.
    pub fn param(&self, name: &str) -> Result<&Param> {
        match name.split_once('.') {
            None => self.entries.get(name).ok_or_else(|| self.unknown_parameter(name)),
            Some((head, rest)) => match self.entries.get(head) {
                Some(Param::Node(node)) => node.param(rest),
                Some(Param::Value(_)) => Err(self.not_a_sub_config(name, head, rest)),
                None => Err(self.unknown_parameter(name)),
            },
        }
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.param(name).ok()
    }

    /// The plain value stored under `name`, if it exists and is not a
    /// sub-config.
    pub fn value(&self, name: &str) -> Option<&ConfigValue> {
        self.get(name).and_then(Param::as_value)
    }

    pub fn node(&self, name: &str) -> Option<&ConfigNode> {
        self.get(name).and_then(Param::as_node)
    }

    pub(crate) fn unknown_parameter(&self, name: &str) -> ConfigError {
        ConfigError::UnknownParameter {
            name: name.to_string(),
            config: self.display_name().to_uppercase(),
            suggestions: did_you_mean(name, self.parameter_names(true), ""),
        }
    }

    pub(crate) fn not_a_sub_config(&self, name: &str, segment: &str, rest: &str) -> ConfigError {
        let node_names = self
            .entries
            .iter()
            .filter(|(_, param)| matches!(param, Param::Node(_)))
            .map(|(key, _)| key.clone());
        ConfigError::NotASubConfig {
            name: name.to_string(),
            segment: segment.to_string(),
            suggestions: did_you_mean(segment, node_names, &format!(".{rest}")),
        }
    }

    /// Flattens the node into an ordered dict; sub-configs recurse.
    pub fn to_dict(&self) -> IndexMap<String, ConfigValue> {
        self.entries
            .iter()
            .map(|(key, param)| (key.clone(), param.to_value()))
            .collect()
    }

    /// Lists every parameter that differs between `self` and `other`, as
    /// `(name, value_in_other)` pairs; `None` means the parameter is absent
    /// (or null) in `other`.
    ///
    /// With `reduce`, names are shortened to the smallest unambiguous dotted
    /// suffix, sub-config entries are skipped (their leaves are reported
    /// individually), and dict values are diffed key by key.
    pub fn compare(&self, other: &ConfigNode, reduce: bool) -> Vec<(String, Option<ConfigValue>)> {
        let own_names = self.parameter_names(true);
        let other_names = other.parameter_names(true);
        let mut differences = Vec::new();

        for name in &own_names {
            let value_in_self = lookup(self, name);
            let value_in_other = lookup(other, name);
            if value_in_self == value_in_other {
                continue;
            }
            let displayed = display_name_for(name, &own_names, reduce);
            if !reduce {
                differences.push((displayed, value_in_other));
            } else if !matches!(self.get(name), Some(Param::Node(_))) {
                match (&value_in_self, &value_in_other) {
                    (Some(ConfigValue::Dict(ours)), Some(ConfigValue::Dict(theirs))) => {
                        let mut delta = IndexMap::new();
                        for (key, our_value) in ours {
                            match theirs.get(key) {
                                None => {
                                    delta.insert(key.clone(), ConfigValue::Null);
                                }
                                Some(their_value) if their_value != our_value => {
                                    delta.insert(key.clone(), their_value.clone());
                                }
                                Some(_) => {}
                            }
                        }
                        for (key, their_value) in theirs {
                            if !ours.contains_key(key) {
                                delta.insert(key.clone(), their_value.clone());
                            }
                        }
                        differences.push((displayed, Some(ConfigValue::Dict(delta))));
                    }
                    _ => differences.push((displayed, value_in_other)),
                }
            }
        }

        for name in &other_names {
            if own_names.contains(name) {
                continue;
            }
            let value_in_other = lookup(other, name);
            if value_in_other.is_none() {
                continue;
            }
            if reduce && matches!(other.get(name), Some(Param::Node(_))) {
                continue;
            }
            let displayed = display_name_for(name, &other_names, reduce);
            differences.push((displayed, value_in_other));
        }

        differences
    }

    /// Renders the node and its sub-configs as an indented listing; the root
    /// also lists the configuration hierarchy.
    pub fn details(&self) -> String {
        let indent = "\t".repeat(self.nesting_hierarchy.len());
        let mut out = format!("\n{}{} CONFIG :\n", indent, self.display_name().to_uppercase());
        if self.nesting_hierarchy.is_empty() {
            out.push_str("Configuration hierarchy :\n");
            for source in &self.hierarchy {
                out.push_str(&format!("> {source}\n"));
            }
            out.push('\n');
        }
        for (key, param) in &self.entries {
            out.push_str(&format!("{indent} - {key} : "));
            match param {
                Param::Node(node) => {
                    out.push_str(&node.details());
                    out.push('\n');
                }
                Param::Value(value) => {
                    out.push_str(&format!("{value}\n"));
                }
            }
        }
        out
    }
}

/// Two nodes are equal when they hold the same parameters with equal values,
/// in both directions. Names, hierarchies, and variation markers do not
/// participate.
impl PartialEq for ConfigNode {
    fn eq(&self, other: &Self) -> bool {
        self.entries
            .iter()
            .all(|(key, param)| other.entries.get(key) == Some(param))
            && other.entries.keys().all(|key| self.entries.contains_key(key))
    }
}

fn lookup(node: &ConfigNode, name: &str) -> Option<ConfigValue> {
    let value = node.get(name)?.to_value();
    if value.is_null() { None } else { Some(value) }
}

fn display_name_for(name: &str, names: &[String], reduce: bool) -> String {
    if !reduce {
        return name.to_string();
    }
    let mut segments: Vec<&str> = name.split('.').collect();
    let mut displayed = segments.pop().unwrap_or_default().to_string();
    while names
        .iter()
        .filter(|candidate| matches(candidate, &format!("*.{displayed}")))
        .count()
        != 1
        && !segments.is_empty()
    {
        displayed = format!("{}.{displayed}", segments.pop().unwrap());
    }
    displayed
}
