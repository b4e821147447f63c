//! Hierarchical configuration trees for experiment-style projects.
//!
//! A tree is built from a default (schema) source plus ordered override
//! layers, refuses silently-added unknown parameters, supports
//! wildcard-addressed bulk edits, derives combinatorial variations for
//! parameter sweeps, and round-trips through YAML saves and command-line
//! argument strings.

pub mod cli;
pub mod error;
pub mod pattern;
pub mod tree;
pub mod value;

pub use error::{ConfigError, Result};
pub use tree::{
    ConfigNode, ConfigTree, METADATA_KEY, Param, Regime, Schema, Transform, VariationDimension,
};
pub use value::{ConfigSource, ConfigValue, Document, Section, parse_documents};
