//! Dynamic parameter values, parsed documents, and configuration sources.
//!
//! `ConfigValue` is the single currency the merge engine trades in. YAML
//! text is lowered into it before any tree mutation happens, so the engine
//! never sees textual syntax: a source is an ordered sequence of mappings by
//! the time it reaches the recursion.

use crate::error::{ConfigError, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::value::{Tag, TaggedValue};
use std::fmt;
use std::path::PathBuf;

/// An ordered mapping of parameter names to values: one parsed document.
pub type Document = IndexMap<String, ConfigValue>;

/// A `!name`-tagged mapping parsed from a document.
///
/// Sections are consumed by the merge engine when they sit directly in a
/// parameter slot, where they become sub-configs. A section anywhere deeper
/// (inside a list or dict value) trips the unlinked-sub-config check after
/// the build.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub body: Document,
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ConfigValue>),
    Dict(IndexMap<String, ConfigValue>),
    Section(Section),
}

impl ConfigValue {
    /// Lowers a parsed YAML value.
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<ConfigValue> {
        use serde_yaml::Value;
        Ok(match value {
            Value::Null => ConfigValue::Null,
            Value::Bool(b) => ConfigValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ConfigValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    ConfigValue::Float(f)
                } else {
                    return Err(ConfigError::UnsupportedYaml(format!(
                        "number out of range: {n}"
                    )));
                }
            }
            Value::String(s) => ConfigValue::Str(s.clone()),
            Value::Sequence(items) => ConfigValue::List(
                items.iter().map(ConfigValue::from_yaml).collect::<Result<_>>()?,
            ),
            Value::Mapping(mapping) => ConfigValue::Dict(yaml_mapping_to_dict(mapping)?),
            Value::Tagged(tagged) => {
                let name = tag_name(&tagged.tag);
                match &tagged.value {
                    Value::Mapping(mapping) => ConfigValue::Section(Section {
                        name,
                        body: yaml_mapping_to_dict(mapping)?,
                    }),
                    other => {
                        return Err(ConfigError::UnsupportedYaml(format!(
                            "tag '!{name}' must introduce a mapping, not {other:?}"
                        )));
                    }
                }
            }
        })
    }

    /// Raises a stored value back to YAML. Sections become tagged mappings.
    pub fn to_yaml(&self) -> serde_yaml::Value {
        use serde_yaml::Value;
        match self {
            ConfigValue::Null => Value::Null,
            ConfigValue::Bool(b) => Value::Bool(*b),
            ConfigValue::Int(i) => Value::Number((*i).into()),
            ConfigValue::Float(f) => Value::Number((*f).into()),
            ConfigValue::Str(s) => Value::String(s.clone()),
            ConfigValue::List(items) => {
                Value::Sequence(items.iter().map(ConfigValue::to_yaml).collect())
            }
            ConfigValue::Dict(map) => Value::Mapping(dict_to_yaml_mapping(map)),
            ConfigValue::Section(section) => Value::Tagged(Box::new(TaggedValue {
                tag: Tag::new(section.name.clone()),
                value: Value::Mapping(dict_to_yaml_mapping(&section.body)),
            })),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Null => "null",
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "int",
            ConfigValue::Float(_) => "float",
            ConfigValue::Str(_) => "str",
            ConfigValue::List(_) => "list",
            ConfigValue::Dict(_) => "dict",
            ConfigValue::Section(_) => "section",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&IndexMap<String, ConfigValue>> {
        match self {
            ConfigValue::Dict(map) => Some(map),
            _ => None,
        }
    }
}

/// Collects the names of sections buried inside container values.
///
/// Sections directly at a parameter slot are consumed by the engine before
/// this runs, so anything found here is unreachable through parameter
/// containment.
pub(crate) fn embedded_section_names(value: &ConfigValue, out: &mut Vec<String>) {
    match value {
        ConfigValue::Section(section) => out.push(section.name.clone()),
        ConfigValue::List(items) => {
            for item in items {
                embedded_section_names(item, out);
            }
        }
        ConfigValue::Dict(map) => {
            for item in map.values() {
                embedded_section_names(item, out);
            }
        }
        _ => {}
    }
}

fn tag_name(tag: &Tag) -> String {
    tag.to_string().trim_start_matches('!').to_string()
}

fn yaml_mapping_to_dict(mapping: &serde_yaml::Mapping) -> Result<IndexMap<String, ConfigValue>> {
    let mut dict = IndexMap::new();
    for (key, value) in mapping {
        let key = match key {
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            other => {
                return Err(ConfigError::UnsupportedYaml(format!(
                    "mapping keys must be scalars, got {other:?}"
                )));
            }
        };
        dict.insert(key, ConfigValue::from_yaml(value)?);
    }
    Ok(dict)
}

fn dict_to_yaml_mapping(dict: &IndexMap<String, ConfigValue>) -> serde_yaml::Mapping {
    let mut mapping = serde_yaml::Mapping::new();
    for (key, value) in dict {
        mapping.insert(serde_yaml::Value::String(key.clone()), value.to_yaml());
    }
    mapping
}

/// Parses a (possibly multi-document) YAML stream into ordered documents.
///
/// A document that is itself a `!name`-tagged mapping becomes a
/// single-entry document introducing that section.
pub fn parse_documents(text: &str) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for deserializer in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        match ConfigValue::from_yaml(&value)? {
            ConfigValue::Null => {}
            ConfigValue::Dict(dict) => documents.push(dict),
            ConfigValue::Section(section) => {
                let mut document = Document::new();
                let name = section.name.clone();
                document.insert(name, ConfigValue::Section(section));
                documents.push(document);
            }
            other => {
                return Err(ConfigError::UnsupportedYaml(format!(
                    "a document must be a mapping, got {}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(documents)
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Null => write!(f, "none"),
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Int(i) => write!(f, "{i}"),
            ConfigValue::Float(x) => write!(f, "{x}"),
            ConfigValue::Str(s) => write!(f, "{s}"),
            ConfigValue::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            ConfigValue::Dict(map) => {
                write!(f, "{{")?;
                for (index, (key, value)) in map.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            ConfigValue::Section(section) => {
                write!(f, "!{} {}", section.name, ConfigValue::Dict(section.body.clone()))
            }
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Str(value)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(value: Vec<ConfigValue>) -> Self {
        ConfigValue::List(value)
    }
}

impl From<Document> for ConfigValue {
    fn from(value: Document) -> Self {
        ConfigValue::Dict(value)
    }
}

/// Where a layer of configuration comes from: a YAML file on disk or an
/// in-memory document. The hierarchy records these in merge order so any
/// state can be replayed exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    Path(PathBuf),
    Doc(Document),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Path(path) => write!(f, "{}", path.display()),
            ConfigSource::Doc(doc) => write!(f, "{}", ConfigValue::Dict(doc.clone())),
        }
    }
}

impl From<&str> for ConfigSource {
    fn from(value: &str) -> Self {
        ConfigSource::Path(PathBuf::from(value))
    }
}

impl From<PathBuf> for ConfigSource {
    fn from(value: PathBuf) -> Self {
        ConfigSource::Path(value)
    }
}

impl From<Document> for ConfigSource {
    fn from(value: Document) -> Self {
        ConfigSource::Doc(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowers_scalars_and_containers() {
        let docs = parse_documents("a: 1\nb: 0.5\nc: [x, true]\nd: {k: null}\n").unwrap();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc["a"], ConfigValue::Int(1));
        assert_eq!(doc["b"], ConfigValue::Float(0.5));
        assert_eq!(
            doc["c"],
            ConfigValue::List(vec![ConfigValue::from("x"), ConfigValue::Bool(true)])
        );
        let dict = doc["d"].as_dict().unwrap();
        assert_eq!(dict["k"], ConfigValue::Null);
    }

    #[test]
    fn tagged_mapping_becomes_section() {
        let docs = parse_documents("sub: !sub\n  x: 1\n").unwrap();
        match &docs[0]["sub"] {
            ConfigValue::Section(section) => {
                assert_eq!(section.name, "sub");
                assert_eq!(section.body["x"], ConfigValue::Int(1));
            }
            other => panic!("expected section, got {other:?}"),
        }
    }

    #[test]
    fn tagged_document_becomes_single_entry() {
        let docs = parse_documents("--- !model\nlr: 0.1\n").unwrap();
        assert_eq!(docs.len(), 1);
        assert!(matches!(docs[0]["model"], ConfigValue::Section(_)));
    }

    #[test]
    fn multi_document_streams_stay_ordered() {
        let docs = parse_documents("a: 1\n---\nb: 2\n").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["a"], ConfigValue::Int(1));
        assert_eq!(docs[1]["b"], ConfigValue::Int(2));
    }

    #[test]
    fn yaml_round_trip_preserves_order() {
        let mut doc = Document::new();
        doc.insert("z".into(), ConfigValue::Int(1));
        doc.insert("a".into(), ConfigValue::Int(2));
        let text = serde_yaml::to_string(&ConfigValue::Dict(doc.clone()).to_yaml()).unwrap();
        let reparsed = parse_documents(&text).unwrap();
        assert_eq!(reparsed[0], doc);
    }

    #[test]
    fn embedded_sections_are_reported() {
        let docs = parse_documents("p:\n  - !hidden\n    x: 1\n").unwrap();
        let mut names = Vec::new();
        embedded_section_names(&docs[0]["p"], &mut names);
        assert_eq!(names, vec!["hidden".to_string()]);
    }
}
