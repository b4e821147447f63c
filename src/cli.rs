//! Command-line codec: serialize a tree to flag tokens and parse flag
//! tokens back into typed override values.
//!
//! The wire format is `--name value` or `--name 'value' !type`, where the
//! `!type` suffix forces a type that the textual form alone cannot carry.
//! Lists render as `[e1,e2,...]` and dicts as `{k1:v1,...}`, recursively.
//! Parsing infers each flag's target type from the configuration's current
//! value unless a forcing suffix overrides it; inference recurses
//! structurally into containers.
//!
//! Escaping happens in layers: quotes, spaces, and backslashes protect a
//! token through whitespace splitting, and container delimiters are escaped
//! once more so the element scanner can tell separators from content. The
//! tokenizer consumes one level of escapes, the container scanner the other.

use crate::error::{ConfigError, Result};
use crate::pattern::matches;
use crate::tree::{ConfigTree, Param};
use crate::value::{ConfigSource, ConfigValue, Document};
use indexmap::IndexMap;
use tracing::{info, warn};

/// A `!type` forcing suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Int,
    Float,
    Str,
    Bool,
    List,
    Dict,
}

impl TypeTag {
    pub const ALL: [TypeTag; 6] = [
        TypeTag::Int,
        TypeTag::Float,
        TypeTag::Str,
        TypeTag::Bool,
        TypeTag::List,
        TypeTag::Dict,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Str => "str",
            TypeTag::Bool => "bool",
            TypeTag::List => "list",
            TypeTag::Dict => "dict",
        }
    }

    pub fn parse(text: &str) -> Option<TypeTag> {
        TypeTag::ALL.into_iter().find(|tag| tag.as_str() == text)
    }
}

impl ConfigTree {
    /// Serializes every leaf parameter to one `--name 'value' !type` token.
    /// Sub-configs themselves are skipped; their leaves appear under dotted
    /// names when `deep` is set.
    pub fn command_line_tokens(&self, deep: bool) -> Vec<String> {
        let mut tokens = Vec::new();
        for name in self.parameter_names(deep) {
            let Some(Param::Value(value)) = self.get(&name) else {
                continue;
            };
            let rendered = render_value(value, false);
            let token = match rendered.rsplit_once(" !") {
                Some((text, tag)) => format!("--{name} '{text}' !{tag}"),
                None => format!("--{name} {rendered}"),
            };
            tokens.push(escape_symbols(&token, &['{', '}', '*']));
        }
        tokens
    }

    /// The tokens of [`Self::command_line_tokens`], whitespace-joined into a
    /// single re-tokenizable string.
    pub fn command_line_string(&self, deep: bool) -> String {
        self.command_line_tokens(deep).join(" ")
    }

    /// Parses an argument vector into a typed override document, without
    /// applying it.
    ///
    /// Flag patterns may contain wildcards and fan out over every matching
    /// leaf parameter. Unknown flags are skipped with a warning. With
    /// `skip_config_flag`, the first `--config` flag and its value are
    /// ignored (they name override sources, handled by the build
    /// orchestration, not parameter overrides).
    pub fn parse_command_line(
        &self,
        tokens: &[String],
        skip_config_flag: bool,
    ) -> Result<Document> {
        let leaf_names: Vec<String> = self
            .parameter_names(true)
            .into_iter()
            .filter(|name| matches!(self.get(name), Some(Param::Value(_))))
            .collect();

        struct Pending {
            previous: ConfigValue,
            raw: Option<String>,
            force: Option<TypeTag>,
        }
        let mut pending: IndexMap<String, Pending> = IndexMap::new();
        let mut in_param: Vec<String> = Vec::new();
        let mut found_config = !skip_config_flag;

        for element in tokens {
            if let Some(flag) = element.strip_prefix("--") {
                if !found_config && flag == "config" {
                    in_param.clear();
                    found_config = true;
                    continue;
                }
                let (pattern, raw) = match flag.split_once('=') {
                    Some((name, value)) if !value.is_empty() => {
                        (name, Some(value.to_string()))
                    }
                    Some((name, _)) => (name, None),
                    None => (flag, None),
                };
                in_param.clear();
                for name in &leaf_names {
                    if matches(name, pattern) {
                        in_param.push(name.clone());
                        let previous = self.value(name).cloned().unwrap_or(ConfigValue::Null);
                        pending.insert(
                            name.clone(),
                            Pending {
                                previous,
                                raw: raw.clone(),
                                force: None,
                            },
                        );
                    }
                }
                if in_param.is_empty() {
                    warn!(
                        "parameter '{pattern}' does not match any parameter in the config; \
                         it will not be merged"
                    );
                }
            } else if !in_param.is_empty() && pending[&in_param[0]].raw.is_none() {
                for name in &in_param {
                    pending[name].raw = Some(element.clone());
                }
            } else if !in_param.is_empty() && element.starts_with('!') {
                let tag = TypeTag::parse(&element[1..])
                    .ok_or_else(|| ConfigError::UnknownTypeTag(element[1..].to_string()))?;
                for name in &in_param {
                    pending[name].force = Some(tag);
                }
                in_param.clear();
            } else if !in_param.is_empty() {
                // A bare continuation token extends the value.
                for name in &in_param {
                    if let Some(raw) = &mut pending[name].raw {
                        raw.push(' ');
                        raw.push_str(element);
                    }
                }
            }
        }

        let mut overrides = Document::new();
        for (name, entry) in pending {
            let adapted =
                adapt_to_type(&entry.previous, entry.raw.as_deref(), entry.force, &name)?;
            overrides.insert(name, adapted);
        }
        Ok(overrides)
    }

    /// Parses and merges an argument vector.
    pub fn merge_command_line(&mut self, tokens: &[String], skip_config_flag: bool) -> Result<()> {
        let overrides = self.parse_command_line(tokens, skip_config_flag)?;
        if overrides.is_empty() {
            return Ok(());
        }
        info!(
            "merging from command line : {}",
            ConfigValue::Dict(overrides.clone())
        );
        self.merge_source(&ConfigSource::Doc(overrides), false)
    }

    /// Tokenizes and merges a single command-line string.
    pub fn merge_command_line_string(&mut self, line: &str) -> Result<()> {
        let tokens = tokenize(line)?;
        self.merge_command_line(&tokens, false)
    }
}

/// Quote-aware whitespace splitting with backslash escapes. Unclosed quotes
/// are fatal.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = vec![String::new()];
    let mut quotes: Vec<char> = Vec::new();
    let mut escaped = false;
    for c in line.chars() {
        if c == '\\' && !escaped {
            escaped = true;
        } else if (c == '"' || c == '\'') && !escaped {
            if quotes.last() == Some(&c) {
                quotes.pop();
            } else {
                quotes.push(c);
            }
        } else if c == ' ' && quotes.is_empty() && !escaped {
            if !tokens.last().is_some_and(String::is_empty) {
                tokens.push(String::new());
            }
        } else {
            escaped = false;
            tokens.last_mut().expect("never empty").push(c);
        }
    }
    if !quotes.is_empty() {
        return Err(ConfigError::UnclosedQuote);
    }
    if tokens.last().is_some_and(String::is_empty) {
        tokens.pop();
    }
    Ok(tokens)
}

fn escape_symbols(input: &str, symbols: &[char]) -> String {
    let mut out = input.to_string();
    for symbol in symbols {
        out = out.replace(*symbol, &format!("\\{symbol}"));
    }
    out
}

/// Renders one value in the wire format, with the forcing suffix whenever
/// the textual form alone cannot reproduce the runtime type.
fn render_value(value: &ConfigValue, in_iterable: bool) -> String {
    match value {
        ConfigValue::Null => "none".to_string(),
        ConfigValue::List(items) => {
            let rendered: Vec<String> =
                items.iter().map(|item| render_value(item, true)).collect();
            format!("[{}] !list", rendered.join(","))
        }
        ConfigValue::Dict(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(key, item)| format!("{key}:{}", render_value(item, true)))
                .collect();
            format!("{{{}}} !dict", rendered.join(","))
        }
        ConfigValue::Section(section) => {
            render_value(&ConfigValue::Dict(section.body.clone()), in_iterable)
        }
        scalar => {
            let (text, tag) = match scalar {
                ConfigValue::Bool(b) => (b.to_string(), TypeTag::Bool),
                ConfigValue::Int(i) => (i.to_string(), TypeTag::Int),
                ConfigValue::Float(f) => (f.to_string(), TypeTag::Float),
                ConfigValue::Str(s) => (s.clone(), TypeTag::Str),
                _ => unreachable!("containers handled above"),
            };
            let mut text = escape_symbols(&text, &['\\']);
            if in_iterable {
                // Twice: one level survives tokenization for the container
                // element scanner to consume.
                text = escape_symbols(&text, &['{', '}', '[', ']', ',']);
                text = escape_symbols(&text, &['{', '}', '[', ']', ',']);
            }
            text = escape_symbols(&text, &['\'', '"', ' ']);
            format!("{text} !{}", tag.as_str())
        }
    }
}

fn is_null_literal(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered == "none" || lowered == "null"
}

fn strip_trailing_unescaped_spaces(text: &mut String) {
    while text.ends_with(' ') {
        let bytes = text.as_bytes();
        if bytes.len() >= 2 && bytes[bytes.len() - 2] == b'\\' {
            break;
        }
        text.pop();
    }
}

/// Splits an inline `!type` suffix off a scalar and trims trailing spaces.
fn parse_scalar(raw: &str, force: Option<TypeTag>) -> (String, Option<TypeTag>) {
    let mut text = raw.to_string();
    let mut force = force;
    if force.is_none() {
        for tag in TypeTag::ALL {
            let suffix = format!("!{}", tag.as_str());
            if text.ends_with(&suffix) {
                let cut = text.len() - suffix.len();
                let escaped = cut >= 1 && text.as_bytes()[cut - 1] == b'\\';
                if !escaped {
                    force = Some(tag);
                    text.truncate(cut);
                }
            }
        }
    }
    strip_trailing_unescaped_spaces(&mut text);
    (text, force)
}

/// Splits container content on top-level commas, honoring bracket nesting
/// and escapes, and extracts per-element forcing suffixes.
fn parse_container(text: &str) -> Vec<(String, Option<TypeTag>)> {
    let mut items: Vec<String> = vec![String::new()];
    let mut brackets: Vec<char> = Vec::new();
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            escaped = false;
            if c == ' ' {
                // Escaped spaces stay marked so the trailing-space trim
                // below leaves them alone.
                items.last_mut().expect("never empty").push('\\');
            }
            items.last_mut().expect("never empty").push(c);
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' && brackets.is_empty() {
            items.push(String::new());
        } else if c != ' ' || !items.last().is_some_and(String::is_empty) {
            items.last_mut().expect("never empty").push(c);
            match c {
                '[' | '{' => brackets.push(c),
                ']' if brackets.last() == Some(&'[') => {
                    brackets.pop();
                }
                '}' if brackets.last() == Some(&'{') => {
                    brackets.pop();
                }
                _ => {}
            }
        }
    }
    let mut elements = Vec::with_capacity(items.len());
    for mut item in items {
        strip_trailing_unescaped_spaces(&mut item);
        let mut item = item.replace("\\ ", " ");
        let mut force = None;
        for tag in TypeTag::ALL {
            if force.is_some() {
                break;
            }
            let suffix = format!("!{}", tag.as_str());
            if item.ends_with(&suffix) {
                let cut = item.len() - suffix.len();
                let escaped = cut >= 1 && item.as_bytes()[cut - 1] == b'\\';
                if !escaped {
                    force = Some(tag);
                    item.truncate(cut);
                    strip_trailing_unescaped_spaces(&mut item);
                }
            }
        }
        elements.push((item, force));
    }
    elements
}

/// Adapts a textual value to the type of the parameter's previous value,
/// or to the forced type. `raw` of `None` means a valueless flag: `true`.
pub(crate) fn adapt_to_type(
    previous: &ConfigValue,
    raw: Option<&str>,
    force: Option<TypeTag>,
    param: &str,
) -> Result<ConfigValue> {
    let Some(raw) = raw else {
        return Ok(ConfigValue::Bool(true));
    };
    if force.is_none() && is_null_literal(raw) {
        return Ok(ConfigValue::Null);
    }
    let (scalar, force) = parse_scalar(raw, force);

    if previous.is_null() && force.is_none() {
        if is_null_literal(&scalar) {
            return Ok(ConfigValue::Null);
        }
        return Err(ConfigError::TypeInference {
            param: param.to_string(),
            reason: "its previous value was none; to overwrite none values from the command \
                     line, force their type (example : --none_param=0.001 !float)"
                .to_string(),
        });
    }

    if force == Some(TypeTag::Str) || (force.is_none() && matches!(previous, ConfigValue::Str(_)))
    {
        return Ok(ConfigValue::Str(scalar));
    }

    if force == Some(TypeTag::List) || (force.is_none() && matches!(previous, ConfigValue::List(_)))
    {
        return adapt_list(previous, &scalar, param);
    }

    if force == Some(TypeTag::Dict) || (force.is_none() && matches!(previous, ConfigValue::Dict(_)))
    {
        return adapt_dict(previous, &scalar, param);
    }

    if force == Some(TypeTag::Int) || (force.is_none() && matches!(previous, ConfigValue::Int(_)))
    {
        return scalar.trim().parse::<i64>().map(ConfigValue::Int).map_err(|_| {
            ConfigError::TypeInference {
                param: param.to_string(),
                reason: format!("'{scalar}' is not a valid int"),
            }
        });
    }

    if force == Some(TypeTag::Float)
        || (force.is_none() && matches!(previous, ConfigValue::Float(_)))
    {
        return scalar
            .trim()
            .parse::<f64>()
            .map(ConfigValue::Float)
            .map_err(|_| ConfigError::TypeInference {
                param: param.to_string(),
                reason: format!("'{scalar}' is not a valid float"),
            });
    }

    if force == Some(TypeTag::Bool) || (force.is_none() && matches!(previous, ConfigValue::Bool(_)))
    {
        return match scalar.trim().to_lowercase().as_str() {
            "y" | "yes" | "true" | "1" => Ok(ConfigValue::Bool(true)),
            "n" | "no" | "false" | "0" => Ok(ConfigValue::Bool(false)),
            _ => Err(ConfigError::TypeInference {
                param: param.to_string(),
                reason: "boolean parameters accept y/yes/true/1 for true and n/no/false/0 \
                         for false"
                    .to_string(),
            }),
        };
    }

    Err(ConfigError::TypeInference {
        param: param.to_string(),
        reason: format!(
            "no adaptation rule for a previous value of type {}",
            previous.type_name()
        ),
    })
}

fn element_is_self_typed(value: &str, force: Option<TypeTag>) -> bool {
    force.is_some() || is_null_literal(value.trim_start())
}

fn homogeneous(items: &[ConfigValue]) -> bool {
    let Some(last) = items.last() else {
        return false;
    };
    items
        .iter()
        .all(|item| std::mem::discriminant(item) == std::mem::discriminant(last))
}

fn adapt_list(previous: &ConfigValue, scalar: &str, param: &str) -> Result<ConfigValue> {
    let inner = if scalar.len() >= 2 && scalar.starts_with('[') && scalar.ends_with(']') {
        &scalar[1..scalar.len() - 1]
    } else {
        scalar
    };
    let elements = if inner.is_empty() {
        Vec::new()
    } else {
        parse_container(inner)
    };

    match previous {
        ConfigValue::List(prev_items) if homogeneous(prev_items) => elements
            .iter()
            .map(|(value, force)| adapt_to_type(&prev_items[0], Some(value), *force, param))
            .collect::<Result<Vec<_>>>()
            .map(ConfigValue::List),
        ConfigValue::List(prev_items) if prev_items.len() == elements.len() => prev_items
            .iter()
            .zip(&elements)
            .map(|(prev, (value, force))| adapt_to_type(prev, Some(value), *force, param))
            .collect::<Result<Vec<_>>>()
            .map(ConfigValue::List),
        ConfigValue::List(_)
            if elements
                .iter()
                .all(|(value, force)| element_is_self_typed(value, *force)) =>
        {
            elements
                .iter()
                .map(|(value, force)| adapt_to_type(&ConfigValue::Null, Some(value), *force, param))
                .collect::<Result<Vec<_>>>()
                .map(ConfigValue::List)
        }
        ConfigValue::List(prev_items) => Err(ConfigError::TypeInference {
            param: param.to_string(),
            reason: format!(
                "the new list is inconsistent with the old value {}; force the type of its \
                 elements so inference can be done",
                ConfigValue::List(prev_items.clone())
            ),
        }),
        _ if elements
            .iter()
            .all(|(value, force)| element_is_self_typed(value, *force)) =>
        {
            elements
                .iter()
                .map(|(value, force)| adapt_to_type(&ConfigValue::Null, Some(value), *force, param))
                .collect::<Result<Vec<_>>>()
                .map(ConfigValue::List)
        }
        _ => Err(ConfigError::TypeInference {
            param: param.to_string(),
            reason: "since the previous value was not a list, none of its items' types can \
                     be inferred; force the type of all elements in the new list"
                .to_string(),
        }),
    }
}

fn adapt_dict(previous: &ConfigValue, scalar: &str, param: &str) -> Result<ConfigValue> {
    let inner = if scalar.len() >= 2 && scalar.starts_with('{') && scalar.ends_with('}') {
        &scalar[1..scalar.len() - 1]
    } else {
        scalar
    };
    let tokens = if inner.is_empty() {
        Vec::new()
    } else {
        parse_container(inner)
    };
    let mut pairs: Vec<(String, String, Option<TypeTag>)> = Vec::new();
    for (text, force) in tokens {
        if text.is_empty() {
            continue;
        }
        let Some((key, value)) = text.split_once(':') else {
            return Err(ConfigError::TypeInference {
                param: param.to_string(),
                reason: format!("dict element '{text}' is missing a ':' separator"),
            });
        };
        pairs.push((key.trim_end().to_string(), value.to_string(), force));
    }

    match previous {
        ConfigValue::Dict(prev_map)
            if pairs.iter().all(|(key, value, force)| {
                prev_map.contains_key(key.as_str()) || element_is_self_typed(value, *force)
            }) =>
        {
            let mut out = IndexMap::new();
            for (key, value, force) in pairs {
                let prev_value = prev_map.get(&key).cloned().unwrap_or(ConfigValue::Null);
                out.insert(
                    key,
                    adapt_to_type(&prev_value, Some(value.trim_start()), force, param)?,
                );
            }
            Ok(ConfigValue::Dict(out))
        }
        ConfigValue::Dict(prev_map) => Err(ConfigError::TypeInference {
            param: param.to_string(),
            reason: format!(
                "the new dict is inconsistent with the old value {}; force the type of its \
                 new elements so inference can be done",
                ConfigValue::Dict(prev_map.clone())
            ),
        }),
        _ if pairs
            .iter()
            .all(|(_, value, force)| element_is_self_typed(value, *force)) =>
        {
            let mut out = IndexMap::new();
            for (key, value, force) in pairs {
                out.insert(
                    key,
                    adapt_to_type(&ConfigValue::Null, Some(value.trim_start()), force, param)?,
                );
            }
            Ok(ConfigValue::Dict(out))
        }
        _ => Err(ConfigError::TypeInference {
            param: param.to_string(),
            reason: "since the previous value was not a dict, none of its keys' types can \
                     be inferred; force the type of all elements in the new dict"
                .to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_honors_quotes_and_escapes() {
        assert_eq!(
            tokenize("--a 'x y' !str").unwrap(),
            vec!["--a", "x y", "!str"]
        );
        assert_eq!(tokenize("a\\ b c").unwrap(), vec!["a b", "c"]);
        assert_eq!(tokenize("  a   b ").unwrap(), vec!["a", "b"]);
        assert!(matches!(tokenize("'open"), Err(ConfigError::UnclosedQuote)));
    }

    #[test]
    fn scalar_suffixes_are_detected_unless_escaped() {
        assert_eq!(parse_scalar("5 !int", None), ("5".to_string(), Some(TypeTag::Int)));
        assert_eq!(parse_scalar("5", Some(TypeTag::Float)), ("5".to_string(), Some(TypeTag::Float)));
        // An escaped '!' keeps the suffix as content.
        assert_eq!(parse_scalar("oops\\!int", None), ("oops\\!int".to_string(), None));
    }

    #[test]
    fn container_split_respects_nesting() {
        let elements = parse_container("1 !int,[2 !int,3 !int] !list,x:y !str");
        assert_eq!(
            elements,
            vec![
                ("1".to_string(), Some(TypeTag::Int)),
                ("[2 !int,3 !int]".to_string(), Some(TypeTag::List)),
                ("x:y".to_string(), Some(TypeTag::Str)),
            ]
        );
    }

    #[test]
    fn adapt_infers_from_previous_scalars() {
        let adapted = adapt_to_type(&ConfigValue::Int(3), Some("12"), None, "p").unwrap();
        assert_eq!(adapted, ConfigValue::Int(12));
        let adapted = adapt_to_type(&ConfigValue::Float(0.5), Some("2"), None, "p").unwrap();
        assert_eq!(adapted, ConfigValue::Float(2.0));
        let adapted = adapt_to_type(&ConfigValue::from("old"), Some("new"), None, "p").unwrap();
        assert_eq!(adapted, ConfigValue::from("new"));
    }

    #[test]
    fn valueless_flag_means_true() {
        assert_eq!(
            adapt_to_type(&ConfigValue::Bool(false), None, None, "p").unwrap(),
            ConfigValue::Bool(true)
        );
    }

    #[test]
    fn bool_literals_are_restricted() {
        for (text, expected) in [("y", true), ("YES", true), ("1", true), ("no", false), ("0", false)] {
            assert_eq!(
                adapt_to_type(&ConfigValue::Bool(true), Some(text), None, "p").unwrap(),
                ConfigValue::Bool(expected)
            );
        }
        assert!(adapt_to_type(&ConfigValue::Bool(true), Some("maybe"), None, "p").is_err());
    }

    #[test]
    fn none_previous_requires_forcing() {
        let error = adapt_to_type(&ConfigValue::Null, Some("0.001"), None, "none_param")
            .unwrap_err();
        assert!(error.to_string().contains("!float"), "{error}");
        // Forced, it goes through.
        assert_eq!(
            adapt_to_type(&ConfigValue::Null, Some("0.001"), Some(TypeTag::Float), "p").unwrap(),
            ConfigValue::Float(0.001)
        );
        // And null stays null without forcing.
        assert_eq!(
            adapt_to_type(&ConfigValue::Null, Some("none"), None, "p").unwrap(),
            ConfigValue::Null
        );
    }

    #[test]
    fn homogeneous_previous_list_types_every_element() {
        let previous = ConfigValue::List(vec![ConfigValue::Int(1), ConfigValue::Int(2)]);
        let adapted = adapt_to_type(&previous, Some("[7,8,9]"), None, "p").unwrap();
        assert_eq!(
            adapted,
            ConfigValue::List(vec![
                ConfigValue::Int(7),
                ConfigValue::Int(8),
                ConfigValue::Int(9)
            ])
        );
    }

    #[test]
    fn same_length_mixed_list_infers_positionally() {
        let previous = ConfigValue::List(vec![ConfigValue::Int(1), ConfigValue::from("a")]);
        let adapted = adapt_to_type(&previous, Some("[2,b]"), None, "p").unwrap();
        assert_eq!(
            adapted,
            ConfigValue::List(vec![ConfigValue::Int(2), ConfigValue::from("b")])
        );
    }

    #[test]
    fn unmatched_mixed_list_needs_element_forcing() {
        let previous = ConfigValue::List(vec![ConfigValue::Int(1), ConfigValue::from("a")]);
        assert!(adapt_to_type(&previous, Some("[2,b,c]"), None, "p").is_err());
        let adapted = adapt_to_type(&previous, Some("[2 !int,b !str,c !str]"), None, "p").unwrap();
        assert_eq!(
            adapted,
            ConfigValue::List(vec![
                ConfigValue::Int(2),
                ConfigValue::from("b"),
                ConfigValue::from("c")
            ])
        );
    }

    #[test]
    fn dict_keys_infer_from_previous_entries() {
        let mut map = IndexMap::new();
        map.insert("lr".to_string(), ConfigValue::Float(0.1));
        map.insert("steps".to_string(), ConfigValue::Int(10));
        let previous = ConfigValue::Dict(map);
        let adapted = adapt_to_type(&previous, Some("{lr:0.2,steps:20}"), None, "p").unwrap();
        let dict = adapted.as_dict().unwrap();
        assert_eq!(dict["lr"], ConfigValue::Float(0.2));
        assert_eq!(dict["steps"], ConfigValue::Int(20));
        // A brand-new key has no previous value to infer from.
        assert!(adapt_to_type(&previous, Some("{momentum:0.9}"), None, "p").is_err());
        let adapted =
            adapt_to_type(&previous, Some("{momentum:0.9 !float}"), None, "p").unwrap();
        assert_eq!(
            adapted.as_dict().unwrap()["momentum"],
            ConfigValue::Float(0.9)
        );
    }

    #[test]
    fn empty_containers_adapt_cleanly() {
        let previous = ConfigValue::List(vec![ConfigValue::Int(1)]);
        assert_eq!(
            adapt_to_type(&previous, Some("[]"), None, "p").unwrap(),
            ConfigValue::List(vec![])
        );
        let mut map = IndexMap::new();
        map.insert("k".to_string(), ConfigValue::Int(1));
        assert_eq!(
            adapt_to_type(&ConfigValue::Dict(map), Some("{}"), None, "p").unwrap(),
            ConfigValue::Dict(IndexMap::new())
        );
    }
}
