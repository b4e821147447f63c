//! Integration tests for the command-line codec round trip.

use config_tree::cli::tokenize;
use config_tree::{
    ConfigError, ConfigSource, ConfigTree, ConfigValue, Document, Regime, Schema,
};
use indexmap::IndexMap;

fn doc(pairs: &[(&str, ConfigValue)]) -> Document {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn dict(pairs: &[(&str, ConfigValue)]) -> ConfigValue {
    ConfigValue::Dict(
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect::<IndexMap<_, _>>(),
    )
}

fn rich_default() -> Document {
    doc(&[
        ("count", ConfigValue::Int(1)),
        ("rate", ConfigValue::Float(0.1)),
        ("label", ConfigValue::from("plain")),
        ("spaced", ConfigValue::from("a b c")),
        ("flag", ConfigValue::Bool(false)),
        ("nothing", ConfigValue::Null),
        (
            "mixed",
            ConfigValue::List(vec![
                ConfigValue::Int(1),
                ConfigValue::from("x"),
                ConfigValue::Bool(true),
            ]),
        ),
        (
            "table",
            dict(&[
                ("lr", ConfigValue::Float(0.5)),
                ("steps", ConfigValue::Int(10)),
                (
                    "inner",
                    ConfigValue::List(vec![ConfigValue::Int(1), ConfigValue::Int(2)]),
                ),
            ]),
        ),
        ("model.depth", ConfigValue::Int(3)),
        ("model.widths", ConfigValue::List(vec![ConfigValue::Int(8), ConfigValue::Int(16)])),
    ])
}

fn build(default: Document) -> ConfigTree {
    ConfigTree::from_sources(
        ConfigSource::Doc(default),
        &[],
        Schema::new(),
        Regime::AutoSave,
    )
    .expect("failed to build config")
}

#[test]
fn serialized_tokens_reproduce_every_leaf() {
    // Mutate a base configuration, serialize it to a command line, and
    // apply that command line to a fresh default build: all leaf values
    // must come back, containers and forced tags included.
    let mut tree = build(rich_default());
    tree.merge(doc(&[
        ("count", ConfigValue::Int(42)),
        ("rate", ConfigValue::Float(2.5)),
        ("spaced", ConfigValue::from("hello there world")),
        ("flag", ConfigValue::Bool(true)),
        (
            "mixed",
            ConfigValue::List(vec![
                ConfigValue::Int(7),
                ConfigValue::from("y z"),
                ConfigValue::Bool(false),
            ]),
        ),
        (
            "table",
            dict(&[
                ("lr", ConfigValue::Float(0.25)),
                ("steps", ConfigValue::Int(20)),
                (
                    "inner",
                    ConfigValue::List(vec![ConfigValue::Int(3), ConfigValue::Int(4)]),
                ),
            ]),
        ),
        ("model.depth", ConfigValue::Int(5)),
    ]))
    .unwrap();

    let line = tree.command_line_string(true);
    let mut fresh = build(rich_default());
    fresh.merge_command_line_string(&line).unwrap();

    assert_eq!(fresh, tree);
}

#[test]
fn shallow_serialization_skips_nested_leaves() {
    let tree = build(rich_default());
    let tokens = tree.command_line_tokens(false);
    assert!(tokens.iter().all(|token| !token.contains("model.depth")));
    let deep_tokens = tree.command_line_tokens(true);
    assert!(deep_tokens.iter().any(|token| token.contains("model.depth")));
    // Sub-configs themselves never serialize, only their leaves.
    assert!(deep_tokens.iter().all(|token| !token.starts_with("--model ")));
}

#[test]
fn unknown_flags_are_skipped_not_fatal() {
    let tree = build(rich_default());
    let tokens: Vec<String> = ["--no_such_thing", "5", "--count", "2"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let overrides = tree.parse_command_line(&tokens, false).unwrap();
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides["count"], ConfigValue::Int(2));
}

#[test]
fn wildcard_flags_fan_out_over_matches() {
    let tree = build(doc(&[
        ("base_lr", ConfigValue::Float(0.1)),
        ("head_lr", ConfigValue::Float(0.2)),
        ("steps", ConfigValue::Int(5)),
    ]));
    let tokens: Vec<String> = ["--*_lr", "0.5"].iter().map(|s| s.to_string()).collect();
    let overrides = tree.parse_command_line(&tokens, false).unwrap();
    assert_eq!(overrides.len(), 2);
    assert_eq!(overrides["base_lr"], ConfigValue::Float(0.5));
    assert_eq!(overrides["head_lr"], ConfigValue::Float(0.5));
}

#[test]
fn valueless_flags_read_as_true() {
    let mut tree = build(rich_default());
    tree.merge_command_line_string("--flag").unwrap();
    assert_eq!(tree.value("flag"), Some(&ConfigValue::Bool(true)));
}

#[test]
fn equals_syntax_and_spaced_values_agree() {
    let tree = build(rich_default());
    let a = tree
        .parse_command_line(&["--count=3".to_string()], false)
        .unwrap();
    let b = tree
        .parse_command_line(&["--count".to_string(), "3".to_string()], false)
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn multi_token_values_join_with_spaces() {
    let tree = build(rich_default());
    let tokens: Vec<String> = ["--label", "one", "two", "three"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let overrides = tree.parse_command_line(&tokens, false).unwrap();
    assert_eq!(overrides["label"], ConfigValue::from("one two three"));
}

#[test]
fn overwriting_a_null_needs_a_forced_type() {
    let tree = build(rich_default());
    let error = tree
        .parse_command_line(&["--nothing".to_string(), "0.5".to_string()], false)
        .unwrap_err();
    assert!(matches!(error, ConfigError::TypeInference { .. }));

    let overrides = tree
        .parse_command_line(
            &["--nothing".to_string(), "0.5".to_string(), "!float".to_string()],
            false,
        )
        .unwrap();
    assert_eq!(overrides["nothing"], ConfigValue::Float(0.5));
}

#[test]
fn null_literals_clear_values_without_forcing() {
    let mut tree = build(rich_default());
    tree.merge_command_line_string("--count none").unwrap();
    assert_eq!(tree.value("count"), Some(&ConfigValue::Null));
}

#[test]
fn unknown_type_tags_are_fatal() {
    let tree = build(rich_default());
    let error = tree
        .parse_command_line(
            &["--count".to_string(), "1".to_string(), "!banana".to_string()],
            false,
        )
        .unwrap_err();
    assert!(matches!(error, ConfigError::UnknownTypeTag(tag) if tag == "banana"));
}

#[test]
fn unclosed_quotes_are_fatal() {
    assert!(matches!(
        tokenize("--label 'oops"),
        Err(ConfigError::UnclosedQuote)
    ));
}

#[test]
fn forced_container_types_replace_scalars() {
    let mut tree = build(rich_default());
    tree.merge_command_line_string("--label '[1 !int,2 !int]' !list")
        .unwrap();
    assert_eq!(
        tree.value("label"),
        Some(&ConfigValue::List(vec![
            ConfigValue::Int(1),
            ConfigValue::Int(2)
        ]))
    );
}
