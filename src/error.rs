//! Error taxonomy for configuration building, merging, and round-tripping.

use crate::pattern::Suggestions;
use thiserror::Error;

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Every failure the engine can surface. All variants abort the operation in
/// progress; none are retried. Recoverable conditions (zero-match wildcard,
/// unknown CLI flag, loading an unsafe save) are logged instead of raised.
#[derive(Debug, Error)]
pub enum ConfigError {
    // Schema violations
    #[error("'overwriting_regime' needs to be either 'auto-save', 'locked' or 'unsafe', got '{0}'")]
    UnknownRegime(String),

    #[error("the '*' character is not authorized in the default config ({0})")]
    WildcardInSchema(String),

    #[error("parameter '{0}' was set twice")]
    DuplicateParameter(String),

    #[error("'{0}' is a protected name and cannot be used as a parameter name here")]
    ProtectedName(String),

    // Addressing failures
    #[error("parameter '{name}' cannot be merged: it is not in the default '{config}' config.{suggestions}")]
    UnknownParameter {
        name: String,
        config: String,
        suggestions: Suggestions,
    },

    #[error("failed to set parameter '{name}': '{segment}' is not a sub-config.{suggestions}")]
    NotASubConfig {
        name: String,
        segment: String,
        suggestions: Suggestions,
    },

    // Type conflicts
    #[error("trying to set sub-config '{0}' with a non-config value; this replacement cannot be performed")]
    SubConfigReplacement(String),

    #[error("trying to set parameter '{0}' with a config section; this replacement cannot be performed")]
    SectionReplacement(String),

    #[error("type of parameter '{param}' cannot be adapted: {reason}")]
    TypeInference { param: String, reason: String },

    #[error("unknown type '{0}', should be in [int, float, str, bool, list, dict]")]
    UnknownTypeTag(String),

    #[error("could not parse args: open quotations were left unclosed")]
    UnclosedQuote,

    // Structural integrity
    #[error("sub-config '{0}' is unlinked; unlinked sub-configs are not allowed")]
    UnlinkedSubConfig(String),

    // Declaration-ordering violations
    #[error("variations declared in sub-configs are invalid ({0}); please declare all your variations in the root config")]
    VariationOutsideRoot(String),

    #[error("grid element '{0}' is an empty list or not a registered variation")]
    UnknownGridDimension(String),

    #[error("variations parsing failed for '{0}': expected a list of configs or a dict containing only configs")]
    InvalidVariation(String),

    #[error("grid parsing failed for '{0}': expected a list of variation names")]
    InvalidGrid(String),

    // Mutation policy
    #[error("overwriting params in locked configs is not allowed")]
    Locked,

    #[error("no filename was provided and the config was never saved before, so there is no previous save to overwrite")]
    NoPreviousSave,

    // Serialized form
    #[error("'config_metadata' is a special parameter, please do not edit or set it")]
    BadMetadata,

    #[error("unsupported YAML construct: {0}")]
    UnsupportedYaml(String),

    // Pre-processing
    #[error("pre-processing of parameter matching '{pattern}' failed: {cause}")]
    PreProcessing { pattern: String, cause: anyhow::Error },

    #[error("pre-processing value for '{name}' has an unsupported shape: {reason}")]
    BadTransformValue { name: String, reason: String },

    // Build orchestration
    #[error("no default source was declared in the schema")]
    NoDefaultSource,

    #[error("the pattern '--config' was not detected in the arguments and no fallback was provided")]
    NoConfigFlag,

    #[error("'--config' must be followed by a source list")]
    MissingConfigList,

    #[error("path not found ({0})")]
    PathNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
