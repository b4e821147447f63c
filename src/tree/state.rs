//! Root-owned shared state for the merge recursion.
//!
//! Exactly one `RootState` exists per tree. It is threaded `&mut` through
//! every recursive call instead of being duplicated per node, and the scoped
//! helpers guarantee that stack frames and window flags are restored on
//! every exit path, including early `?` returns.

use crate::error::{ConfigError, Result};
use crate::value::ConfigSource;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Write-mutation policy for a whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Regime {
    /// Overwrites are redirected into merges; a previously saved tree is
    /// re-saved after each one.
    #[default]
    AutoSave,
    /// Overwrites outside of an explicit merge are rejected.
    Locked,
    /// Overwrites land directly; reproducibility is not guaranteed.
    Unsafe,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::AutoSave => "auto-save",
            Regime::Locked => "locked",
            Regime::Unsafe => "unsafe",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Regime {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto-save" => Ok(Regime::AutoSave),
            "locked" => Ok(Regime::Locked),
            "unsafe" => Ok(Regime::Unsafe),
            other => Err(ConfigError::UnknownRegime(other.to_string())),
        }
    }
}

/// Whether an entry is being declared for the first time or merged into an
/// existing tree. Passed explicitly down the recursion; never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Construct,
    Merge,
}

/// One registered variation dimension: the declaring parameter's name plus
/// its labeled candidate override sources.
#[derive(Debug, Clone)]
pub struct VariationDimension {
    pub name: String,
    pub candidates: Vec<(ConfigSource, String)>,
}

/// The process-wide mutable state owned by the root.
#[derive(Debug, Clone)]
pub(crate) struct RootState {
    pub regime: Regime,
    /// Master switch for the pre-processing pipeline. Forced off while
    /// merging a previously saved document, restored after every top-level
    /// build or merge.
    pub pre_processing_enabled: bool,
    /// True only inside a construction/merge window, where internal code may
    /// populate the tree regardless of the regime.
    pub in_build: bool,
    /// Diagnostic descriptors for the recursion in flight.
    pub stack: Vec<String>,
    pub variations: Vec<VariationDimension>,
    pub grids: Vec<Vec<String>>,
    /// Section names discovered inside container values during the current
    /// window; fatal once the window closes.
    pub unlinked: Vec<String>,
    pub was_last_saved_as: Option<PathBuf>,
    /// Directory relative source paths resolve against, updated whenever a
    /// file source is located.
    pub reference_folder: Option<PathBuf>,
    pub former_saving_time: Option<f64>,
    /// Epoch seconds at which this tree was created.
    pub created_at: f64,
}

impl RootState {
    pub fn new(regime: Regime) -> Self {
        let now = chrono::Local::now();
        Self {
            regime,
            pre_processing_enabled: true,
            in_build: false,
            stack: Vec::new(),
            variations: Vec::new(),
            grids: Vec::new(),
            unlinked: Vec::new(),
            was_last_saved_as: None,
            reference_folder: None,
            former_saving_time: None,
            created_at: now.timestamp() as f64
                + f64::from(now.timestamp_subsec_micros()) / 1e6,
        }
    }

    /// Runs `f` with a diagnostic frame pushed; the frame is popped on every
    /// exit path.
    pub fn with_frame<T>(
        &mut self,
        frame: String,
        f: impl FnOnce(&mut RootState) -> Result<T>,
    ) -> Result<T> {
        self.stack.push(frame);
        let result = f(self);
        self.stack.pop();
        result
    }

    /// Runs `f` inside a construction/merge window. The window flag is
    /// restored and the pre-processing switch re-enabled no matter how `f`
    /// exits, so a failed merge cannot leave the root wedged for the next
    /// top-level operation.
    pub fn with_build_window<T>(
        &mut self,
        f: impl FnOnce(&mut RootState) -> Result<T>,
    ) -> Result<T> {
        let was_building = self.in_build;
        self.in_build = true;
        let result = f(self);
        self.in_build = was_building;
        self.pre_processing_enabled = true;
        if result.is_err() {
            // Sections recorded by a failed window must not poison the next
            // top-level operation.
            self.unlinked.clear();
        }
        result
    }

    /// Registers (or replaces) a variation dimension. Empty candidate lists
    /// are dropped so a grid referencing them fails as unregistered.
    pub fn register_variation(&mut self, name: &str, candidates: Vec<(ConfigSource, String)>) {
        if candidates.is_empty() {
            return;
        }
        self.variations.retain(|dimension| dimension.name != name);
        self.variations.push(VariationDimension {
            name: name.to_string(),
            candidates,
        });
    }

    pub fn variation(&self, name: &str) -> Option<&VariationDimension> {
        self.variations.iter().find(|dimension| dimension.name == name)
    }

    /// Raises the deferred unlinked-sub-config error, if any was recorded
    /// during the window that just closed.
    pub fn check_unlinked(&mut self) -> Result<()> {
        if let Some(name) = self.unlinked.first().cloned() {
            self.unlinked.clear();
            return Err(ConfigError::UnlinkedSubConfig(name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regime_round_trips_through_strings() {
        for regime in [Regime::AutoSave, Regime::Locked, Regime::Unsafe] {
            assert_eq!(regime.as_str().parse::<Regime>().unwrap(), regime);
        }
        assert!(matches!(
            "yolo".parse::<Regime>(),
            Err(ConfigError::UnknownRegime(_))
        ));
    }

    #[test]
    fn frames_are_popped_on_error() {
        let mut state = RootState::new(Regime::AutoSave);
        let result: Result<()> = state.with_frame("outer".into(), |state| {
            state.with_frame("inner".into(), |_| Err(ConfigError::Locked))
        });
        assert!(result.is_err());
        assert!(state.stack.is_empty());
    }

    #[test]
    fn build_window_restores_flags_on_error() {
        let mut state = RootState::new(Regime::AutoSave);
        state.pre_processing_enabled = false;
        let result: Result<()> = state.with_build_window(|state| {
            assert!(state.in_build);
            Err(ConfigError::Locked)
        });
        assert!(result.is_err());
        assert!(!state.in_build);
        assert!(state.pre_processing_enabled);
    }

    #[test]
    fn re_registering_a_dimension_replaces_it() {
        let mut state = RootState::new(Regime::AutoSave);
        state.register_variation(
            "dim",
            vec![(ConfigSource::from("a.yaml"), "0".to_string())],
        );
        state.register_variation(
            "dim",
            vec![
                (ConfigSource::from("b.yaml"), "first".to_string()),
                (ConfigSource::from("c.yaml"), "second".to_string()),
            ],
        );
        let dimension = state.variation("dim").unwrap();
        assert_eq!(dimension.candidates.len(), 2);
        assert_eq!(dimension.candidates[0].1, "first");
    }
}
