//! Deriving variation and grid sweeps from a built tree.
//!
//! Every derived configuration is rebuilt from scratch through the full load
//! pipeline (the recorded hierarchy plus the cell's overrides), never
//! patched from the original, so it is indistinguishable from a tree built
//! directly with that override set.

use super::engine::ConfigTree;
use super::state::VariationDimension;
use crate::error::{ConfigError, Result};
use crate::value::ConfigSource;

impl ConfigTree {
    /// Expands the registered grids and variations into independent derived
    /// trees.
    ///
    /// Each grid contributes the Cartesian product of its dimensions in
    /// declared order, one derived tree per cell; its name joins
    /// `{dimension}_{label}` parts with `*`. Dimensions not consumed by any
    /// grid contribute one derived tree per candidate, uncombined.
    pub fn create_variations(&self) -> Result<Vec<ConfigTree>> {
        let mut remaining: Vec<&VariationDimension> = self.state.variations.iter().collect();
        let mut cells: Vec<(Vec<ConfigSource>, String)> = Vec::new();

        for grid in &self.state.grids {
            let mut grid_cells: Vec<(Vec<ConfigSource>, String)> = Vec::new();
            for dimension_name in grid {
                let dimension = self
                    .state
                    .variation(dimension_name)
                    .ok_or_else(|| ConfigError::UnknownGridDimension(dimension_name.clone()))?;
                remaining.retain(|candidate| candidate.name != dimension.name);
                if grid_cells.is_empty() {
                    grid_cells = dimension
                        .candidates
                        .iter()
                        .map(|(source, label)| {
                            (vec![source.clone()], format!("{}_{label}", dimension.name))
                        })
                        .collect();
                } else {
                    let mut crossed =
                        Vec::with_capacity(grid_cells.len() * dimension.candidates.len());
                    for (sources, cell_name) in &grid_cells {
                        for (source, label) in &dimension.candidates {
                            let mut sources = sources.clone();
                            sources.push(source.clone());
                            crossed.push((
                                sources,
                                format!("{cell_name}*{}_{label}", dimension.name),
                            ));
                        }
                    }
                    grid_cells = crossed;
                }
            }
            cells.extend(grid_cells);
        }

        for dimension in remaining {
            for (source, label) in &dimension.candidates {
                cells.push((vec![source.clone()], format!("{}_{label}", dimension.name)));
            }
        }

        let hierarchy = self.root.hierarchy();
        let default = hierarchy
            .first()
            .cloned()
            .ok_or(ConfigError::NoDefaultSource)?;
        let mut derived = Vec::with_capacity(cells.len());
        for (extra_overrides, variation_name) in cells {
            let mut overrides: Vec<ConfigSource> = hierarchy[1..].to_vec();
            overrides.extend(extra_overrides);
            let mut tree = ConfigTree::from_sources(
                default.clone(),
                &overrides,
                self.schema.clone(),
                self.state.regime,
            )?;
            tree.set_variation_name(&variation_name);
            derived.push(tree);
        }
        Ok(derived)
    }
}
