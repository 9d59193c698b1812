//! Drives one experiment's combinations through the block scheduler and
//! snapshots each run.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{info, instrument, warn};

use linnyr_model::{ActorId, ClusterId, Expr, ExperimentId, Model};
use linnyr_solver::context_eval::eval_value_at;
use linnyr_solver::{BlockScheduler, RunConfig, Solver, SolverError};

use crate::combination::{
    cartesian_product, exclude, expand_combination_selectors, parse_combination_selector_defs,
    validate_orthogonality, CombinationError,
};
use crate::rle;
use crate::stats;

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("experiment dimensions are not orthogonal: {0}")]
    Combination(#[from] CombinationError),
    #[error("experiment has no such id")]
    NotFound,
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// A parsed settings-selector override for one combination, applied to the
/// [`RunConfig`] that combination's block scheduler run uses — examples like
/// `b=6 l=2 t=1-24`/`s=1h` give the shape but no wire grammar is named for
/// them beyond those examples; format decided and recorded as an Open
/// Decision.
#[derive(Debug, Default, Clone)]
struct SettingsOverride {
    block_length: Option<i64>,
    look_ahead: Option<i64>,
    start_period: Option<i64>,
    end_period: Option<i64>,
}

fn parse_settings_selector(selector: &str, out: &mut SettingsOverride) {
    let Some((key, value)) = selector.split_once('=') else { return };
    match key {
        "b" => out.block_length = value.parse().ok(),
        "l" => out.look_ahead = value.parse().ok(),
        "t" => {
            if let Some((start, end)) = value.split_once('-') {
                out.start_period = start.parse().ok();
                out.end_period = end.parse().ok();
            }
        }
        _ => {}
    }
}

/// `actor_id=weight`.
fn parse_actor_selector<'a>(selector: &'a str) -> Option<(&'a str, f64)> {
    let (id, weight) = selector.split_once('=')?;
    Some((id, weight.parse().ok()?))
}

struct SavedSettings {
    actor_weights: Vec<(ActorId, Expr)>,
    cluster_ignore: Vec<(ClusterId, bool)>,
}

pub struct ExperimentRunner<'a> {
    model: &'a mut Model,
}

impl<'a> ExperimentRunner<'a> {
    pub fn new(model: &'a mut Model) -> Self {
        Self { model }
    }

    #[instrument(skip(self, solver, base_config))]
    pub fn run(
        &mut self,
        experiment_id: ExperimentId,
        solver: &mut dyn Solver,
        base_config: &RunConfig,
    ) -> Result<(), ExperimentError> {
        let experiment = self
            .model
            .experiments
            .get(experiment_id)
            .ok_or(ExperimentError::NotFound)?;
        validate_orthogonality(&experiment.dimensions)?;

        let dimensions = experiment.dimensions.clone();
        let combination_selectors = experiment.combination_selectors.clone();
        let settings_selectors = experiment.settings_selectors.clone();
        let actor_selectors = experiment.actor_selectors.clone();
        let clusters_to_ignore = experiment.clusters_to_ignore.clone();
        let excluded = experiment.excluded_selectors.clone();

        let dimension_of: FxHashMap<&str, usize> = dimensions
            .iter()
            .enumerate()
            .flat_map(|(i, dim)| dim.iter().map(move |s| (s.as_str(), i)))
            .collect();
        let combination_selector_defs = parse_combination_selector_defs(&combination_selectors);

        let raw_combinations = exclude(cartesian_product(&dimensions), &excluded);
        let mut run_number = 0u32;
        let mut runs = Vec::new();

        for combo in raw_combinations {
            let expanded = expand_combination_selectors(&combo, &combination_selector_defs, &dimension_of)?;

            let saved = self.save_settings();

            let mut overrides = SettingsOverride::default();
            for selector in &expanded {
                if settings_selectors.contains(selector) {
                    parse_settings_selector(selector, &mut overrides);
                }
            }
            for selector in &expanded {
                if actor_selectors.contains(selector) {
                    if let Some((actor_id, weight)) = parse_actor_selector(selector) {
                        if let Some(id) = self.model.lookup_actor(actor_id) {
                            if let Some(actor) = self.model.actors.get_mut(id) {
                                actor.weight = Expr::constant("weight", weight);
                            }
                        }
                    }
                }
            }
            self.mark_ignored_clusters(&clusters_to_ignore);

            let config = RunConfig {
                block_length: overrides.block_length.unwrap_or(base_config.block_length),
                look_ahead: overrides.look_ahead.unwrap_or(base_config.look_ahead),
                start_period: overrides.start_period.unwrap_or(base_config.start_period),
                end_period: overrides.end_period.unwrap_or(base_config.end_period),
                timeout_period: base_config.timeout_period,
            };

            let mut scheduler = BlockScheduler::new();
            let run_result = scheduler.run(self.model, solver, &config);
            self.restore_settings(saved);

            match run_result {
                Ok(()) => {
                    run_number += 1;
                    runs.push(self.snapshot(run_number, &config, experiment_id));
                    info!(run = run_number, combination = ?expanded, "experiment run complete");
                }
                Err(err) => {
                    warn!(combination = ?expanded, error = %err, "experiment run halted");
                    return Err(err.into());
                }
            }
        }

        if let Some(experiment) = self.model.experiments.get_mut(experiment_id) {
            experiment.runs.extend(runs);
        }
        Ok(())
    }

    /// `clusters_to_ignore` names clusters by id directly; there is no
    /// selector-to-cluster indirection modeled beyond that.
    fn mark_ignored_clusters(&mut self, clusters_to_ignore: &[String]) {
        for id in clusters_to_ignore {
            if let Some(cluster_id) = self.model.lookup_cluster(id) {
                if let Some(cluster) = self.model.clusters.get_mut(cluster_id) {
                    cluster.ignore = true;
                }
            }
        }
    }

    fn save_settings(&mut self) -> SavedSettings {
        SavedSettings {
            actor_weights: self
                .model
                .actors
                .iter()
                .map(|(id, a)| (id, a.weight.clone()))
                .collect(),
            cluster_ignore: self
                .model
                .clusters
                .iter()
                .map(|(id, c)| (id, c.ignore))
                .collect(),
        }
    }

    fn restore_settings(&mut self, saved: SavedSettings) {
        for (id, weight) in saved.actor_weights {
            if let Some(actor) = self.model.actors.get_mut(id) {
                actor.weight = weight;
            }
        }
        for (id, ignore) in saved.cluster_ignore {
            if let Some(cluster) = self.model.clusters.get_mut(id) {
                cluster.ignore = ignore;
            }
        }
    }

    fn snapshot(
        &mut self,
        run_number: u32,
        config: &RunConfig,
        experiment_id: ExperimentId,
    ) -> linnyr_model::ExperimentRun {
        let experiment = self.model.experiments.get(experiment_id).unwrap();
        let mut variable_stats = Vec::new();
        let mut variable_series = Vec::new();

        for &chart_id in &experiment.charts {
            let Some(chart) = self.model.charts.get(chart_id) else { continue };
            for variable in &chart.variables {
                let key = match &variable.attribute {
                    Some(attr) => format!("{}.{attr}", variable.object),
                    None => format!("{}.level", variable.object),
                };
                let attribute = variable.attribute.as_deref().unwrap_or("level");
                let series: Vec<f64> = (config.start_period..=config.end_period)
                    .map(|t| eval_value_at(self.model, &variable.object, attribute, t).unwrap_or(0.0))
                    .collect();
                variable_stats.push((key.clone(), stats::compute(&series)));
                variable_series.push((key, series));
            }
        }

        linnyr_model::ExperimentRun {
            number: run_number,
            wall_clock_start: 0.0,
            wall_clock_recorded: 0.0,
            time_step_count: (config.end_period - config.start_period + 1).max(0) as u32,
            duration: 0.0,
            variable_stats,
            variable_series,
            solver_messages: Vec::new(),
        }
    }
}

/// Encodes every series in a snapshot at the given precision, for
/// persistence via `linnyr-xml`.
pub fn encode_series(run: &linnyr_model::ExperimentRun, precision: u32) -> Vec<(String, String)> {
    run.variable_series
        .iter()
        .map(|(name, series)| (name.clone(), rle::encode(series, precision)))
        .collect()
}
