//! Applying converter chains to circuit values.

use tracing::{debug, instrument};

use crate::data::CircuitData;
use crate::error::{TranspileError, TranspileResult};
use crate::registry::TranspilerRegistry;
use crate::search::{TranspileChain, TranspileOptions};

/// A circuit value in one of several acceptable formats.
#[derive(Debug, Clone, PartialEq)]
pub struct Transpiled {
    /// Format of `data`.
    pub format: String,
    /// The converted circuit.
    pub data: CircuitData,
    /// Names of the converters applied, empty if no conversion was needed.
    pub steps: Vec<String>,
}

impl TranspilerRegistry {
    /// Convert a circuit available in one or more formats into `target`.
    ///
    /// If any pair is already in `target` it is returned untouched and no
    /// converter runs. Otherwise the cheapest chain from any provided format
    /// is applied to the matching value; a failing step aborts the call and
    /// is reported with the converter and the value it was given.
    pub fn transpile_circuit(
        &self,
        target: &str,
        pairs: Vec<(String, CircuitData)>,
        options: &TranspileOptions,
    ) -> TranspileResult<CircuitData> {
        Ok(self.transpile_to_any(&[target], pairs, options)?.data)
    }

    /// Convert a circuit into whichever of `targets` is cheapest to reach.
    ///
    /// `targets` is typically a pilot's list of supported formats. Pairs
    /// already in one of the targets win immediately, earliest target first.
    /// Targets no converter knows are skipped. Equal-cost targets resolve to
    /// the one listed first. A single unknown target is an error.
    #[instrument(skip(self, pairs, options))]
    pub fn transpile_to_any(
        &self,
        targets: &[&str],
        mut pairs: Vec<(String, CircuitData)>,
        options: &TranspileOptions,
    ) -> TranspileResult<Transpiled> {
        if pairs.is_empty() {
            return Err(TranspileError::NoCircuits);
        }
        if targets.is_empty() {
            return Err(TranspileError::NoTargets);
        }

        for target in targets {
            if let Some(pos) = pairs.iter().position(|(f, _)| f == target) {
                let (format, data) = pairs.swap_remove(pos);
                debug!(format, "Circuit already in a target format");
                return Ok(Transpiled {
                    format,
                    data,
                    steps: Vec::new(),
                });
            }
        }

        let sources: Vec<&str> = pairs.iter().map(|(f, _)| f.as_str()).collect();
        let mut best: Option<(TranspileChain<'_>, &str)> = None;
        let mut last_error = None;
        for target in targets {
            if !self.is_known(target) {
                if targets.len() == 1 {
                    return Err(TranspileError::UnknownFormat(target.to_string()));
                }
                debug!(target, "Skipping target format unknown to the registry");
                continue;
            }
            match self.find_chain(&sources, target, options) {
                Ok(chain) => {
                    if best.as_ref().is_none_or(|(b, _)| chain.cost() < b.cost()) {
                        best = Some((chain, *target));
                    }
                }
                Err(e @ (TranspileError::NoPath { .. } | TranspileError::TargetExcluded(_))) => {
                    debug!(target, error = %e, "Target not reachable");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let Some((chain, target)) = best else {
            return Err(match (targets, last_error) {
                ([_], Some(e)) => e,
                _ => TranspileError::NoPath {
                    sources: sources.iter().map(ToString::to_string).collect(),
                    target: targets.join("|"),
                },
            });
        };

        // The chain is non-empty: no source equals any target here.
        let start = chain.source().unwrap_or(target);
        let pos = pairs
            .iter()
            .position(|(f, _)| f == start)
            .ok_or_else(|| TranspileError::UnknownFormat(start.to_string()))?;
        let (_, data) = pairs.swap_remove(pos);
        let data = self.apply_chain(&chain, data)?;

        Ok(Transpiled {
            format: target.to_string(),
            data,
            steps: chain.names().into_iter().map(ToString::to_string).collect(),
        })
    }

    /// Fold a chain over a value, attributing any failure to one step.
    pub fn apply_chain(
        &self,
        chain: &TranspileChain<'_>,
        mut data: CircuitData,
    ) -> TranspileResult<CircuitData> {
        for step in chain.steps() {
            let input = data.preview();
            debug!(transpiler = step.name(), "Applying transpile step");
            data = step
                .convert(data)
                .map_err(|error| TranspileError::Conversion {
                    transpiler: step.name().to_string(),
                    source_format: step.source().to_string(),
                    target_format: step.target().to_string(),
                    input,
                    error,
                })?;
        }
        Ok(data)
    }
}
