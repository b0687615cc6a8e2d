//! Minimum-cost converter chain search.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use petgraph::graph::NodeIndex;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::error::{TranspileError, TranspileResult};
use crate::registry::TranspilerRegistry;
use crate::transpiler::Transpiler;

/// How edge weights are assigned during search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchPolicy {
    /// Every converter costs its declared `cost()`.
    #[default]
    LowestCost,
    /// Every converter costs 1.
    FewestHops,
}

/// Exclusions and policy applied to a search.
#[derive(Debug, Clone, Default)]
pub struct TranspileOptions {
    /// Converter names that may not appear in a chain.
    pub exclude: FxHashSet<String>,
    /// Formats that may not be visited, as source or target.
    pub exclude_formats: FxHashSet<String>,
    /// Skip converters that execute embedded code.
    pub exclude_unsafe: bool,
    /// Edge weighting.
    pub policy: SearchPolicy,
}

impl TranspileOptions {
    /// Exclude a converter by name.
    #[must_use]
    pub fn excluding(mut self, name: impl Into<String>) -> Self {
        self.exclude.insert(name.into());
        self
    }

    /// Exclude a format.
    #[must_use]
    pub fn excluding_format(mut self, format: impl Into<String>) -> Self {
        self.exclude_formats.insert(format.into());
        self
    }

    /// Exclude unsafe converters (and unsafe preprocessing).
    #[must_use]
    pub fn safe_only(mut self) -> Self {
        self.exclude_unsafe = true;
        self
    }

    /// Set the edge weighting.
    #[must_use]
    pub fn with_policy(mut self, policy: SearchPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn admits(&self, t: &dyn Transpiler) -> bool {
        !(self.exclude_unsafe && t.is_unsafe())
            && !self.exclude.contains(t.name())
            && !self.exclude_formats.contains(t.target())
    }

    fn weight(&self, t: &dyn Transpiler) -> u64 {
        match self.policy {
            SearchPolicy::LowestCost => u64::from(t.cost()),
            SearchPolicy::FewestHops => 1,
        }
    }
}

/// An ordered sequence of converters where each step's target is the next
/// step's source.
#[derive(Clone)]
pub struct TranspileChain<'a> {
    steps: Vec<&'a dyn Transpiler>,
    cost: u64,
}

impl<'a> TranspileChain<'a> {
    /// Steps in application order.
    pub fn steps(&self) -> &[&'a dyn Transpiler] {
        &self.steps
    }

    /// Total cost under the policy used for the search.
    pub fn cost(&self) -> u64 {
        self.cost
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True for the zero-step chain (a source already equals the target).
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Format the chain starts from, if it has any step.
    pub fn source(&self) -> Option<&'a str> {
        self.steps.first().map(|t| t.source())
    }

    /// Converter names in order.
    pub fn names(&self) -> Vec<&'a str> {
        self.steps.iter().map(|t| t.name()).collect()
    }
}

impl std::fmt::Debug for TranspileChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspileChain")
            .field("steps", &self.names())
            .field("cost", &self.cost)
            .finish()
    }
}

/// Frontier entry of the search.
struct Frontier {
    cost: u64,
    /// Push order, so equal-cost entries pop first-in first-out.
    seq: u64,
    node: NodeIndex,
    chain: Vec<usize>,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.seq == other.seq
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: lowest cost, then earliest push, pops first
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl TranspilerRegistry {
    /// Find a minimum-cost chain from any of `sources` to `target`.
    ///
    /// Fails fast, before searching, when no source is given, the target is
    /// excluded, any format is unknown, or every source is excluded. Among
    /// equal-cost chains the one returned is unspecified.
    pub fn find_chain(
        &self,
        sources: &[&str],
        target: &str,
        options: &TranspileOptions,
    ) -> TranspileResult<TranspileChain<'_>> {
        if sources.is_empty() {
            return Err(TranspileError::EmptySources);
        }
        if options.exclude_formats.contains(target) {
            return Err(TranspileError::TargetExcluded(target.to_string()));
        }
        let target_node = self.node(target)?;

        let mut seeds = Vec::with_capacity(sources.len());
        for source in sources {
            let node = self.node(source)?;
            if !options.exclude_formats.contains(*source) && !seeds.contains(&node) {
                seeds.push(node);
            }
        }
        if seeds.is_empty() {
            return Err(TranspileError::AllSourcesExcluded(
                sources.iter().map(ToString::to_string).collect(),
            ));
        }

        let bound = self.num_formats();
        let mut heap = BinaryHeap::new();
        let mut seq = 0u64;
        for node in seeds {
            heap.push(Frontier {
                cost: 0,
                seq,
                node,
                chain: Vec::new(),
            });
            seq += 1;
        }

        let mut settled = FxHashSet::default();
        while let Some(Frontier {
            cost, node, chain, ..
        }) = heap.pop()
        {
            if node == target_node {
                let chain = TranspileChain {
                    steps: chain.iter().map(|i| self.transpilers[*i].as_ref()).collect(),
                    cost,
                };
                debug!(target, steps = ?chain.names(), cost, "Found transpile chain");
                return Ok(chain);
            }
            // With positive weights the first pop of a node is its cheapest arrival.
            if !settled.insert(node) || chain.len() >= bound {
                continue;
            }
            for (idx, next) in self.outgoing(node) {
                let t = self.transpilers[idx].as_ref();
                if !options.admits(t) || chain.contains(&idx) || settled.contains(&next) {
                    continue;
                }
                let mut extended = chain.clone();
                extended.push(idx);
                heap.push(Frontier {
                    cost: cost + options.weight(t),
                    seq,
                    node: next,
                    chain: extended,
                });
                seq += 1;
            }
        }

        Err(TranspileError::NoPath {
            sources: sources.iter().map(ToString::to_string).collect(),
            target: target.to_string(),
        })
    }
}
