//! The converter contract.

use std::fmt;

use crate::data::CircuitData;
use crate::error::ConversionError;

/// A single-step circuit format converter.
///
/// | Method | Meaning |
/// |--------|---------|
/// | `name()` | Identity used for exclusion and error attribution |
/// | `source()` / `target()` | Format tags of the edge this converter adds |
/// | `cost()` | Positive weight used by [`SearchPolicy::LowestCost`](crate::SearchPolicy) |
/// | `is_unsafe()` | True if converting executes code embedded in the input |
/// | `convert()` | Perform the conversion |
///
/// Implementations must be `Send + Sync`: the registry is shared across
/// dispatch tasks without locking.
pub trait Transpiler: Send + Sync {
    /// Unique name of this converter.
    fn name(&self) -> &str;

    /// Format consumed.
    fn source(&self) -> &str;

    /// Format produced.
    fn target(&self) -> &str;

    /// Edge weight; must be at least 1.
    fn cost(&self) -> u32 {
        1
    }

    /// Whether conversion executes embedded code.
    fn is_unsafe(&self) -> bool {
        false
    }

    /// Convert a circuit from `source()` to `target()`.
    fn convert(&self, input: CircuitData) -> Result<CircuitData, ConversionError>;
}

type ConvertFn = dyn Fn(CircuitData) -> Result<CircuitData, ConversionError> + Send + Sync;

/// A [`Transpiler`] backed by a closure.
pub struct FnTranspiler {
    name: String,
    source: String,
    target: String,
    cost: u32,
    is_unsafe: bool,
    f: Box<ConvertFn>,
}

impl FnTranspiler {
    /// Create a safe, unit-cost converter.
    pub fn new<F>(
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(CircuitData) -> Result<CircuitData, ConversionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            cost: 1,
            is_unsafe: false,
            f: Box::new(f),
        }
    }

    /// Set the edge cost.
    #[must_use]
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Mark the converter as executing embedded code.
    #[must_use]
    pub fn mark_unsafe(mut self) -> Self {
        self.is_unsafe = true;
        self
    }
}

impl fmt::Debug for FnTranspiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTranspiler")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("cost", &self.cost)
            .field("is_unsafe", &self.is_unsafe)
            .finish_non_exhaustive()
    }
}

impl Transpiler for FnTranspiler {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn cost(&self) -> u32 {
        self.cost
    }

    fn is_unsafe(&self) -> bool {
        self.is_unsafe
    }

    fn convert(&self, input: CircuitData) -> Result<CircuitData, ConversionError> {
        (self.f)(input)
    }
}
