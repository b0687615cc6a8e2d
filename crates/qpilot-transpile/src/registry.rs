//! Transpiler registry: the format graph.
//!
//! Formats are nodes in a `petgraph` arena; each registered converter adds
//! one edge whose weight is the converter's index in the registry. Looking a
//! format up in the node table is what distinguishes "never seen" from
//! "known but isolated".

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::data::CircuitData;
use crate::error::{ConversionError, TranspileError, TranspileResult};
use crate::transpiler::{FnTranspiler, Transpiler};

/// Registry of converters, built once at startup and shared read-only.
///
/// Registration takes `&mut self`; every query takes `&self`, so once the
/// registry is behind an `Arc` it cannot change under concurrent readers.
pub struct TranspilerRegistry {
    pub(crate) graph: DiGraph<String, usize>,
    pub(crate) formats: FxHashMap<String, NodeIndex>,
    pub(crate) transpilers: Vec<Box<dyn Transpiler>>,
}

impl Default for TranspilerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TranspilerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            formats: FxHashMap::default(),
            transpilers: Vec::new(),
        }
    }

    /// Create a registry holding the built-in converters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtin::register_builtins(&mut registry);
        registry
    }

    /// Register a converter.
    ///
    /// Both of its formats become known even if nothing else connects to them.
    pub fn register(&mut self, transpiler: Box<dyn Transpiler>) -> TranspileResult<()> {
        if transpiler.cost() == 0 {
            return Err(TranspileError::InvalidCost(transpiler.name().to_string()));
        }
        if self.transpilers.iter().any(|t| t.name() == transpiler.name()) {
            return Err(TranspileError::DuplicateTranspiler(
                transpiler.name().to_string(),
            ));
        }
        self.insert(transpiler);
        Ok(())
    }

    /// Add a converter already known to be valid.
    pub(crate) fn insert(&mut self, transpiler: Box<dyn Transpiler>) {
        let from = self.intern(transpiler.source());
        let to = self.intern(transpiler.target());
        let index = self.transpilers.len();
        debug!(
            name = transpiler.name(),
            source = transpiler.source(),
            target = transpiler.target(),
            cost = transpiler.cost(),
            is_unsafe = transpiler.is_unsafe(),
            "Registering transpiler"
        );
        self.graph.add_edge(from, to, index);
        self.transpilers.push(transpiler);
    }

    /// Register a closure as a converter.
    #[allow(clippy::too_many_arguments)]
    pub fn register_fn<F>(
        &mut self,
        name: &str,
        source: &str,
        target: &str,
        cost: u32,
        is_unsafe: bool,
        f: F,
    ) -> TranspileResult<()>
    where
        F: Fn(CircuitData) -> Result<CircuitData, ConversionError> + Send + Sync + 'static,
    {
        let mut transpiler = FnTranspiler::new(name, source, target, f).with_cost(cost);
        if is_unsafe {
            transpiler = transpiler.mark_unsafe();
        }
        self.register(Box::new(transpiler))
    }

    fn intern(&mut self, format: &str) -> NodeIndex {
        if let Some(idx) = self.formats.get(format) {
            return *idx;
        }
        let idx = self.graph.add_node(format.to_string());
        self.formats.insert(format.to_string(), idx);
        idx
    }

    /// All known formats, sorted.
    pub fn known_formats(&self) -> Vec<&str> {
        let mut formats: Vec<_> = self.formats.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }

    /// Whether any converter names this format.
    pub fn is_known(&self, format: &str) -> bool {
        self.formats.contains_key(format)
    }

    /// Number of known formats.
    pub fn num_formats(&self) -> usize {
        self.formats.len()
    }

    /// Converters whose source is `format`, in registration order.
    ///
    /// Errors if the format was never seen; an isolated format yields an
    /// empty list.
    pub fn transpilers_from(&self, format: &str) -> TranspileResult<Vec<&dyn Transpiler>> {
        let node = self.node(format)?;
        Ok(self
            .outgoing(node)
            .into_iter()
            .map(|(i, _)| self.transpilers[i].as_ref())
            .collect())
    }

    /// Look up a converter by name.
    pub fn get(&self, name: &str) -> Option<&dyn Transpiler> {
        self.transpilers
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Iterate over every registered converter in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Transpiler> {
        self.transpilers.iter().map(|t| t.as_ref())
    }

    pub(crate) fn node(&self, format: &str) -> TranspileResult<NodeIndex> {
        self.formats
            .get(format)
            .copied()
            .ok_or_else(|| TranspileError::UnknownFormat(format.to_string()))
    }

    /// `(converter index, target node)` for edges leaving `node`, in
    /// registration order.
    pub(crate) fn outgoing(&self, node: NodeIndex) -> Vec<(usize, NodeIndex)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (*e.weight(), e.target()))
            .collect();
        edges.sort_unstable();
        edges
    }
}

impl std::fmt::Debug for TranspilerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspilerRegistry")
            .field("formats", &self.known_formats())
            .field(
                "transpilers",
                &self.transpilers.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passthrough(data: CircuitData) -> Result<CircuitData, ConversionError> {
        Ok(data)
    }

    #[test]
    fn test_register_adds_both_formats() {
        let mut registry = TranspilerRegistry::new();
        registry
            .register_fn("a_to_b", "A", "B", 1, false, passthrough)
            .unwrap();
        assert_eq!(registry.known_formats(), vec!["A", "B"]);
        assert_eq!(registry.transpilers_from("A").unwrap().len(), 1);
    }

    #[test]
    fn test_known_but_isolated_vs_unknown() {
        let mut registry = TranspilerRegistry::new();
        registry
            .register_fn("a_to_b", "A", "B", 1, false, passthrough)
            .unwrap();
        assert!(registry.transpilers_from("B").unwrap().is_empty());
        assert!(matches!(
            registry.transpilers_from("C"),
            Err(TranspileError::UnknownFormat(f)) if f == "C"
        ));
    }

    #[test]
    fn test_transpilers_from_keeps_registration_order() {
        let mut registry = TranspilerRegistry::new();
        for (name, target) in [("first", "B"), ("second", "C"), ("third", "B")] {
            registry
                .register_fn(name, "A", target, 1, false, passthrough)
                .unwrap();
        }
        let names: Vec<_> = registry
            .transpilers_from("A")
            .unwrap()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_rejects_zero_cost_and_duplicates() {
        let mut registry = TranspilerRegistry::new();
        assert!(matches!(
            registry.register_fn("free", "A", "B", 0, false, passthrough),
            Err(TranspileError::InvalidCost(_))
        ));
        assert!(!registry.is_known("A"));

        registry
            .register_fn("dup", "A", "B", 1, false, passthrough)
            .unwrap();
        assert!(matches!(
            registry.register_fn("dup", "B", "C", 1, false, passthrough),
            Err(TranspileError::DuplicateTranspiler(_))
        ));
    }

    #[test]
    fn test_builtins_registered() {
        let registry = TranspilerRegistry::with_builtins();
        for format in ["IR", "IR_JSON", "QASM2", "QASM3", "QUIL"] {
            assert!(registry.is_known(format), "missing {format}");
        }
        assert!(registry.transpilers_from("QUIL").unwrap().is_empty());
        assert!(registry.iter().all(|t| !t.is_unsafe()));
    }
}
