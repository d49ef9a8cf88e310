//! Invariant checking for controller simulations.
//!
//! Invariants are properties that must hold at every observable point, not
//! outcomes of one scenario. The harness captures published views into a
//! [`SystemSnapshot`] and runs every registered [`Invariant`] against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = SystemSnapshot::single(ConvoSnapshot::new(handle.view(), previous_tail));
//! registry.assert_all(&snapshot, "after poll");
//! ```

mod checks;
mod snapshot;

pub use checks::{CadenceMatchesState, NoDuplicateIds, SortedByTimestamp, TailIsMaxId, TailMonotonic};
pub use snapshot::{ConvoSnapshot, SystemSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a snapshot.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every conversation invariant.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(NoDuplicateIds);
        registry.add(SortedByTimestamp);
        registry.add(TailIsMaxId);
        registry.add(TailMonotonic);
        registry.add(CadenceMatchesState);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation.
    ///
    /// # Panics
    ///
    /// If any invariant fails.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn empty_snapshot_passes_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&SystemSnapshot::default()).is_ok());
    }
}
