//! Inputs to a planning run: the static profile, the current repository
//! inventory, and a filter evaluator. The profile comes from the store,
//! the inventory and evaluator are supplied by the caller (the
//! composition root knows how to enumerate repositories and how to
//! interpret a `RepositorySelector::Predicate` expression; this crate
//! only applies the result).

use gitaudit_store::RepositorySelector;
use serde_json::Value;

/// One unit of work a stage can run. `id` must match an entry in its
/// stage's `actions` list (and, for `DependencyOrdered` stages, the
/// `dependencies` map) for the planner to pick it up.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    pub id: String,
    pub repository: String,
    pub branch: String,
    pub commit: String,
    pub parameters: Value,
}

/// Narrows `inventory` down to the repositories a profile actually
/// targets. `All` takes the whole inventory; `Explicit` intersects with
/// it (an explicit repository absent from the inventory is silently
/// dropped, not an error — it may simply not exist yet); `Predicate`
/// delegates to the caller-supplied evaluator.
pub fn select_repositories(selector: &RepositorySelector, inventory: &[String], evaluate_predicate: &dyn Fn(&str) -> bool) -> Vec<String> {
    match selector {
        RepositorySelector::All => inventory.to_vec(),
        RepositorySelector::Explicit(names) => inventory.iter().filter(|r| names.contains(r)).cloned().collect(),
        RepositorySelector::Predicate(_) => inventory.iter().filter(|r| evaluate_predicate(r)).cloned().collect(),
    }
}
