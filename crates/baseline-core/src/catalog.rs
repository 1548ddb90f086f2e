//! The baseline catalog: a validated, dependency-ordered set of controls.
//!
//! `Catalog::load` is the only constructor. It validates the dependency
//! graph and computes a stable topological order, so every `Catalog` value in
//! the program is known to be acyclic and closed over its dependencies.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use baseline_contracts::{
    control::{Control, ControlId},
    error::{BaselineError, BaselineResult},
};

/// A validated catalog of controls in dependency order.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Controls ordered so every control follows all of its dependencies.
    ordered: Vec<Control>,
    /// Control id → position in `ordered`.
    index: HashMap<ControlId, usize>,
    /// Dependency level per position in `ordered`.
    levels: Vec<usize>,
}

impl Catalog {
    /// Check that identifiers are unique and every dependency exists.
    ///
    /// Returns `DuplicateControl` or `UnknownDependency` on the first problem
    /// found, scanning in declaration order.
    pub fn validate(controls: &[Control]) -> BaselineResult<()> {
        let mut seen: HashSet<&ControlId> = HashSet::with_capacity(controls.len());
        for control in controls {
            if !seen.insert(&control.id) {
                return Err(BaselineError::DuplicateControl {
                    id: control.id.to_string(),
                });
            }
        }

        for control in controls {
            for dep in &control.depends_on {
                if !seen.contains(dep) {
                    return Err(BaselineError::UnknownDependency {
                        control: control.id.to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Validate `controls` and order them topologically.
    ///
    /// The sort is stable: among controls whose dependencies are satisfied,
    /// the one declared first comes first. Fails with `CycleDetected` when the
    /// dependencies form a cycle.
    pub fn load(controls: Vec<Control>) -> BaselineResult<Self> {
        Self::validate(&controls)?;

        let position: HashMap<&ControlId, usize> =
            controls.iter().enumerate().map(|(i, c)| (&c.id, i)).collect();

        // Kahn's algorithm over declaration indices; the BTreeSet always
        // yields the earliest-declared ready control.
        let mut remaining_deps: Vec<usize> = vec![0; controls.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); controls.len()];
        for (i, control) in controls.iter().enumerate() {
            let unique: HashSet<&ControlId> = control.depends_on.iter().collect();
            remaining_deps[i] = unique.len();
            for dep in unique {
                dependents[position[dep]].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = remaining_deps
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order: Vec<usize> = Vec::with_capacity(controls.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &dependents[next] {
                remaining_deps[dependent] -= 1;
                if remaining_deps[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < controls.len() {
            let cycle = find_cycle(&controls, &position, &remaining_deps);
            return Err(BaselineError::CycleDetected { cycle });
        }

        let mut slots: Vec<Option<Control>> = controls.into_iter().map(Some).collect();
        let ordered: Vec<Control> = order
            .iter()
            .filter_map(|&i| slots[i].take())
            .collect();

        let index: HashMap<ControlId, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        let mut levels = vec![0usize; ordered.len()];
        for (i, control) in ordered.iter().enumerate() {
            let level = control
                .depends_on
                .iter()
                .map(|dep| levels[index[dep]] + 1)
                .max()
                .unwrap_or(0);
            levels[i] = level;
        }

        debug!(controls = ordered.len(), "catalog loaded");

        Ok(Self { ordered, index, levels })
    }

    /// Controls in dependency order.
    pub fn ordered(&self) -> &[Control] {
        &self.ordered
    }

    pub fn get(&self, id: &ControlId) -> Option<&Control> {
        self.index.get(id).map(|&i| &self.ordered[i])
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Dependency level of a control: 0 without dependencies, otherwise one
    /// more than its deepest dependency.
    pub fn level(&self, id: &ControlId) -> Option<usize> {
        self.index.get(id).map(|&i| self.levels[i])
    }

    /// Group controls into waves by dependency level, lowest level first.
    ///
    /// Controls in one wave never depend on each other. Within a wave the
    /// catalog order is preserved.
    pub fn waves(&self) -> Vec<Vec<&Control>> {
        let depth = self.levels.iter().copied().max().map_or(0, |m| m + 1);
        let mut waves: Vec<Vec<&Control>> = vec![Vec::new(); depth];
        for (i, control) in self.ordered.iter().enumerate() {
            waves[self.levels[i]].push(control);
        }
        waves
    }

    /// Waves for teardown: highest level first, each wave in reverse catalog
    /// order, so dependents are removed before what they depend on.
    pub fn teardown_waves(&self) -> Vec<Vec<&Control>> {
        let mut waves = self.waves();
        waves.reverse();
        for wave in &mut waves {
            wave.reverse();
        }
        waves
    }

    /// Controls that list `id` as a dependency.
    pub fn dependents_of(&self, id: &ControlId) -> Vec<&Control> {
        self.ordered
            .iter()
            .filter(|c| c.depends_on.contains(id))
            .collect()
    }
}

/// Walk the unsorted remainder of the graph until a control repeats, and
/// return the cycle path starting and ending at that control.
fn find_cycle(
    controls: &[Control],
    position: &HashMap<&ControlId, usize>,
    remaining_deps: &[usize],
) -> Vec<String> {
    // Every control left with unmet dependencies has at least one dependency
    // that is also left, so following those edges must revisit a node.
    let Some(start) = remaining_deps.iter().position(|&n| n > 0) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut on_path: HashMap<usize, usize> = HashMap::new();
    let mut current = start;

    loop {
        if let Some(&at) = on_path.get(&current) {
            let mut cycle: Vec<String> = path[at..]
                .iter()
                .map(|&i| controls[i].id.to_string())
                .collect();
            cycle.push(controls[current].id.to_string());
            return cycle;
        }
        on_path.insert(current, path.len());
        path.push(current);

        let next = controls[current]
            .depends_on
            .iter()
            .map(|dep| position[dep])
            .find(|&i| remaining_deps[i] > 0);

        match next {
            Some(i) => current = i,
            None => {
                return path.iter().map(|&i| controls[i].id.to_string()).collect();
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
