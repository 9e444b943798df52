//! [`Plan`] — an ordered collection of [`Step`]s forming a DAG, plus the
//! invariant checks (I1–I5) every mutation must preserve.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::PlanError;
use crate::step::{Step, StepStatus};

/// Ordered collection of steps forming a directed acyclic graph.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Monotone version counter, bumped on every `write_plan`.
    pub version: u64,
    /// Short summary of the goal this plan pursues.
    pub goal_summary: String,
    /// Steps in insertion order. Order is not semantically meaningful for
    /// scheduling (`next_ready` uses id, not position) but is preserved for
    /// stable serialization.
    pub steps: Vec<Step>,
}

impl Plan {
    /// Construct a plan and validate I1–I3 before returning it.
    pub fn new(goal_summary: impl Into<String>, steps: Vec<Step>) -> Result<Self, PlanError> {
        let plan = Self {
            version: 0,
            goal_summary: goal_summary.into(),
            steps,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// An empty plan (no steps). Trivially valid and immediately terminal.
    pub fn empty(goal_summary: impl Into<String>) -> Self {
        Self {
            version: 0,
            goal_summary: goal_summary.into(),
            steps: Vec::new(),
        }
    }

    /// Look up a step by id.
    pub fn get(&self, id: &crate::id::StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Mutable lookup of a step by id.
    pub fn get_mut(&mut self, id: &crate::id::StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| &s.id == id)
    }

    /// Validate I1 (unique ids), I2 (dependencies exist), I3 (acyclic).
    /// Returns the offending step ids alongside the error so callers can
    /// render a diagnostic without re-deriving them.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.clone()) {
                return Err(PlanError::DuplicateStepId(step.id.to_string()));
            }
        }

        let ids: HashSet<_> = self.steps.iter().map(|s| s.id.clone()).collect();
        for step in &self.steps {
            for dep in &step.dependencies {
                if !ids.contains(dep) {
                    return Err(PlanError::DanglingDependency {
                        step: step.id.to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }

        self.topo_order().map(|_| ())
    }

    /// Kahn's-algorithm topological ordering of step ids. Returns
    /// `PlanError::Cycle` if the dependency graph isn't a DAG (I3).
    pub fn topo_order(&self) -> Result<Vec<crate::id::StepId>, PlanError> {
        let mut indegree: HashMap<_, usize> = self
            .steps
            .iter()
            .map(|s| (s.id.clone(), s.dependencies.len()))
            .collect();
        // dependents[d] = steps that depend on d
        let mut dependents: HashMap<crate::id::StepId, Vec<crate::id::StepId>> = HashMap::new();
        for step in &self.steps {
            for dep in &step.dependencies {
                dependents.entry(dep.clone()).or_default().push(step.id.clone());
            }
        }

        // Deterministic order: sort the initial frontier.
        let mut frontier: Vec<_> = indegree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| id.clone())
            .collect();
        frontier.sort();
        let mut queue: VecDeque<_> = frontier.into();

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            if let Some(deps) = dependents.get(&id) {
                let mut newly_ready = Vec::new();
                for dep_id in deps {
                    let deg = indegree.get_mut(dep_id).expect("known step id");
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(dep_id.clone());
                    }
                }
                newly_ready.sort();
                for id in newly_ready {
                    queue.push_back(id);
                }
            }
        }

        if order.len() != self.steps.len() {
            let stuck: Vec<String> = indegree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            return Err(PlanError::Cycle(stuck));
        }

        Ok(order)
    }

    /// Returns the lowest-id step whose status is `pending` and whose
    /// dependencies are all `completed`. See `taskloom-plan::next_ready`
    /// for the full scheduling semantics (this is a pure DAG query; the
    /// plan-engine crate interprets the result against I4).
    pub fn ready_steps(&self) -> Vec<&Step> {
        let mut ready: Vec<&Step> = self
            .steps
            .iter()
            .filter(|s| {
                s.status == StepStatus::Pending
                    && s.dependencies
                        .iter()
                        .all(|dep| self.get(dep).is_some_and(|d| d.status == StepStatus::Completed))
            })
            .collect();
        ready.sort_by(|a, b| a.id.cmp(&b.id));
        ready
    }

    /// Whether any step is currently `in_progress` (I4 enforcement point).
    pub fn has_in_progress(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::InProgress)
    }

    /// Whether every step has reached a terminal status
    /// (`completed`, `failed`, or `skipped`).
    pub fn is_terminal(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped))
    }

    /// Whether every step completed successfully (the empty plan counts
    /// as vacuously successful, per the boundary behavior in §8).
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    /// Whether any step is `failed` with `attempts >= MAX_ATTEMPTS`
    /// (terminal-failure condition for `next_ready`).
    pub fn has_exhausted_failure(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.status == StepStatus::Failed && s.attempts >= crate::step::MAX_ATTEMPTS)
    }
}
