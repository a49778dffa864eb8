//! Plan deduplication.

use std::collections::HashSet;

use tracing::{info, instrument};

use crate::plan::ElectivePlan;
use crate::session::{SessionPatch, SessionState};

/// Collapse plans with the same course set, keeping first occurrences in
/// order.
#[instrument(skip_all, fields(plans = state.plans.len()))]
pub(crate) fn dedup_plans(state: &SessionState) -> SessionPatch {
    let unique = unique_plans(&state.plans);
    info!(unique = unique.len(), "plans deduplicated");
    SessionPatch {
        plans: Some(unique),
        ..Default::default()
    }
}

/// Plans with distinct course sets, first occurrence wins.
pub(crate) fn unique_plans(plans: &[ElectivePlan]) -> Vec<ElectivePlan> {
    let mut seen = HashSet::new();
    plans
        .iter()
        .filter(|p| seen.insert(p.key()))
        .cloned()
        .collect()
}

/// Number of distinct course sets among `plans`.
pub(crate) fn distinct_count(plans: &[ElectivePlan]) -> usize {
    plans.iter().map(ElectivePlan::key).collect::<HashSet<_>>().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::course;

    fn plan(numbers: &[&str]) -> ElectivePlan {
        ElectivePlan::new(numbers.iter().map(|n| course(n, n, 4)))
    }

    #[test]
    fn test_should_collapse_plans_with_same_course_set() {
        let mut state = SessionState::default();
        state.plans = vec![plan(&["DS5110", "DS5220"]), plan(&["DS5220", "DS5110"])];

        let patch = dedup_plans(&state);
        let plans = patch.plans.expect("plans should be set");
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].courses[0].course_number, "DS5110");
    }

    #[test]
    fn test_should_preserve_first_occurrence_order() {
        let plans = vec![
            plan(&["B1000"]),
            plan(&["A1000"]),
            plan(&["B1000"]),
            plan(&["C1000", "A1000"]),
        ];
        let unique = unique_plans(&plans);
        let keys: Vec<_> = unique.iter().map(ElectivePlan::key).collect();
        assert_eq!(
            keys,
            vec![
                vec!["B1000".to_owned()],
                vec!["A1000".to_owned()],
                vec!["A1000".to_owned(), "C1000".to_owned()],
            ]
        );
        assert_eq!(distinct_count(&plans), 3);
    }

    #[test]
    fn test_should_be_idempotent() {
        let plans = vec![
            plan(&["DS5110", "DS5220"]),
            plan(&["DS5230"]),
            plan(&["DS5220", "DS5110"]),
            plan(&[]),
            plan(&[]),
        ];
        let once = unique_plans(&plans);
        let twice = unique_plans(&once);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }
}
