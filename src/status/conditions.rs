use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;

use crate::{common::create_condition, renderer::ConditionOutcome};

pub fn to_conditions<'a>(outcomes: impl IntoIterator<Item = &'a ConditionOutcome>, generation: Option<i64>) -> Vec<Condition> {
    outcomes
        .into_iter()
        .map(|outcome| create_condition(&outcome.condition_type.to_string(), outcome.status, &outcome.reason.to_string(), &outcome.message, generation))
        .collect()
}

fn same_condition(this: &Condition, other: &Condition) -> bool {
    this.type_ == other.type_
        && this.status == other.status
        && this.reason == other.reason
        && this.message == other.message
        && this.observed_generation == other.observed_generation
}

/// Equal up to transition times.
pub fn same_conditions(this: &[Condition], other: &[Condition]) -> bool {
    this.len() == other.len() && this.iter().zip(other).all(|(this, other)| same_condition(this, other))
}

/// Carries over the transition time of every condition whose status, reason and message did not change.
pub fn preserve_transition_times(conditions: &mut [Condition], previous: &[Condition]) {
    for condition in conditions {
        let unchanged = previous.iter().find(|old| {
            old.type_ == condition.type_ && old.status == condition.status && old.reason == condition.reason && old.message == condition.message
        });
        if let Some(old) = unchanged {
            condition.last_transition_time = old.last_transition_time.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{ConditionType, Reason};

    #[test]
    pub fn test_transition_time_is_preserved() {
        let accepted = ConditionOutcome::new(ConditionType::Accepted, true, Reason::Accepted, "ok");
        let mut previous = to_conditions([&accepted], Some(1));
        previous[0].last_transition_time.0 -= k8s_openapi::chrono::Duration::hours(1);

        let mut current = to_conditions([&accepted], Some(2));
        preserve_transition_times(&mut current, &previous);
        assert_eq!(current[0].last_transition_time, previous[0].last_transition_time);
        assert!(!same_conditions(&current, &previous));

        let rejected = ConditionOutcome::new(ConditionType::Accepted, false, Reason::Invalid, "not ok");
        let mut current = to_conditions([&rejected], Some(1));
        preserve_transition_times(&mut current, &previous);
        assert_ne!(current[0].last_transition_time, previous[0].last_transition_time);
    }
}
