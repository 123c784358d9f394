use std::collections::HashMap;

use common::api::ProgressStep;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepEvent {
    pub name: Option<String>,
    pub status: Option<String>,
}

/// Last-seen status per component, visiting steps in pre-order.
///
/// A step's `status` falls back to its `name` when absent. A step with
/// neither still claims the entry and clears it to `None`. Steps without a
/// component name contribute nothing but their children are still visited.
pub fn flatten(steps: &[Option<ProgressStep>]) -> HashMap<String, Option<String>> {
    let mut statuses = HashMap::new();
    walk(steps, &mut |step| {
        let Some(component) = step.component_name.as_deref().filter(|c| !c.is_empty()) else {
            return;
        };
        let status = step.status.clone().or_else(|| step.name.clone());
        statuses.insert(component.to_string(), status);
    });
    statuses
}

/// Every step attributed to one component, in pre-order.
pub fn component_events(steps: &[Option<ProgressStep>], component: &str) -> Vec<StepEvent> {
    let mut events = Vec::new();
    walk(steps, &mut |step| {
        if step.component_name.as_deref() == Some(component) {
            events.push(StepEvent {
                name: step.name.clone(),
                status: step.status.clone(),
            });
        }
    });
    events
}

fn walk<F>(steps: &[Option<ProgressStep>], visit: &mut F)
where
    F: FnMut(&ProgressStep),
{
    for step in steps.iter().flatten() {
        visit(step);
        walk(&step.steps, visit);
    }
}
