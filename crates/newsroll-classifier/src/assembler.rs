//! Mapping validated output back into the caller's namespace

use newsroll_core::{CategorySpec, DegradedPolicy, Group, IdMap, ValidatedResponse};
use tracing::debug;

/// Summary used for categories with no items
pub const NO_ITEMS_SUMMARY: &str = "No items found for this category.";

/// Summary of the catch-all group produced by [`DegradedPolicy::CatchAll`]
pub const UNCLASSIFIED_SUMMARY: &str = "These items could not be classified automatically.";

/// Assembled groups plus any warnings raised on the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub groups: Vec<Group>,
    pub warnings: Vec<String>,
}

/// Translate dense ids back and, with a closed category list, emit every
/// configured category in configured order
pub fn assemble(validated: ValidatedResponse, ids: &IdMap, categories: &[CategorySpec]) -> Assembled {
    let mut warnings = validated.warnings;

    let mut groups: Vec<Group> = validated
        .groups
        .into_iter()
        .map(|g| Group {
            label: g.label,
            summary: g.summary,
            item_ids: g.item_ids.into_iter().filter_map(|d| ids.to_external(d)).collect(),
        })
        .collect();

    if !categories.is_empty() {
        groups = arrange_by_category(groups, categories, &mut warnings);
    }

    Assembled { groups, warnings }
}

fn arrange_by_category(
    groups: Vec<Group>,
    categories: &[CategorySpec],
    warnings: &mut Vec<String>,
) -> Vec<Group> {
    let mut slots: Vec<Option<Group>> = vec![None; categories.len()];

    for group in groups {
        // Labels were canonicalized by the validator, so exact match suffices
        let Some(index) = categories.iter().position(|c| c.label == group.label) else {
            continue;
        };
        if let Some(existing) = slots[index].as_mut() {
            warnings.push(format!(
                "Merged repeated group for category \"{}\"",
                group.label
            ));
            existing.item_ids.extend(group.item_ids);
        } else {
            slots[index] = Some(group);
        }
    }

    slots
        .into_iter()
        .zip(categories)
        .map(|(slot, category)| {
            slot.unwrap_or_else(|| {
                debug!("Adding placeholder for absent category: {}", category.label);
                placeholder(category)
            })
        })
        .collect()
}

fn placeholder(category: &CategorySpec) -> Group {
    Group::new(category.label.clone(), NO_ITEMS_SUMMARY, Vec::new())
}

/// Groups returned when the attempt budget is exhausted
pub fn degraded(policy: &DegradedPolicy, ids: &IdMap, categories: &[CategorySpec]) -> Vec<Group> {
    let mut groups: Vec<Group> = categories.iter().map(placeholder).collect();

    if let DegradedPolicy::CatchAll { label } = policy {
        let all_ids = ids.external_ids().to_vec();
        if all_ids.is_empty() {
            return groups;
        }
        let wanted = label.trim().to_lowercase();
        match groups
            .iter_mut()
            .find(|g| g.label.trim().to_lowercase() == wanted)
        {
            Some(existing) => {
                existing.summary = UNCLASSIFIED_SUMMARY.to_string();
                existing.item_ids = all_ids;
            }
            None => groups.push(Group::new(label.clone(), UNCLASSIFIED_SUMMARY, all_ids)),
        }
    }

    groups
}
