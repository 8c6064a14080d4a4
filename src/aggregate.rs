//! Dashboard aggregates over the project list
//!
//! Folds every project row into per-category totals and a monthly
//! generation series. This is a total function: missing or malformed
//! columns degrade to zeros and empty lists, never to errors.

use crate::columns::{self, ProjectColumns};
use crate::value::{Record, round2};
use serde::Serialize;
use std::collections::HashMap;

pub const SOLAR_WITHIN: &str = "Solar (Punjab)";
pub const SOLAR_OUTSIDE: &str = "Solar (Outside)";
pub const OTHER: &str = "Other";

/// Fiscal year month order, April first
const FISCAL_MONTHS: [&str; 12] = [
    "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec", "jan", "feb", "mar",
];

const UNITS_PER_MU: f64 = 1_000_000.0;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CategoryGroup {
    pub label: String,
    pub count: usize,
    pub installed_capacity: f64,
    pub contracted_capacity: f64,
}

/// Generation for one month label, in millions of units
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlyGenerationPoint {
    pub month: String,
    pub value_mu: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    /// Sum of contracted capacity across projects
    pub total_capacity: f64,
    pub total_count: usize,
    /// Raw units, not MU
    pub total_generation: f64,
    pub categories: Vec<CategoryGroup>,
    pub monthly: Vec<MonthlyGenerationPoint>,
}

/// Fold the project list into dashboard aggregates
pub fn aggregate(records: &[Record]) -> Summary {
    let Some(first) = records.first() else {
        return Summary::default();
    };
    let headers: Vec<&str> = first.columns().collect();
    let cols = ProjectColumns::resolve(&headers);

    let mut summary = Summary {
        total_count: records.len(),
        ..Summary::default()
    };
    let mut groups: Vec<CategoryGroup> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut months: Vec<(String, f64)> = Vec::new();
    let mut month_index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let installed = record.number_in(cols.installed_capacity.as_deref());
        let contracted = record.number_in(cols.contracted_capacity.as_deref());
        summary.total_capacity += contracted;

        let label = category_label(
            &record.text_in(cols.plant_type.as_deref()),
            &record.text_in(cols.state.as_deref()),
        );
        let idx = *group_index.entry(label.clone()).or_insert_with(|| {
            groups.push(CategoryGroup {
                label,
                ..CategoryGroup::default()
            });
            groups.len() - 1
        });
        let group = &mut groups[idx];
        group.count += 1;
        group.installed_capacity += installed;
        group.contracted_capacity += contracted;

        for column in &cols.generation {
            let Some(month) = columns::month_label(column) else {
                continue;
            };
            let value = record.number(column);
            if value <= 0.0 {
                continue;
            }
            let idx = *month_index.entry(month.to_string()).or_insert_with(|| {
                months.push((month.to_string(), 0.0));
                months.len() - 1
            });
            months[idx].1 += value;
            summary.total_generation += value;
        }
    }

    summary.categories = sort_categories(groups);
    summary.monthly = monthly_series(months);
    summary
}

/// Category label for one project row
///
/// Strips a trailing " Power Plant" or " Project" from the plant type, then
/// splits Solar into within-state and outside-state buckets.
pub fn category_label(plant_type: &str, state: &str) -> String {
    let mut label = plant_type.trim();
    for suffix in [" power plant", " project"] {
        label = strip_suffix_ignore_case(label, suffix).trim_end();
    }
    if label.is_empty() {
        return OTHER.to_string();
    }
    if label.to_lowercase().contains("solar") {
        if state.to_lowercase().contains("within") {
            return SOLAR_WITHIN.to_string();
        }
        return SOLAR_OUTSIDE.to_string();
    }
    label.to_string()
}

fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> &'a str {
    let Some(cut) = text.len().checked_sub(suffix.len()) else {
        return text;
    };
    if text.is_char_boundary(cut) && text[cut..].eq_ignore_ascii_case(suffix) {
        &text[..cut]
    } else {
        text
    }
}

/// "Solar (Punjab)" first, the rest by installed capacity, largest first
fn sort_categories(mut groups: Vec<CategoryGroup>) -> Vec<CategoryGroup> {
    groups.sort_by(|a, b| {
        let a_first = a.label == SOLAR_WITHIN;
        let b_first = b.label == SOLAR_WITHIN;
        b_first.cmp(&a_first).then_with(|| {
            b.installed_capacity
                .partial_cmp(&a.installed_capacity)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });
    groups
}

/// Position of a month label in the fiscal year, unknown months last
pub fn fiscal_index(month: &str) -> usize {
    let prefix: String = month.chars().take(3).collect::<String>().to_lowercase();
    FISCAL_MONTHS
        .iter()
        .position(|m| *m == prefix)
        .unwrap_or(FISCAL_MONTHS.len())
}

fn monthly_series(months: Vec<(String, f64)>) -> Vec<MonthlyGenerationPoint> {
    let mut series: Vec<MonthlyGenerationPoint> = months
        .into_iter()
        .map(|(month, units)| MonthlyGenerationPoint {
            month,
            value_mu: round2(units / UNITS_PER_MU),
        })
        .collect();
    series.sort_by_key(|p| fiscal_index(&p.month));
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project(plant: &str, state: &str, installed: f64, contracted: f64) -> Record {
        vec![
            ("Name of Project", json!("P")),
            ("Plant Type", json!(plant)),
            ("State", json!(state)),
            ("Installed Capacity (MW)", json!(installed)),
            ("Contracted Capacity (MW)", json!(contracted)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn empty_input_gives_zeroes() {
        assert_eq!(aggregate(&[]), Summary::default());
    }

    #[test]
    fn suffixes_are_stripped() {
        assert_eq!(category_label("Biomass Power Plant", ""), "Biomass");
        assert_eq!(category_label("Small Hydro Project", ""), "Small Hydro");
        assert_eq!(category_label("   ", ""), OTHER);
    }

    #[test]
    fn solar_splits_on_within() {
        assert_eq!(category_label("Solar Power Plant", "Within Punjab"), SOLAR_WITHIN);
        assert_eq!(category_label("Solar", "Rajasthan"), SOLAR_OUTSIDE);
    }

    #[test]
    fn total_capacity_sums_contracted_values() {
        let rows = vec![
            project("Biomass", "", 10.0, 8.0),
            project("Biomass", "", 5.0, 4.0),
        ];
        let summary = aggregate(&rows);
        assert_eq!(summary.total_capacity, 12.0);
        assert_eq!(summary.categories[0].installed_capacity, 15.0);
        assert_eq!(summary.categories[0].count, 2);
    }

    #[test]
    fn solar_within_state_always_leads() {
        let rows = vec![
            project("Biomass", "", 100.0, 100.0),
            project("Solar", "Within State", 1.0, 1.0),
            project("Solar", "Outside", 50.0, 50.0),
        ];
        let labels: Vec<String> = aggregate(&rows)
            .categories
            .into_iter()
            .map(|g| g.label)
            .collect();
        assert_eq!(labels, vec![SOLAR_WITHIN, "Biomass", SOLAR_OUTSIDE]);
    }

    #[test]
    fn fiscal_index_orders_april_first() {
        assert_eq!(fiscal_index("Apr-24"), 0);
        assert_eq!(fiscal_index("March-25"), 11);
        assert_eq!(fiscal_index("Foo-25"), 12);
    }
}
