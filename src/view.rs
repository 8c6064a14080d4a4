//! Dashboard navigation state
//!
//! Holds which screen is showing and what it needs fetched. Transitions
//! return the requests to issue; the caller performs them. Requests are
//! independent and may complete in any order.

use crate::columns;
use crate::value::{Record, display_text};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum View {
    Dashboard,
    List,
    Detail { project: String },
    Report,
}

/// A request the current view needs made
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    FetchStats,
    FetchProjects,
    FetchColumns,
    /// Path of the project's ledger, already URL-encoded
    FetchHistory(String),
}

#[derive(Clone, Debug)]
pub struct ViewRouter {
    view: View,
    report_columns: Vec<String>,
    search: String,
}

impl Default for ViewRouter {
    fn default() -> Self {
        ViewRouter {
            view: View::Dashboard,
            report_columns: Vec::new(),
            search: String::new(),
        }
    }
}

/// API path of a project's ledger
pub fn history_path(project: &str) -> String {
    format!("/history/{}", urlencoding::encode(project))
}

impl ViewRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// Switch screens; opening a project always refetches its ledger
    pub fn navigate(&mut self, view: View) -> Vec<Effect> {
        let effects = match &view {
            View::Detail { project } if self.view != view => {
                vec![Effect::FetchHistory(history_path(project))]
            }
            _ => Vec::new(),
        };
        self.view = view;
        effects
    }

    pub fn select_project(&mut self, project: &str) -> Vec<Effect> {
        self.navigate(View::Detail {
            project: project.to_string(),
        })
    }

    /// Reissue every top-level fetch
    pub fn refresh(&self) -> Vec<Effect> {
        vec![Effect::FetchStats, Effect::FetchProjects, Effect::FetchColumns]
    }

    pub fn set_search(&mut self, term: impl Into<String>) {
        self.search = term.into();
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    /// Add a report column, or remove it if already chosen
    pub fn toggle_report_column(&mut self, column: &str) {
        if let Some(pos) = self.report_columns.iter().position(|c| c == column) {
            self.report_columns.remove(pos);
        } else {
            self.report_columns.push(column.to_string());
        }
    }

    /// Chosen report columns, in the order they were picked
    pub fn report_columns(&self) -> &[String] {
        &self.report_columns
    }
}

/// Rows with any cell containing `term`, ignoring case
pub fn filter_projects<'a>(records: &'a [Record], term: &str) -> Vec<&'a Record> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return records.iter().collect();
    }
    records
        .iter()
        .filter(|r| {
            r.iter()
                .any(|(_, v)| display_text(v).to_lowercase().contains(&needle))
        })
        .collect()
}

/// Display name of a project row
pub fn project_name(record: &Record) -> String {
    let headers: Vec<&str> = record.columns().collect();
    columns::name_column(&headers)
        .map(|c| record.text(c))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selecting_a_project_fetches_its_history() {
        let mut router = ViewRouter::new();
        let effects = router.select_project("Alpha Solar/2");
        assert_eq!(
            effects,
            vec![Effect::FetchHistory("/history/Alpha%20Solar%2F2".to_string())]
        );
        assert_eq!(
            router.view(),
            &View::Detail {
                project: "Alpha Solar/2".to_string()
            }
        );
        assert!(router.select_project("Alpha Solar/2").is_empty());
        assert_eq!(router.select_project("Beta").len(), 1);
    }

    #[test]
    fn report_columns_keep_pick_order() {
        let mut router = ViewRouter::new();
        router.toggle_report_column("B");
        router.toggle_report_column("A");
        router.toggle_report_column("C");
        router.toggle_report_column("B");
        assert_eq!(router.report_columns(), ["A".to_string(), "C".to_string()]);
    }

    #[test]
    fn filter_matches_any_cell() {
        let records: Vec<Record> = vec![
            vec![("Name of Project", json!("Alpha")), ("MW", json!(12))]
                .into_iter()
                .collect(),
            vec![("Name of Project", json!("Beta")), ("MW", json!(3))]
                .into_iter()
                .collect(),
        ];
        assert_eq!(filter_projects(&records, "alp").len(), 1);
        assert_eq!(filter_projects(&records, "12").len(), 1);
        assert_eq!(filter_projects(&records, "  ").len(), 2);
        assert_eq!(project_name(&records[1]), "Beta");
    }
}
