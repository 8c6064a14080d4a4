use crate::store::Sheet;
use crate::value::round2;
use serde::Serialize;
use serde_json::{Map, Value};

/// Headline figures for the dashboard cards
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_projects: usize,
    pub total_capacity: f64,
    /// Month label to total payment, in column order
    pub monthly_payments: Map<String, Value>,
    pub available_months: Vec<String>,
    pub latest_month: String,
    pub latest_payment: f64,
}

impl DashboardStats {
    /// Payments worth charting: totals and prior-year carry-overs are dropped
    pub fn displayable_payments(&self) -> Vec<(String, f64)> {
        self.monthly_payments
            .iter()
            .filter(|(month, _)| !month.contains("Total") && !month.contains("Previous Year"))
            .map(|(month, amount)| (month.clone(), amount.as_f64().unwrap_or(0.0)))
            .collect()
    }
}

/// Month part of a payment column name (`"April-25 - Payment"` → `"April-25"`)
pub fn payment_month(column: &str) -> String {
    match column.split_once(" - ") {
        Some((month, _)) => month.trim().to_string(),
        None => column.split('-').next().unwrap_or(column).trim().to_string(),
    }
}

/// Compute the stats cards from the master and monthly sheets
pub fn compute(master: &Sheet, monthly: &Sheet) -> DashboardStats {
    let total_capacity = master
        .headers
        .iter()
        .find(|h| h.to_lowercase().contains("capacity"))
        .map(|column| master.rows.iter().map(|r| r.number(column)).sum::<f64>())
        .unwrap_or(0.0);

    let mut sums: Vec<(String, f64)> = Vec::new();
    for column in monthly.headers.iter().filter(|h| h.contains("Payment")) {
        let month = payment_month(column);
        let total: f64 = monthly.rows.iter().map(|r| r.number(column)).sum();
        match sums.iter_mut().find(|(m, _)| *m == month) {
            Some((_, sum)) => *sum += total,
            None => sums.push((month, total)),
        }
    }

    let (latest_month, latest_payment) = sums
        .last()
        .map(|(m, v)| (m.clone(), round2(*v)))
        .unwrap_or_else(|| ("N/A".to_string(), 0.0));

    DashboardStats {
        total_projects: master.rows.len(),
        total_capacity: round2(total_capacity),
        available_months: sums.iter().map(|(m, _)| m.clone()).collect(),
        monthly_payments: sums
            .into_iter()
            .map(|(m, v)| (m, Value::from(round2(v))))
            .collect(),
        latest_month,
        latest_payment,
    }
}
