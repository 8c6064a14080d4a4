#![cfg(feature = "web")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use power_ledger::app::{AppState, router};
use power_ledger::auth::EmployeeRoster;
use power_ledger::store::{DataStore, MASTER_JOIN_COLUMN, NAME_OF_PROJECT, Sheet};
use power_ledger::value::Record;
use pretty_assertions::assert_eq;
use rust_xlsxwriter::Workbook;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn sheet(headers: &[&str], rows: Vec<Vec<Value>>) -> Sheet {
    let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let rows: Vec<Record> = rows
        .into_iter()
        .map(|values| headers.iter().cloned().zip(values).collect())
        .collect();
    Sheet::new(headers, rows)
}

fn app() -> Router {
    let mut store = DataStore::in_memory();
    store
        .replace_master(sheet(
            &[MASTER_JOIN_COLUMN, "Plant Type", "Contracted Capacity"],
            vec![vec![json!("Alpha Solar"), json!("Solar"), json!(12)]],
        ))
        .unwrap();
    store
        .append_monthly(sheet(
            &[NAME_OF_PROJECT, "April-25 - Payment"],
            vec![vec![json!("ALPHA SOLAR "), json!(5000)]],
        ))
        .unwrap();
    store
        .replace_history(
            "Alpha Solar",
            sheet(
                &["MONTH", "MF", "RATE", "EXPORT - CURRENT", "IMPORT - CURRENT"],
                vec![vec![
                    json!("Apr-24"),
                    json!(1000),
                    json!(5),
                    json!(100),
                    json!(10),
                ]],
            ),
        )
        .unwrap();
    store
        .replace_history(
            "No Baseline",
            sheet(&["MONTH", "MF"], vec![vec![json!("Apr-24"), json!("")]]),
        )
        .unwrap();
    router(Arc::new(AppState::new(store, EmployeeRoster::new(["E100"]))))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn projects_and_columns_are_listed() {
    let (status, body) = get_json(app(), "/projects").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0][MASTER_JOIN_COLUMN], json!("Alpha Solar"));

    let (_, body) = get_json(app(), "/columns").await;
    assert_eq!(
        body["columns"],
        json!([
            "April-25 - Payment",
            "Contracted Capacity",
            MASTER_JOIN_COLUMN,
            NAME_OF_PROJECT,
            "Plant Type"
        ])
    );
}

#[tokio::test]
async fn stats_and_summary_are_computed() {
    let (_, stats) = get_json(app(), "/stats").await;
    assert_eq!(stats["total_projects"], json!(1));
    assert_eq!(stats["latest_month"], json!("April-25"));
    assert_eq!(stats["latest_payment"], json!(5000.0));

    let (_, summary) = get_json(app(), "/summary").await;
    assert_eq!(summary["total_capacity"], json!(12.0));
    assert_eq!(summary["categories"][0]["label"], json!("Solar (Outside)"));
}

#[tokio::test]
async fn history_is_looked_up_by_encoded_name() {
    let (status, body) = get_json(app(), "/history/alpha%20solar").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["headers"][1], json!("MF"));
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = get_json(app(), "/history/Nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn preview_bills_against_the_last_reading() {
    let request = json_request(
        "POST",
        "/preview-reading",
        json!({"project_name": "Alpha Solar", "current_export": 150, "current_import": 10}),
    );
    let (status, body) = send(app(), request).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["net_units"], json!(50000.0));
    assert_eq!(body["bill"], json!(250000.0));

    let request = json_request(
        "POST",
        "/preview-reading",
        json!({"project_name": "No Baseline", "current_export": 1, "current_import": 1}),
    );
    let (status, body) = send(app(), request).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("meter factor"));
}

#[tokio::test]
async fn rows_can_be_added_and_updated() {
    let app = app();
    let request = json_request(
        "POST",
        "/add-reading",
        json!({
            "project_name": "Alpha Solar",
            "date": "May-24",
            "current_export": 120,
            "current_import": 10
        }),
    );
    let (status, body) = send(app.clone(), request).await;
    let row: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["MONTH"], json!("May-24"));
    assert_eq!(row["EXPORT - CURRENT"], json!(120.0));

    let request = json_request(
        "PUT",
        "/update-row",
        json!({
            "project_name": "Alpha Solar",
            "month_date": "Apr-24",
            "updated_data": {"RATE": "6", "REMARKS": "revised"}
        }),
    );
    let (status, _) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, history) = get_json(app.clone(), "/history/Alpha%20Solar").await;
    assert_eq!(history["data"][0]["RATE"], json!("6"));
    assert_eq!(history["data"].as_array().unwrap().len(), 2);
    assert!(
        history["headers"]
            .as_array()
            .unwrap()
            .contains(&json!("REMARKS"))
    );

    let request = json_request(
        "PUT",
        "/update-row",
        json!({"project_name": "Alpha Solar", "month_date": "Dec-99", "updated_data": {}}),
    );
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn report_downloads_as_xlsx() {
    let request = json_request(
        "POST",
        "/generate-report",
        json!([NAME_OF_PROJECT, "Contracted Capacity", "Unknown"]),
    );
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Office_Report.xlsx\""
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..2], b"PK");
}

#[tokio::test]
async fn employees_are_checked_against_the_roster() {
    let (_, body) = get_json(app(), "/verify-employee/e100").await;
    assert_eq!(body, json!({"allowed": true}));

    let (_, body) = get_json(app(), "/verify-employee/E999").await;
    assert_eq!(body["allowed"], json!(false));
    assert!(body["error"].is_string());
}

fn multipart(field: &str, file: &[u8]) -> Request<Body> {
    let boundary = "LEDGERBOUNDARY";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"upload.xlsx\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Request::post("/upload-master")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn master_upload_replaces_the_project_list() {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.write_string(0, 0, "SR. No.").unwrap();
    worksheet.write_string(0, 1, MASTER_JOIN_COLUMN).unwrap();
    for (i, name) in ["Gamma", "Delta"].iter().enumerate() {
        let row = i as u32 + 1;
        worksheet.write_number(row, 0, row as f64).unwrap();
        worksheet.write_string(row, 1, *name).unwrap();
    }
    let bytes = workbook.save_to_buffer().unwrap();

    let app = app();
    let (status, _) = send(app.clone(), multipart("file", &bytes)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get_json(app, "/projects").await;
    let names: Vec<&Value> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| &r[MASTER_JOIN_COLUMN])
        .collect();
    assert_eq!(names, vec![&json!("Gamma"), &json!("Delta")]);
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let (status, body) = send(app(), multipart("attachment", b"ignored")).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("No file data received"));
}
