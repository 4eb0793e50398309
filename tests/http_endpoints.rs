//! HTTP endpoint tests for the dashboard router
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`.
#![cfg(feature = "web")]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use rust_xlsxwriter::{Workbook, Worksheet};
use sensor_dashboard::{
    DashboardConfig,
    app::{self, AppState},
    llm::{LlmError, TextGenerator},
};
use tower::ServiceExt;

const BOUNDARY: &str = "dashboard-test-boundary";
const FULL_HEADER: [&str; 4] = ["Fecha", "P42", "P43", "P55"];
const NO_FECHA_HEADER: [&str; 4] = ["Tiempo", "P42", "P43", "P55"];

#[derive(Default)]
struct CannedGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Los sensores muestran un comportamiento estable".to_string())
    }
}

fn create_test_app(generator: Option<Arc<dyn TextGenerator>>) -> Router {
    let state = AppState::new(DashboardConfig::default(), generator).unwrap();
    app::router(Arc::new(state))
}

type Rows<'a> = &'a [(&'a str, [f64; 3])];

fn sheets_bytes(sheets: &[(&str, [&str; 4], Rows<'_>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, header, rows) in sheets {
        let mut sheet = Worksheet::new();
        sheet.set_name(*name).unwrap();
        for (c, h) in header.iter().enumerate() {
            sheet.write_string(0, c as u16, *h).unwrap();
        }
        for (r, (date, values)) in rows.iter().enumerate() {
            let r = r as u32 + 1;
            sheet.write_string(r, 0, *date).unwrap();
            for (c, v) in values.iter().enumerate() {
                sheet.write_number(r, c as u16 + 1, *v).unwrap();
            }
        }
        workbook.push_worksheet(sheet);
    }
    workbook.save_to_buffer().unwrap()
}

/// Workbook whose sheets share three dated readings
fn workbook_bytes(completed_header: [&str; 4]) -> Vec<u8> {
    let rows: Rows<'_> = &[
        ("2021-01-15", [10.0, 20.0, 30.0]),
        ("2021-02-15", [5.0, 5.0, 5.0]),
        ("2022-03-01", [1.0, 2.0, 3.0]),
    ];
    sheets_bytes(&[
        ("Original", FULL_HEADER, rows),
        ("Completado_Filas", completed_header, rows),
    ])
}

fn upload_request(file: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"archivo\"; filename=\"sensores.xlsx\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn post_form(uri: &str, cookie: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

/// Upload a workbook and return the session cookie pair
async fn upload(app: &Router, file: &[u8]) -> String {
    let response = app.clone().oneshot(upload_request(file)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/?hoja=Original");
    session_cookie(&response)
}

fn session_cookie(response: &Response) -> String {
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("dashboard_session="));
    set_cookie.split(';').next().unwrap().to_string()
}

async fn body_text(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app(None);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["ai_enabled"], false);
}

#[tokio::test]
async fn test_dashboard_without_upload() {
    let app = create_test_app(None);
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::SET_COOKIE));

    let html = body_text(response).await;
    assert!(html.contains("Sube el archivo Excel"));
    assert!(!html.contains("Generar Conclusión"));
}

#[tokio::test]
async fn test_upload_then_view_charts() {
    let app = create_test_app(None);
    let cookie = upload(&app, &workbook_bytes(FULL_HEADER)).await;

    let response = app
        .clone()
        .oneshot(get("/?hoja=Original&vista=anuales", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("sensores.xlsx"));
    assert!(html.contains("Suma por Año"));
    assert!(html.contains("<svg"));
    assert!(html.contains("Generar Conclusión"));
}

#[tokio::test]
async fn test_totals_view_shows_metrics() {
    let app = create_test_app(None);
    let cookie = upload(&app, &workbook_bytes(FULL_HEADER)).await;

    let html = body_text(app.oneshot(get("/", &cookie)).await.unwrap()).await;
    assert!(html.contains("Suma de P42"));
    assert!(html.contains("16.00 mil"));
    assert!(html.contains("38.00 mil"));
}

#[tokio::test]
async fn test_sheet_without_fecha_shows_warning() {
    let app = create_test_app(None);
    let cookie = upload(&app, &workbook_bytes(NO_FECHA_HEADER)).await;

    let response = app
        .clone()
        .oneshot(get("/?hoja=Completado_Filas&vista=anuales", &cookie))
        .await
        .unwrap();
    let html = body_text(response).await;
    assert!(html.contains("no tiene una columna"));
    assert!(!html.contains("<svg"));
    assert!(!html.contains("Generar Conclusión"));

    // The other sheet of the same upload is still usable
    let html = body_text(
        app.oneshot(get("/?hoja=Original&vista=anuales", &cookie))
            .await
            .unwrap(),
    )
    .await;
    assert!(html.contains("<svg"));
}

#[tokio::test]
async fn test_invalid_upload_is_rejected() {
    let app = create_test_app(None);
    let response = app
        .oneshot(upload_request(b"not a spreadsheet"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_text(response).await;
    assert!(html.contains("no es un Excel válido"));
}

#[tokio::test]
async fn test_view_json_endpoint() {
    let app = create_test_app(None);

    let response = app
        .clone()
        .oneshot(get("/api/views/totales", "dashboard_session=unknown"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let cookie = upload(&app, &workbook_bytes(FULL_HEADER)).await;
    let response = app
        .clone()
        .oneshot(get("/api/views/totales?hoja=Original", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["view"], "totals");
    assert_eq!(json["totals"]["P42"], 16.0);
    assert_eq!(json["totals"]["P55"], 38.0);

    let response = app
        .oneshot(get("/api/views/graficos", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_view_json_for_sheet_without_fecha() {
    let app = create_test_app(None);
    let cookie = upload(&app, &workbook_bytes(NO_FECHA_HEADER)).await;

    let response = app
        .oneshot(get("/api/views/anuales?hoja=Completado_Filas", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(json["error"].as_str().unwrap().contains("Fecha"));
}

#[tokio::test]
async fn test_csv_export() {
    let app = create_test_app(None);
    let cookie = upload(&app, &workbook_bytes(FULL_HEADER)).await;

    let response = app
        .oneshot(get("/export/anuales?format=csv", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("Original_anuales.csv")
    );

    let csv = body_text(response).await;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines, vec!["Año,P42,P43,P55", "2021,15,25,35", "2022,1,2,3"]);
}

#[tokio::test]
async fn test_export_link_keeps_selected_sheet() {
    let app = create_test_app(None);
    let original: Rows<'_> = &[("2021-01-15", [1.0, 1.0, 1.0])];
    let completed: Rows<'_> = &[("2021-01-15", [100.0, 100.0, 100.0])];
    let file = sheets_bytes(&[
        ("Original", FULL_HEADER, original),
        ("Completado_Filas", FULL_HEADER, completed),
    ]);
    let cookie = upload(&app, &file).await;

    let page = app
        .clone()
        .oneshot(get("/?hoja=Completado_Filas", &cookie))
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let html = body_text(page).await;
    let href = html
        .split("href=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .find(|href| href.starts_with("/export/") && href.contains("format=csv"))
        .expect("csv export link")
        .replace("&amp;", "&");
    assert!(href.contains("hoja=Completado_Filas"));

    let response = app.oneshot(get(&href, &cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let csv = body_text(response).await;
    assert!(csv.contains("P42,100"));
    assert!(!csv.contains("P42,1\n"));
}

#[tokio::test]
async fn test_unknown_export_format() {
    let app = create_test_app(None);
    let cookie = upload(&app, &workbook_bytes(FULL_HEADER)).await;

    let response = app
        .oneshot(get("/export/totales?format=pdf", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_conclusion_with_generator() {
    let generator = Arc::new(CannedGenerator::default());
    let app = create_test_app(Some(generator.clone() as Arc<dyn TextGenerator>));
    let cookie = upload(&app, &workbook_bytes(FULL_HEADER)).await;

    let response = app
        .oneshot(post_form("/conclusion", &cookie, "hoja=Original&vista=totales"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Los sensores muestran un comportamiento estable"));

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("2021-01-15"));
}

#[tokio::test]
async fn test_conclusion_without_api_key() {
    let app = create_test_app(None);
    let cookie = upload(&app, &workbook_bytes(FULL_HEADER)).await;

    let response = app
        .oneshot(post_form("/conclusion", &cookie, "hoja=Original"))
        .await
        .unwrap();
    let html = body_text(response).await;
    assert!(html.contains("No se pudo generar la conclusión"));
    assert!(html.contains("not configured"));
}

#[tokio::test]
async fn test_comparison_reports_unusable_sheet() {
    let generator = Arc::new(CannedGenerator::default());
    let app = create_test_app(Some(generator.clone() as Arc<dyn TextGenerator>));
    let cookie = upload(&app, &workbook_bytes(NO_FECHA_HEADER)).await;

    let response = app
        .oneshot(post_form("/comparacion", &cookie, "hoja=Original"))
        .await
        .unwrap();
    let html = body_text(response).await;
    assert!(html.contains("Error al generar la comparación"));
    assert!(html.contains("Completado_Filas"));
    assert!(generator.prompts.lock().unwrap().is_empty());
}
