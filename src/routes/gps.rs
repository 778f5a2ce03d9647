use crate::html;
use crate::models::coord::{CoordinateReport, ReportCreate};
use crate::models::received::Received;
use crate::routes::{error_response, store_error_response};
use crate::store::{DocumentStore, StoreError};
use worker::{console_debug, console_error, console_log, Env, Request, Response, Result, RouteContext};

/// GET|POST /gps/{lng},{lat},{imei},{dev},{name}
pub async fn gps(_req: Request, ctx: RouteContext<()>) -> Result<Response> {
    console_debug!("/gps/:report");
    let segment = ctx.param("report").map_or("", |v| v);

    match ReportCreate::from_segment(segment) {
        Some(create) => ingest(create, &ctx.env).await,
        None => error_response(404, "Expected /gps/{lng},{lat},{imei},{dev},{name}."),
    }
}

/// GET|POST /gpsa/{lng},{lat}
pub async fn gps_anonymous(_req: Request, ctx: RouteContext<()>) -> Result<Response> {
    console_debug!("/gpsa/:report");
    let segment = ctx.param("report").map_or("", |v| v);

    match ReportCreate::anonymous_from_segment(segment) {
        Some(create) => ingest(create, &ctx.env).await,
        None => error_response(404, "Expected /gpsa/{lng},{lat}."),
    }
}

async fn ingest(create: ReportCreate, env: &Env) -> Result<Response> {
    console_log!("Received GPS coords.");
    let coordinate1 = create.lng.clone();
    let coordinate2 = create.lat.clone();
    let report = create.into_report(Received::now());

    match save_report(env, &report).await {
        Ok(id) => {
            console_log!("Document {} created in DB.", id);
            Response::from_html(html::gps_confirmation(&coordinate1, &coordinate2))
        }
        Err(e) => {
            console_error!("error in /gps: {:?}", e);
            store_error_response(&e)
        }
    }
}

async fn save_report(env: &Env, report: &CoordinateReport) -> std::result::Result<String, StoreError> {
    let store = DocumentStore::open(env).await?;
    store.insert(&serde_json::to_value(report)?).await
}
