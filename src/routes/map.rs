use crate::html;
use crate::models::marker::{fold_markers, FoldError, MapMarker};
use crate::routes::{error_response, store_error_response};
use crate::store::{DocumentStore, StoreError};
use thiserror::Error;
use worker::{console_debug, console_error, console_log, Env, Request, Response, Result, RouteContext};

#[derive(Error, Debug)]
enum MapError {
    #[error(transparent)]
    StoreError(#[from] StoreError),
    #[error(transparent)]
    FoldError(#[from] FoldError),
}

/// GET /map
pub async fn get_map(_req: Request, ctx: RouteContext<()>) -> Result<Response> {
    console_debug!("GET /map");
    console_log!("Creating map with saved points.");

    let markers = match load_markers(&ctx.env).await {
        Ok(markers) => markers,
        Err(MapError::StoreError(e)) => {
            console_error!("error in /map: {:?}", e);
            return store_error_response(&e);
        }
        Err(MapError::FoldError(e)) => {
            console_error!("error in /map: {}", e);
            return error_response(500, e.to_string());
        }
    };

    match html::map(&markers) {
        Ok(page) => Response::from_html(page),
        Err(e) => {
            console_error!("failed to render map: {:?}", e);
            error_response(500, "Internal error occurred.")
        }
    }
}

async fn load_markers(env: &Env) -> std::result::Result<Vec<MapMarker>, MapError> {
    let store = DocumentStore::open(env).await?;
    let documents = store.all_documents().await?;
    Ok(fold_markers(&documents)?)
}

/// GET|POST /clear
pub async fn clear(req: Request, ctx: RouteContext<()>) -> Result<Response> {
    console_debug!("/clear");

    console_log!("Clearing database.");
    let cleared = match DocumentStore::open(&ctx.env).await {
        Ok(store) => store.clear_coords().await,
        Err(e) => Err(e),
    };
    match cleared {
        Ok(deleted) => {
            console_log!("Deleted {} documents.", deleted);
            let url = req
                .url()?
                .join("/map")
                .map_err(|e| worker::Error::RustError(e.to_string()))?;
            Response::redirect(url)
        }
        Err(e) => {
            console_error!("error in /clear: {:?}", e);
            store_error_response(&e)
        }
    }
}
