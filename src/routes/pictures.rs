use crate::config::R2_PICTURES;
use crate::html;
use crate::pictures::{
    classify, list_directory, normalize_dir, put_picture, secure_filename, PictureError,
    PictureView, MAX_UPLOAD_BYTES,
};
use crate::routes::error_response;
use crate::util::content_type_from_extension;
use percent_encoding::percent_decode_str;
use wasm_bindgen::JsValue;
use worker::{
    console_debug, console_error, console_log, Cors, FormEntry, Headers, Request, Response, Result,
    RouteContext,
};

fn decoded_param(ctx: &RouteContext<()>, name: &str) -> String {
    let raw = ctx.param(name).map_or("", |v| v);
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// GET /uploader
pub async fn get_uploader(_req: Request, _ctx: RouteContext<()>) -> Result<Response> {
    console_debug!("GET /uploader");
    Response::from_html(html::uploader_form())
}

/// POST /uploader (multipart, field `file`)
pub async fn post_uploader(mut req: Request, ctx: RouteContext<()>) -> Result<Response> {
    console_debug!("POST /uploader");
    let Ok(bucket) = ctx.env.bucket(R2_PICTURES) else {
        return error_response(503, "Picture storage is not configured.");
    };

    let form = match req.form_data().await {
        Ok(form) => form,
        Err(e) => return error_response(400, format!("Invalid form data: {}", e)),
    };
    let Some(FormEntry::File(file)) = form.get("file") else {
        return error_response(400, "Missing 'file' field in request body");
    };

    let original_name = file.name();
    let Some(filename) = secure_filename(&original_name) else {
        return error_response(400, "Invalid filename");
    };

    let bytes = file.bytes().await?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return error_response(413, "payload too large");
    }

    let content_type = match file.type_() {
        ct if ct.is_empty() => content_type_from_extension(&filename).to_string(),
        ct => ct,
    };

    // 保存
    match put_picture(&bucket, &filename, bytes, content_type).await {
        Ok(key) => {
            console_log!("Uploaded {} as {}", original_name, key);
            Response::ok("file uploaded successfully")
        }
        Err(e) => {
            console_error!("failed to store upload: {:?}", e);
            error_response(500, "Internal error occurred.")
        }
    }
}

/// GET /pictures/{path}
pub async fn get_pictures(_req: Request, ctx: RouteContext<()>) -> Result<Response> {
    console_debug!("GET /pictures/*path");
    let Ok(dir) = normalize_dir(&decoded_param(&ctx, "path")) else {
        return error_response(404, "Directory not found.");
    };
    let Ok(bucket) = ctx.env.bucket(R2_PICTURES) else {
        return error_response(503, "Picture storage is not configured.");
    };

    let (files, subdirs) = match list_directory(&bucket, &dir).await {
        Ok(listing) => listing,
        Err(PictureError::InvalidPath) => return error_response(404, "Directory not found."),
        Err(PictureError::WorkerError(e)) => {
            console_error!("failed to list {}: {:?}", dir, e);
            return error_response(500, "Internal error occurred.");
        }
    };
    if !dir.is_empty() && files.is_empty() && subdirs.is_empty() {
        return error_response(404, "Directory not found.");
    }

    match classify(&dir, files, subdirs) {
        PictureView::Gallery(keys) => Response::from_html(html::gallery(&dir, &keys)),
        PictureView::Directory(entries) => Response::from_html(html::directory(&dir, &entries)),
    }
}

/// GET /images/{key}
pub async fn get_image(_req: Request, ctx: RouteContext<()>) -> Result<Response> {
    console_debug!("GET /images/*key");
    let key = decoded_param(&ctx, "key");
    let Ok(bucket) = ctx.env.bucket(R2_PICTURES) else {
        return error_response(503, "Picture storage is not configured.");
    };

    let Some(object) = bucket.get(&key).execute().await? else {
        return error_response(404, "Image not found.");
    };

    // レスポンス
    let headers = Headers::new();
    object.write_http_metadata(headers.clone())?;
    headers.set("etag", &object.http_etag())?;
    let Some(body) = object.body() else {
        return Err(worker::Error::Internal(JsValue::from_str("body is none")));
    };
    Ok(Response::from_bytes(body.bytes().await?)?
        .with_headers(headers)
        .with_cors(&Cors::new().with_origins(vec!["*"]))?
        .with_status(200))
}
