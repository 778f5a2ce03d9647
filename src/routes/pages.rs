use crate::config::R2_PICTURES;
use crate::html;
use crate::pictures::{directory_entries, list_directory, DirEntry};
use worker::{console_debug, console_error, Env, Request, Response, Result, RouteContext};

/// GET /
pub async fn get_landing(_req: Request, ctx: RouteContext<()>) -> Result<Response> {
    console_debug!("GET /");
    let directories = picture_root(&ctx.env).await;
    Response::from_html(html::landing(&directories))
}

/// 画像フォルダの一覧。バケットが無い・読めないときは空
async fn picture_root(env: &Env) -> Vec<DirEntry> {
    let Ok(bucket) = env.bucket(R2_PICTURES) else {
        return vec![];
    };
    match list_directory(&bucket, "").await {
        Ok((files, subdirs)) => directory_entries("", files, subdirs),
        Err(e) => {
            console_error!("failed to list pictures: {:?}", e);
            vec![]
        }
    }
}

/// GET /iotpost
pub async fn get_iotpost(_req: Request, _ctx: RouteContext<()>) -> Result<Response> {
    console_debug!("GET /iotpost");
    Response::from_html(html::iotpost())
}
