mod config;
mod html;
mod models;
mod pictures;
mod routes;
mod service;
mod store;
mod util;

use crate::routes::{gps, map, pages, pictures as picture_routes};
use worker::*;

#[event(fetch)]
async fn fetch(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    console_error_panic_hook::set_once();

    // Router設定
    let router = Router::new();

    router
        .get_async("/", pages::get_landing)
        .get_async("/iotpost", pages::get_iotpost)
        // 位置情報の受信 (GET/POST どちらも受け付ける)
        .get_async("/gps/:report", gps::gps)
        .post_async("/gps/:report", gps::gps)
        .get_async("/gpsa/:report", gps::gps_anonymous)
        .post_async("/gpsa/:report", gps::gps_anonymous)
        // 地図表示と一括削除
        .get_async("/map", map::get_map)
        .get_async("/clear", map::clear)
        .post_async("/clear", map::clear)
        // 画像
        .get_async("/uploader", picture_routes::get_uploader)
        .post_async("/uploader", picture_routes::post_uploader)
        .get_async("/pictures", picture_routes::get_pictures)
        .get_async("/pictures/*path", picture_routes::get_pictures)
        .get_async("/images/*key", picture_routes::get_image)
        .run(req, env)
        .await
}
