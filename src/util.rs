use serde::de::DeserializeOwned;
use std::collections::HashMap;
use js_sys::{Array, Promise};
use wasm_bindgen::prelude::{wasm_bindgen, Closure};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use worker::{kv::KvStore, Error};

/// KV bulk get の 1 回あたりの最大キー数
pub const KV_BULK_LIMIT: usize = 100;

#[wasm_bindgen(module = "/src/js/kv_bulk.js")]
extern "C" {
    #[wasm_bindgen(js_name = kv_bulk_get)]
    pub fn kv_bulk_get_js(kv: &JsValue, keys: Array, ty: &str, with_metadata: bool) -> Promise;
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_name = setTimeout)]
    fn set_timeout(closure: &Closure<dyn FnMut()>, timeout: u32) -> f64;
}

/// `keys` の値を JSON としてまとめて取得する (最大 [`KV_BULK_LIMIT`] 件)
pub async fn kv_bulk_get_values<T: DeserializeOwned>(
    kv: &KvStore,
    keys: &[String],
) -> worker::Result<HashMap<String, Option<T>>> {
    let js_kv: &JsValue = unsafe { std::mem::transmute(kv) }; // KvStoreをJsValueとして扱う
    let arr = Array::new();
    for k in keys {
        arr.push(&JsValue::from_str(k));
    }

    let p = kv_bulk_get_js(js_kv, arr, "json", false);
    let js_val = JsFuture::from(p)
        .await
        .map_err(|e| Error::RustError(format!("{e:?}")))?;
    // JS Object -> HashMap<String, Option<T>>
    let map: HashMap<String, Option<T>> = serde_wasm_bindgen::from_value(js_val)
        .map_err(|e| Error::RustError(format!("serde_wasm_bindgen: {e}")))?;
    Ok(map)
}

pub async fn sleep_ms(ms: u64) {
    let promise = Promise::new(&mut |resolve, _| {
        let resolve_clone = resolve.clone();
        let closure = Closure::wrap(Box::new(move || {
            let _ = resolve_clone.call0(&JsValue::NULL);
        }) as Box<dyn FnMut()>);
        set_timeout(&closure, ms as u32);
        closure.forget();
    });

    let _ = JsFuture::from(promise).await;
}

pub fn content_type_from_extension(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type_from_extension("a.png"), "image/png");
        assert_eq!(content_type_from_extension("a.JPG"), "image/jpeg");
        assert_eq!(content_type_from_extension("a.tar.jpeg"), "image/jpeg");
        assert_eq!(content_type_from_extension("README"), "application/octet-stream");
    }
}
