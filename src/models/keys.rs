use worker::kv::{KvError, KvStore};

/// KV の全キーを取得する (カーソルで最後までページング)
pub async fn list_keys(kv: &KvStore) -> Result<Vec<String>, KvError> {
    let mut keys = vec![];
    let mut cursor: Option<String> = None;
    loop {
        let mut list = kv.list();
        if let Some(c) = cursor.take() {
            list = list.cursor(c);
        }
        let page = list.execute().await?;
        keys.extend(page.keys.into_iter().map(|key| key.name));
        if page.list_complete {
            break;
        }
        match page.cursor {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }

    Ok(keys)
}
