use thiserror::Error;
use worker::{Bucket, HttpMetadata};

/// アップロード先のディレクトリ
pub const UPLOAD_DIR: &str = "dir";
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".png", ".jpeg"];

#[derive(Error, Debug)]
pub enum PictureError {
    #[error("invalid path")]
    InvalidPath,
    #[error(transparent)]
    WorkerError(#[from] worker::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirEntry {
    /// `/pictures/` 以下のパス
    pub path: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PictureView {
    /// 画像を含むディレクトリ。値は `/images/` 以下のキー
    Gallery(Vec<String>),
    Directory(Vec<DirEntry>),
}

/// ファイル名を安全な ASCII 名に変換する。何も残らなければ None
pub fn secure_filename(filename: &str) -> Option<String> {
    let ascii: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// `a//b/./c/` → `a/b/c`。`..` を含むパスは拒否する
pub fn normalize_dir(path: &str) -> Result<String, PictureError> {
    let mut segments = vec![];
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(PictureError::InvalidPath),
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

pub fn is_image(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// 画像が 1 つでもあればギャラリー、無ければディレクトリ一覧
pub fn classify(dir: &str, files: Vec<String>, subdirs: Vec<String>) -> PictureView {
    if files.iter().any(|f| is_image(f)) {
        return PictureView::Gallery(files.iter().map(|f| join(dir, f)).collect());
    }
    PictureView::Directory(directory_entries(dir, files, subdirs))
}

pub fn directory_entries(dir: &str, files: Vec<String>, subdirs: Vec<String>) -> Vec<DirEntry> {
    let mut names: Vec<String> = subdirs.into_iter().chain(files).collect();
    names.sort();
    names
        .into_iter()
        .map(|name| DirEntry {
            path: join(dir, &name),
            name,
        })
        .collect()
}

/// `dir` 直下のファイル名とサブディレクトリ名を返す
pub async fn list_directory(
    bucket: &Bucket,
    dir: &str,
) -> Result<(Vec<String>, Vec<String>), PictureError> {
    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", dir)
    };

    let mut files = vec![];
    let mut subdirs = vec![];
    let mut cursor: Option<String> = None;
    loop {
        let mut list = bucket.list().prefix(prefix.clone()).delimiter("/".to_string());
        if let Some(c) = cursor.take() {
            list = list.cursor(c);
        }
        let page = list.execute().await?;
        for object in page.objects() {
            if let Some(name) = object.key().strip_prefix(&prefix) {
                if !name.is_empty() {
                    files.push(name.to_string());
                }
            }
        }
        for sub in page.delimited_prefixes() {
            if let Some(name) = sub.strip_prefix(&prefix) {
                let name = name.trim_end_matches('/');
                if !name.is_empty() {
                    subdirs.push(name.to_string());
                }
            }
        }
        if !page.truncated() {
            break;
        }
        match page.cursor() {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }

    files.sort();
    subdirs.sort();
    Ok((files, subdirs))
}

/// 画像をr2 bucketに保存し、保存先のキーを返す
pub async fn put_picture(
    bucket: &Bucket,
    filename: &str,
    bytes: Vec<u8>,
    content_type: String,
) -> Result<String, PictureError> {
    let key = join(UPLOAD_DIR, filename);
    bucket
        .put(&key, bytes)
        .http_metadata(HttpMetadata {
            content_type: Some(content_type),
            ..Default::default()
        })
        .execute()
        .await?;

    Ok(key)
}
