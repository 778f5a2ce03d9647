pub mod gps;
pub mod map;
pub mod pages;
pub mod pictures;

use crate::service::cloudant::CloudantError;
use crate::store::StoreError;
use worker::{Response, Result};

pub fn error_response(status: u16, message: impl Into<String>) -> Result<Response> {
    Ok(Response::from_json(&serde_json::json!({
        "code": status,
        "message": message.into()
    }))?
    .with_status(status))
}

pub fn store_error_response(error: &StoreError) -> Result<Response> {
    let (status, message) = store_error_status(error);
    error_response(status, message)
}

/// ストアのエラーを HTTP ステータスとメッセージに対応付ける
fn store_error_status(error: &StoreError) -> (u16, String) {
    match error {
        StoreError::NotConfigured => (503, "Document store is not configured.".into()),
        StoreError::CloudantError(CloudantError::PartialDelete { failed, .. }) => (
            502,
            format!("{} documents could not be deleted.", failed.len()),
        ),
        StoreError::CloudantError(_) | StoreError::KvError(_) | StoreError::WorkerError(_) => {
            (502, "Document store request failed.".into())
        }
        StoreError::SerdeError(_) => (500, "Internal error occurred.".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_delete_is_upstream_failure() {
        let error = StoreError::from(CloudantError::PartialDelete {
            deleted: 1,
            failed: vec!["b".into()],
        });
        assert_eq!(
            store_error_status(&error),
            (502, "1 documents could not be deleted.".to_string())
        );
    }

    #[test]
    fn test_not_configured_is_unavailable() {
        assert_eq!(store_error_status(&StoreError::NotConfigured).0, 503);
    }
}
