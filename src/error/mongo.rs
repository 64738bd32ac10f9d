use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured error information extracted from MongoDB driver errors.
///
/// Serialized to JSON by the [`ProviderError`](super::ProviderError)
/// `Display` impl so that callers (shell frontends, logs) get a stable
/// shape instead of the driver's free-form messages.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) details: Option<ErrorDetails>,
}

/// Additional detail extracted from a write error's `errInfo` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) key: Option<bson::Document>,
}

/// Format a MongoDB driver error as pretty JSON wrapped in an `error` field.
///
/// Used by the parent module's `Display` implementation for
/// `ProviderError::MongoDb`.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let info = extract_error_info(error);
    let wrapper = serde_json::json!({ "error": info });
    let json_output = serde_json::to_string_pretty(&wrapper).map_err(|_| fmt::Error)?;
    write!(f, "\n{json_output}")
}

/// Extract structured information from a MongoDB error using the driver's
/// typed error structures, avoiding string parsing where possible.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::{ErrorKind, WriteFailure};

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Write(write_failure) => {
            info.error_type = Some("mongo.write_error".to_string());

            match write_failure {
                WriteFailure::WriteError(write_error) => {
                    info.code = Some(write_error.code);
                    info.message = Some(write_error.message.clone());
                    info.name = error_name(write_error.code);
                    info.details = Some(details_from(&write_error.details));
                }
                WriteFailure::WriteConcernError(wc_error) => {
                    info.code = Some(wc_error.code);
                    info.message = Some(wc_error.message.clone());
                    info.name = error_name(wc_error.code);
                }
                _ => {}
            }
        }
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
            info.name = error_name(command_error.code);
        }
        ErrorKind::BulkWrite(bulk_error) => {
            info.error_type = Some("mongo.bulk_write_error".to_string());
            // BulkWriteError doesn't expose the structured fields we want.
            info.message = Some(format!("{bulk_error:?}"));
        }
        ErrorKind::InsertMany(insert_error) => {
            info.error_type = Some("mongo.insert_many_error".to_string());

            if let Some(write_errors) = &insert_error.write_errors {
                if let Some(first_error) = write_errors.first() {
                    info.code = Some(first_error.code);
                    info.message = Some(first_error.message.clone());
                    info.name = error_name(first_error.code);
                    info.details = Some(details_from(&first_error.details));
                }
            } else if let Some(wc_error) = &insert_error.write_concern_error {
                info.code = Some(wc_error.code);
                info.message = Some(wc_error.message.clone());
                info.name = error_name(wc_error.code);
            }
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("mongo.authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("mongo.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            // For other error types, fall back to the Display representation.
            info.message = Some(error.to_string());
        }
    }

    // Simplify message for duplicate key errors to avoid redundancy.
    if let Some(11000 | 11001) = info.code {
        info.message = Some("Duplicate key error".to_string());
    }

    info
}

/// Human-readable error name for well-known MongoDB error codes.
fn error_name(code: i32) -> Option<String> {
    let name = match code {
        11000 | 11001 => "DuplicateKey",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        50 => "MaxTimeMSExpired",
        121 => "DocumentValidationFailure",
        _ => return None,
    };

    Some(name.to_string())
}

/// Extract collection, index, and key information from a write error's
/// optional `errInfo` document.
fn details_from(error_details: &Option<bson::Document>) -> ErrorDetails {
    let mut details = ErrorDetails {
        collection: None,
        index: None,
        key: None,
    };

    if let Some(doc) = error_details {
        if let Some(bson::Bson::String(ns)) = doc.get("namespace").or_else(|| doc.get("ns")) {
            details.collection = Some(ns.clone());
        }

        if let Some(bson::Bson::String(idx)) = doc.get("index").or_else(|| doc.get("indexName")) {
            details.index = Some(idx.clone());
        }

        if let Some(bson::Bson::Document(key_doc)) =
            doc.get("keyPattern").or_else(|| doc.get("keyValue"))
        {
            details.key = Some(key_doc.clone());
        }
    }

    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_error_name_known_codes() {
        assert_eq!(error_name(11000).as_deref(), Some("DuplicateKey"));
        assert_eq!(error_name(26).as_deref(), Some("NamespaceNotFound"));
        assert_eq!(error_name(9999), None);
    }

    #[test]
    fn test_details_extraction() {
        let err_info = doc! {
            "ns": "test.users",
            "index": "email_1",
            "keyPattern": { "email": 1 },
        };
        let details = details_from(&Some(err_info));
        assert_eq!(details.collection.as_deref(), Some("test.users"));
        assert_eq!(details.index.as_deref(), Some("email_1"));
        assert_eq!(details.key, Some(doc! { "email": 1 }));
    }

    #[test]
    fn test_error_info_serializes_without_empty_fields() {
        let info = ErrorInfo {
            error_type: Some("mongo.command_error".to_string()),
            code: Some(26),
            ..Default::default()
        };
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(json, r#"{"type":"mongo.command_error","code":26}"#);
    }
}
