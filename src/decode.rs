use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};

use crate::{
    types::{http_code, now_timestamp, reason_phrase, DECODE_ERROR},
    wire::{ErrorBody, ErrorObject, WireError, WirePagination},
    ApiError, ApiResponse, Pagination, Success,
};

/// Classifies a body received with a status below 400.
pub(crate) fn decode_success(body: &str) -> ApiResponse<Value> {
    if body.trim().is_empty() {
        return ApiResponse::ok(Value::Null);
    }

    let value = match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(err) => {
            return ApiResponse::Error(
                ApiError::new(DECODE_ERROR, format!("invalid response JSON: {err}"))
                    .with_details(truncate(body)),
            )
        }
    };

    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            let data = map.remove("data").unwrap_or(Value::Null);
            ApiResponse::Success(Success {
                data,
                pagination: read_pagination(&map),
            })
        }
        other => ApiResponse::ok(other),
    }
}

/// Classifies a success body that may be plain text instead of JSON.
///
/// Text that does not parse as JSON becomes a string payload.
pub(crate) fn decode_text(body: &str) -> ApiResponse<Value> {
    if body.trim().is_empty() || serde_json::from_str::<Value>(body).is_ok() {
        return decode_success(body);
    }
    ApiResponse::ok(Value::String(body.trim().to_owned()))
}

/// Builds the error for a status of 400 or above.
///
/// Every field the body does not supply falls back to the status defaults;
/// a body that is not JSON at all yields the bare status error.
pub(crate) fn decode_error(status: u16, body: &str) -> ApiError {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return ApiError::http_status(status);
    };

    let object = match parsed.error {
        Some(WireError::Structured(object)) => object,
        Some(WireError::Message(message)) => ErrorObject {
            message: Some(Value::String(message)),
            details: parsed.details,
            ..ErrorObject::default()
        },
        Some(WireError::Other(_)) | None => ErrorObject::default(),
    };

    ApiError {
        code: string_field(object.code).unwrap_or_else(|| http_code(status)),
        message: string_field(object.message).unwrap_or_else(|| reason_phrase(status)),
        details: object.details.and_then(details_field),
        timestamp: string_field(object.timestamp).unwrap_or_else(now_timestamp),
    }
}

/// Decodes the JSON payload of a success envelope into `T`.
pub(crate) fn decode_typed<T: DeserializeOwned>(response: ApiResponse<Value>) -> ApiResponse<T> {
    match response {
        ApiResponse::Success(Success { data, pagination }) => {
            match T::deserialize(&data) {
                Ok(data) => ApiResponse::Success(Success { data, pagination }),
                Err(err) => ApiResponse::Error(
                    ApiError::new(DECODE_ERROR, format!("unexpected response payload: {err}"))
                        .with_details(truncate(&data.to_string())),
                ),
            }
        }
        ApiResponse::Error(error) => ApiResponse::Error(error),
    }
}

/// Like [`decode_typed`] for list payloads; `null` is an empty list.
pub(crate) fn decode_list<T: DeserializeOwned>(response: ApiResponse<Value>) -> ApiResponse<Vec<T>> {
    decode_typed::<Option<Vec<T>>>(response).map(Option::unwrap_or_default)
}

fn read_pagination(map: &Map<String, Value>) -> Pagination {
    let nested = map
        .get("pagination")
        .cloned()
        .and_then(|value| serde_json::from_value::<WirePagination>(value).ok())
        .unwrap_or_default();

    let pick = |key: &str, nested: &Option<Value>| {
        map.get(key)
            .filter(|value| !value.is_null())
            .or(nested.as_ref())
            .cloned()
    };

    Pagination {
        count: pick("count", &nested.count).and_then(|value| value.as_u64()),
        limit: pick("limit", &nested.limit).and_then(|value| value.as_u64()),
        offset: pick("offset", &nested.offset).and_then(|value| value.as_u64()),
        has_next: pick("has_next", &nested.has_next).and_then(|value| value.as_bool()),
    }
}

fn string_field(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn details_field(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

fn truncate(body: &str) -> String {
    const LIMIT: usize = 512;
    match body.char_indices().nth(LIMIT) {
        Some((index, _)) => format!("{}...", &body[..index]),
        None => body.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use crate::{decode, ApiResponse, Pagination};

    #[test]
    fn data_envelope_is_unwrapped_with_pagination() {
        let body = json!({"data": [{"id": 1}], "count": 3, "limit": 1, "offset": 0, "has_next": true});
        let response = decode::decode_success(&body.to_string());

        match response {
            ApiResponse::Success(success) => {
                assert_eq!(success.data, json!([{"id": 1}]));
                assert_eq!(
                    success.pagination,
                    Pagination {
                        count: Some(3),
                        limit: Some(1),
                        offset: Some(0),
                        has_next: Some(true),
                    }
                );
            }
            ApiResponse::Error(err) => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn absent_pagination_fields_stay_none() {
        let response = decode::decode_success(r#"{"data": {"id": 1}, "count": 7}"#);
        let pagination = response.pagination().expect("must be success");
        assert_eq!(pagination.count, Some(7));
        assert_eq!(pagination.limit, None);
        assert_eq!(pagination.offset, None);
        assert_eq!(pagination.has_next, None);
    }

    #[test]
    fn body_without_data_key_is_whole_payload() {
        let body = json!({"status": "ok", "count": 2});
        let response = decode::decode_success(&body.to_string());
        assert_eq!(response.data(), Some(&body));
        assert!(response.pagination().expect("must be success").is_empty());
    }

    #[test]
    fn bare_array_and_string_are_payloads() {
        let response = decode::decode_success(r#"["users","posts"]"#);
        assert_eq!(response.data(), Some(&json!(["users", "posts"])));

        let response = decode::decode_success(r#""pong""#);
        assert_eq!(response.data(), Some(&json!("pong")));
    }

    #[test]
    fn nested_pagination_object_is_read() {
        let body = json!({"data": [], "pagination": {"limit": 20, "offset": 40, "count": 0}});
        let response = decode::decode_success(&body.to_string());
        let pagination = response.pagination().expect("must be success");
        assert_eq!(pagination.limit, Some(20));
        assert_eq!(pagination.offset, Some(40));
        assert_eq!(pagination.count, Some(0));
    }

    #[test]
    fn empty_success_body_is_null() {
        let response = decode::decode_success("");
        assert_eq!(response.data(), Some(&serde_json::Value::Null));
    }

    #[test]
    fn invalid_success_json_is_decode_error() {
        let response = decode::decode_success("<html>");
        let err = response.error().expect("must be error");
        assert_eq!(err.code, "decode_error");
        assert_eq!(err.details.as_deref(), Some("<html>"));
    }

    #[test]
    fn structured_error_is_reflected() {
        let body = json!({"error": {
            "code": "invalid_query",
            "message": "bad column",
            "details": "column x",
            "timestamp": "2024-05-01T10:00:00Z"
        }});
        let err = decode::decode_error(400, &body.to_string());
        assert_eq!(err.code, "invalid_query");
        assert_eq!(err.message, "bad column");
        assert_eq!(err.details.as_deref(), Some("column x"));
        assert_eq!(err.timestamp, "2024-05-01T10:00:00Z");
    }

    #[test]
    fn missing_error_fields_fall_back() {
        let err = decode::decode_error(404, r#"{"error":{"message":"not found"}}"#);
        assert_eq!(err.code, "http_404");
        assert_eq!(err.message, "not found");
        assert!(err.details.is_none());
        assert!(err.timestamp.ends_with('Z'));
    }

    #[test]
    fn unparsable_error_body_uses_status() {
        let err = decode::decode_error(502, "upstream exploded");
        assert_eq!(err.code, "http_502");
        assert_eq!(err.message, "Bad Gateway");
        assert!(err.details.is_none());
    }

    #[test]
    fn non_object_error_body_uses_status() {
        let err = decode::decode_error(500, "[1,2,3]");
        assert_eq!(err.code, "http_500");
        assert_eq!(err.message, "Internal Server Error");
    }

    #[test]
    fn string_error_with_top_level_details() {
        let err = decode::decode_error(
            400,
            r#"{"error":"Invalid JSON data","details":"unexpected EOF"}"#,
        );
        assert_eq!(err.code, "http_400");
        assert_eq!(err.message, "Invalid JSON data");
        assert_eq!(err.details.as_deref(), Some("unexpected EOF"));
    }

    #[test]
    fn structured_details_become_json_text() {
        let err = decode::decode_error(422, r#"{"error":{"details":{"field":"email"}}}"#);
        assert_eq!(err.message, "Unprocessable Entity");
        assert_eq!(err.details.as_deref(), Some(r#"{"field":"email"}"#));
    }

    #[test]
    fn typed_decode_failure_is_envelope_error() {
        #[derive(Debug, Deserialize)]
        struct Row {
            #[allow(dead_code)]
            id: i64,
        }

        let response = decode::decode_typed::<Vec<Row>>(decode::decode_success(r#"{"data":"nope"}"#));
        assert_eq!(response.error().map(|err| err.code.as_str()), Some("decode_error"));
    }

    #[test]
    fn typed_decode_failure_keeps_payload_in_details() {
        #[derive(Debug, Deserialize)]
        struct Key {
            #[allow(dead_code)]
            id: String,
        }

        let response =
            decode::decode_typed::<Key>(decode::decode_success(r#"{"error":"Name is required"}"#));
        let err = response.error().expect("mismatch must be an error");
        assert_eq!(err.code, "decode_error");
        assert_eq!(err.details.as_deref(), Some(r#"{"error":"Name is required"}"#));
    }

    #[test]
    fn plain_text_success_is_string_payload() {
        assert_eq!(
            decode::decode_text("pong\n").data(),
            Some(&json!("pong"))
        );
        assert_eq!(
            decode::decode_text(r#"{"data":"pong"}"#).data(),
            Some(&json!("pong"))
        );
    }

    #[test]
    fn null_list_payload_is_empty() {
        let response =
            decode::decode_list::<serde_json::Value>(decode::decode_success(r#"{"data":null,"count":0}"#));
        match response {
            ApiResponse::Success(success) => {
                assert!(success.data.is_empty());
                assert_eq!(success.pagination.count, Some(0));
            }
            ApiResponse::Error(err) => panic!("unexpected error: {err}"),
        }
    }
}
