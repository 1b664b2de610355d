//! File storage (`/files/v1`).

use chrono::{DateTime, Utc};
use reqwest::{
    multipart::{Form, Part},
    Method,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    client::{classify, path_segment},
    decode::{decode_error, decode_typed},
    wire::null_as_default,
    ApiResponse, MetaBaseClient, MetaBaseError, QueryParams, Result, Success,
};

const FILES_ROOT: &str = "/files/v1";

/// Options for [`FileManager::upload`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileUploadOptions {
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub metadata: Map<String, Value>,
    pub public: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl FileUploadOptions {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Self::default()
        }
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default, alias = "url")]
    pub download_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
}

/// Options for [`FileManager::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileListOptions {
    pub search: Option<String>,
    pub mime_type: Option<String>,
    pub public: Option<bool>,
    pub created_by: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub limit: u64,
    pub offset: u64,
    pub sort_by: String,
    pub sort_order: String,
}

impl Default for FileListOptions {
    fn default() -> Self {
        Self {
            search: None,
            mime_type: None,
            public: None,
            created_by: None,
            min_size: None,
            max_size: None,
            created_after: None,
            created_before: None,
            limit: 50,
            offset: 0,
            sort_by: "created_at".to_owned(),
            sort_order: "desc".to_owned(),
        }
    }
}

impl FileListOptions {
    fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params.push_opt("search", self.search.as_deref());
        params.push_opt("mime_type", self.mime_type.as_deref());
        params.push_opt("public", self.public);
        params.push_opt("created_by", self.created_by.as_deref());
        params.push_opt("min_size", self.min_size);
        params.push_opt("max_size", self.max_size);
        params.push_opt("created_after", self.created_after.as_deref());
        params.push_opt("created_before", self.created_before.as_deref());
        params.push("limit", self.limit.to_string());
        params.push("offset", self.offset.to_string());
        params.push("sort_by", self.sort_by.as_str());
        params.push("sort_order", self.sort_order.as_str());
        params
    }
}

/// The list endpoint answers either with a bare array or `{files, total}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum FileListPayload {
    Wrapped {
        #[serde(deserialize_with = "null_as_default")]
        files: Vec<FileInfo>,
        #[serde(default)]
        total: Option<u64>,
    },
    Bare(Option<Vec<FileInfo>>),
}

fn file_path(id: &str) -> Result<String> {
    Ok(format!("{FILES_ROOT}/{}", path_segment(id)?))
}

/// File calls, borrowed from a [`MetaBaseClient`].
#[derive(Clone, Copy, Debug)]
pub struct FileManager<'a> {
    client: &'a MetaBaseClient,
}

impl MetaBaseClient {
    pub fn files(&self) -> FileManager<'_> {
        FileManager { client: self }
    }
}

impl FileManager<'_> {
    /// Uploads `contents` as a multipart form (`file` part plus option fields).
    pub async fn upload(
        &self,
        contents: impl Into<Vec<u8>>,
        options: &FileUploadOptions,
    ) -> Result<ApiResponse<FileInfo>> {
        let http = self.client.http()?;
        let url = self.client.url(&format!("{FILES_ROOT}/upload"));
        let contents = contents.into();
        let size = contents.len();
        let form = upload_form(contents, options)?;

        let summary = format!(
            "multipart file={} bytes={size}",
            options.filename.as_deref().unwrap_or("upload")
        );
        self.client
            .trace_request(&Method::POST, &url, Some(&summary), &QueryParams::new());

        let request = http.post(&url).multipart(form);
        Ok(match self.client.send(request).await {
            Ok((status, body)) => decode_typed(classify(status, &body)),
            Err(error) => ApiResponse::Error(error),
        })
    }

    /// Downloads raw file contents.
    pub async fn download(&self, id: &str) -> Result<ApiResponse<Vec<u8>>> {
        let http = self.client.http()?;
        let url = self.client.url(&file_path(id)?);
        self.client
            .trace_request(&Method::GET, &url, None, &QueryParams::new());

        Ok(match self.client.send(http.get(&url)).await {
            Ok((status, body)) if status >= 400 => {
                ApiResponse::Error(decode_error(status, &String::from_utf8_lossy(&body)))
            }
            Ok((_, body)) => ApiResponse::ok(body),
            Err(error) => ApiResponse::Error(error),
        })
    }

    /// Fetches file metadata.
    pub async fn info(&self, id: &str) -> Result<ApiResponse<FileInfo>> {
        self.client
            .execute_as(
                Method::GET,
                &format!("{}/info", file_path(id)?),
                None,
                &QueryParams::new(),
            )
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<ApiResponse<Value>> {
        self.client
            .execute(
                Method::DELETE,
                &file_path(id)?,
                None,
                &QueryParams::new(),
            )
            .await
    }

    pub async fn list(
        &self,
        options: Option<&FileListOptions>,
    ) -> Result<ApiResponse<Vec<FileInfo>>> {
        let params = options.cloned().unwrap_or_default().to_params();
        let response = self
            .client
            .execute_as::<FileListPayload>(Method::GET, FILES_ROOT, None, &params)
            .await?;

        Ok(match response {
            ApiResponse::Success(Success {
                data: FileListPayload::Wrapped { files, total },
                mut pagination,
            }) => {
                pagination.count = pagination.count.or(total);
                ApiResponse::Success(Success {
                    data: files,
                    pagination,
                })
            }
            ApiResponse::Success(Success {
                data: FileListPayload::Bare(files),
                pagination,
            }) => ApiResponse::Success(Success {
                data: files.unwrap_or_default(),
                pagination,
            }),
            ApiResponse::Error(error) => ApiResponse::Error(error),
        })
    }
}

fn upload_form(contents: Vec<u8>, options: &FileUploadOptions) -> Result<Form> {
    let filename = options
        .filename
        .clone()
        .unwrap_or_else(|| "upload".to_owned());
    let mut part = Part::bytes(contents).file_name(filename);
    if let Some(mime_type) = &options.mime_type {
        part = part.mime_str(mime_type).map_err(|err| {
            MetaBaseError::Invalid(format!("invalid mime type '{mime_type}': {err}"))
        })?;
    }

    let mut form = Form::new().part("file", part);
    if !options.metadata.is_empty() {
        form = form.text("metadata", Value::Object(options.metadata.clone()).to_string());
    }
    if options.public {
        form = form.text("public", "true");
    }
    if let Some(expires_at) = options.expires_at {
        form = form.text("expires_at", expires_at.to_rfc3339());
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{file_path, upload_form, FileInfo, FileListOptions, FileListPayload, FileUploadOptions};
    use crate::MetaBaseError;

    #[test]
    fn null_file_lists_are_empty() {
        let bare: FileListPayload = serde_json::from_value(json!(null)).expect("null list");
        assert!(matches!(bare, FileListPayload::Bare(None)));

        let wrapped: FileListPayload =
            serde_json::from_value(json!({"files": null, "total": 0})).expect("wrapped null");
        match wrapped {
            FileListPayload::Wrapped { files, total } => {
                assert!(files.is_empty());
                assert_eq!(total, Some(0));
            }
            FileListPayload::Bare(_) => panic!("expected wrapped payload"),
        }
    }

    #[test]
    fn file_ids_are_escaped() {
        assert_eq!(file_path("a/b").expect("path"), "/files/v1/a%2Fb");
        assert!(file_path(".").is_err());
    }

    #[test]
    fn file_info_accepts_url_alias() {
        let info: FileInfo = serde_json::from_value(json!({
            "id": "file_1",
            "filename": "a.txt",
            "size": 3,
            "mime_type": "text/plain",
            "url": "/files/file_1"
        }))
        .expect("must decode");
        assert_eq!(info.download_url, "/files/file_1");
        assert!(info.public_url.is_none());
    }

    #[test]
    fn list_defaults_sort_newest_first() {
        let params = FileListOptions::default().to_params();
        assert_eq!(params.get("sort_by"), Some("created_at"));
        assert_eq!(params.get("sort_order"), Some("desc"));
        assert_eq!(params.get("limit"), Some("50"));
        assert_eq!(params.get("public"), None);
    }

    #[test]
    fn invalid_mime_type_is_rejected() {
        let options = FileUploadOptions::new("a.bin").mime_type("not a mime");
        let err = upload_form(vec![1, 2, 3], &options).expect_err("must fail");
        assert!(matches!(err, MetaBaseError::Invalid(_)));
    }
}
