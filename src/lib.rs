//! `metabase-client` is an async HTTP client for the MetaBase REST API.
//!
//! Every call goes through [`MetaBaseClient::execute`] and returns an
//! [`ApiResponse`]: either the decoded payload with pagination metadata, or a
//! normalized [`ApiError`]. Network failures and error statuses are data,
//! never `Err`.
//!
//! Surfaces:
//! - table CRUD: [`MetaBaseClient::query`], [`MetaBaseClient::insert`], ...
//! - API keys: [`MetaBaseClient::keys`]
//! - files: [`MetaBaseClient::files`]
//! - realtime (feature `realtime`): [`MetaBaseClient::realtime`]

mod client;
mod decode;
mod error;
mod options;
mod params;
mod table;
mod types;
mod wire;

pub mod files;
pub mod keys;
#[cfg(feature = "realtime")]
pub mod realtime;

pub use client::{join_url, MetaBaseClient, USER_AGENT};
pub use error::MetaBaseError;
pub use options::{ClientConfig, DEFAULT_TIMEOUT_MS};
pub use params::{
    Filter, InsertOptions, JoinClause, JoinKind, QueryOptions, QueryParams, UpdateOptions,
};
pub use reqwest::Method;
pub use table::Row;
pub use types::{
    ApiError, ApiResponse, CacheStatus, Column, DatabaseStatus, HealthResponse, Index,
    Pagination, Success, TableSchema, DECODE_ERROR, NETWORK_ERROR,
};

pub type Result<T> = std::result::Result<T, MetaBaseError>;
