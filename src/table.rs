use std::fmt::Display;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::{
    client::{classify, path_segment},
    decode::{decode_list, decode_text},
    params::push_returning,
    ApiResponse, Filter, HealthResponse, InsertOptions, MetaBaseClient, QueryOptions, QueryParams,
    Result, TableSchema, UpdateOptions,
};

/// One table row as returned by the REST endpoints.
pub type Row = Map<String, Value>;

fn table_path(table: &str) -> Result<String> {
    Ok(format!("/rest/v1/{}", path_segment(table)?))
}

fn record_path(table: &str, id: impl Display) -> Result<String> {
    Ok(format!(
        "/rest/v1/{}/{}",
        path_segment(table)?,
        path_segment(&id.to_string())?
    ))
}

impl MetaBaseClient {
    /// Checks API health (`GET /rest/health`).
    pub async fn health(&self) -> Result<ApiResponse<HealthResponse>> {
        self.execute_as(Method::GET, "/rest/health", None, &QueryParams::new())
            .await
    }

    /// Connectivity check (`GET /ping`).
    ///
    /// The server answers with plain text; a non-JSON body is returned as a
    /// string payload.
    pub async fn ping(&self) -> Result<ApiResponse<Value>> {
        let http = self.http()?;
        let url = self.url("/ping");
        self.trace_request(&Method::GET, &url, None, &QueryParams::new());

        Ok(match self.send(http.get(&url)).await {
            Ok((status, body)) if status < 400 => decode_text(&String::from_utf8_lossy(&body)),
            Ok((status, body)) => classify(status, &body),
            Err(error) => ApiResponse::Error(error),
        })
    }

    /// Queries rows from a table.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use metabase_client::{ClientConfig, MetaBaseClient, QueryOptions};
    /// use serde_json::json;
    ///
    /// # async fn run() -> metabase_client::Result<()> {
    /// let client = MetaBaseClient::new(ClientConfig::new("http://localhost:7609", "key"))?;
    /// let options = QueryOptions::new()
    ///     .select(["id", "name"])
    ///     .condition("age", json!({"gte": 18}))
    ///     .limit(10);
    /// let users = client.query("users", Some(&options)).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn query(
        &self,
        table: &str,
        options: Option<&QueryOptions>,
    ) -> Result<ApiResponse<Vec<Row>>> {
        self.query_as(table, options).await
    }

    /// Like [`MetaBaseClient::query`], decoding rows into `T`.
    ///
    /// A `null` payload (an empty table) decodes as no rows.
    pub async fn query_as<T: DeserializeOwned>(
        &self,
        table: &str,
        options: Option<&QueryOptions>,
    ) -> Result<ApiResponse<Vec<T>>> {
        let params = match options {
            Some(options) => options.to_params()?,
            None => QueryParams::new(),
        };
        let response = self
            .execute(Method::GET, &table_path(table)?, None, &params)
            .await?;
        Ok(decode_list(response))
    }

    /// Fetches a single record by id.
    pub async fn get(
        &self,
        table: &str,
        id: impl Display,
        select: &[&str],
    ) -> Result<ApiResponse<Row>> {
        self.get_as(table, id, select).await
    }

    pub async fn get_as<T: DeserializeOwned>(
        &self,
        table: &str,
        id: impl Display,
        select: &[&str],
    ) -> Result<ApiResponse<T>> {
        let mut params = QueryParams::new();
        params.push_list("select", select);
        self.execute_as(Method::GET, &record_path(table, id)?, None, &params)
            .await
    }

    /// Inserts one record or a sequence of records.
    ///
    /// The records are sent as the raw JSON body.
    pub async fn insert<B: Serialize + ?Sized>(
        &self,
        table: &str,
        records: &B,
        options: Option<&InsertOptions>,
    ) -> Result<ApiResponse<Value>> {
        let body = serde_json::to_value(records)?;
        let mut params = QueryParams::new();
        push_returning(&mut params, options.map(|options| options.returning.as_slice()));
        self.execute(Method::POST, &table_path(table)?, Some(body), &params)
            .await
    }

    /// Updates every row matching `filter`.
    pub async fn update<B: Serialize + ?Sized>(
        &self,
        table: &str,
        data: &B,
        options: Option<&UpdateOptions>,
        filter: &Filter,
    ) -> Result<ApiResponse<Value>> {
        let body = serde_json::to_value(data)?;
        let mut params = QueryParams::new();
        params.push_filter(filter);
        push_returning(&mut params, options.map(|options| options.returning.as_slice()));
        self.execute(Method::PATCH, &table_path(table)?, Some(body), &params)
            .await
    }

    /// Updates a single record by id.
    pub async fn update_one<B: Serialize + ?Sized>(
        &self,
        table: &str,
        id: impl Display,
        data: &B,
        options: Option<&UpdateOptions>,
    ) -> Result<ApiResponse<Value>> {
        let body = serde_json::to_value(data)?;
        let mut params = QueryParams::new();
        push_returning(&mut params, options.map(|options| options.returning.as_slice()));
        self.execute(Method::PATCH, &record_path(table, id)?, Some(body), &params)
            .await
    }

    /// Deletes every row matching `filter`.
    pub async fn delete(
        &self,
        table: &str,
        options: Option<&UpdateOptions>,
        filter: &Filter,
    ) -> Result<ApiResponse<Value>> {
        let mut params = QueryParams::new();
        params.push_filter(filter);
        push_returning(&mut params, options.map(|options| options.returning.as_slice()));
        self.execute(Method::DELETE, &table_path(table)?, None, &params)
            .await
    }

    /// Deletes a single record by id.
    pub async fn delete_one(
        &self,
        table: &str,
        id: impl Display,
        options: Option<&UpdateOptions>,
    ) -> Result<ApiResponse<Value>> {
        let mut params = QueryParams::new();
        push_returning(&mut params, options.map(|options| options.returning.as_slice()));
        self.execute(Method::DELETE, &record_path(table, id)?, None, &params)
            .await
    }

    /// Lists table names (`GET /rest/v1`).
    pub async fn list_tables(&self) -> Result<ApiResponse<Vec<String>>> {
        let response = self
            .execute(Method::GET, "/rest/v1", None, &QueryParams::new())
            .await?;
        Ok(decode_list(response))
    }

    /// Fetches a table definition (`GET /rest/v1/{table}/schema`).
    pub async fn get_table_schema(&self, table: &str) -> Result<ApiResponse<TableSchema>> {
        self.execute_as(
            Method::GET,
            &format!("{}/schema", table_path(table)?),
            None,
            &QueryParams::new(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::{record_path, table_path};

    #[test]
    fn paths_follow_rest_layout() {
        assert_eq!(table_path("users").expect("path"), "/rest/v1/users");
        assert_eq!(record_path("users", 42).expect("path"), "/rest/v1/users/42");
        assert_eq!(record_path("users", "u-1").expect("path"), "/rest/v1/users/u-1");
    }

    #[test]
    fn ids_stay_inside_their_segment() {
        assert_eq!(
            record_path("users", "a/../../keys/x").expect("path"),
            "/rest/v1/users/a%2F..%2F..%2Fkeys%2Fx"
        );
        assert!(record_path("users", "..").is_err());
        assert!(table_path("").is_err());
    }
}
