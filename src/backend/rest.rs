use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, trace};

use super::{BulkOperationResult, GridBackend, RowSource};
use crate::data::cell_value::CellValue;
use crate::data::column::{ColumnLayout, FieldPath};
use crate::data::row::RowId;
use crate::error::{GridError, GridResult};
use crate::services::retry::DataResult;

/// HTTP/JSON client for a hosted grid table
#[derive(Clone)]
pub struct RestBackend {
    base_url: String,
    table: String,
    api_key: Option<String>,
    client: Client,
}

impl RestBackend {
    pub fn new(base_url: &str, table: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            api_key: None,
            client: Client::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/tables/{}/{}", self.base_url, self.table, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> GridResult<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GridError::from_status(status.as_u16(), &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> GridResult<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GridError::terminal(format!("malformed response: {}", e)))
    }

    async fn put_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> GridResult<()> {
        let request = self.client.put(self.url(path)).json(body);
        self.send(request).await.map(|_| ())
    }
}

#[async_trait]
impl GridBackend for RestBackend {
    async fn save_cell(&self, row_id: &str, field: &FieldPath, value: &CellValue) -> GridResult<()> {
        debug!(target: "rest_backend", "PATCH row {} {}", row_id, field.remote_expr());
        let body = json!({
            "field": field.key(),
            "custom": matches!(field, FieldPath::Custom(_)),
            "value": value,
        });
        let request = self.client.patch(self.url(&format!("rows/{}", row_id))).json(&body);
        self.send(request).await.map(|_| ())
    }

    async fn load_column_layout(&self) -> DataResult<ColumnLayout> {
        let request = self.client.get(self.url("columns"));
        match self.send(request).await {
            Err(err) => DataResult::err(err),
            Ok(response) => match response.json::<Option<ColumnLayout>>().await {
                Ok(Some(layout)) => DataResult::ok(layout),
                Ok(None) => DataResult::empty(),
                Err(e) => DataResult::err(GridError::terminal(format!("malformed layout: {}", e))),
            },
        }
    }

    async fn save_column_layout(&self, layout: &ColumnLayout) -> GridResult<()> {
        self.put_json("columns", layout).await
    }

    async fn bulk_update(
        &self,
        row_ids: &[RowId],
        field: &FieldPath,
        value: &CellValue,
    ) -> GridResult<BulkOperationResult> {
        debug!(target: "rest_backend", "bulk update of {} rows on {}", row_ids.len(), field.remote_expr());
        let body = json!({
            "ids": row_ids,
            "field": field.key(),
            "custom": matches!(field, FieldPath::Custom(_)),
            "value": value,
        });
        let request = self.client.post(self.url("rows/bulk-update")).json(&body);
        self.send_json(request).await
    }
}

#[async_trait]
impl RowSource for RestBackend {
    async fn fetch_field_range(
        &self,
        field: &FieldPath,
        offset: usize,
        limit: usize,
    ) -> DataResult<Vec<Option<String>>> {
        trace!(target: "rest_backend", "range {}..{} of {}", offset, offset + limit, field.remote_expr());
        let request = self.client.get(self.url("values")).query(&[
            ("select", field.remote_expr()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ]);
        match self.send_json::<Vec<Option<String>>>(request).await {
            Ok(values) => DataResult::ok(values),
            Err(err) => DataResult::err(err),
        }
    }
}
