//! PostgREST client for the hosted task table.

use super::{NewTaskRow, RemoteError, RowStore, TaskPatch};
use async_trait::async_trait;
use focusdeck_ipc::{Task, TaskId};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    endpoint: String,
}

impl RestStore {
    /// `base_url` is the project root, e.g. `https://xyz.supabase.co`.
    pub fn new(
        base_url: &str,
        api_key: &str,
        table: &str,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key)
                .map_err(|e| RemoteError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| RemoteError::Config(format!("invalid API key header value: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
        })
    }

    fn id_filter(id: TaskId) -> [(&'static str, String); 1] {
        [("id", format!("eq.{id}"))]
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    debug!(status = %status, url = %response.url(), "remote response");
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RowStore for RestStore {
    async fn fetch_all(&self) -> Result<Vec<Task>, RemoteError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn insert(&self, row: &NewTaskRow) -> Result<Task, RemoteError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;
        let mut rows: Vec<Task> = check(response).await?.json().await?;
        if rows.is_empty() {
            return Err(RemoteError::Decode("insert returned no rows".into()));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<(), RemoteError> {
        let response = self
            .client
            .patch(&self.endpoint)
            .query(&Self::id_filter(id))
            .header("Prefer", "return=minimal")
            .json(patch)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(&self.endpoint)
            .query(&Self::id_filter(id))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use focusdeck_ipc::{Quadrant, TaskStatus};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> RestStore {
        RestStore::new(&server.uri(), "anon-key", "tasks", Duration::from_secs(5)).unwrap()
    }

    fn row_json(id: i64, title: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "description": null,
            "tags": null,
            "quadrant": 2,
            "status": "todo",
            "created_at": "2024-03-01T09:00:00Z",
            "start_time": null,
            "completed_at": null,
            "duration_seconds": 0
        })
    }

    #[tokio::test]
    async fn fetch_all_orders_newest_first_and_authenticates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/tasks"))
            .and(query_param("order", "created_at.desc"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([row_json(2, "second"), row_json(1, "first")])),
            )
            .mount(&server)
            .await;

        let rows = store(&server).fetch_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "second");
        assert_eq!(rows[1].quadrant, Quadrant::Important);
    }

    #[tokio::test]
    async fn insert_returns_server_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/tasks"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([row_json(41, "Draft")])))
            .mount(&server)
            .await;

        let row = NewTaskRow {
            title: "Draft".into(),
            description: None,
            tags: None,
            quadrant: Quadrant::Important,
            status: TaskStatus::Todo,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            start_time: None,
            completed_at: None,
            duration_seconds: 0,
        };
        let task = store(&server).insert(&row).await.unwrap();
        assert_eq!(task.id, 41);
    }

    #[tokio::test]
    async fn update_targets_row_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/tasks"))
            .and(query_param("id", "eq.5"))
            .and(body_json(json!({ "status": "done", "duration_seconds": 165 })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let patch = TaskPatch {
            status: Some(TaskStatus::Done),
            duration_seconds: Some(165),
            ..Default::default()
        };
        store(&server).update(5, &patch).await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_reported_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/tasks"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = store(&server).delete(9).await.unwrap_err();
        match &err {
            RemoteError::Status { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_transient());
    }
}
