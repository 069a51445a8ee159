//! Test helpers for integration tests
//!
//! Provides utilities for spawning in-process test servers over the memory
//! store, seeding events, and making HTTP requests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use audit_api::server::{build_app_state, create_app};
use audit_api::AppState;
use audit_common::AppConfig;
use audit_core::{AuditStore, EventId, NewAuditEvent};
use audit_db::MemoryAuditStore;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Test server instance that manages lifecycle
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub state: AppState,
    pub store: Arc<MemoryAuditStore>,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server
    pub async fn start() -> Result<Self> {
        Self::start_with_config(test_config(&[])?).await
    }

    /// Start a test server with custom config
    pub async fn start_with_config(config: AppConfig) -> Result<Self> {
        let store = Arc::new(MemoryAuditStore::new());

        // Create app state
        let state = build_app_state(config, Arc::clone(&store) as Arc<dyn AuditStore>)?;

        // Build application
        let app = create_app(state.clone())?;

        // Bind to an ephemeral port
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        // Spawn server task
        let handle = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .ok();
        });

        // Create HTTP client
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            addr,
            client,
            state,
            store,
            _handle: handle,
        })
    }

    /// Get base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn request(&self, path: &str) -> RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<Response> {
        Ok(self.request(path).send().await?)
    }

    /// Make a GET request on behalf of an actor
    pub async fn get_as(&self, path: &str, actor_id: i64) -> Result<Response> {
        Ok(self
            .request(path)
            .header("x-actor-id", actor_id.to_string())
            .header("user-agent", "integration-tests")
            .send()
            .await?)
    }

    /// Append an event straight to the store, bypassing the pipeline
    pub async fn seed(&self, event: NewAuditEvent) -> EventId {
        self.store
            .append(event)
            .await
            .expect("memory store append never fails")
    }

    /// Wait until every submitted event has been settled
    pub async fn settle(&self) {
        assert!(
            self.state
                .service_context()
                .pipeline()
                .wait_idle(Duration::from_secs(5))
                .await,
            "audit pipeline did not go idle"
        );
    }
}

/// Create a test configuration
///
/// Starts from defaults with the memory store and a generous rate limit;
/// `overrides` are applied as environment-style keys.
pub fn test_config(overrides: &[(&str, &str)]) -> Result<AppConfig> {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("RATE_LIMIT_REQUESTS_PER_SECOND".to_string(), "1000".to_string()),
        ("RATE_LIMIT_BURST".to_string(), "1000".to_string()),
        ("AUDIT_WORKERS".to_string(), "2".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }

    AppConfig::from_lookup(|key| vars.get(key).cloned())
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))
}

/// Assert response status and parse JSON body
pub async fn assert_json<T: DeserializeOwned>(response: Response, expected_status: StatusCode) -> Result<T> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!(
            "Expected status {}, got {}. Body: {}",
            expected_status,
            status,
            body
        );
    }
    Ok(response.json().await?)
}

/// Assert response status without parsing body
pub async fn assert_status(response: Response, expected_status: StatusCode) -> Result<()> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!(
            "Expected status {}, got {}. Body: {}",
            expected_status,
            status,
            body
        );
    }
    Ok(())
}
