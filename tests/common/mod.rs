//! Common test utilities.

#![allow(dead_code)]

use std::time::Duration;
use tokio::net::TcpListener;

use blobstore_rs::{
    AccessPolicy, BlobServer, BlobService, Config, Metadata, Permissions,
};

/// Test server wrapper.
pub struct TestServer {
    pub base_url: String,
    pub key: String,
    pub service: BlobService,
}

impl TestServer {
    /// Creates and starts a test server on a random port.
    pub async fn start() -> Self {
        Self::start_with(Config::in_memory()).await
    }

    /// Starts a test server with the given configuration.
    pub async fn start_with(config: Config) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let key = config.account_key.clone();
        let service = BlobService::new(config);
        let server = BlobServer::new(service.clone());

        // Start server in background
        tokio::spawn(async move {
            server.serve(listener).await.unwrap();
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            key,
            service,
        }
    }

    /// Returns the URL for a container.
    pub fn container_url(&self, container: &str) -> String {
        format!("{}/containers/{}", self.base_url, container)
    }

    /// Returns the URL for a blob.
    pub fn blob_url(&self, container: &str, blob: &str) -> String {
        format!("{}/containers/{}/blobs/{}", self.base_url, container, blob)
    }

    /// Returns the Authorization header value for the account key.
    pub fn auth_header(&self) -> String {
        format!("Key {}", self.key)
    }
}

/// Creates a service with a short operation timeout.
pub fn test_service() -> BlobService {
    BlobService::new(Config {
        operation_timeout: Duration::from_secs(5),
        ..Config::in_memory()
    })
}

/// A policy valid from an hour ago until an hour from now.
pub fn current_policy(id: &str, permissions: &str) -> AccessPolicy {
    let now = chrono::Utc::now();
    AccessPolicy::new(
        id,
        now - chrono::Duration::hours(1),
        now + chrono::Duration::hours(1),
        Permissions::parse(permissions).unwrap(),
    )
}

/// Builds metadata from key/value pairs.
pub fn metadata(pairs: &[(&str, &str)]) -> Metadata {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}
