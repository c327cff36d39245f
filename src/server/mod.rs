//! Harness web server
//!
//! Simulates the WhatsApp provider over HTTP so the Dor app can be poked
//! from Postman, curl or the control commands.

pub mod api;

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::simulator::WebhookClient;
use crate::utils::config::HarnessConfig;
use api::AppState;

/// Assemble the full application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::api_router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct HarnessServer {
    config: HarnessConfig,
}

impl HarnessServer {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Bind and serve until the process stops
    pub async fn start(&self) -> Result<()> {
        let client =
            WebhookClient::from_config(&self.config).context("Failed to build webhook client")?;
        let webhook_url = client.webhook_url().to_string();

        let state = Arc::new(AppState::new(self.config.clone(), Arc::new(client)));
        let app = router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));

        println!("\n🧪 Dor test server started!");
        println!("   Open: http://localhost:{}", self.config.port);
        println!("   Dor app webhook: {}", webhook_url);
        println!("   Sender: {}", self.config.sender);
        println!("\n   Press Ctrl+C to stop.\n");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind port {}", self.config.port))?;
        axum::serve(listener, app.into_make_service()).await?;

        Ok(())
    }
}
