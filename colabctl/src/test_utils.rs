//! Shared helpers for tests that need a running app.

use std::time::Duration;

use axum_test::TestServer;

use crate::config::{Config, SessionsConfig};
use crate::Application;

/// Default config with metrics off and a short boot delay.
///
/// The Prometheus recorder is process-global, so only tests that explicitly opt in
/// should install it.
pub fn create_test_config() -> Config {
    Config {
        enable_metrics: false,
        sessions: SessionsConfig {
            boot_delay: Duration::from_millis(10),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn create_test_app() -> TestServer {
    create_test_app_with_config(create_test_config())
}

pub fn create_test_app_with_config(config: Config) -> TestServer {
    Application::new(config)
        .expect("Failed to create application")
        .into_test_server()
}
