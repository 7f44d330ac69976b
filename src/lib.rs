//! Polaris - pull request and CI build tracker.
//!
//! Periodically pulls pull requests and reviews from a GitHub-style review host
//! and builds from a Jenkins-style CI server, cross-references them by branch,
//! and answers per-user queries over HTTP from an in-memory cache.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

use config::AppConfig;
use error::AppError;
use services::github_client::GitHubClientConfig;
use services::jenkins_client::JenkinsClientConfig;
use services::{
    BuildFetcher, Coordinator, GitHubClient, JenkinsClient, PeriodicTask, QueryServer,
    QueryService, ReviewFetcher,
};
use std::time::Duration;

/// Install the global logger; `RUST_LOG` overrides the `info` default.
fn init_logging() -> Result<(), AppError> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
        .map_err(|e| AppError::internal(format!("Failed to install logger: {}", e)))
}

/// Periodic tasks for every enabled source, wired to the real HTTP clients.
pub fn source_tasks(config: &AppConfig) -> Result<Vec<PeriodicTask>, AppError> {
    let mut tasks = Vec::new();

    if config.github.enabled {
        let client = GitHubClient::new(GitHubClientConfig {
            base_url: config.github.base_url.clone(),
            token: config.github.token.clone(),
            timeout_secs: config.http_timeout_secs,
        })?;
        let fetcher = ReviewFetcher::new(client, &config.github, config.fetch_concurrency);
        tasks.push(PeriodicTask::new(
            fetcher,
            Duration::from_secs(config.github.refresh_interval_secs),
        ));
    } else {
        log::info!("[github] Review source disabled");
    }

    if config.jenkins.enabled {
        let client = JenkinsClient::new(JenkinsClientConfig {
            username: config.jenkins.username.clone(),
            api_token: config.jenkins.api_token.clone(),
            timeout_secs: config.http_timeout_secs,
        })?;
        let fetcher = BuildFetcher::new(client, &config.jenkins, config.fetch_concurrency);
        log::info!("[jenkins] Tracking {} job slots", fetcher.slots().len());
        tasks.push(PeriodicTask::new(
            fetcher,
            Duration::from_secs(config.jenkins.refresh_interval_secs),
        ));
    } else {
        log::info!("[jenkins] Build source disabled");
    }

    Ok(tasks)
}

/// Load configuration, start the fetchers and serve queries until Ctrl-C.
pub async fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging()?;

    let config = AppConfig::from_env()?;
    let tasks = source_tasks(&config)?;

    let (coordinator, _) = Coordinator::new(
        config.cross_reference,
        config.github.enabled,
        config.jenkins.enabled,
    );
    let handle = coordinator.start(tasks);

    let query = QueryService::new(handle.subscribe());
    let server = match QueryServer::bind(&config.server, query).await {
        Ok(server) => server,
        Err(e) => {
            handle.shutdown().await;
            return Err(e);
        }
    };

    let shutdown = handle.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("[server] Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => log::error!("[server] Failed to listen for Ctrl-C: {}", e),
        }
    });

    let result = server.run(handle.cancel_token()).await;
    handle.shutdown().await;
    result
}
