//! Business logic services.
//!
//! This module contains the upstream clients, the two periodic fetchers, the
//! coordinator owning the cache, and the query layer with its HTTP surface.
//!
//! Fetchers only reach upstream through the traits in `sources`, so every
//! service can be exercised against in-memory fakes.

pub mod aggregation;
pub mod api;
pub mod build_fetcher;
pub mod coordinator;
pub mod github_client;
pub mod jenkins_client;
pub mod query;
pub mod refresh;
pub mod review_fetcher;
pub mod server;
pub mod snapshot_store;
pub mod sources;

pub use build_fetcher::BuildFetcher;
pub use coordinator::{Coordinator, CoordinatorHandle, PeriodicTask};
pub use github_client::GitHubClient;
pub use jenkins_client::JenkinsClient;
pub use query::QueryService;
pub use review_fetcher::ReviewFetcher;
pub use server::QueryServer;
