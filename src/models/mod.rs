//! Data models for the tracker.
//!
//! These models are the records held in the in-memory cache, written to the
//! restart-baseline files and served to the browser extension.

pub mod awaited_reviews;
pub mod build;
pub mod pull_request;
pub mod snapshot;

// Re-exports for convenient access
pub use awaited_reviews::AwaitedReviewsIndex;
pub use build::{BuildRecord, BuildResult};
pub use pull_request::{PullRequestRecord, PullRequestState, ReviewEntry, ReviewState, UserRole};
pub use snapshot::{BuildSnapshot, Identified, PullRequestSnapshot, Snapshot};
