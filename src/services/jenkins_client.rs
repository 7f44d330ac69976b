//! Jenkins API client.
//!
//! Reads job listings and build details through the `/api/json` endpoints,
//! authenticated with a user name and API token.

use crate::error::AppError;
use crate::models::BuildResult;
use crate::services::sources::{decode_response, BuildSource};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Build parameter carrying the source branch.
pub const BRANCH_PARAMETER: &str = "SCM_BRANCH";

/// Jenkins API client configuration.
#[derive(Debug, Clone, Default)]
pub struct JenkinsClientConfig {
    pub username: String,
    pub api_token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Jenkins API client.
#[derive(Debug, Clone)]
pub struct JenkinsClient {
    client: Client,
    config: JenkinsClientConfig,
}

/// Build reference inside a job listing.
#[derive(Debug, Clone, Deserialize)]
pub struct JenkinsBuildRef {
    pub number: u64,
    pub url: String,
}

/// Jenkins job from `{job}/api/json`.
#[derive(Debug, Clone, Deserialize)]
pub struct JenkinsJob {
    pub name: String,
    #[serde(default)]
    pub builds: Vec<JenkinsBuildRef>,
}

/// Cause entry of a build action.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsCause {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

/// Parameter entry of a build action.
#[derive(Debug, Clone, Deserialize)]
pub struct JenkinsParameter {
    pub name: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// One entry of a build's `actions` array.
///
/// Actions are heterogeneous; most carry neither causes nor parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JenkinsAction {
    #[serde(default)]
    pub causes: Option<Vec<JenkinsCause>>,
    #[serde(default)]
    pub parameters: Option<Vec<JenkinsParameter>>,
}

/// Jenkins build from `{build}/api/json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsBuild {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub in_progress: bool,
    pub result: Option<BuildResult>,
    #[serde(default)]
    pub actions: Vec<Option<JenkinsAction>>,
}

impl JenkinsBuild {
    fn actions(&self) -> impl Iterator<Item = &JenkinsAction> {
        self.actions.iter().flatten()
    }

    /// `(user_id, user_name)` of the first cause that names a user.
    pub fn triggering_user(&self) -> Option<(String, String)> {
        self.actions()
            .filter_map(|action| action.causes.as_ref())
            .flatten()
            .find_map(|cause| {
                cause.user_id.as_ref().map(|id| {
                    (id.clone(), cause.user_name.clone().unwrap_or_default())
                })
            })
    }

    /// Value of the first string parameter called `name`.
    pub fn parameter(&self, name: &str) -> Option<String> {
        self.actions()
            .filter_map(|action| action.parameters.as_ref())
            .flatten()
            .find(|p| p.name.as_deref() == Some(name))
            .and_then(|p| p.value.as_str().map(|s| s.to_string()))
    }
}

impl JenkinsClient {
    /// Create a new Jenkins client.
    pub fn new(config: JenkinsClientConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// JSON API URL of a job or build page.
    fn api_json_url(url: &str) -> String {
        format!("{}/api/json", url.trim_end_matches('/'))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        let endpoint = Self::api_json_url(url);
        let mut request = self.client.get(&endpoint);
        if !self.config.username.is_empty() {
            request = request.basic_auth(&self.config.username, Some(&self.config.api_token));
        }

        let response = request.send().await?;
        decode_response(response, &endpoint).await
    }
}

#[async_trait]
impl BuildSource for JenkinsClient {
    async fn get_job(&self, job_url: &str) -> Result<JenkinsJob, AppError> {
        self.get_json(job_url).await
    }

    async fn get_build(&self, build_url: &str) -> Result<JenkinsBuild, AppError> {
        self.get_json(build_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_json_url() {
        assert_eq!(
            JenkinsClient::api_json_url("https://ci.example.com/job/quick-1/"),
            "https://ci.example.com/job/quick-1/api/json"
        );
        assert_eq!(
            JenkinsClient::api_json_url("https://ci.example.com/job/quick-1/42"),
            "https://ci.example.com/job/quick-1/42/api/json"
        );
    }

    #[test]
    fn test_build_metadata_extraction() {
        let json = r#"{
            "timestamp": 1700000000000,
            "inProgress": false,
            "result": "FAILURE",
            "actions": [
                {"_class": "hudson.model.CauseAction", "causes": [
                    {"shortDescription": "Started by timer"},
                    {"userId": "jdoe", "userName": "John Doe"}
                ]},
                {},
                null,
                {"parameters": [
                    {"name": "DEPLOY", "value": true},
                    {"name": "SCM_BRANCH", "value": "feature/login"}
                ]}
            ]
        }"#;
        let build: JenkinsBuild = serde_json::from_str(json).unwrap();
        assert_eq!(build.result, Some(BuildResult::Failure));
        assert_eq!(
            build.triggering_user(),
            Some(("jdoe".to_string(), "John Doe".to_string()))
        );
        assert_eq!(build.parameter(BRANCH_PARAMETER).as_deref(), Some("feature/login"));
        assert_eq!(build.parameter("DEPLOY"), None);
    }

    #[test]
    fn test_build_without_metadata() {
        let json = r#"{"timestamp": 5, "inProgress": true, "result": null, "actions": []}"#;
        let build: JenkinsBuild = serde_json::from_str(json).unwrap();
        assert!(build.in_progress);
        assert!(build.result.is_none());
        assert!(build.triggering_user().is_none());
        assert!(build.parameter(BRANCH_PARAMETER).is_none());
    }
}
