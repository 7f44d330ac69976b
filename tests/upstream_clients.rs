//! HTTP client verification against a mock upstream.
//!
//! Covers the request shapes both clients send (paths, query parameters,
//! credentials) and how upstream failures map onto `AppError`.

use polaris_lib::config::RepositoryRef;
use polaris_lib::error::AppError;
use polaris_lib::models::BuildResult;
use polaris_lib::services::github_client::{GitHubClient, GitHubClientConfig};
use polaris_lib::services::jenkins_client::{
    JenkinsClient, JenkinsClientConfig, BRANCH_PARAMETER,
};
use polaris_lib::services::sources::{BuildSource, ReviewSource};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn repo() -> RepositoryRef {
    "acme/api".parse().unwrap()
}

fn github(server: &MockServer) -> GitHubClient {
    GitHubClient::new(GitHubClientConfig {
        base_url: server.uri(),
        token: "t0ken".to_string(),
        timeout_secs: 5,
    })
    .unwrap()
}

fn jenkins(username: &str) -> JenkinsClient {
    JenkinsClient::new(JenkinsClientConfig {
        username: username.to_string(),
        api_token: "secret".to_string(),
        timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn test_list_pull_requests_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/pulls"))
        .and(query_param("state", "all"))
        .and(query_param("per_page", "100"))
        .and(query_param("page", "2"))
        .and(header("authorization", "token t0ken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "number": 42,
            "html_url": "https://github.example.com/acme/api/pull/42",
            "title": "Add login",
            "draft": false,
            "user": {"login": "alice"},
            "head": {"ref": "feature/login"},
            "assignees": [{"login": "carol"}],
            "requested_reviewers": [{"login": "bob"}],
            "created_at": "2024-01-15T10:30:00Z",
            "updated_at": "2024-01-16T10:30:00Z",
            "closed_at": null,
            "merged_at": null,
            "merge_commit_sha": null
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let prs = github(&server)
        .list_pull_requests(&repo(), 2, 100)
        .await
        .unwrap();
    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].number, 42);
    assert_eq!(prs[0].head.ref_name, "feature/login");
    assert_eq!(prs[0].user.as_ref().unwrap().login, "alice");
}

#[tokio::test]
async fn test_list_reviews_keeps_null_users() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/pulls/42/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"user": {"login": "bob"}, "state": "COMMENTED"},
            {"user": null, "state": "APPROVED"},
            {"user": {"login": "bob"}, "state": "APPROVED"}
        ])))
        .mount(&server)
        .await;

    let reviews = github(&server).list_reviews(&repo(), 42).await.unwrap();
    assert_eq!(reviews.len(), 3);
    assert!(reviews[1].user.is_none());
    assert_eq!(reviews[2].state, "APPROVED");
}

#[tokio::test]
async fn test_github_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/pulls"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/pulls/7/reviews"))
        .respond_with(
            ResponseTemplate::new(502).set_body_json(json!({"message": "Server Error"})),
        )
        .mount(&server)
        .await;

    let client = github(&server);
    let listing = client.list_pull_requests(&repo(), 1, 100).await;
    assert!(matches!(listing, Err(AppError::Authentication { .. })));

    match client.list_reviews(&repo(), 7).await {
        Err(AppError::Upstream {
            message,
            status_code,
            ..
        }) => {
            assert_eq!(message, "Server Error");
            assert_eq!(status_code, Some(502));
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let client = GitHubClient::new(GitHubClientConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        token: String::new(),
        timeout_secs: 2,
    })
    .unwrap();

    let result = client.list_pull_requests(&repo(), 1, 100).await;
    assert!(matches!(result, Err(AppError::Network { .. })));
}

#[tokio::test]
async fn test_jenkins_job_and_build_with_basic_auth() {
    let server = MockServer::start().await;
    let job_url = format!("{}/job/custom-quick-1", server.uri());
    let build_url = format!("{}/job/custom-quick-1/7/", server.uri());

    Mock::given(method("GET"))
        .and(path("/job/custom-quick-1/api/json"))
        .and(header("authorization", "Basic Y2k6c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_class": "hudson.model.FreeStyleProject",
            "name": "custom-quick-1",
            "builds": [{"number": 7, "url": &build_url}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/job/custom-quick-1/7/api/json"))
        .and(header("authorization", "Basic Y2k6c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "timestamp": 1700000000000i64,
            "inProgress": false,
            "result": "UNSTABLE",
            "actions": [
                {"causes": [{"userId": "alice", "userName": "Alice"}]},
                {"parameters": [{"name": "SCM_BRANCH", "value": "feature/login"}]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = jenkins("ci");
    let job = client.get_job(&job_url).await.unwrap();
    assert_eq!(job.name, "custom-quick-1");
    assert_eq!(job.builds[0].url, build_url);

    let build = client.get_build(&job.builds[0].url).await.unwrap();
    assert_eq!(build.result, Some(BuildResult::Unstable));
    assert_eq!(build.parameter(BRANCH_PARAMETER).as_deref(), Some("feature/login"));
    assert_eq!(build.triggering_user().unwrap().0, "alice");
}

#[tokio::test]
async fn test_jenkins_missing_job_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/job/gone/api/json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = jenkins("")
        .get_job(&format!("{}/job/gone", server.uri()))
        .await;
    match result {
        Err(AppError::Upstream { status_code, .. }) => assert_eq!(status_code, Some(404)),
        other => panic!("expected upstream error, got {:?}", other),
    }
}
