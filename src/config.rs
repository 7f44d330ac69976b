//! Server configuration loaded from environment variables.
//!
//! All optional fields have defaults suitable for a small team setup. The
//! upstream URLs, repository list and job list are required for each source
//! that is enabled.

use crate::error::AppError;
use std::path::PathBuf;
use std::str::FromStr;

/// Default query server port.
pub const DEFAULT_PORT: u16 = 1948;

/// Default delay between two fetch cycles of one source.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

/// Default number of cycles between two full refreshes.
pub const DEFAULT_FULL_REFRESH_CYCLES: u32 = 10;

/// A repository on the review host, `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryRef {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(AppError::config_key(
                format!("Invalid repository '{}', expected owner/name", s.trim()),
                "GITHUB_REPOSITORIES",
            )),
        }
    }
}

/// Review source (GitHub) settings.
#[derive(Debug, Clone)]
pub struct ReviewSourceConfig {
    pub enabled: bool,
    /// API base, e.g. `https://github.example.com/api/v3`.
    pub base_url: String,
    pub token: String,
    pub repositories: Vec<RepositoryRef>,
    /// Max PRs collected per repository per cycle.
    pub max_prs: u32,
    pub refresh_interval_secs: u64,
    /// Every Nth cycle ignores cached records. Zero disables full refreshes.
    pub full_refresh_cycles: u32,
    pub snapshot_file: Option<PathBuf>,
}

/// A job type and the path prefix its numbered jobs share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    pub job_type: String,
    pub path_prefix: String,
}

/// One cell of the job matrix: a concrete CI job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSlot {
    pub job_type: String,
    pub ordinal: u32,
    pub url: String,
}

/// Build source (Jenkins) settings.
#[derive(Debug, Clone)]
pub struct BuildSourceConfig {
    pub enabled: bool,
    pub job_base_url: String,
    pub username: String,
    pub api_token: String,
    pub jobs: Vec<JobDefinition>,
    /// Each job type is expanded to ordinals `1..=job_ordinals`.
    pub job_ordinals: u32,
    pub max_builds_per_job: usize,
    pub refresh_interval_secs: u64,
    pub full_refresh_cycles: u32,
    pub snapshot_file: Option<PathBuf>,
}

impl BuildSourceConfig {
    /// Expand job definitions × ordinals into concrete job slots.
    pub fn job_matrix(&self) -> Vec<JobSlot> {
        let base = self.job_base_url.trim_end_matches('/');
        self.jobs
            .iter()
            .flat_map(|job| {
                (1..=self.job_ordinals).map(move |ordinal| JobSlot {
                    job_type: job.job_type.clone(),
                    ordinal,
                    url: format!("{}/{}{}", base, job.path_prefix, ordinal),
                })
            })
            .collect()
    }
}

/// Which pull requests get builds attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossReferencePolicy {
    /// Only PRs in state `open`.
    #[default]
    OpenOnly,
    /// Every PR regardless of state.
    All,
}

impl FromStr for CrossReferencePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(Self::OpenOnly),
            "all" => Ok(Self::All),
            other => Err(AppError::config_key(
                format!("Unknown cross reference policy '{}'", other),
                "CROSS_REFERENCE_POLICY",
            )),
        }
    }
}

/// Query server bind settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub github: ReviewSourceConfig,
    pub jenkins: BuildSourceConfig,
    /// Max in-flight upstream calls per fan-out step.
    pub fetch_concurrency: usize,
    pub cross_reference: CrossReferencePolicy,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// | Env Var                          | Default   |
    /// |----------------------------------|-----------|
    /// | `HOST`                           | `0.0.0.0` |
    /// | `PORT`                           | `1948`    |
    /// | `GITHUB_MAX_NUM_OF_PRS`          | `100`     |
    /// | `JENKINS_JOB_ORDINALS`           | `5`       |
    /// | `JENKINS_MAX_NUM_OF_BUILDS`      | `50`      |
    /// | `*_REFRESH_INTERVAL_SECS`        | `60`      |
    /// | `*_FULL_REFRESH_CYCLES`          | `10`      |
    /// | `FETCH_CONCURRENCY`              | `8`       |
    /// | `CROSS_REFERENCE_POLICY`         | `open`    |
    /// | `HTTP_TIMEOUT_SECS`              | `30`      |
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let server = ServerConfig {
            host: env.string_or("HOST", "0.0.0.0"),
            port: env.parse_or("PORT", DEFAULT_PORT)?,
        };

        let github_enabled = env.parse_or("GITHUB_ENABLED", true)?;
        let repositories = match env.get("GITHUB_REPOSITORIES") {
            Some(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(RepositoryRef::from_str)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        let github = ReviewSourceConfig {
            enabled: github_enabled,
            base_url: env.required_if(github_enabled, "GITHUB_BASE_URL")?,
            token: env.string_or("GITHUB_AUTH_TOKEN", ""),
            repositories,
            max_prs: env.parse_or("GITHUB_MAX_NUM_OF_PRS", 100)?,
            refresh_interval_secs: env
                .parse_or("GITHUB_REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS)?,
            full_refresh_cycles: env
                .parse_or("GITHUB_FULL_REFRESH_CYCLES", DEFAULT_FULL_REFRESH_CYCLES)?,
            snapshot_file: env.get("PRS_PERSISTENT_FILE").map(PathBuf::from),
        };
        if github.enabled && github.repositories.is_empty() {
            return Err(AppError::config_key(
                "At least one repository is required",
                "GITHUB_REPOSITORIES",
            ));
        }

        let jenkins_enabled = env.parse_or("JENKINS_ENABLED", true)?;
        let jobs = match env.get("JENKINS_JOBS") {
            Some(list) => parse_jobs(&list)?,
            None => Vec::new(),
        };
        let jenkins = BuildSourceConfig {
            enabled: jenkins_enabled,
            job_base_url: env.required_if(jenkins_enabled, "JENKINS_JOB_BASE_URL")?,
            username: env.string_or("JENKINS_USERNAME", ""),
            api_token: env.string_or("JENKINS_API_TOKEN", ""),
            jobs,
            job_ordinals: env.parse_or("JENKINS_JOB_ORDINALS", 5)?,
            max_builds_per_job: env.parse_or("JENKINS_MAX_NUM_OF_BUILDS", 50)?,
            refresh_interval_secs: env
                .parse_or("JENKINS_REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS)?,
            full_refresh_cycles: env
                .parse_or("JENKINS_FULL_REFRESH_CYCLES", DEFAULT_FULL_REFRESH_CYCLES)?,
            snapshot_file: env.get("BUILDS_PERSISTENT_FILE").map(PathBuf::from),
        };
        if jenkins.enabled && jenkins.jobs.is_empty() {
            return Err(AppError::config_key(
                "At least one job is required",
                "JENKINS_JOBS",
            ));
        }

        let fetch_concurrency: usize = env.parse_or("FETCH_CONCURRENCY", 8)?;

        Ok(Self {
            server,
            github,
            jenkins,
            fetch_concurrency: fetch_concurrency.max(1),
            cross_reference: env.parse_or("CROSS_REFERENCE_POLICY", CrossReferencePolicy::OpenOnly)?,
            http_timeout_secs: env.parse_or("HTTP_TIMEOUT_SECS", 30)?,
        })
    }
}

/// Parse `type=prefix,type=prefix` into job definitions.
fn parse_jobs(list: &str) -> Result<Vec<JobDefinition>, AppError> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|entry| match entry.trim().split_once('=') {
            Some((job_type, path_prefix)) if !job_type.is_empty() && !path_prefix.is_empty() => {
                Ok(JobDefinition {
                    job_type: job_type.trim().to_string(),
                    path_prefix: path_prefix.trim().to_string(),
                })
            }
            _ => Err(AppError::config_key(
                format!("Invalid job '{}', expected type=pathPrefix", entry.trim()),
                "JENKINS_JOBS",
            )),
        })
        .collect()
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn required_if(&self, required: bool, key: &str) -> Result<String, AppError> {
        match self.get(key) {
            Some(value) => Ok(value),
            None if required => Err(AppError::config_key(format!("{} must be set", key), key)),
            None => Ok(String::new()),
        }
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, AppError> {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                AppError::config_key(format!("{} has an invalid value '{}'", key, raw), key)
            }),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("GITHUB_BASE_URL", "https://github.example.com/api/v3"),
            ("GITHUB_REPOSITORIES", "acme/api, acme/web"),
            ("JENKINS_JOB_BASE_URL", "https://ci.example.com/"),
            ("JENKINS_JOBS", "custom-quick=job/custom-quick-,custom-full=job/custom-full-"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&minimal())).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.github.enabled);
        assert_eq!(config.github.max_prs, 100);
        assert_eq!(config.github.full_refresh_cycles, DEFAULT_FULL_REFRESH_CYCLES);
        assert_eq!(config.jenkins.job_ordinals, 5);
        assert_eq!(config.fetch_concurrency, 8);
        assert_eq!(config.cross_reference, CrossReferencePolicy::OpenOnly);
        assert!(config.github.snapshot_file.is_none());
    }

    #[test]
    fn test_repositories_parsed() {
        let config = AppConfig::from_lookup(lookup(&minimal())).unwrap();
        let names: Vec<String> = config
            .github
            .repositories
            .iter()
            .map(RepositoryRef::full_name)
            .collect();
        assert_eq!(names, vec!["acme/api", "acme/web"]);
    }

    #[test]
    fn test_job_matrix() {
        let mut pairs = minimal();
        pairs.push(("JENKINS_JOB_ORDINALS", "2"));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        let matrix = config.jenkins.job_matrix();

        assert_eq!(matrix.len(), 4);
        assert_eq!(
            matrix[0],
            JobSlot {
                job_type: "custom-quick".to_string(),
                ordinal: 1,
                url: "https://ci.example.com/job/custom-quick-1".to_string(),
            }
        );
        assert_eq!(matrix[3].url, "https://ci.example.com/job/custom-full-2");
    }

    #[test]
    fn test_invalid_number_reports_key() {
        let mut pairs = minimal();
        pairs.push(("PORT", "not-a-port"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        match err {
            AppError::Config { key, .. } => assert_eq!(key.as_deref(), Some("PORT")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_required_only_when_enabled() {
        let err = AppConfig::from_lookup(lookup(&[("JENKINS_ENABLED", "false")])).unwrap_err();
        assert!(err.to_string().contains("GITHUB_BASE_URL"));

        let config = AppConfig::from_lookup(lookup(&[
            ("GITHUB_ENABLED", "false"),
            ("JENKINS_ENABLED", "false"),
        ]))
        .unwrap();
        assert!(!config.github.enabled);
        assert!(!config.jenkins.enabled);
    }

    #[test]
    fn test_bad_repository() {
        let mut pairs = minimal();
        pairs[1] = ("GITHUB_REPOSITORIES", "just-a-name");
        assert!(AppConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_cross_reference_policy() {
        assert_eq!("ALL".parse::<CrossReferencePolicy>().unwrap(), CrossReferencePolicy::All);
        assert_eq!("open".parse::<CrossReferencePolicy>().unwrap(), CrossReferencePolicy::OpenOnly);
        assert!("closed".parse::<CrossReferencePolicy>().is_err());
    }
}
