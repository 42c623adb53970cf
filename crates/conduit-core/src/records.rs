//! Records the compiler reads from its callers.
//!
//! These are owned by the platform's storage layer. The compiler only needs a
//! handful of fields from each, mostly to project them into container
//! environments and rule data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Format;
use crate::rules::RuleData;
use crate::{ENV_PREFIX, Environment};

/// The build being compiled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildRecord {
    pub number: i64,
    pub parent: i64,
    /// `push`, `pull_request`, `tag`, `deployment`, `comment`, `schedule`.
    pub event: String,
    pub action: String,
    pub status: String,
    pub branch: String,
    /// Full git reference, e.g. `refs/tags/v1.0.0`.
    #[serde(rename = "ref")]
    pub reference: String,
    pub base_ref: String,
    pub commit: String,
    pub message: String,
    pub title: String,
    pub author: String,
    pub email: String,
    pub sender: String,
    /// Deployment target.
    pub deploy: String,
    pub link: String,
    pub clone: String,
    pub source: String,
    pub host: String,
    pub created: Option<DateTime<Utc>>,
}

impl BuildRecord {
    /// The tag name, for tag events.
    pub fn tag(&self) -> &str {
        self.reference
            .strip_prefix("refs/tags/")
            .unwrap_or_default()
    }

    /// The pull request number, for pull request events.
    pub fn pull_request(&self) -> Option<&str> {
        self.reference
            .strip_prefix("refs/pull/")
            .and_then(|rest| rest.split('/').next())
            .filter(|number| !number.is_empty())
    }

    /// `event` or `event:action`.
    pub fn event_action(&self) -> String {
        if self.action.is_empty() {
            self.event.clone()
        } else {
            format!("{}:{}", self.event, self.action)
        }
    }

    pub fn environment(&self, workspace: &str) -> Environment {
        let created = self
            .created
            .map(|t| t.timestamp().to_string())
            .unwrap_or_default();

        let mut values = vec![
            ("AUTHOR", self.author.clone()),
            ("AUTHOR_EMAIL", self.email.clone()),
            ("BASE_REF", self.base_ref.clone()),
            ("BRANCH", self.branch.clone()),
            ("CLONE", self.clone.clone()),
            ("COMMIT", self.commit.clone()),
            ("CREATED", created),
            ("EVENT", self.event.clone()),
            ("EVENT_ACTION", self.action.clone()),
            ("HOST", self.host.clone()),
            ("LINK", self.link.clone()),
            ("MESSAGE", self.message.clone()),
            ("NUMBER", self.number.to_string()),
            ("PARENT", self.parent.to_string()),
            ("REF", self.reference.clone()),
            ("SENDER", self.sender.clone()),
            ("SOURCE", self.source.clone()),
            ("STATUS", self.status.clone()),
            ("TITLE", self.title.clone()),
            ("WORKSPACE", workspace.to_string()),
        ];

        match self.event.as_str() {
            "tag" => values.push(("TAG", self.tag().to_string())),
            "pull_request" => {
                values.push(("PULL_REQUEST", self.pull_request().unwrap_or_default().to_string()))
            }
            "deployment" => values.push(("TARGET", self.deploy.clone())),
            _ => {}
        }

        prefixed(&values, "BUILD_")
    }
}

/// The repository the build belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repo {
    pub org: String,
    pub name: String,
    pub full_name: String,
    pub link: String,
    pub clone: String,
    /// Default branch.
    pub branch: String,
    pub visibility: String,
    pub private: bool,
    pub trusted: bool,
    pub topics: Vec<String>,
    /// Dialect of the repository's pipeline configuration.
    pub pipeline_type: Format,
    pub owner: Option<User>,
}

impl Repo {
    pub fn environment(&self) -> Environment {
        let values = [
            ("BRANCH", self.branch.clone()),
            ("CLONE", self.clone.clone()),
            ("FULL_NAME", self.full_name.clone()),
            ("LINK", self.link.clone()),
            ("NAME", self.name.clone()),
            ("ORG", self.org.clone()),
            ("PRIVATE", self.private.to_string()),
            ("TOPICS", self.topics.join(",")),
            ("TRUSTED", self.trusted.to_string()),
            ("VISIBILITY", self.visibility.clone()),
        ];
        prefixed(&values, "REPOSITORY_")
    }
}

/// A platform user. Only the compiling user's name and token are read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub name: String,
    /// Source provider token, used to fetch remote templates.
    #[serde(skip_serializing)]
    pub token: String,
    pub admin: bool,
}

impl User {
    pub fn environment(&self) -> Environment {
        let values = [
            ("ADMIN", self.admin.to_string()),
            ("NAME", self.name.clone()),
        ];
        values
            .iter()
            .map(|(key, value)| (format!("{ENV_PREFIX}USER_{key}"), value.clone()))
            .collect()
    }
}

/// Facts about the platform the build runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformMetadata {
    /// Address of the API server.
    pub address: String,
    /// Address of the web UI.
    pub web_address: String,
    /// Source provider driver, e.g. `github`.
    pub scm_driver: String,
    /// Source provider address, e.g. `https://github.com`.
    pub scm_address: String,
    pub runtime_driver: String,
}

impl PlatformMetadata {
    /// Host part of the source provider address.
    pub fn scm_host(&self) -> String {
        url::Url::parse(&self.scm_address)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| {
                self.scm_address
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string()
            })
    }

    pub fn environment(&self) -> Environment {
        let values = [
            ("ADDR", self.web_address.clone()),
            ("SERVER", self.address.clone()),
            ("SOURCE", self.scm_address.clone()),
            ("RUNTIME", self.runtime_driver.clone()),
        ];
        values
            .iter()
            .map(|(key, value)| (format!("{ENV_PREFIX}{key}"), value.clone()))
            .collect()
    }
}

/// Each value is exposed both as `<PREFIX><KEY>` and `CONDUIT_<PREFIX><KEY>`.
fn prefixed(values: &[(&str, String)], prefix: &str) -> Environment {
    let mut env = Environment::new();
    for (key, value) in values {
        env.insert(format!("{prefix}{key}"), value.clone());
        env.insert(format!("{ENV_PREFIX}{prefix}{key}"), value.clone());
    }
    env
}

impl RuleData {
    /// Rule data for a build.
    ///
    /// `status` is left empty: status rules are decided while the build runs,
    /// not when it is compiled.
    pub fn from_records(
        build: &BuildRecord,
        repo: &Repo,
        metadata: &PlatformMetadata,
        files: &[String],
        labels: &[String],
    ) -> RuleData {
        RuleData {
            branch: build.branch.clone(),
            event: build.event_action(),
            path: files.to_vec(),
            label: labels.to_vec(),
            repo: repo.full_name.clone(),
            sender: build.sender.clone(),
            status: String::new(),
            tag: build.tag().to_string(),
            target: build.deploy.clone(),
            instance: metadata.address.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_environment_is_nil_safe() {
        let env = BuildRecord::default().environment("/conduit");
        assert_eq!(env["BUILD_NUMBER"], "0");
        assert_eq!(env["CONDUIT_BUILD_WORKSPACE"], "/conduit");
        assert_eq!(env["BUILD_CREATED"], "");
        assert!(!env.contains_key("BUILD_TAG"));
    }

    #[test]
    fn test_event_specific_variables() {
        let build = BuildRecord {
            event: "tag".to_string(),
            reference: "refs/tags/v1.2.0".to_string(),
            ..Default::default()
        };
        assert_eq!(build.environment("")["BUILD_TAG"], "v1.2.0");

        let build = BuildRecord {
            event: "pull_request".to_string(),
            action: "opened".to_string(),
            reference: "refs/pull/42/head".to_string(),
            ..Default::default()
        };
        assert_eq!(build.environment("")["CONDUIT_BUILD_PULL_REQUEST"], "42");
        assert_eq!(build.event_action(), "pull_request:opened");
    }

    #[test]
    fn test_rule_data_from_records() {
        let build = BuildRecord {
            event: "push".to_string(),
            branch: "main".to_string(),
            sender: "octocat".to_string(),
            status: "running".to_string(),
            ..Default::default()
        };
        let repo = Repo {
            full_name: "octo/hello".to_string(),
            ..Default::default()
        };
        let data = RuleData::from_records(
            &build,
            &repo,
            &PlatformMetadata::default(),
            &["src/main.rs".to_string()],
            &[],
        );
        assert_eq!(data.event, "push");
        assert_eq!(data.repo, "octo/hello");
        assert_eq!(data.path, vec!["src/main.rs"]);
        assert!(data.status.is_empty());
    }

    #[test]
    fn test_scm_host() {
        let metadata = PlatformMetadata {
            scm_address: "https://github.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(metadata.scm_host(), "github.example.com");
    }
}
