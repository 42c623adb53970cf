//! Composite identifiers for pipelines and their containers.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Org used for builds compiled without repository metadata.
pub const LOCAL_ORG: &str = "localOrg";

/// Repo used for builds compiled without repository metadata.
pub const LOCAL_REPO: &str = "localRepo";

/// The build a pipeline belongs to: `org/repo#number`.
///
/// Every id stamped on a compiled pipeline is derived from this identity, so
/// compiling the same configuration for the same build is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{org}/{repo}#{number}")]
pub struct BuildIdentity {
    pub org: String,
    pub repo: String,
    pub number: i64,
}

impl BuildIdentity {
    pub fn new(org: impl Into<String>, repo: impl Into<String>, number: i64) -> Self {
        Self {
            org: org.into(),
            repo: repo.into(),
            number,
        }
    }

    /// The identity used for local compiles.
    pub fn local() -> Self {
        Self::new(LOCAL_ORG, LOCAL_REPO, 1)
    }

    fn scope(&self) -> String {
        format!("{}_{}_{}", self.org, self.repo, self.number)
    }

    pub fn pipeline_id(&self) -> String {
        format!("__{}", self.scope())
    }

    pub fn step_id(&self, step: &str) -> String {
        format!("step_{}_{}", self.scope(), step)
    }

    pub fn stage_step_id(&self, stage: &str, step: &str) -> String {
        format!("step_{}_{}_{}", self.scope(), stage, step)
    }

    pub fn service_id(&self, service: &str) -> String {
        format!("service_{}_{}", self.scope(), service)
    }

    pub fn secret_id(&self, secret: &str) -> String {
        format!("secret_{}_{}", self.scope(), secret)
    }
}

impl Default for BuildIdentity {
    fn default() -> Self {
        Self::local()
    }
}
