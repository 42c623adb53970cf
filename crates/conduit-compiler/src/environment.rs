//! Container environments.
//!
//! Every container sees, in increasing precedence:
//!
//! 1. the build's global `environment`, if the build inherits it into the
//!    container's scope (`steps`, `services` or `secrets`)
//! 2. the enclosing stage's `environment`
//! 3. the container's own `environment`
//! 4. platform defaults (build, repository, user and platform facts)
//! 5. the process environment, for local compiles
//! 6. `PARAMETER_<KEY>` for each non-null parameter
//!
//! Platform defaults deliberately win over what a user declares, so a
//! configuration cannot mask facts such as `BUILD_COMMIT`.

use async_trait::async_trait;
use conduit_core::document::{Build, Step};
use conduit_core::records::{BuildRecord, PlatformMetadata, Repo, User};
use conduit_core::{ENV_PREFIX, Environment, ParameterValue};
use indexmap::IndexMap;
use tracing::debug;

/// Workspace path used when no platform metadata is available.
pub const DEFAULT_WORKSPACE: &str = "/conduit";

/// Credentials written to `~/.netrc` inside containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Netrc {
    pub machine: String,
    pub username: String,
    pub password: String,
}

/// Looks up netrc credentials for a source provider host.
#[async_trait]
pub trait NetrcProvider: Send + Sync {
    async fn netrc(&self, host: &str) -> Option<Netrc>;
}

/// The facts container environments are built from.
///
/// Every record is optional; a missing record contributes empty values.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentContext {
    pub build: Option<BuildRecord>,
    pub repo: Option<Repo>,
    pub user: Option<User>,
    pub metadata: Option<PlatformMetadata>,
    pub netrc: Option<Netrc>,
    /// Merge the process environment into every container.
    pub local: bool,
}

impl EnvironmentContext {
    pub fn workspace(&self) -> String {
        match &self.metadata {
            Some(metadata) => {
                let repo = self.repo.clone().unwrap_or_default();
                format!(
                    "{}/src/{}/{}/{}",
                    DEFAULT_WORKSPACE,
                    metadata.scm_host(),
                    repo.org,
                    repo.name
                )
            }
            None => DEFAULT_WORKSPACE.to_string(),
        }
    }

    /// Platform defaults shared by every container.
    pub fn defaults(&self) -> Environment {
        let workspace = self.workspace();
        let mut env = Environment::new();

        env.insert("CI".to_string(), "true".to_string());
        env.insert("CONDUIT".to_string(), "true".to_string());
        env.insert(format!("{ENV_PREFIX}WORKSPACE"), workspace.clone());

        env.extend(self.metadata.clone().unwrap_or_default().environment());
        env.extend(self.build.clone().unwrap_or_default().environment(&workspace));
        env.extend(self.repo.clone().unwrap_or_default().environment());
        env.extend(self.user.clone().unwrap_or_default().environment());

        let netrc = self.netrc.clone().unwrap_or_default();
        env.insert(format!("{ENV_PREFIX}NETRC_MACHINE"), netrc.machine);
        env.insert(format!("{ENV_PREFIX}NETRC_USERNAME"), netrc.username);
        env.insert(format!("{ENV_PREFIX}NETRC_PASSWORD"), netrc.password);

        env
    }

    /// Layers the environment of one container.
    pub fn container_environment(
        &self,
        global: &Environment,
        stage: Option<&Environment>,
        own: &Environment,
        parameters: &IndexMap<String, ParameterValue>,
    ) -> Environment {
        let mut env = global.clone();
        if let Some(stage) = stage {
            env.extend(stage.clone());
        }
        env.extend(own.clone());
        env.extend(self.defaults());
        if self.local {
            env.extend(std::env::vars());
        }
        for (key, value) in parameters {
            if value.is_null() {
                continue;
            }
            env.insert(
                format!("PARAMETER_{}", key.to_uppercase()),
                value.to_display_string(),
            );
        }
        env
    }

    /// The environment a step runs with.
    pub fn step_environment(
        &self,
        build: &Build,
        stage: Option<&Environment>,
        step: &Step,
    ) -> Environment {
        self.container_environment(
            &scoped(build, "steps"),
            stage,
            &step.environment,
            &step.parameters,
        )
    }

    /// Resolves the environment of every step, service and secret origin.
    pub fn apply(&self, build: &mut Build) {
        let steps_env = scoped(build, "steps");
        let services_env = scoped(build, "services");
        let secrets_env = scoped(build, "secrets");
        let none = IndexMap::new();

        for service in &mut build.services {
            service.environment =
                self.container_environment(&services_env, None, &service.environment, &none);
        }

        for secret in &mut build.secrets {
            if let Some(origin) = secret.origin.as_mut() {
                origin.environment = self.container_environment(
                    &secrets_env,
                    None,
                    &origin.environment,
                    &origin.parameters,
                );
            }
        }

        for stage in &mut build.stages {
            let mut stage_env = steps_env.clone();
            stage_env.extend(stage.environment.clone());
            stage_env.extend(self.defaults());

            for step in &mut stage.steps {
                step.environment = self.container_environment(
                    &steps_env,
                    Some(&stage.environment),
                    &step.environment,
                    &step.parameters,
                );
            }
            stage.environment = stage_env;
        }

        for step in &mut build.steps {
            step.environment =
                self.container_environment(&steps_env, None, &step.environment, &step.parameters);
        }

        debug!(
            services = build.services.len(),
            stages = build.stages.len(),
            steps = build.steps.len(),
            "environment applied"
        );
    }
}

/// The global environment if the build inherits it into `scope`.
fn scoped(build: &Build, scope: &str) -> Environment {
    if build.metadata.has_environment(scope) {
        build.environment.clone()
    } else {
        Environment::new()
    }
}
