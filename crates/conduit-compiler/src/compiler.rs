//! The compile orchestrator.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use conduit_config::parse::{Source, parse};
use conduit_config::render::RenderContext;
use conduit_config::system::CompilerConfig;
use conduit_core::BuildIdentity;
use conduit_core::document::{Build, Format, Step};
use conduit_core::pipeline::Pipeline;
use conduit_core::records::{BuildRecord, PlatformMetadata, Repo, User};
use conduit_core::rules::RuleData;
use tracing::{debug, info};

use crate::cache::TemplateCache;
use crate::environment::{EnvironmentContext, NetrcProvider};
use crate::expand::Expander;
use crate::inject::{inject_stages, inject_steps};
use crate::modify::{ModificationClient, ModifyRequest};
use crate::purge::purge_document;
use crate::registry::{GitHubRegistry, Registry};
use crate::resolve::Resolver;
use crate::script::script_build;
use crate::substitute::substitute_step;
use crate::summary::ConfigSummary;
use crate::transform::transform;
use crate::validate::{validate_document, validate_pipeline};
use crate::Result;

/// A compiled pipeline.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub pipeline: Pipeline,
    pub summary: ConfigSummary,
    pub warnings: Vec<String>,
}

/// An expanded but untransformed configuration.
#[derive(Debug, Clone)]
pub struct LiteOutput {
    pub document: Build,
    pub summary: ConfigSummary,
    pub warnings: Vec<String>,
}

/// Compiles configurations for one build.
///
/// Records describing the build are optional. Without them the compiler
/// uses the local identity and empty platform values.
pub struct Compiler {
    config: CompilerConfig,
    build: Option<BuildRecord>,
    repo: Option<Repo>,
    user: Option<User>,
    metadata: Option<PlatformMetadata>,
    files: Vec<String>,
    labels: Vec<String>,
    format: Option<Format>,
    token: Option<String>,
    cache: Option<Arc<dyn TemplateCache>>,
    registry: Arc<dyn Registry>,
    netrc: Option<Arc<dyn NetrcProvider>>,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        let registry = Arc::new(GitHubRegistry::new(
            config.github.api_url.clone(),
            config.github.token.clone(),
        ));
        Self {
            config,
            build: None,
            repo: None,
            user: None,
            metadata: None,
            files: Vec::new(),
            labels: Vec::new(),
            format: None,
            token: None,
            cache: None,
            registry,
            netrc: None,
        }
    }

    pub fn with_build(mut self, build: BuildRecord) -> Self {
        self.build = Some(build);
        self
    }

    pub fn with_repo(mut self, repo: Repo) -> Self {
        self.repo = Some(repo);
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_metadata(mut self, metadata: PlatformMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Files changed by the build, for `path` rules.
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.config.local = local;
        self
    }

    pub fn with_local_templates(mut self, templates: BTreeMap<String, PathBuf>) -> Self {
        self.config.local_templates = templates;
        self
    }

    /// Overrides the dialect taken from the repository.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Source provider token attached to the pipeline and used for template
    /// fetches when the user has none.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn TemplateCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_netrc_provider(mut self, provider: Arc<dyn NetrcProvider>) -> Self {
        self.netrc = Some(provider);
        self
    }

    fn identity(&self) -> BuildIdentity {
        match (&self.repo, &self.build) {
            (Some(repo), Some(build)) if !self.config.local => {
                BuildIdentity::new(repo.org.clone(), repo.name.clone(), build.number)
            }
            _ => BuildIdentity::local(),
        }
    }

    /// Rule data for the build, if there is a build to match against.
    fn rule_data(&self) -> Option<RuleData> {
        let build = self.build.as_ref()?;
        Some(RuleData::from_records(
            build,
            &self.repo.clone().unwrap_or_default(),
            &self.metadata.clone().unwrap_or_default(),
            &self.files,
            &self.labels,
        ))
    }

    fn format(&self) -> Format {
        self.format
            .or_else(|| self.repo.as_ref().map(|repo| repo.pipeline_type))
            .unwrap_or_default()
    }

    async fn environment(&self) -> EnvironmentContext {
        let netrc = match (&self.netrc, &self.metadata) {
            (Some(provider), Some(metadata)) => provider.netrc(&metadata.scm_host()).await,
            _ => None,
        };
        EnvironmentContext {
            build: self.build.clone(),
            repo: self.repo.clone(),
            user: self.user.clone(),
            metadata: self.metadata.clone(),
            netrc,
            local: self.config.local,
        }
    }

    fn resolver(&self) -> Resolver {
        let user_token = self
            .user
            .as_ref()
            .map(|user| user.token.clone())
            .filter(|token| !token.is_empty());
        Resolver {
            cache: self.cache.clone(),
            registry: self.registry.clone(),
            local: self.config.local,
            local_templates: self.config.local_templates.clone(),
            token: user_token.or_else(|| self.token.clone()),
            repository: self
                .repo
                .as_ref()
                .map(|repo| (repo.org.clone(), repo.name.clone())),
            commit: self
                .build
                .as_ref()
                .map(|build| build.commit.clone())
                .unwrap_or_default(),
        }
    }

    /// Parses `source` and expands every template in it.
    async fn parse_and_expand(
        &self,
        source: Source,
        env: &EnvironmentContext,
        rule_data: Option<&RuleData>,
    ) -> Result<(Build, ConfigSummary, Vec<String>, bool)> {
        let format = self.format();
        let ctx = RenderContext {
            name: self
                .repo
                .as_ref()
                .map(|repo| repo.full_name.clone())
                .unwrap_or_default(),
            environment: env.defaults(),
            script_limit: self.config.script_exec_limit,
            ..Default::default()
        };
        let parsed = parse(source, format, &ctx)?;
        let summary = ConfigSummary::new(parsed.raw, format, &parsed.build, parsed.warnings.clone());
        let mut warnings = parsed.warnings;

        let resolver = self.resolver();
        // Chains of templates must stay shorter than the configured depth.
        let depth = self.config.template_depth.saturating_sub(1);
        let mut expander = Expander::new(
            &resolver,
            env,
            rule_data,
            self.config.template_depth,
            self.config.script_exec_limit,
        );
        let build = expander.render_inline(parsed.build, depth).await?;
        let build = expander.expand_steps(build, depth).await?;
        warnings.append(&mut expander.warnings);

        Ok((build, summary, warnings, expander.templated))
    }

    /// Compiles `source` into an executable pipeline.
    pub async fn compile(&self, source: Source) -> Result<CompileOutput> {
        let identity = self.identity();
        info!(build = %identity, local = self.config.local, "compiling pipeline");

        let env = self.environment().await;
        let rule_data = self.rule_data();

        let (mut build, summary, mut warnings, templated) = self
            .parse_and_expand(source, &env, rule_data.as_ref())
            .await?;

        if let Some(config) = &self.config.modification {
            let request = ModifyRequest {
                build: identity.number,
                repo: identity.repo.clone(),
                org: identity.org.clone(),
                user: self.user.as_ref().map(|u| u.name.clone()).unwrap_or_default(),
                ..Default::default()
            };
            let (modified, mut modify_warnings) = ModificationClient::new(config.clone())
                .modify(&build, request)
                .await?;
            build = modified;
            warnings.append(&mut modify_warnings);
        }

        validate_document(&build, self.config.report_as_limit)?;

        if build.stages.is_empty() {
            inject_steps(&mut build, &self.config.clone_image);
        } else {
            inject_stages(&mut build, &self.config.clone_image);
        }

        env.apply(&mut build);
        substitute_build(&mut build)?;
        script_build(&mut build);

        let mut pipeline = transform(&build, &identity, templated);
        pipeline.token = self.token.clone();
        validate_pipeline(&pipeline)?;

        if let Some(data) = &rule_data {
            pipeline = pipeline.purge(data)?;
        }

        info!(
            pipeline = %pipeline.id,
            stages = pipeline.stages.len(),
            steps = pipeline.containers().count(),
            warnings = warnings.len(),
            "pipeline compiled"
        );
        Ok(CompileOutput {
            pipeline,
            summary,
            warnings,
        })
    }

    /// Expands `source` without transforming it.
    ///
    /// With `rule_data` the document is purged against it, and templates of
    /// steps that would be purged are never fetched. With `substitute` every
    /// step has its `${VAR}` references resolved against the environment it
    /// would run with, without that environment being written to the step.
    pub async fn compile_lite(
        &self,
        source: Source,
        rule_data: Option<&RuleData>,
        substitute: bool,
    ) -> Result<LiteOutput> {
        let env = self.environment().await;
        let (mut build, summary, warnings, _) =
            self.parse_and_expand(source, &env, rule_data).await?;

        if let Some(data) = rule_data {
            build = purge_document(build, data)?;
        }

        if substitute {
            let snapshot = build.clone();
            for stage in &mut build.stages {
                for step in &mut stage.steps {
                    let step_env = env.step_environment(&snapshot, Some(&stage.environment), step);
                    *step = substitute_step(step, &step_env)?;
                }
            }
            for step in &mut build.steps {
                let step_env = env.step_environment(&snapshot, None, step);
                *step = substitute_step(step, &step_env)?;
            }
        }

        validate_document(&build, self.config.report_as_limit)?;
        debug!(
            stages = build.stages.len(),
            steps = build.steps.len(),
            "configuration expanded"
        );
        Ok(LiteOutput {
            document: build,
            summary,
            warnings,
        })
    }
}

/// Substitutes every step and secret origin against its own environment.
fn substitute_build(build: &mut Build) -> Result<()> {
    let apply = |step: &mut Step| -> Result<()> {
        let env = step.environment.clone();
        *step = substitute_step(step, &env)?;
        Ok(())
    };

    for stage in &mut build.stages {
        stage.steps.iter_mut().try_for_each(apply)?;
    }
    build.steps.iter_mut().try_for_each(apply)?;
    build
        .secrets
        .iter_mut()
        .filter_map(|secret| secret.origin.as_mut())
        .try_for_each(apply)
}
