//! Template source resolution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use conduit_core::document::{Template, TemplateType};
use tracing::debug;

use crate::cache::TemplateCache;
use crate::registry::{Registry, RegistrySource};
use crate::{CompileError, Result};

/// Finds the bytes of a template.
///
/// Lookup order: the cache, then (for local compiles) the local template
/// table or the file named by a `file` template, then the registry. In
/// service mode a `file` template is read from the building repository at the
/// building commit.
pub(crate) struct Resolver {
    pub cache: Option<Arc<dyn TemplateCache>>,
    pub registry: Arc<dyn Registry>,
    pub local: bool,
    pub local_templates: BTreeMap<String, PathBuf>,
    pub token: Option<String>,
    /// `org/name` of the building repository and the commit being built.
    pub repository: Option<(String, String)>,
    pub commit: String,
}

impl Resolver {
    pub async fn fetch(&self, template: &Template) -> Result<Vec<u8>> {
        let key = self.cache_key(template)?;
        if let Some(bytes) = key
            .as_deref()
            .and_then(|key| self.cache.as_ref()?.get(key))
        {
            debug!(template = %template.name, source = %template.source, "template cache hit");
            return Ok(bytes);
        }

        let bytes = if self.local {
            self.fetch_local(template).await?
        } else {
            self.fetch_remote(template).await?
        };

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.put(&key, &bytes);
        }
        Ok(bytes)
    }

    /// The locator a template is cached under. `file` templates resolve
    /// against the building repository and commit; anything read from disk
    /// is not cached.
    fn cache_key(&self, template: &Template) -> Result<Option<String>> {
        if self.local
            && (template.kind == TemplateType::File
                || self.local_templates.contains_key(&template.name))
        {
            return Ok(None);
        }
        match template.kind {
            TemplateType::Github => Ok(Some(template.source.clone())),
            TemplateType::File => Ok(Some(self.file_source(template)?.to_string())),
        }
    }

    async fn fetch_local(&self, template: &Template) -> Result<Vec<u8>> {
        let path = match (self.local_templates.get(&template.name), template.kind) {
            (Some(path), _) => path.as_path(),
            (None, TemplateType::File) => Path::new(&template.source),
            (None, TemplateType::Github) => {
                return Err(CompileError::template_source(
                    &template.name,
                    "no local definition provided",
                ));
            }
        };
        debug!(template = %template.name, path = %path.display(), "reading local template");
        tokio::fs::read(path)
            .await
            .map_err(|e| CompileError::template_source(&template.name, format!("{}: {e}", path.display())))
    }

    fn file_source(&self, template: &Template) -> Result<RegistrySource> {
        let Some((org, repo)) = &self.repository else {
            return Err(CompileError::template_source(
                &template.name,
                "file templates need a repository",
            ));
        };
        Ok(RegistrySource {
            host: None,
            org: org.clone(),
            repo: repo.clone(),
            path: template.source.trim_start_matches("./").to_string(),
            reference: (!self.commit.is_empty()).then(|| self.commit.clone()),
        })
    }

    async fn fetch_remote(&self, template: &Template) -> Result<Vec<u8>> {
        let source = match template.kind {
            TemplateType::Github => RegistrySource::parse(&template.source)
                .map_err(|e| CompileError::template_source(&template.name, e))?,
            TemplateType::File => self.file_source(template)?,
        };

        debug!(template = %template.name, %source, "fetching template");
        self.registry
            .template(self.token.as_deref(), &source)
            .await
            .map_err(|e| CompileError::template_source(&template.name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{SharedCache, StaticCache};
    use crate::registry::RegistryError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every request and serves a fixed body.
    #[derive(Default)]
    struct Recording {
        requests: Mutex<Vec<(Option<String>, String)>>,
    }

    #[async_trait]
    impl Registry for Recording {
        async fn template(
            &self,
            token: Option<&str>,
            source: &RegistrySource,
        ) -> std::result::Result<Vec<u8>, RegistryError> {
            self.requests
                .lock()
                .unwrap()
                .push((token.map(str::to_string), source.to_string()));
            Ok(b"steps: []".to_vec())
        }
    }

    fn resolver(registry: Arc<Recording>) -> Resolver {
        Resolver {
            cache: None,
            registry,
            local: false,
            local_templates: BTreeMap::new(),
            token: Some("user-token".to_string()),
            repository: Some(("octo".to_string(), "hello".to_string())),
            commit: "abc123".to_string(),
        }
    }

    fn template(kind: TemplateType, source: &str) -> Template {
        Template {
            name: "tmpl".to_string(),
            source: source.to_string(),
            kind,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cache_first() {
        let registry = Arc::new(Recording::default());
        let mut resolver = resolver(registry.clone());
        resolver.cache = Some(Arc::new(StaticCache::new().with("octo/tmpl/go.yml", "cached")));

        let bytes = resolver
            .fetch(&template(TemplateType::Github, "octo/tmpl/go.yml"))
            .await
            .unwrap();
        assert_eq!(bytes, b"cached");
        assert!(registry.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_sources() {
        let registry = Arc::new(Recording::default());
        let resolver = resolver(registry.clone());

        resolver
            .fetch(&template(TemplateType::Github, "octo/tmpl/go.yml@v1"))
            .await
            .unwrap();
        resolver
            .fetch(&template(TemplateType::File, "./.conduit/go.yml"))
            .await
            .unwrap();

        let requests = registry.requests.lock().unwrap().clone();
        assert_eq!(
            requests,
            vec![
                (Some("user-token".to_string()), "octo/tmpl/go.yml@v1".to_string()),
                (Some("user-token".to_string()), "octo/hello/.conduit/go.yml@abc123".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_source() {
        let resolver = resolver(Arc::new(Recording::default()));
        let err = resolver
            .fetch(&template(TemplateType::Github, "go.yml"))
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::TemplateSource { name, .. } if name == "tmpl"));
    }

    #[tokio::test]
    async fn test_local_templates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("go.yml");
        std::fs::write(&path, "steps: []").unwrap();

        let mut resolver = resolver(Arc::new(Recording::default()));
        resolver.local = true;

        let by_path = template(TemplateType::File, path.to_str().unwrap());
        assert_eq!(resolver.fetch(&by_path).await.unwrap(), b"steps: []");

        let remote = template(TemplateType::Github, "octo/tmpl/go.yml");
        assert!(resolver.fetch(&remote).await.is_err());

        resolver.local_templates.insert("tmpl".to_string(), path);
        assert_eq!(resolver.fetch(&remote).await.unwrap(), b"steps: []");
    }

    /// Serves `<repo>-<ref>` for every request.
    struct PerRepo;

    #[async_trait]
    impl Registry for PerRepo {
        async fn template(
            &self,
            _token: Option<&str>,
            source: &RegistrySource,
        ) -> std::result::Result<Vec<u8>, RegistryError> {
            let reference = source.reference.clone().unwrap_or_default();
            Ok(format!("{}-{reference}", source.repo).into_bytes())
        }
    }

    #[tokio::test]
    async fn test_shared_cache_keys_file_templates_by_repository() {
        let cache = Arc::new(SharedCache::new());
        let for_repo = |repo: &str, commit: &str| Resolver {
            cache: Some(cache.clone()),
            registry: Arc::new(PerRepo),
            local: false,
            local_templates: BTreeMap::new(),
            token: None,
            repository: Some(("octo".to_string(), repo.to_string())),
            commit: commit.to_string(),
        };
        let file = template(TemplateType::File, "./.conduit/t.yml");

        let alpha = for_repo("alpha", "c1").fetch(&file).await.unwrap();
        let beta = for_repo("beta", "c2").fetch(&file).await.unwrap();
        let alpha_next = for_repo("alpha", "c3").fetch(&file).await.unwrap();

        assert_eq!(alpha, b"alpha-c1");
        assert_eq!(beta, b"beta-c2");
        assert_eq!(alpha_next, b"alpha-c3");
        assert_eq!(cache.len(), 3);

        // Absolute sources are shared.
        let github = template(TemplateType::Github, "octo/tmpl/go.yml@v1");
        let first = for_repo("alpha", "c1").fetch(&github).await.unwrap();
        let second = for_repo("beta", "c2").fetch(&github).await.unwrap();
        assert_eq!(first, b"tmpl-v1");
        assert_eq!(second, b"tmpl-v1");
        assert_eq!(cache.len(), 4);
    }

    #[tokio::test]
    async fn test_local_reads_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("go.yml");
        std::fs::write(&path, "steps: []").unwrap();

        let cache = Arc::new(SharedCache::new());
        let mut resolver = resolver(Arc::new(Recording::default()));
        resolver.local = true;
        resolver.cache = Some(cache.clone());

        let by_path = template(TemplateType::File, path.to_str().unwrap());
        assert_eq!(resolver.fetch(&by_path).await.unwrap(), b"steps: []");
        assert!(cache.is_empty());
    }
}
