use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use conduit_compiler::cache::StaticCache;
use conduit_compiler::modify::{ModifyRequest, ModifyResponse};
use conduit_compiler::{CompileError, Compiler};
use conduit_config::Source;
use conduit_config::system::{CompilerConfig, ModificationConfig};
use conduit_core::document::Format;
use conduit_core::records::{BuildRecord, PlatformMetadata, Repo, User};
use conduit_core::rules::RuleData;

fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/testdata")
        .join(name)
}

fn fixture(name: &str) -> Source {
    Source::Path(testdata(name))
}

fn push_build() -> BuildRecord {
    BuildRecord {
        number: 42,
        event: "push".to_string(),
        branch: "main".to_string(),
        commit: "abc123".to_string(),
        ..Default::default()
    }
}

fn repo() -> Repo {
    Repo {
        org: "octo".to_string(),
        name: "hello".to_string(),
        full_name: "octo/hello".to_string(),
        ..Default::default()
    }
}

fn compiler() -> Compiler {
    Compiler::new(CompilerConfig::default())
        .with_build(push_build())
        .with_repo(repo())
        .with_metadata(PlatformMetadata {
            address: "https://conduit.example.com".to_string(),
            scm_address: "https://github.com".to_string(),
            ..Default::default()
        })
}

fn go_template_cache() -> Arc<StaticCache> {
    let template = std::fs::read_to_string(testdata("templates/go.yml")).unwrap();
    Arc::new(StaticCache::new().with("octo/templates/go.yml", template))
}

fn step_names(output: &conduit_compiler::CompileOutput) -> Vec<String> {
    output
        .pipeline
        .containers()
        .map(|c| c.name.clone())
        .collect()
}

fn decoded_script(container: &conduit_core::pipeline::Container) -> String {
    let encoded = &container.environment["CONDUIT_BUILD_SCRIPT"];
    String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap()
}

/// Serves `router` on an ephemeral port and returns its address.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_compile_steps() {
    let output = compiler().compile(fixture("steps.yml")).await.unwrap();
    let pipeline = &output.pipeline;

    assert_eq!(pipeline.id, "__octo_hello_42");
    assert_eq!(step_names(&output), vec!["init", "clone", "test", "publish"]);
    let numbers: Vec<_> = pipeline.steps.iter().map(|c| c.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(pipeline.steps[2].id, "step_octo_hello_42_test");
    assert_eq!(pipeline.steps[1].image, conduit_config::system::DEFAULT_CLONE_IMAGE);

    let test = &pipeline.steps[2];
    assert_eq!(test.environment["BUILD_BRANCH"], "main");
    assert_eq!(test.environment["GOOS"], "linux");
    assert_eq!(test.entrypoint, vec!["/bin/sh", "-c"]);
    assert!(decoded_script(test).contains("\necho main\n"));

    let publish = &pipeline.steps[3];
    assert_eq!(
        publish.parameters["tags"].to_display_string(),
        "latest,abc123"
    );
    assert_eq!(publish.environment["PARAMETER_REPO"], "octo/hello");
    assert!(publish.commands.is_empty());

    assert_eq!(output.summary.digest.len(), 64);
    assert!(output.summary.flags.steps);
}

#[tokio::test]
async fn test_clone_disabled() {
    let source = Source::from(
        r#"
version: "1"
metadata:
  clone: false
steps:
  - name: a
    image: alpine
    commands: [echo a]
  - name: b
    image: alpine
    commands: [echo b]
"#,
    );
    let output = Compiler::new(CompilerConfig::default())
        .compile(source)
        .await
        .unwrap();

    assert_eq!(output.pipeline.id, "__localOrg_localRepo_1");
    assert_eq!(step_names(&output), vec!["init", "a", "b"]);
    assert!(!output.pipeline.metadata.clone);
}

#[tokio::test]
async fn test_compile_stages() {
    let output = compiler().compile(fixture("stages.yml")).await.unwrap();
    let pipeline = &output.pipeline;

    let stages: Vec<_> = pipeline.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(stages, vec!["init", "clone", "test", "publish"]);
    assert_eq!(pipeline.stages[2].needs, vec!["clone"]);
    assert_eq!(pipeline.stages[3].needs, vec!["test", "clone"]);

    let numbers: Vec<_> = pipeline.containers().map(|c| c.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);

    let unit = &pipeline.stages[2].steps[0];
    assert_eq!(unit.id, "step_octo_hello_42_test_unit");
    assert_eq!(unit.environment["REGION"], "eu-west-1");
    let docker = &pipeline.stages[3].steps[0];
    assert_eq!(docker.environment["REGION"], "us-east-1");
}

#[tokio::test]
async fn test_structural_errors() {
    let cases = [
        ("version: \"1\"\nservices:\n  - name: redis\n    image: redis\n", "no stages, steps or templates"),
        (
            "version: \"1\"\nstages:\n  a:\n    steps:\n      - {name: x, image: alpine, commands: [x]}\nsteps:\n  - {name: y, image: alpine, commands: [y]}\n",
            "stages and steps cannot both be provided",
        ),
        (
            "version: \"1\"\nstages:\n  build:\n    needs: [build]\n    steps:\n      - {name: make, image: gcc, commands: [make]}\n",
            "stage build: needs itself",
        ),
        (
            "version: \"1\"\nstages:\n  clone:\n    steps:\n      - {name: fetch, image: git, commands: [git fetch]}\n",
            "stage clone: name is reserved",
        ),
    ];

    for (source, expected) in cases {
        let err = compiler().compile(Source::from(source)).await.unwrap_err();
        match err {
            CompileError::Validation(errors) => assert!(errors.contains(expected), "{errors}"),
            other => panic!("expected a validation error, got {other}"),
        }
    }
}

fn report_as_source(targets: &[String]) -> Source {
    let mut yaml = String::from("version: \"1\"\nsteps:\n");
    for (i, target) in targets.iter().enumerate() {
        yaml.push_str(&format!(
            "  - name: step{i}\n    image: alpine\n    commands: [\"true\"]\n    report_as: {target}\n"
        ));
    }
    Source::Str(yaml)
}

#[tokio::test]
async fn test_report_as_limit() {
    let twelve: Vec<String> = (0..12).map(|i| format!("check-{i}")).collect();
    let err = compiler()
        .compile(report_as_source(&twelve))
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::Validation(_)));

    assert!(compiler().compile(report_as_source(&twelve[..10])).await.is_ok());

    let shared = vec!["lint".to_string(), "lint".to_string()];
    let err = compiler()
        .compile(report_as_source(&shared))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already used"));
}

#[tokio::test]
async fn test_purge_by_rule() {
    let data = RuleData {
        event: "pull_request".to_string(),
        ..Default::default()
    };
    let lite = compiler()
        .compile_lite(fixture("steps.yml"), Some(&data), false)
        .await
        .unwrap();
    let names: Vec<_> = lite.document.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["test"]);

    let full = compiler()
        .with_build(BuildRecord {
            event: "pull_request".to_string(),
            ..push_build()
        })
        .compile(fixture("steps.yml"))
        .await
        .unwrap();
    assert_eq!(step_names(&full), vec!["init", "clone", "test"]);
}

#[tokio::test]
async fn test_lite_substitution() {
    let lite = compiler()
        .compile_lite(fixture("steps.yml"), None, true)
        .await
        .unwrap();
    let test = &lite.document.steps[0];
    assert_eq!(test.commands[1], "echo main");
    assert_eq!(test.environment["BUILD_BRANCH"], "spoofed");
}

#[tokio::test]
async fn test_step_templates() {
    let output = compiler()
        .with_cache(go_template_cache())
        .compile(fixture("templated.yml"))
        .await
        .unwrap();

    assert_eq!(
        step_names(&output),
        vec!["init", "clone", "golang_install", "golang_test"]
    );
    assert!(output.pipeline.metadata.template);

    let test = &output.pipeline.steps[3];
    assert_eq!(test.image, "golang:1.22");
    assert_eq!(test.environment["GOPROXY"], "https://proxy.golang.org");
    let script = decoded_script(test);
    assert!(script.contains("\ngo test -race ./...\n"), "{script}");
    assert!(script.contains("\necho built main\n"), "{script}");
}

#[tokio::test]
async fn test_template_used_by_two_steps() {
    let source = r#"
version: "1"
templates:
  - name: go
    source: octo/templates/go.yml
    type: github
steps:
  - name: stable
    template:
      name: go
      vars: {version: "1.22", race: false}
  - name: next
    template:
      name: go
      vars: {version: "1.23", race: true}
"#;
    let output = compiler()
        .with_cache(go_template_cache())
        .compile(Source::from(source))
        .await
        .unwrap();

    assert_eq!(
        step_names(&output),
        vec!["init", "clone", "stable_install", "stable_test", "next_install", "next_test"]
    );
    assert_eq!(output.pipeline.steps[5].image, "golang:1.23");
}

#[tokio::test]
async fn test_step_templates_rejected_with_render_inline() {
    let source = r#"
version: "1"
metadata:
  render_inline: true
templates:
  - name: go
    source: octo/templates/go.yml
    type: github
    vars: {version: "1.22", race: false}
steps:
  - name: x
    template:
      name: go
"#;
    let err = compiler()
        .with_cache(go_template_cache())
        .compile(Source::from(source))
        .await
        .unwrap_err();
    match err {
        CompileError::Validation(errors) => {
            assert!(errors.contains("step templates cannot be used with render_inline"), "{errors}")
        }
        other => panic!("expected a validation error, got {other}"),
    }
}

fn chain(depth: usize) -> StaticCache {
    let mut cache = StaticCache::new();
    for level in 1..=depth {
        let body = if level < depth {
            format!(
                "templates:\n  - name: t{next}\n    source: octo/templates/t{next}.yml\nsteps:\n  - name: s{next}\n    template:\n      name: t{next}\n",
                next = level + 1
            )
        } else {
            "steps:\n  - name: leaf\n    image: alpine\n    commands: [echo leaf]\n".to_string()
        };
        cache = cache.with(format!("octo/templates/t{level}.yml"), body);
    }
    cache
}

const CHAIN_ROOT: &str = r#"
version: "1"
templates:
  - name: t1
    source: octo/templates/t1.yml
steps:
  - name: s1
    template:
      name: t1
"#;

#[tokio::test]
async fn test_template_depth() {
    let config = CompilerConfig {
        template_depth: 3,
        ..Default::default()
    };

    let output = Compiler::new(config.clone())
        .with_cache(Arc::new(chain(2)))
        .compile(Source::from(CHAIN_ROOT))
        .await
        .unwrap();
    assert_eq!(step_names(&output), vec!["init", "clone", "s1_s2_leaf"]);

    for length in [3, 4] {
        let err = Compiler::new(config.clone())
            .with_cache(Arc::new(chain(length)))
            .compile(Source::from(CHAIN_ROOT))
            .await
            .unwrap_err();
        assert!(
            matches!(err, CompileError::TemplateDepthExceeded { max: 3 }),
            "chain of {length}: {err}"
        );
    }

    let looping = "templates:\n  - name: t1\n    source: octo/templates/t1.yml\nsteps:\n  - name: s1\n    template:\n      name: t1\n";
    let err = Compiler::new(config)
        .with_cache(Arc::new(StaticCache::new().with("octo/templates/t1.yml", looping)))
        .compile(Source::from(CHAIN_ROOT))
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::TemplateDepthExceeded { .. }));
}

#[tokio::test]
async fn test_local_templates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("go.yml");
    std::fs::copy(testdata("templates/go.yml"), &path).unwrap();

    let mut templates = BTreeMap::new();
    templates.insert("go".to_string(), path);

    let output = Compiler::new(CompilerConfig::default())
        .with_local(true)
        .with_local_templates(templates)
        .compile(fixture("templated.yml"))
        .await
        .unwrap();
    assert_eq!(output.pipeline.id, "__localOrg_localRepo_1");
    assert_eq!(output.pipeline.steps.len(), 4);

    let err = Compiler::new(CompilerConfig::default())
        .with_local(true)
        .compile(fixture("templated.yml"))
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::TemplateSource { name, .. } if name == "go"));
}

#[tokio::test]
async fn test_github_registry() {
    async fn contents(
        Path((org, repo, path)): Path<(String, String, String)>,
        headers: HeaderMap,
    ) -> Result<String, StatusCode> {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer user-token");
        if !authorized {
            return Err(StatusCode::UNAUTHORIZED);
        }
        if (org.as_str(), repo.as_str(), path.as_str()) != ("octo", "templates", "go.yml") {
            return Err(StatusCode::NOT_FOUND);
        }
        std::fs::read_to_string(testdata("templates/go.yml")).map_err(|_| StatusCode::NOT_FOUND)
    }

    let api = serve(Router::new().route("/repos/{org}/{repo}/contents/{*path}", get(contents))).await;
    let mut config = CompilerConfig::default();
    config.github.api_url = api;

    let output = Compiler::new(config.clone())
        .with_build(push_build())
        .with_repo(repo())
        .with_user(User {
            name: "octocat".to_string(),
            token: "user-token".to_string(),
            ..Default::default()
        })
        .compile(fixture("templated.yml"))
        .await
        .unwrap();
    assert_eq!(output.pipeline.steps.len(), 4);

    let err = Compiler::new(config)
        .with_build(push_build())
        .with_repo(repo())
        .compile(fixture("templated.yml"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("401"), "{err}");
}

#[tokio::test]
async fn test_modification_hook() {
    async fn modify(headers: HeaderMap, Json(request): Json<ModifyRequest>) -> Result<Json<ModifyResponse>, StatusCode> {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer s3cret") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        assert_eq!(request.org, "octo");
        assert_eq!(request.repo, "hello");
        assert_eq!(request.build, 42);
        let mut doc: serde_yaml::Value = serde_yaml::from_str(&request.pipeline).unwrap();
        let audit: serde_yaml::Value =
            serde_yaml::from_str("{name: audit, image: alpine, commands: [echo audit]}").unwrap();
        doc["steps"].as_sequence_mut().unwrap().push(audit);
        Ok(Json(ModifyResponse {
            pipeline: serde_yaml::to_string(&doc).unwrap(),
        }))
    }

    let endpoint = serve(Router::new().route("/modify", post(modify))).await;
    let mut hook = ModificationConfig::new(format!("{endpoint}/modify"));
    hook.secret = "s3cret".to_string();
    let config = CompilerConfig {
        modification: Some(hook),
        ..Default::default()
    };

    let source = Source::from(
        "version: \"1\"\nsteps:\n  - name: test\n    image: alpine\n    commands: [echo test]\n",
    );
    let output = Compiler::new(config)
        .with_build(push_build())
        .with_repo(repo())
        .compile(source)
        .await
        .unwrap();
    assert_eq!(step_names(&output), vec!["init", "clone", "test", "audit"]);
}

#[tokio::test]
async fn test_modification_hook_retries() {
    async fn failing(State(calls): State<Arc<AtomicUsize>>) -> StatusCode {
        calls.fetch_add(1, Ordering::SeqCst);
        StatusCode::INTERNAL_SERVER_ERROR
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let endpoint = serve(
        Router::new()
            .route("/modify", post(failing))
            .with_state(calls.clone()),
    )
    .await;

    let mut hook = ModificationConfig::new(format!("{endpoint}/modify"));
    hook.retries = 3;
    hook.backoff_min = Duration::from_millis(1);
    hook.backoff_max = Duration::from_millis(5);
    let config = CompilerConfig {
        modification: Some(hook),
        ..Default::default()
    };

    let err = Compiler::new(config)
        .compile(fixture("steps.yml"))
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::ModificationHook { attempts: 3, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_script_configuration() {
    let source = Source::from(
        r#"
#{
    version: "1",
    steps: [1, 2].map(|n| #{
        name: `shard-${n}`,
        image: "golang",
        commands: [`go test -shard ${n}`, "echo " + platform("build_branch")],
    }),
}
"#,
    );
    let output = compiler()
        .with_format(Format::Rhai)
        .compile(source)
        .await
        .unwrap();

    assert_eq!(
        step_names(&output),
        vec!["init", "clone", "shard-1", "shard-2"]
    );
    assert!(decoded_script(&output.pipeline.steps[3]).contains("\necho main\n"));
}
