//! End-to-end tests of the two-pass resolution pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use mu_spec::config::{Loader, Parser, ResourceKind, SpecHasher};
use mu_spec::error::{MuError, PreprocessError, ResolveError};
use serde_json::json;

fn source(pairs: &[(&str, &str)]) -> Arc<HashMap<String, String>> {
    Arc::new(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    )
}

fn parser_with(pairs: &[(&str, &str)]) -> Parser {
    Parser::new().with_environment_source(source(pairs))
}

const MULTI_ENVIRONMENT: &str = r#"
environments:
  - acceptance:
      x: 1
  - production:
      x: 2
      events:
        pre-deploy: ./migrate.sh
---
containers:
  - docker:
      name: app
      file: Dockerfile
---
actions:
  - deploy:
      name: web
---
resources:
  - service:
      name: api
      replicas: {{ 3 if environment == "production" else 1 }}
{% if environment == "production" %}
  - database:
      name: main
{% endif %}
"#;

#[test]
fn absent_environments_default_to_development() {
    let spec = parser_with(&[]).parse("resources:\n  - network: {}\n").unwrap();

    assert_eq!(spec.environment_names(), vec!["development"]);
    let development = spec.environment("development").unwrap();
    assert_eq!(development.resources.last().map(|r| r.kind()), Some(ResourceKind::Environment));
}

#[test]
fn declared_environments_are_discovered_in_order() {
    let spec = parser_with(&[]).parse("environments: [a, b, c]\n").unwrap();
    assert_eq!(spec.environment_names(), vec!["a", "b", "c"]);
}

#[test]
fn environment_config_does_not_cross_environments() {
    let spec = parser_with(&[]).parse(MULTI_ENVIRONMENT).unwrap();

    let acceptance = spec.environment("acceptance").unwrap().environment().unwrap();
    let production = spec.environment("production").unwrap().environment().unwrap();
    assert_eq!(acceptance.get("x"), Some(&json!(1)));
    assert_eq!(production.get("x"), Some(&json!(2)));
    assert!(spec.environment("acceptance").unwrap().events().is_none());
    assert_eq!(
        spec.environment("production").unwrap().events(),
        Some(&json!({ "pre-deploy": "./migrate.sh" }))
    );
}

#[test]
fn conditionals_resolve_per_environment() {
    let spec = parser_with(&[]).parse(MULTI_ENVIRONMENT).unwrap();

    let acceptance = spec.environment("acceptance").unwrap();
    let production = spec.environment("production").unwrap();
    assert_eq!(acceptance.resources_of(ResourceKind::Database).count(), 0);
    assert_eq!(production.resources_of(ResourceKind::Database).count(), 1);

    assert_eq!(spec.containers.len(), 1);
    assert_eq!(spec.containers[0].kind, "docker");
    assert_eq!(spec.actions.len(), 1);
}

#[test]
fn env_values_follow_the_source_between_parses() {
    let input = "resources:\n  - service:\n      owner: {{ env(\"OWNER\") }}\n";

    let first = parser_with(&[("OWNER", "alice")]).parse(input).unwrap();
    let second = parser_with(&[("OWNER", "bob")]).parse(input).unwrap();

    let owner = |spec: &mu_spec::config::Spec| {
        spec.environments[0].resources[0]
            .props()
            .and_then(|p| p.get("owner"))
            .cloned()
    };
    assert_eq!(owner(&first), Some(json!("alice")));
    assert_eq!(owner(&second), Some(json!("bob")));
    assert_eq!(first.environment_variables.get("OWNER").map(String::as_str), Some("alice"));
}

#[cfg(unix)]
#[test]
fn failing_command_is_a_shell_failure() {
    let result = parser_with(&[]).parse("user: {{ cmd(\"exit 1\") }}\n");
    assert!(matches!(
        result,
        Err(MuError::Preprocess(PreprocessError::ShellCommandFailed { .. }))
    ));
}

#[test]
fn malformed_document_does_not_hide_siblings() {
    let input = "environments: [a]\n---\nbroken: [1, 2\n---\nresources:\n  - storage: {}\n";

    let loaded = Loader::new().load(input).unwrap();
    assert_eq!(loaded.documents.len(), 2);
    assert_eq!(loaded.dropped.len(), 1);

    let spec = parser_with(&[]).parse(input).unwrap();
    assert_eq!(spec.environment_names(), vec!["a"]);
    assert_eq!(spec.environments[0].resources_of(ResourceKind::Storage).count(), 1);
}

#[test]
fn environments_tag_must_be_unique() {
    let result = parser_with(&[]).parse("environments: [a]\n---\nenvironments: [b]\n");
    assert!(matches!(
        result,
        Err(MuError::Resolve(ResolveError::TooManyRootTags { .. }))
    ));
}

#[test]
fn repeated_parses_are_deterministic() {
    let hasher = SpecHasher::new();
    let parser = parser_with(&[("REGION", "eu-west-1")]);
    let input = format!("{MULTI_ENVIRONMENT}---\nresources:\n  - network:\n      region: {{{{ env(\"REGION\") }}}}\n");

    let first = parser.parse(&input).unwrap();
    let second = parser.parse(&input).unwrap();

    assert_eq!(first, second);
    assert_eq!(hasher.hash_spec(&first).unwrap(), hasher.hash_spec(&second).unwrap());
}

#[test]
fn failure_in_one_environment_fails_the_parse() {
    let input = r#"
environments: [acceptance, production]
---
resources:
  - service:
      tag: {{ missing if environment == "production" else "ok" }}
"#;
    let result = parser_with(&[]).parse(input);
    assert!(matches!(
        result,
        Err(MuError::Preprocess(PreprocessError::RenderFailed { .. }))
    ));
}

#[test]
fn spec_file_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("mu.yml");
    std::fs::write(&path, MULTI_ENVIRONMENT).unwrap();

    let spec = parser_with(&[]).parse_file(&path).unwrap();
    assert_eq!(spec.environment_names(), vec!["acceptance", "production"]);
}
