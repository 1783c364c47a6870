//! Compliance surface: the evaluator is a pure function, so this module
//! is the one place that gathers the inventory it needs to feed it,
//! fetched from the code host rather than the compliance crate itself.

use std::collections::HashMap;

use axum::extract::{Extension, Query, State};
use axum::Json;
use gitaudit_compliance::{RepositoryFile, RepositoryInventory};
use gitaudit_core::{Action, Fingerprint, GitopsError, Resource};
use gitaudit_store::{RepositoryCompliance, Template};
use serde::Deserialize;

use super::{audit, require};
use crate::auth_middleware::AuthenticatedUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "minScore")]
    pub min_score: Option<u32>,
}

pub async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Vec<RepositoryCompliance>>> {
    require(&user, Resource::Repository, Action::Read)?;
    let rows = state.store.list_repository_compliance(query.min_score).await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct CheckRequest {
    pub repo: String,
    pub templates: Vec<String>,
}

pub async fn check(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<CheckRequest>,
) -> ApiResult<Json<RepositoryCompliance>> {
    require(&user, Resource::Repository, Action::Read)?;

    let mut templates = Vec::with_capacity(request.templates.len());
    for name in &request.templates {
        let template = state
            .store
            .get_template(name)
            .await?
            .ok_or_else(|| GitopsError::not_found(format!("template {name} not found")))?;
        templates.push(template);
    }

    let inventory = collect_inventory(&state, &request.repo, &templates).await?;
    let result = gitaudit_compliance::evaluate(&request.repo, &inventory, &templates);
    state.store.upsert_repository_compliance(result.clone()).await?;
    audit(&state, &user.user.username, "compliance.check", "repository", &request.repo, serde_json::json!({"templates": request.templates, "score": result.score})).await;
    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct ApplyRequest {
    pub repo: String,
    pub template: String,
}

pub async fn apply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<ApplyRequest>,
) -> ApiResult<Json<RepositoryCompliance>> {
    require(&user, Resource::Template, Action::Apply)?;

    let template = state
        .store
        .get_template(&request.template)
        .await?
        .ok_or_else(|| GitopsError::not_found(format!("template {} not found", request.template)))?;

    let inventory = collect_inventory(&state, &request.repo, std::slice::from_ref(&template)).await?;
    let result = gitaudit_compliance::evaluate(&request.repo, &inventory, std::slice::from_ref(&template));
    let result = apply_remediations(&state, &request.repo, &template, &inventory, result).await?;
    state.store.upsert_repository_compliance(result.clone()).await?;
    audit(&state, &user.user.username, "compliance.apply", "repository", &request.repo, serde_json::json!({"template": request.template, "score": result.score})).await;
    Ok(Json(result))
}

/// Fetches every required file in every named template, and infers
/// directory presence from the parent paths of files that resolved.
/// `RepoHost` has no directory-listing primitive, so a required
/// directory counts as present only via this side effect of fetching
/// the files inside it.
async fn collect_inventory(
    state: &AppState,
    repository: &str,
    templates: &[Template],
) -> ApiResult<RepositoryInventory> {
    let (owner, name) = repository.split_once('/').unwrap_or((repository, repository));
    let mut inventory = RepositoryInventory::new();
    let mut seen_paths: HashMap<String, ()> = HashMap::new();

    for template in templates {
        for path in &template.required_files {
            if seen_paths.contains_key(path) {
                continue;
            }
            seen_paths.insert(path.clone(), ());

            match state.repo_host.get_file(owner, name, path, None).await {
                Ok(file) => {
                    let hash = Fingerprint::of(file.content.as_bytes()).to_hex();
                    inventory = inventory.with_file(
                        path.clone(),
                        RepositoryFile { hash, version: extract_version(&file.content), syntax_valid: true },
                    );
                    if let Some((dir, _)) = path.rsplit_once('/') {
                        inventory = inventory.with_directory(dir.to_string());
                    }
                }
                Err(error) if error.kind == gitaudit_core::ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
        }
    }

    Ok(inventory)
}

/// Templates rarely carry a version marker in file content; this looks
/// for a leading `# version: x.y.z` comment convention and otherwise
/// treats the file as unversioned (never flagged outdated).
fn extract_version(content: &str) -> Option<String> {
    content
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("# version:"))
        .map(|v| v.trim().to_string())
}

/// Writes back every required file that's currently missing, using the
/// template name itself as placeholder content; a real bundle source
/// (fetched from a template registry) is left for a future pass.
async fn apply_remediations(
    state: &AppState,
    repository: &str,
    template: &Template,
    inventory: &RepositoryInventory,
    compliance: RepositoryCompliance,
) -> ApiResult<RepositoryCompliance> {
    let (owner, name) = repository.split_once('/').unwrap_or((repository, repository));
    for path in &template.required_files {
        if inventory.files.contains_key(path) {
            continue;
        }
        let content = format!("# generated by template {} v{}\n", template.name, template.version);
        state
            .repo_host
            .put_file(owner, name, path, content.as_bytes(), &format!("apply template {}", template.name), "main", None)
            .await?;
    }
    Ok(compliance)
}
