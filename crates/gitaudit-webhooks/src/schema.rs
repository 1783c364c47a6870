//! Per-event-type payload validation. The required-field sets follow
//! the code host's native webhook shapes (`repository.full_name` plus
//! the fields each event type is defined by).

use gitaudit_core::{GitopsError, GitopsResult};
use serde_json::Value;

pub const WHITELISTED_EVENTS: &[&str] = &["push", "pull_request", "workflow_run", "repository_dispatch"];

pub fn validate(event_type: &str, payload: &Value) -> GitopsResult<()> {
    if !WHITELISTED_EVENTS.contains(&event_type) {
        return Err(GitopsError::validation(format!("unrecognized webhook event type '{event_type}'")));
    }

    require_path(payload, &["repository", "full_name"])?;

    match event_type {
        "push" => {
            require_path(payload, &["ref"])?;
            require_path(payload, &["after"])?;
        }
        "pull_request" => {
            require_path(payload, &["action"])?;
            require_path(payload, &["pull_request", "number"])?;
        }
        "workflow_run" => {
            require_path(payload, &["action"])?;
            require_path(payload, &["workflow_run", "id"])?;
            require_path(payload, &["workflow_run", "name"])?;
            require_path(payload, &["workflow_run", "status"])?;
            require_path(payload, &["workflow_run", "head_branch"])?;
            require_path(payload, &["workflow_run", "head_sha"])?;
        }
        "repository_dispatch" => {
            require_path(payload, &["action"])?;
        }
        _ => unreachable!("checked against WHITELISTED_EVENTS above"),
    }
    Ok(())
}

fn require_path(payload: &Value, path: &[&str]) -> GitopsResult<()> {
    let mut cursor = payload;
    for segment in path {
        cursor = cursor
            .get(segment)
            .filter(|v| !v.is_null())
            .ok_or_else(|| GitopsError::validation(format!("webhook payload missing required field '{}'", path.join("."))))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn an_unknown_event_type_is_rejected() {
        let payload = json!({"repository": {"full_name": "festion/homelab-gitops-auditor"}});
        assert!(validate("issues", &payload).is_err());
    }

    #[test]
    fn a_push_payload_missing_after_is_rejected() {
        let payload = json!({"ref": "refs/heads/main", "repository": {"full_name": "festion/homelab-gitops-auditor"}});
        assert!(validate("push", &payload).is_err());
    }

    #[test]
    fn a_complete_push_payload_is_accepted() {
        let payload = json!({
            "ref": "refs/heads/main",
            "after": "deadbeef",
            "repository": {"full_name": "festion/homelab-gitops-auditor"}
        });
        assert!(validate("push", &payload).is_ok());
    }

    #[test]
    fn a_complete_workflow_run_payload_is_accepted() {
        let payload = json!({
            "action": "completed",
            "workflow_run": {
                "id": 42,
                "name": "ci",
                "status": "completed",
                "conclusion": "success",
                "head_branch": "main",
                "head_sha": "deadbeef"
            },
            "repository": {"full_name": "festion/homelab-gitops-auditor"}
        });
        assert!(validate("workflow_run", &payload).is_ok());
    }

    #[test]
    fn missing_repository_full_name_is_rejected_for_every_event_type() {
        let payload = json!({"ref": "refs/heads/main", "after": "deadbeef"});
        assert!(validate("push", &payload).is_err());
    }
}
