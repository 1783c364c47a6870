use serde::{Deserialize, Serialize};

/// Resources and actions are enumerated at compile time: unrecognized
/// pairs are a validation error, not an unknown permission. There is no
/// free-form string permission anywhere above the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Repository,
    Pipeline,
    Template,
    Deployment,
    Metrics,
    Webhooks,
    Orchestration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Create,
    Trigger,
    Cancel,
    Apply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub resource: Resource,
    pub action: Action,
}

impl Permission {
    pub const fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }
}

/// `Admin` is the wildcard `*:*` role and is checked separately rather
/// than materialized as every pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
    Viewer,
}

impl std::str::FromStr for Role {
    type Err = crate::GitopsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "operator" => Ok(Role::Operator),
            "viewer" => Ok(Role::Viewer),
            other => Err(crate::GitopsError::validation(format!("unknown role: {other}"))),
        }
    }
}

impl Role {
    const OPERATOR_PERMISSIONS: &'static [Permission] = {
        use Action::*;
        use Resource::*;
        &[
            Permission::new(Repository, Read),
            Permission::new(Repository, Write),
            Permission::new(Pipeline, Read),
            Permission::new(Pipeline, Trigger),
            Permission::new(Pipeline, Cancel),
            Permission::new(Template, Read),
            Permission::new(Template, Apply),
            Permission::new(Template, Create),
            Permission::new(Metrics, Read),
            Permission::new(Webhooks, Read),
            Permission::new(Deployment, Read),
            Permission::new(Deployment, Create),
            Permission::new(Deployment, Cancel),
        ]
    };

    const VIEWER_PERMISSIONS: &'static [Permission] = {
        use Action::*;
        use Resource::*;
        &[
            Permission::new(Repository, Read),
            Permission::new(Pipeline, Read),
            Permission::new(Template, Read),
            Permission::new(Metrics, Read),
        ]
    };

    pub fn permissions(self) -> &'static [Permission] {
        match self {
            Role::Admin => &[],
            Role::Operator => Self::OPERATOR_PERMISSIONS,
            Role::Viewer => Self::VIEWER_PERMISSIONS,
        }
    }

    /// Matches the exact resource/action pair, or the wildcard `*:*`.
    pub fn allows(self, permission: Permission) -> bool {
        self == Role::Admin || self.permissions().contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_wildcard() {
        assert!(Role::Admin.allows(Permission::new(Resource::Deployment, Action::Create)));
    }

    #[test]
    fn viewer_cannot_trigger_pipelines() {
        assert!(!Role::Viewer.allows(Permission::new(Resource::Pipeline, Action::Trigger)));
    }

    #[test]
    fn operator_can_apply_templates() {
        assert!(Role::Operator.allows(Permission::new(Resource::Template, Action::Apply)));
    }

    #[test]
    fn operator_can_create_deployments_but_viewer_cannot() {
        let permission = Permission::new(Resource::Deployment, Action::Create);
        assert!(Role::Operator.allows(permission));
        assert!(!Role::Viewer.allows(permission));
    }
}
