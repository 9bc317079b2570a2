// api/permission.rs - Outcome of a controller permission hook
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status_code: u16,
}

impl PermissionResult {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            id: None,
            message: None,
            status_code: 200,
        }
    }

    pub fn deny() -> Self {
        Self {
            allowed: false,
            id: None,
            message: None,
            status_code: 400,
        }
    }

    pub fn deny_with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::deny()
        }
    }

    pub fn deny_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self {
            message: Some(message.into()),
            status_code,
            ..Self::deny()
        }
    }

    pub fn deny_with_not_found(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            status_code: 404,
            ..Self::deny()
        }
    }

    /// Attach the id of the model the decision was made for
    pub fn for_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Per-id outcome of a bulk delete or undelete
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelActionResults {
    pub success: Vec<String>,
    pub failure: Vec<PermissionResult>,
    pub not_found: Vec<String>,
}

impl ModelActionResults {
    pub fn add_success(&mut self, id: impl Into<String>) {
        self.success.push(id.into());
    }

    pub fn add_failure(&mut self, result: PermissionResult) {
        self.failure.push(result);
    }

    pub fn add_not_found(&mut self, id: impl Into<String>) {
        self.not_found.push(id.into());
    }

    pub fn has_failures(&self) -> bool {
        !self.failure.is_empty() || !self.not_found.is_empty()
    }
}
