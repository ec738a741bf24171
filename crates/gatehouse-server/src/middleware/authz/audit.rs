//! Authorization audit events.

use super::types::Actor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct AuthzAuditEvent {
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub account_id: Option<String>,
    pub method: String,
    pub route: String,
    pub resource_id: Option<String>,
    pub access: i32,
    pub granted: bool,
    pub reason: Option<String>,
}

impl AuthzAuditEvent {
    pub fn new(actor: Option<&Actor>, method: &str, route: &str, access: i32) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: actor.map(|a| a.user_id.clone()),
            account_id: actor
                .map(|a| a.account_id.clone())
                .filter(|account| !account.is_empty()),
            method: method.to_string(),
            route: route.to_string(),
            resource_id: None,
            access,
            granted: false,
            reason: None,
        }
    }

    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn granted(mut self) -> Self {
        self.granted = true;
        self.reason = None;
        self
    }

    pub fn denied(mut self, reason: impl Into<String>) -> Self {
        self.granted = false;
        self.reason = Some(reason.into());
        self
    }

    pub fn log(&self) {
        if self.granted {
            info!(
                event = "authz_granted",
                user_id = ?self.user_id,
                account_id = ?self.account_id,
                method = %self.method,
                route = %self.route,
                resource_id = ?self.resource_id,
                "Authorization granted"
            );
        } else {
            warn!(
                event = "authz_denied",
                user_id = ?self.user_id,
                account_id = ?self.account_id,
                method = %self.method,
                route = %self.route,
                resource_id = ?self.resource_id,
                reason = ?self.reason,
                "Authorization denied"
            );
        }
    }
}
