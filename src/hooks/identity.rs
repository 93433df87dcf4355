//! Identity forwarding hook.
//!
//! # Responsibilities
//! - Read the resolved `Identity` an upstream auth layer attached to the request
//! - Inject identity headers into the outbound request
//! - Strip the host's session cookie so it never reaches the backend
//!
//! # Design Decisions
//! - Authentication itself is not done here; no identity means no headers
//! - Any inbound `x-user`-style headers are overwritten, never trusted

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::hooks::cookies::strip_cookie;
use crate::hooks::{BeforeProxy, HookContext, HookError};

pub const X_USER: HeaderName = HeaderName::from_static("x-user");
pub const X_GROUPS: HeaderName = HeaderName::from_static("x-groups");
pub const X_ROLES: HeaderName = HeaderName::from_static("x-roles");
pub const X_DISPLAY_NAME: HeaderName = HeaderName::from_static("x-display-name");
pub const X_EMAIL: HeaderName = HeaderName::from_static("x-email");

/// Context attached to authenticated requests (as a request extension).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub groups: Vec<String>,
    pub roles: Vec<String>,
}

impl Identity {
    /// "First Last", trimmed when either part is missing.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Write the identity headers, replacing any inbound values.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), HookError> {
        let values = [
            (X_USER, self.username.clone()),
            (X_GROUPS, self.groups.join(",")),
            (X_ROLES, self.roles.join(",")),
            (X_DISPLAY_NAME, self.display_name()),
            (X_EMAIL, self.email.clone()),
        ];

        for (name, value) in values {
            let value = HeaderValue::from_str(&value)
                .map_err(|_| HookError::new(format!("invalid value for {name}")))?;
            headers.insert(name, value);
        }
        Ok(())
    }
}

/// `BeforeProxy` hook forwarding the request's `Identity` as headers.
#[derive(Clone, Debug, Default)]
pub struct IdentityForwarding {
    session_cookie: Option<String>,
}

impl IdentityForwarding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also strip the cookie named `name` from forwarded requests.
    pub fn strip_session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = Some(name.into());
        self
    }

    fn apply(&self, context: HookContext<'_>, headers: &mut HeaderMap) -> Result<(), HookError> {
        if let Some(identity) = context.inbound.extensions.get::<Identity>() {
            identity.apply(headers)?;
            if context.settings.debug {
                tracing::info!(user = %identity.username, "Forwarding identity");
            } else {
                tracing::debug!(user = %identity.username, "Forwarding identity");
            }
        }

        if let Some(name) = &self.session_cookie {
            strip_cookie(headers, name);
        }
        Ok(())
    }
}

impl BeforeProxy for IdentityForwarding {
    fn before<'a>(
        &'a self,
        context: HookContext<'a>,
        headers: &'a mut HeaderMap,
    ) -> BoxFuture<'a, Result<(), HookError>> {
        let result = self.apply(context, headers);
        async move { result }.boxed()
    }
}
