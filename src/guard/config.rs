use std::collections::HashMap;

use serde::Deserialize;

use crate::utils::error::ToolpassError;

/// User-facing texts attached to redirects when `include_error_details` is on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ErrorMessages {
    pub authentication_required: String,
    pub no_subscription: String,
    pub expired: String,
    pub tool_inactive: String,
    pub access_denied: String,
    pub system_error: String,
}

impl Default for ErrorMessages {
    fn default() -> Self {
        Self {
            authentication_required: "Please log in to access this tool".into(),
            no_subscription: "This tool requires an active subscription".into(),
            expired: "Your subscription has expired".into(),
            tool_inactive: "This tool is currently unavailable".into(),
            access_denied: "Access denied to this tool".into(),
            system_error: "Unable to verify subscription access".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_login_redirect")]
    pub login_redirect: String,

    #[serde(default = "default_unauthorized_redirect")]
    pub unauthorized_redirect: String,

    #[serde(default = "default_true")]
    pub include_error_details: bool,

    #[serde(default)]
    pub error_messages: ErrorMessages,

    /// Route prefix -> tool slug. A route also covers everything nested under it.
    #[serde(default)]
    pub protected_routes: HashMap<String, String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            login_redirect: default_login_redirect(),
            unauthorized_redirect: default_unauthorized_redirect(),
            include_error_details: true,
            error_messages: ErrorMessages::default(),
            protected_routes: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch<'a> {
    Unprotected,
    /// Protected, but no tool slug is configured for the route.
    Unmapped(&'a str),
    Tool(&'a str),
}

impl GuardConfig {
    pub fn with_route(mut self, route: impl Into<String>, tool_slug: impl Into<String>) -> Self {
        self.protected_routes.insert(route.into(), tool_slug.into());
        self
    }

    /// Exact match wins; otherwise the longest route the path is nested under.
    pub fn route_for(&self, path: &str) -> RouteMatch<'_> {
        let matched = self
            .protected_routes
            .get_key_value(path)
            .or_else(|| {
                self.protected_routes
                    .iter()
                    .filter(|(route, _)| {
                        path.strip_prefix(route.as_str())
                            .is_some_and(|rest| rest.starts_with('/'))
                    })
                    .max_by_key(|(route, _)| route.len())
            });

        match matched {
            None => RouteMatch::Unprotected,
            Some((route, slug)) if slug.trim().is_empty() => RouteMatch::Unmapped(route),
            Some((_, slug)) => RouteMatch::Tool(slug),
        }
    }

    pub fn is_protected(&self, path: &str) -> bool {
        !matches!(self.route_for(path), RouteMatch::Unprotected)
    }

    pub fn validate(&self) -> Result<(), ToolpassError> {
        for (name, target) in [
            ("login_redirect", &self.login_redirect),
            ("unauthorized_redirect", &self.unauthorized_redirect),
        ] {
            if !target.starts_with('/') {
                return Err(ToolpassError::ConfigError(format!(
                    "guard.{} must be an absolute path, got {:?}",
                    name, target
                )));
            }
        }

        if let Some(route) = self
            .protected_routes
            .keys()
            .find(|r| !r.starts_with('/') || r.len() > 1 && r.ends_with('/'))
        {
            return Err(ToolpassError::ConfigError(format!(
                "protected route {:?} must start with '/' and have no trailing slash",
                route
            )));
        }

        Ok(())
    }
}

fn default_login_redirect() -> String {
    "/auth/login".into()
}

fn default_unauthorized_redirect() -> String {
    "/app".into()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GuardConfig {
        GuardConfig::default()
            .with_route("/app/invoice-reconciler", "invoice-reconciler")
            .with_route("/app/invoice-reconciler/beta", "reconciler-beta")
            .with_route("/app/broken", "")
    }

    #[test]
    fn exact_and_nested_paths_are_protected() {
        let cfg = config();
        assert_eq!(cfg.route_for("/app/invoice-reconciler"), RouteMatch::Tool("invoice-reconciler"));
        assert_eq!(
            cfg.route_for("/app/invoice-reconciler/runs/42"),
            RouteMatch::Tool("invoice-reconciler")
        );
        assert_eq!(
            cfg.route_for("/app/invoice-reconciler/beta/x"),
            RouteMatch::Tool("reconciler-beta")
        );
    }

    #[test]
    fn sibling_prefixes_are_not_protected() {
        let cfg = config();
        assert_eq!(cfg.route_for("/app/invoice-reconciler-v2"), RouteMatch::Unprotected);
        assert_eq!(cfg.route_for("/app"), RouteMatch::Unprotected);
        assert!(!cfg.is_protected("/"));
    }

    #[test]
    fn blank_slug_is_unmapped() {
        assert_eq!(config().route_for("/app/broken/page"), RouteMatch::Unmapped("/app/broken"));
    }

    #[test]
    fn validate_rejects_relative_redirects_and_bad_routes() {
        assert!(config().validate().is_ok());

        let mut cfg = config();
        cfg.login_redirect = "auth/login".into();
        assert!(cfg.validate().is_err());

        let cfg = GuardConfig::default().with_route("/app/tool/", "tool");
        assert!(cfg.validate().is_err());
    }
}
