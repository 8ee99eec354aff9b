//! Route registry
//!
//! Expands registered viewsets into concrete `(method, path)` routes, mounts
//! foreign route subtrees under fixed prefixes and turns the result into an
//! axum [`Router`]. The table is built once at startup; every conflict is
//! reported as a [`RouterError`] before the server accepts traffic.

use crate::error::ApiError;
use crate::viewset::{Action, ActionBinding, ViewSet};
use axum::{
    Extension, Json, Router,
    http::{Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{MethodRouter, get},
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Startup-time route configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("prefix '{0}' is already registered")]
    DuplicatePrefix(String),

    #[error("basename '{0}' is already registered")]
    DuplicateBasename(String),

    #[error("invalid prefix '{0}': expected letters, digits, '-' or '_'")]
    InvalidPrefix(String),

    #[error("invalid action name '{0}': expected letters, digits, '-' or '_'")]
    InvalidActionName(String),

    #[error("route {method} {path} is bound more than once")]
    DuplicateRoute { method: Method, path: String },

    #[error("mount prefix '{0}' conflicts with an existing route prefix")]
    MountConflict(String),

    #[error("method {method} cannot be routed for action '{action}'")]
    UnsupportedMethod { method: Method, action: String },

    #[error("no route named '{0}' with the given parameters")]
    NoReverseMatch(String),

    #[error("route name '{0}' is already taken")]
    DuplicateRouteName(String),
}

/// One concrete route produced by a viewset registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub method: Method,
    /// Path pattern in axum syntax, e.g. `/snippets/{id}/`
    pub pattern: String,
    pub action: Action,
    /// Route name, e.g. `snippet-detail`
    pub name: String,
    pub basename: String,
}

/// Result of matching a request against the table
#[derive(Debug, PartialEq, Eq)]
pub struct ResolvedRoute<'a> {
    pub entry: &'a RouteEntry,
    pub params: Vec<(String, String)>,
}

impl ResolvedRoute<'_> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Immutable view of all generated routes, shared with handlers for URL reversal
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    prefixes: Vec<String>,
    mounts: Vec<String>,
    /// Full paths served by mounted subtrees
    mounted_paths: Vec<String>,
}

impl RouteTable {
    /// All routes in registration order
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Registered resource prefixes in registration order
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Mounted subtree prefixes in mount order
    pub fn mounts(&self) -> &[String] {
        &self.mounts
    }

    /// Paths served by mounted subtrees, e.g. `/api-auth/login/`
    pub fn mounted_paths(&self) -> &[String] {
        &self.mounted_paths
    }

    /// Find the route serving `method` on `path`
    ///
    /// A literal segment beats a parameter at the same position, the way
    /// axum's matcher picks between `/things/recent/` and `/things/{id}/`.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<ResolvedRoute<'_>> {
        self.entries
            .iter()
            .filter(|entry| entry.method == *method)
            .filter_map(|entry| {
                match_pattern(&entry.pattern, path).map(|params| ResolvedRoute { entry, params })
            })
            .min_by_key(|resolved| param_positions(&resolved.entry.pattern))
    }

    /// Whether any method is routed on `path`, including mounted subtrees
    pub fn matches_path(&self, path: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| match_pattern(&entry.pattern, path).is_some())
            || self.mounted_paths.iter().any(|mounted| mounted == path)
    }

    /// Build the path for a named route
    pub fn reverse(&self, name: &str, params: &[(&str, &str)]) -> Result<String, RouterError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| RouterError::NoReverseMatch(name.to_string()))?;

        let mut path = String::with_capacity(entry.pattern.len());
        for (i, segment) in entry.pattern.split('/').enumerate() {
            if i > 0 {
                path.push('/');
            }
            match param_name(segment) {
                Some(key) => {
                    let value = params
                        .iter()
                        .find(|(k, _)| *k == key)
                        .map(|(_, v)| *v)
                        .filter(|v| !v.is_empty() && !v.contains('/'))
                        .ok_or_else(|| RouterError::NoReverseMatch(name.to_string()))?;
                    path.push_str(value);
                }
                None => path.push_str(segment),
            }
        }

        Ok(path)
    }
}

fn param_name(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

/// Per segment, whether it is a parameter; compares lower for earlier literals
fn param_positions(pattern: &str) -> Vec<bool> {
    pattern
        .split('/')
        .map(|segment| param_name(segment).is_some())
        .collect()
}

fn match_pattern(pattern: &str, path: &str) -> Option<Vec<(String, String)>> {
    let mut pattern_segments = pattern.split('/');
    let mut path_segments = path.split('/');
    let mut params = Vec::new();

    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return Some(params),
            (Some(expected), Some(actual)) => match param_name(expected) {
                Some(key) if !actual.is_empty() => {
                    params.push((key.to_string(), actual.to_string()));
                }
                Some(_) => return None,
                None if expected == actual => {}
                None => return None,
            },
            _ => return None,
        }
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Builder that expands viewsets into routes
///
/// Similar in spirit to a REST framework's default router: each registration
/// yields a list route, a detail route and one route per extra action.
pub struct ResourceRouter {
    table: RouteTable,
    basenames: HashSet<String>,
    handlers: Vec<(String, MethodRouter)>,
    mounted: Vec<(String, Router)>,
    root_view: bool,
}

impl Default for ResourceRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRouter {
    pub fn new() -> Self {
        Self {
            table: RouteTable::default(),
            basenames: HashSet::new(),
            handlers: Vec::new(),
            mounted: Vec::new(),
            root_view: true,
        }
    }

    /// Disable the `GET /` listing of registered prefixes
    pub fn without_root_view(mut self) -> Self {
        self.root_view = false;
        self
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Register a viewset under `prefix`
    ///
    /// Either the whole registration is applied or, on error, nothing is.
    pub fn register<V: ViewSet>(
        &mut self,
        prefix: &str,
        viewset: V,
    ) -> Result<&mut Self, RouterError> {
        let prefix = prefix.trim_matches('/');
        if !is_valid_segment(prefix) {
            return Err(RouterError::InvalidPrefix(prefix.to_string()));
        }
        if self.table.prefixes.iter().any(|p| p == prefix) {
            return Err(RouterError::DuplicatePrefix(prefix.to_string()));
        }
        if self.table.mounts.iter().any(|m| m == prefix) {
            return Err(RouterError::MountConflict(prefix.to_string()));
        }

        let basename = viewset.basename().to_string();
        if self.basenames.contains(&basename) {
            return Err(RouterError::DuplicateBasename(basename));
        }

        let lookup = viewset.lookup_field().to_string();
        let bindings = viewset.into_bindings()?;

        let mut entries: Vec<RouteEntry> = Vec::with_capacity(bindings.len());
        let mut handlers: Vec<(String, MethodRouter)> = Vec::new();

        for ActionBinding { action, handler } in bindings {
            let (pattern, name) = match &action {
                Action::Extra { name, detail, .. } => {
                    if !is_valid_segment(name) {
                        return Err(RouterError::InvalidActionName(name.clone()));
                    }
                    if matches!(name.as_str(), "list" | "detail") {
                        return Err(RouterError::DuplicateRouteName(format!("{basename}-{name}")));
                    }
                    let pattern = if *detail {
                        format!("/{prefix}/{{{lookup}}}/{name}/")
                    } else {
                        format!("/{prefix}/{name}/")
                    };
                    (pattern, format!("{basename}-{name}"))
                }
                standard if standard.is_detail() => (
                    format!("/{prefix}/{{{lookup}}}/"),
                    format!("{basename}-detail"),
                ),
                _ => (format!("/{prefix}/"), format!("{basename}-list")),
            };

            if self.table.entries.iter().any(|e| e.name == name)
                || entries.iter().any(|e| e.name == name && e.pattern != pattern)
            {
                return Err(RouterError::DuplicateRouteName(name));
            }

            let method = action.method();
            if entries
                .iter()
                .any(|e| e.method == method && e.pattern == pattern)
            {
                return Err(RouterError::DuplicateRoute {
                    method,
                    path: pattern,
                });
            }

            match handlers.iter_mut().find(|(path, _)| *path == pattern) {
                Some((_, existing)) => {
                    let current = std::mem::replace(existing, MethodRouter::new());
                    *existing = current.merge(handler);
                }
                None => handlers.push((pattern.clone(), handler)),
            }

            entries.push(RouteEntry {
                method,
                pattern,
                action,
                name,
                basename: basename.clone(),
            });
        }

        tracing::debug!(
            prefix = %prefix,
            basename = %basename,
            routes = entries.len(),
            "Viewset registered"
        );

        self.table.prefixes.push(prefix.to_string());
        self.table.entries.extend(entries);
        self.basenames.insert(basename);
        self.handlers.extend(handlers);

        Ok(self)
    }

    /// Nest a foreign route subtree under `/{prefix}/`
    ///
    /// `paths` lists the subtree's own routes (relative to the mount point)
    /// so that slash redirects also reach them.
    pub fn mount(
        &mut self,
        prefix: &str,
        router: Router,
        paths: &[&str],
    ) -> Result<&mut Self, RouterError> {
        let prefix = prefix.trim_matches('/');
        if !is_valid_segment(prefix) {
            return Err(RouterError::InvalidPrefix(prefix.to_string()));
        }
        if self.table.prefixes.iter().any(|p| p == prefix)
            || self.table.mounts.iter().any(|m| m == prefix)
        {
            return Err(RouterError::MountConflict(prefix.to_string()));
        }

        tracing::debug!(prefix = %prefix, "Route subtree mounted");

        self.table.mounts.push(prefix.to_string());
        self.table.mounted_paths.extend(
            paths
                .iter()
                .map(|path| format!("/{prefix}/{}", path.trim_start_matches('/'))),
        );
        self.mounted.push((prefix.to_string(), router));
        Ok(self)
    }

    /// Turn the table into an axum router
    ///
    /// The shared [`RouteTable`] is attached as an [`Extension`] so handlers
    /// can reverse route names.
    pub fn into_router(self) -> Router {
        let table = Arc::new(self.table);
        let mut router = Router::new();

        if self.root_view {
            let listing: BTreeMap<String, String> = table
                .prefixes
                .iter()
                .map(|prefix| (prefix.clone(), format!("/{prefix}/")))
                .collect();
            let listing = Arc::new(listing);
            router = router.route(
                "/",
                get(move || {
                    let listing = listing.clone();
                    async move { Json(listing.as_ref().clone()) }
                })
                .fallback(method_not_allowed),
            );
        }

        for (path, handler) in self.handlers {
            router = router.route(&path, handler.fallback(method_not_allowed));
        }

        for (prefix, subtree) in self.mounted {
            router = router.nest(&format!("/{prefix}"), subtree);
        }

        router.fallback(append_slash).layer(Extension(table))
    }
}

/// Method fallback for routed paths, answering 405 in the API error shape
pub async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}

/// Redirect `GET /snippets` to `/snippets/` when the latter is routed
async fn append_slash(
    Extension(table): Extension<Arc<RouteTable>>,
    method: Method,
    uri: Uri,
) -> Response {
    let path = uri.path();
    if (method == Method::GET || method == Method::HEAD) && !path.ends_with('/') {
        let candidate = format!("{path}/");
        if table.matches_path(&candidate) {
            let location = match uri.query() {
                Some(query) => format!("{candidate}?{query}"),
                None => candidate,
            };
            return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
        }
    }

    ApiError::NotFound.into_response()
}
