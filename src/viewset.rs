//! Viewsets: bundles of CRUD handlers generated from a [`Resource`]
//!
//! A [`Resource`] supplies storage access and a JSON representation; the
//! viewsets here turn it into per-action axum handlers which the
//! [`ResourceRouter`](crate::router::ResourceRouter) expands into routes.

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageParams, Paginator};
use crate::router::{RouteTable, RouterError};
use async_trait::async_trait;
use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    handler::Handler,
    http::{Method, StatusCode},
    routing::{MethodFilter, MethodRouter, on},
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

/// A named operation of a viewset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    List,
    Create,
    Retrieve,
    Update,
    PartialUpdate,
    Destroy,
    /// Custom action routed at `/{prefix}/{id}/{name}/` (detail) or `/{prefix}/{name}/`
    Extra {
        name: String,
        method: Method,
        detail: bool,
    },
}

impl Action {
    pub fn extra(name: impl Into<String>, method: Method, detail: bool) -> Self {
        Action::Extra {
            name: name.into(),
            method,
            detail,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Action::List => "list",
            Action::Create => "create",
            Action::Retrieve => "retrieve",
            Action::Update => "update",
            Action::PartialUpdate => "partial_update",
            Action::Destroy => "destroy",
            Action::Extra { name, .. } => name,
        }
    }

    /// HTTP verb the action is bound to
    pub fn method(&self) -> Method {
        match self {
            Action::List | Action::Retrieve => Method::GET,
            Action::Create => Method::POST,
            Action::Update => Method::PUT,
            Action::PartialUpdate => Method::PATCH,
            Action::Destroy => Method::DELETE,
            Action::Extra { method, .. } => method.clone(),
        }
    }

    /// Whether the action addresses a single object
    pub fn is_detail(&self) -> bool {
        match self {
            Action::List | Action::Create => false,
            Action::Retrieve | Action::Update | Action::PartialUpdate | Action::Destroy => true,
            Action::Extra { detail, .. } => *detail,
        }
    }
}

/// An action together with the handler serving it
pub struct ActionBinding {
    pub action: Action,
    pub handler: MethodRouter,
}

impl ActionBinding {
    /// Bind `handler` to the verb of `action`, with its state already applied
    pub fn new<H, T, S>(action: Action, handler: H, state: S) -> Result<Self, RouterError>
    where
        H: Handler<T, S>,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let method = action.method();
        let filter = MethodFilter::try_from(method.clone()).map_err(|_| {
            RouterError::UnsupportedMethod {
                method,
                action: action.name().to_string(),
            }
        })?;

        Ok(Self {
            action,
            handler: on(filter, handler).with_state(state),
        })
    }
}

/// A bundle of action bindings for one resource
pub trait ViewSet: Send + 'static {
    /// Stem for route names (`{basename}-list`, `{basename}-detail`, ...)
    fn basename(&self) -> &str;

    /// Name of the path parameter identifying an object
    fn lookup_field(&self) -> &str {
        "id"
    }

    fn into_bindings(self) -> Result<Vec<ActionBinding>, RouterError>;
}

/// Storage and representation capability behind a viewset
///
/// Write operations default to [`ApiError::MethodNotAllowed`] so read-only
/// resources only implement the query side.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    type Object: Send + Sync + 'static;
    /// Payload for create and full update
    type Input: DeserializeOwned + Send + 'static;
    /// Payload for partial update
    type Patch: DeserializeOwned + Send + 'static;
    type Representation: Serialize + Send + 'static;

    async fn list(&self) -> Vec<Self::Object>;

    async fn get(&self, id: u64) -> Option<Self::Object>;

    async fn create(&self, _owner: &AuthUser, _input: Self::Input) -> ApiResult<Self::Object> {
        Err(ApiError::MethodNotAllowed(Method::POST))
    }

    async fn update(&self, _object: Self::Object, _input: Self::Input) -> ApiResult<Self::Object> {
        Err(ApiError::MethodNotAllowed(Method::PUT))
    }

    async fn partial_update(
        &self,
        _object: Self::Object,
        _patch: Self::Patch,
    ) -> ApiResult<Self::Object> {
        Err(ApiError::MethodNotAllowed(Method::PATCH))
    }

    async fn destroy(&self, _object: Self::Object) -> ApiResult<()> {
        Err(ApiError::MethodNotAllowed(Method::DELETE))
    }

    /// Owning user id, for object-level write permission
    fn owner_of(&self, _object: &Self::Object) -> Option<u64> {
        None
    }

    async fn represent(
        &self,
        object: &Self::Object,
        urls: &RouteTable,
    ) -> ApiResult<Self::Representation>;
}

/// State shared by the generated handlers of one viewset
pub struct ViewState<R> {
    pub resource: Arc<R>,
    pub basename: Arc<str>,
    pub paginator: Paginator,
}

impl<R> Clone for ViewState<R> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            basename: self.basename.clone(),
            paginator: self.paginator,
        }
    }
}

impl<R: Resource> ViewState<R> {
    pub fn new(basename: &str, resource: Arc<R>, paginator: Paginator) -> Self {
        Self {
            resource,
            basename: Arc::from(basename),
            paginator,
        }
    }

    async fn object(&self, raw_id: &str) -> ApiResult<R::Object> {
        let id = parse_id(raw_id)?;
        self.resource.get(id).await.ok_or(ApiError::NotFound)
    }

    /// Load the object and check the caller owns it
    async fn owned_object(&self, raw_id: &str, user: &AuthUser) -> ApiResult<R::Object> {
        let object = self.object(raw_id).await?;
        if self.resource.owner_of(&object) != Some(user.id) {
            tracing::debug!(
                resource = %self.basename,
                user = %user.username,
                "Write rejected for non-owner"
            );
            return Err(ApiError::PermissionDenied);
        }
        Ok(object)
    }
}

/// Lookup values are numeric ids; anything else cannot name an object
pub fn parse_id(raw: &str) -> ApiResult<u64> {
    raw.parse().map_err(|_| ApiError::NotFound)
}

/// Full CRUD viewset with optional extra actions
pub struct ModelViewSet<R: Resource> {
    state: ViewState<R>,
    extra: Vec<ActionBinding>,
}

impl<R: Resource> ModelViewSet<R> {
    pub fn new(basename: &str, resource: Arc<R>, paginator: Paginator) -> Self {
        Self {
            state: ViewState::new(basename, resource, paginator),
            extra: Vec::new(),
        }
    }

    pub fn with_action(mut self, binding: ActionBinding) -> Self {
        self.extra.push(binding);
        self
    }
}

impl<R: Resource> ViewSet for ModelViewSet<R> {
    fn basename(&self) -> &str {
        &self.state.basename
    }

    fn into_bindings(self) -> Result<Vec<ActionBinding>, RouterError> {
        let state = self.state;
        let mut bindings = vec![
            ActionBinding::new(Action::List, list::<R>, state.clone())?,
            ActionBinding::new(Action::Create, create::<R>, state.clone())?,
            ActionBinding::new(Action::Retrieve, retrieve::<R>, state.clone())?,
            ActionBinding::new(Action::Update, update::<R>, state.clone())?,
            ActionBinding::new(Action::PartialUpdate, partial_update::<R>, state.clone())?,
            ActionBinding::new(Action::Destroy, destroy::<R>, state)?,
        ];
        bindings.extend(self.extra);
        Ok(bindings)
    }
}

/// List and retrieve only
pub struct ReadOnlyModelViewSet<R: Resource> {
    state: ViewState<R>,
}

impl<R: Resource> ReadOnlyModelViewSet<R> {
    pub fn new(basename: &str, resource: Arc<R>, paginator: Paginator) -> Self {
        Self {
            state: ViewState::new(basename, resource, paginator),
        }
    }
}

impl<R: Resource> ViewSet for ReadOnlyModelViewSet<R> {
    fn basename(&self) -> &str {
        &self.state.basename
    }

    fn into_bindings(self) -> Result<Vec<ActionBinding>, RouterError> {
        Ok(vec![
            ActionBinding::new(Action::List, list::<R>, self.state.clone())?,
            ActionBinding::new(Action::Retrieve, retrieve::<R>, self.state)?,
        ])
    }
}

/// GET /{prefix}/
pub async fn list<R: Resource>(
    State(view): State<ViewState<R>>,
    Extension(urls): Extension<Arc<RouteTable>>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<R::Representation>>> {
    crate::metrics::record_request(&view.basename, "list");

    let list_path = urls
        .reverse(&format!("{}-list", view.basename), &[])
        .map_err(anyhow::Error::from)?;
    let page = view.paginator.paginate(
        view.resource.list().await,
        params.page.as_deref(),
        &list_path,
    )?;

    let mut results = Vec::with_capacity(page.results.len());
    for object in &page.results {
        results.push(view.resource.represent(object, &urls).await?);
    }

    Ok(Json(page.with_results(results)))
}

/// POST /{prefix}/
pub async fn create<R: Resource>(
    State(view): State<ViewState<R>>,
    Extension(urls): Extension<Arc<RouteTable>>,
    user: AuthUser,
    payload: Result<Json<R::Input>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<R::Representation>)> {
    crate::metrics::record_request(&view.basename, "create");

    let Json(input) = payload?;
    let object = view.resource.create(&user, input).await?;
    let body = view.resource.represent(&object, &urls).await?;

    Ok((StatusCode::CREATED, Json(body)))
}

/// GET /{prefix}/{id}/
pub async fn retrieve<R: Resource>(
    State(view): State<ViewState<R>>,
    Extension(urls): Extension<Arc<RouteTable>>,
    Path(id): Path<String>,
) -> ApiResult<Json<R::Representation>> {
    crate::metrics::record_request(&view.basename, "retrieve");

    let object = view.object(&id).await?;
    Ok(Json(view.resource.represent(&object, &urls).await?))
}

/// PUT /{prefix}/{id}/
pub async fn update<R: Resource>(
    State(view): State<ViewState<R>>,
    Extension(urls): Extension<Arc<RouteTable>>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<R::Input>, JsonRejection>,
) -> ApiResult<Json<R::Representation>> {
    crate::metrics::record_request(&view.basename, "update");

    let object = view.owned_object(&id, &user).await?;
    let Json(input) = payload?;
    let object = view.resource.update(object, input).await?;

    Ok(Json(view.resource.represent(&object, &urls).await?))
}

/// PATCH /{prefix}/{id}/
pub async fn partial_update<R: Resource>(
    State(view): State<ViewState<R>>,
    Extension(urls): Extension<Arc<RouteTable>>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<R::Patch>, JsonRejection>,
) -> ApiResult<Json<R::Representation>> {
    crate::metrics::record_request(&view.basename, "partial_update");

    let object = view.owned_object(&id, &user).await?;
    let Json(patch) = payload?;
    let object = view.resource.partial_update(object, patch).await?;

    Ok(Json(view.resource.represent(&object, &urls).await?))
}

/// DELETE /{prefix}/{id}/
pub async fn destroy<R: Resource>(
    State(view): State<ViewState<R>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    crate::metrics::record_request(&view.basename, "destroy");

    let object = view.owned_object(&id, &user).await?;
    view.resource.destroy(object).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_verbs() {
        assert_eq!(Action::List.method(), Method::GET);
        assert_eq!(Action::Create.method(), Method::POST);
        assert_eq!(Action::Update.method(), Method::PUT);
        assert_eq!(Action::PartialUpdate.method(), Method::PATCH);
        assert_eq!(Action::Destroy.method(), Method::DELETE);

        let highlight = Action::extra("highlight", Method::GET, true);
        assert_eq!(highlight.method(), Method::GET);
        assert_eq!(highlight.name(), "highlight");
        assert!(highlight.is_detail());
        assert!(!Action::Create.is_detail());
    }

    #[test]
    fn test_unroutable_method_rejected() {
        let action = Action::extra("purge", Method::from_bytes(b"PURGE").unwrap(), false);
        let result = ActionBinding::new(action, || async {}, ());
        assert!(matches!(
            result,
            Err(RouterError::UnsupportedMethod { .. })
        ));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(matches!(parse_id("abc"), Err(ApiError::NotFound)));
        assert!(matches!(parse_id("-1"), Err(ApiError::NotFound)));
    }
}
