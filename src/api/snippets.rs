//! Snippet resource: validation, highlighting and the `highlight` action

use super::models::{SnippetInfo, SnippetInput};
use crate::auth::AuthUser;
use crate::config::SnippetDefaults;
use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::highlight::{self, HighlightError, HighlightRequest};
use crate::pagination::Paginator;
use crate::router::{RouteTable, RouterError};
use crate::store::{Snippet, SnippetStore, UserStore};
use crate::viewset::{Action, ActionBinding, ModelViewSet, Resource, parse_id};
use anyhow::Context;
use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::Method,
    response::Html,
};
use std::sync::Arc;

const TITLE_MAX_CHARS: usize = 100;

/// Snippet fields after validation, ready to be written
#[derive(Debug, Clone)]
struct SnippetFields {
    title: String,
    code: String,
    linenos: bool,
    language: String,
    style: String,
}

impl SnippetFields {
    fn from_snippet(snippet: &Snippet) -> Self {
        Self {
            title: snippet.title.clone(),
            code: snippet.code.clone(),
            linenos: snippet.linenos,
            language: snippet.language.clone(),
            style: snippet.style.clone(),
        }
    }

    fn merge(mut self, input: SnippetInput) -> Self {
        if let Some(title) = input.title {
            self.title = title;
        }
        if let Some(code) = input.code {
            self.code = code;
        }
        if let Some(linenos) = input.linenos {
            self.linenos = linenos;
        }
        if let Some(language) = input.language {
            self.language = language;
        }
        if let Some(style) = input.style {
            self.style = style;
        }
        self
    }

    fn render(&self) -> Result<String, HighlightError> {
        highlight::render_document(&HighlightRequest {
            code: &self.code,
            language: &self.language,
            style: &self.style,
            linenos: self.linenos,
            title: &self.title,
        })
    }
}

/// Field-level checks; `require_code` is set for create and full update
fn validate(input: &SnippetInput, require_code: bool) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    let mut reject = |field: &str, message: String| {
        errors.entry(field.to_string()).or_default().push(message);
    };

    match input.code.as_deref() {
        None if require_code => reject("code", "This field is required.".to_string()),
        Some(code) if code.trim().is_empty() => {
            reject("code", "This field may not be blank.".to_string())
        }
        _ => {}
    }

    if let Some(title) = &input.title
        && title.chars().count() > TITLE_MAX_CHARS
    {
        reject(
            "title",
            format!("Ensure this field has no more than {TITLE_MAX_CHARS} characters."),
        );
    }

    if let Some(language) = &input.language
        && !highlight::is_known_language(language)
    {
        reject("language", format!("\"{language}\" is not a valid choice."));
    }

    if let Some(style) = &input.style
        && !highlight::is_known_style(style)
    {
        reject("style", format!("\"{style}\" is not a valid choice."));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

fn highlight_failure(err: HighlightError) -> ApiError {
    match err {
        HighlightError::UnknownLanguage(_) => ApiError::invalid("language", err.to_string()),
        HighlightError::UnknownStyle(_) => ApiError::invalid("style", err.to_string()),
        HighlightError::Render(_) => ApiError::Internal(err.into()),
    }
}

/// Snippets with their owners resolved through the user store
pub struct SnippetResource {
    snippets: Arc<SnippetStore>,
    users: Arc<UserStore>,
    defaults: SnippetDefaults,
}

impl SnippetResource {
    pub fn new(
        snippets: Arc<SnippetStore>,
        users: Arc<UserStore>,
        defaults: SnippetDefaults,
    ) -> Self {
        Self {
            snippets,
            users,
            defaults,
        }
    }

    /// Validate, re-render and store new field values
    async fn save(
        &self,
        snippet: Snippet,
        input: SnippetInput,
        require_code: bool,
    ) -> ApiResult<Snippet> {
        validate(&input, require_code)?;
        let fields = SnippetFields::from_snippet(&snippet).merge(input);
        let highlighted = fields.render().map_err(highlight_failure)?;

        self.snippets
            .update(snippet.id, move |stored| {
                stored.title = fields.title;
                stored.code = fields.code;
                stored.linenos = fields.linenos;
                stored.language = fields.language;
                stored.style = fields.style;
                stored.highlighted = highlighted;
            })
            .await
            .ok_or(ApiError::NotFound)
    }
}

#[async_trait]
impl Resource for SnippetResource {
    type Object = Snippet;
    type Input = SnippetInput;
    type Patch = SnippetInput;
    type Representation = SnippetInfo;

    async fn list(&self) -> Vec<Snippet> {
        self.snippets.list().await
    }

    async fn get(&self, id: u64) -> Option<Snippet> {
        self.snippets.get(id).await
    }

    async fn create(&self, owner: &AuthUser, input: SnippetInput) -> ApiResult<Snippet> {
        validate(&input, true)?;

        let fields = SnippetFields {
            title: String::new(),
            code: String::new(),
            linenos: false,
            language: self.defaults.language.clone(),
            style: self.defaults.style.clone(),
        }
        .merge(input);
        let highlighted = fields.render().map_err(highlight_failure)?;

        let owner_id = owner.id;
        let snippet = self
            .snippets
            .insert_with(move |id| Snippet {
                id,
                created: chrono::Utc::now(),
                title: fields.title,
                code: fields.code,
                linenos: fields.linenos,
                language: fields.language,
                style: fields.style,
                owner: owner_id,
                highlighted,
            })
            .await;

        tracing::info!(
            snippet_id = snippet.id,
            owner = %owner.username,
            language = %snippet.language,
            "Snippet created"
        );
        crate::metrics::record_snippet_created(&snippet.language);
        crate::metrics::update_snippet_count(self.snippets.count().await);

        Ok(snippet)
    }

    async fn update(&self, snippet: Snippet, input: SnippetInput) -> ApiResult<Snippet> {
        self.save(snippet, input, true).await
    }

    async fn partial_update(&self, snippet: Snippet, patch: SnippetInput) -> ApiResult<Snippet> {
        self.save(snippet, patch, false).await
    }

    async fn destroy(&self, snippet: Snippet) -> ApiResult<()> {
        self.snippets
            .remove(snippet.id)
            .await
            .ok_or(ApiError::NotFound)?;

        tracing::info!(snippet_id = snippet.id, "Snippet deleted");
        crate::metrics::record_snippet_deleted();
        crate::metrics::update_snippet_count(self.snippets.count().await);

        Ok(())
    }

    fn owner_of(&self, snippet: &Snippet) -> Option<u64> {
        Some(snippet.owner)
    }

    async fn represent(&self, snippet: &Snippet, urls: &RouteTable) -> ApiResult<SnippetInfo> {
        let id = snippet.id.to_string();
        let owner = self
            .users
            .get(snippet.owner)
            .await
            .with_context(|| {
                format!("Snippet {} has unknown owner {}", snippet.id, snippet.owner)
            })?;

        Ok(SnippetInfo {
            url: urls
                .reverse("snippet-detail", &[("id", id.as_str())])
                .map_err(anyhow::Error::from)?,
            id: snippet.id,
            highlight: urls
                .reverse("snippet-highlight", &[("id", id.as_str())])
                .map_err(anyhow::Error::from)?,
            owner: owner.username,
            title: snippet.title.clone(),
            code: snippet.code.clone(),
            linenos: snippet.linenos,
            language: snippet.language.clone(),
            style: snippet.style.clone(),
        })
    }
}

/// GET /snippets/{id}/highlight/
pub async fn render_highlight(
    State(resource): State<Arc<SnippetResource>>,
    Path(id): Path<String>,
) -> ApiResult<Html<String>> {
    crate::metrics::record_request("snippet", "highlight");

    let snippet = resource
        .get(parse_id(&id)?)
        .await
        .ok_or(ApiError::NotFound)?;

    Ok(Html(snippet.highlighted))
}

/// CRUD viewset for snippets plus the `highlight` detail action
pub fn viewset(
    resource: Arc<SnippetResource>,
    paginator: Paginator,
) -> Result<ModelViewSet<SnippetResource>, RouterError> {
    let highlight_action = ActionBinding::new(
        Action::extra("highlight", Method::GET, true),
        render_highlight,
        resource.clone(),
    )?;

    Ok(ModelViewSet::new("snippet", resource, paginator).with_action(highlight_action))
}
