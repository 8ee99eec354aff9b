//! Login/logout route subtree, mounted under `/api-auth/`

use super::{Authenticator, session_key};
use crate::error::ApiError;
use crate::highlight::escape_html;
use crate::router::method_not_allowed;
use axum::{
    Form, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

const LOGIN_PATH: &str = "/login/";
const LOGOUT_PATH: &str = "/logout/";

/// Paths served by [`auth_router`], relative to the mount point
pub const AUTH_PATHS: [&str; 2] = [LOGIN_PATH, LOGOUT_PATH];

/// Routes relative to the mount point
pub fn auth_router(authenticator: Arc<Authenticator>) -> Router {
    Router::new()
        .route(
            LOGIN_PATH,
            get(login_form).post(login).fallback(method_not_allowed),
        )
        .route(LOGOUT_PATH, post(logout).fallback(method_not_allowed))
        .with_state(authenticator)
}

/// Only same-site absolute paths are followed after login
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}

fn render_login_page(next: Option<&str>, error: Option<&str>) -> String {
    let error = error
        .map(|message| format!("<p class=\"error\">{}</p>\n", escape_html(message)))
        .unwrap_or_default();
    let next = escape_html(next.unwrap_or(""));

    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><meta charset=\"utf-8\"><title>Log in</title></head>\n\
         <body>\n\
         <h1>Snippets API</h1>\n\
         {error}\
         <form method=\"post\" action=\"\">\n\
         <input type=\"hidden\" name=\"next\" value=\"{next}\">\n\
         <label for=\"id_username\">Username:</label>\n\
         <input type=\"text\" name=\"username\" id=\"id_username\" required>\n\
         <label for=\"id_password\">Password:</label>\n\
         <input type=\"password\" name=\"password\" id=\"id_password\" required>\n\
         <button type=\"submit\">Log in</button>\n\
         </form>\n\
         </body>\n\
         </html>\n"
    )
}

/// GET /api-auth/login/
async fn login_form(Query(query): Query<NextQuery>) -> Html<String> {
    Html(render_login_page(query.next.as_deref(), None))
}

/// POST /api-auth/login/
async fn login(
    State(authenticator): State<Arc<Authenticator>>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    if form.username.is_empty() || form.password.is_empty() {
        crate::metrics::record_login(false);
        let page = render_login_page(
            form.next.as_deref(),
            Some("Please enter a username and password."),
        );
        return Ok(Html(page).into_response());
    }

    let Some(user) = authenticator
        .verify_credentials(&form.username, &form.password)
        .await?
    else {
        tracing::info!(username = %form.username, "Login failed");
        crate::metrics::record_login(false);
        let page = render_login_page(
            form.next.as_deref(),
            Some("Please enter a correct username and password."),
        );
        return Ok(Html(page).into_response());
    };

    let key = authenticator.sessions().create(user.id);
    tracing::info!(username = %user.username, "User logged in");
    crate::metrics::record_login(true);

    let cookie = format!(
        "{}={key}; Path=/; HttpOnly; SameSite=Lax",
        authenticator.cookie_name()
    );
    let location = safe_next(form.next.as_deref()).to_string();

    Ok((
        StatusCode::SEE_OTHER,
        [(header::SET_COOKIE, cookie), (header::LOCATION, location)],
    )
        .into_response())
}

/// POST /api-auth/logout/
async fn logout(State(authenticator): State<Arc<Authenticator>>, headers: HeaderMap) -> Response {
    if let Some(key) = session_key(&headers, authenticator.cookie_name())
        && let Some(user_id) = authenticator.sessions().remove(&key)
    {
        tracing::info!(user_id, "User logged out");
    }

    let expired = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        authenticator.cookie_name()
    );

    (
        [(header::SET_COOKIE, expired)],
        Html("<!DOCTYPE html>\n<html><body><p>Logged out.</p></body></html>\n"),
    )
        .into_response()
}
