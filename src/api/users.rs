//! Read-only user resource

use super::models::UserInfo;
use crate::error::ApiResult;
use crate::router::RouteTable;
use crate::store::{SnippetStore, User, UserStore};
use crate::viewset::Resource;
use async_trait::async_trait;
use std::sync::Arc;

pub struct UserResource {
    users: Arc<UserStore>,
    snippets: Arc<SnippetStore>,
}

impl UserResource {
    pub fn new(users: Arc<UserStore>, snippets: Arc<SnippetStore>) -> Self {
        Self { users, snippets }
    }
}

#[async_trait]
impl Resource for UserResource {
    type Object = User;
    type Input = serde_json::Value;
    type Patch = serde_json::Value;
    type Representation = UserInfo;

    async fn list(&self) -> Vec<User> {
        self.users.list().await
    }

    async fn get(&self, id: u64) -> Option<User> {
        self.users.get(id).await
    }

    async fn represent(&self, user: &User, urls: &RouteTable) -> ApiResult<UserInfo> {
        let mut snippets = Vec::new();
        for snippet in self.snippets.owned_by(user.id).await {
            let url = urls
                .reverse("snippet-detail", &[("id", snippet.id.to_string().as_str())])
                .map_err(anyhow::Error::from)?;
            snippets.push(url);
        }

        Ok(UserInfo {
            url: urls
                .reverse("user-detail", &[("id", user.id.to_string().as_str())])
                .map_err(anyhow::Error::from)?,
            id: user.id,
            username: user.username.clone(),
            snippets,
        })
    }
}
