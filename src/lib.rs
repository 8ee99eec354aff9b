//! Snippets API - code snippet pastebin over a resource router
//!
//! Snippets and users are exposed as hyperlinked REST resources. A
//! [`ResourceRouter`] turns viewsets into conventional list/detail routes,
//! adds a root listing, and hosts the session login subtree.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod highlight;
pub mod metrics;
pub mod pagination;
pub mod router;
pub mod state;
pub mod store;
pub mod viewset;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use router::{ResourceRouter, RouteEntry, RouteTable, RouterError};
pub use state::StateManager;
pub use store::{Snippet, SnippetStore, User, UserStore};
pub use viewset::{Action, ModelViewSet, ReadOnlyModelViewSet, Resource, ViewSet};
