pub mod access;
pub mod auth;
pub mod config;
pub mod core;
pub mod follow;
pub mod hashtags;
pub mod models;
pub mod posts;
pub mod profiles;
pub mod users;
pub mod visibility;

use spin_sdk::http::{Request, Response};
use crate::core::db::Store;
use crate::core::errors::ApiError;

/// Dispatches a request to its handler and renders any error as JSON.
pub fn route(store: &Store, req: &Request) -> Response {
    let method = req.method().to_string().to_uppercase();
    let path = req.path().split('?').next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let result = match (method.as_str(), segments.as_slice()) {
        ("POST", ["users"]) => users::create_user(store, req),
        ("DELETE", ["users", id]) => users::handle_delete(store, req, id),
        ("POST", ["login"]) => auth::login_user(store, req),
        ("POST", ["logout"]) | ("DELETE", ["logout"]) => auth::logout_user(store, req),
        ("GET", ["me"]) => users::get_me(store, req),
        ("PUT", ["me"]) | ("PATCH", ["me"]) => users::update_me(store, req),

        ("GET", ["posts"]) => posts::handle_list(store, req),
        ("POST", ["posts"]) => posts::handle_create(store, req),
        ("GET", ["posts", id]) => posts::handle_retrieve(store, req, id),
        ("PUT", ["posts", id]) => posts::handle_update(store, req, id, false),
        ("PATCH", ["posts", id]) => posts::handle_update(store, req, id, true),
        ("DELETE", ["posts", id]) => posts::handle_delete(store, req, id),

        ("GET", ["hashtags"]) => hashtags::handle_list(store, req),
        ("POST", ["hashtags"]) => hashtags::handle_create(store, req),
        ("GET", ["hashtags", id]) => hashtags::handle_retrieve(store, req, id),
        ("PUT", ["hashtags", id]) | ("PATCH", ["hashtags", id]) => hashtags::handle_update(store, req, id),
        ("DELETE", ["hashtags", id]) => hashtags::handle_delete(store, req, id),

        ("GET", ["profiles"]) => profiles::handle_list(store, req),
        ("POST", ["profiles"]) => profiles::handle_create(store, req),
        ("GET", ["profiles", id]) => profiles::handle_retrieve(store, req, id),
        ("PUT", ["profiles", id]) => profiles::handle_update(store, req, id, false),
        ("PATCH", ["profiles", id]) => profiles::handle_update(store, req, id, true),
        ("DELETE", ["profiles", id]) => profiles::handle_delete(store, req, id),
        ("POST", ["profiles", id, "follow_switch"]) => follow::handle_follow_switch(store, req, id),
        ("GET", ["profiles", id, "followers"]) => follow::handle_relations(store, req, id, true),
        ("GET", ["profiles", id, "following"]) => follow::handle_relations(store, req, id, false),

        _ => Err(ApiError::NotFound("No route found".to_string())),
    };

    match result {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(method = %method, path = %path, status = err.status(), "request rejected");
            err.into()
        }
    }
}

/// Spin entry point: serves every request from the default key/value store.
#[cfg(target_arch = "wasm32")]
#[spin_sdk::http_component]
fn handle(req: Request) -> anyhow::Result<impl spin_sdk::http::IntoResponse> {
    let store = Store::open_default()?;
    if let Some((email, password)) = config::admin_credentials() {
        crate::core::db::ensure_admin(&store, &email, &password)?;
    }
    Ok(route(&store, &req))
}
