use spin_sdk::http::{Request, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use crate::models::models::{Actor, User, TokenData};
use crate::config::*;
use crate::core::db::{Store, Transaction, find_user_by_email};
use crate::core::errors::ApiError;
use crate::core::helpers::{verify_password, now_iso, bearer_token, parse_json, json_response};
use crate::core::validation::normalize_email;

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub fn login_user(store: &Store, req: &Request) -> Result<Response, ApiError> {
    let creds: Credentials = parse_json(req)?;
    let email = normalize_email(&creds.email);

    let user = match find_user_by_email(store, &email)? {
        Some(u) if verify_password(&creds.password, &u.password) => u,
        _ => {
            tracing::warn!(email = %email, "login rejected");
            return Err(ApiError::Unauthorized);
        }
    };

    let token = Uuid::new_v4().to_string();
    let data = TokenData {
        user_id: user.id.clone(),
        created_at: now_iso(),
    };
    let pruned = store.transaction(|tx| -> anyhow::Result<usize> {
        let pruned = prune_expired(tx, Utc::now(), token_ttl())?;
        tx.set_json(&token_key(&token), &data)?;
        tx.push_id(TOKENS_LIST_KEY, &token)?;
        Ok(pruned)
    })?;
    tracing::info!(user_id = %user.id, pruned, "user logged in");

    json_response(200, &serde_json::json!({
        "token": token,
        "user_id": user.id
    }))
}

pub fn logout_user(store: &Store, req: &Request) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    let token = bearer_token(req).ok_or(ApiError::Unauthorized)?;

    store.transaction(|tx| -> anyhow::Result<()> {
        tx.delete(&token_key(&token))?;
        tx.remove_id(TOKENS_LIST_KEY, &token)
    })?;
    tracing::info!(user_id = %actor.user_id, "user logged out");

    json_response(200, &serde_json::json!({
        "message": "Logged out successfully"
    }))
}

fn token_ttl() -> chrono::Duration {
    chrono::Duration::hours(token_expiration_hours())
}

/// A token whose issue time cannot be read counts as expired.
fn is_expired(data: &TokenData, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
    match DateTime::parse_from_rfc3339(&data.created_at) {
        Ok(created) => now - created.with_timezone(&Utc) > ttl,
        Err(_) => true,
    }
}

/// Removes every expired or dangling token from the store.
fn prune_expired(tx: &mut Transaction<'_>, now: DateTime<Utc>, ttl: chrono::Duration) -> anyhow::Result<usize> {
    let tokens: Vec<String> = tx.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
    let total = tokens.len();
    let mut live = Vec::with_capacity(total);
    for token in tokens {
        match tx.get_json::<TokenData>(&token_key(&token))? {
            Some(data) if !is_expired(&data, now, ttl) => live.push(token),
            _ => tx.delete(&token_key(&token))?,
        }
    }
    let pruned = total - live.len();
    if pruned > 0 {
        tx.set_json(TOKENS_LIST_KEY, &live)?;
    }
    Ok(pruned)
}

/// Resolves the bearer token to the user it was issued to.
///
/// Expired tokens are rejected and removed; tokens of deleted users are
/// rejected.
pub fn validate_token(store: &Store, token: &str) -> anyhow::Result<Option<User>> {
    let Some(data) = store.get_json::<TokenData>(&token_key(token))? else {
        return Ok(None);
    };
    if is_expired(&data, Utc::now(), token_ttl()) {
        store.transaction(|tx| -> anyhow::Result<()> {
            tx.delete(&token_key(token))?;
            tx.remove_id(TOKENS_LIST_KEY, token)
        })?;
        tracing::debug!(user_id = %data.user_id, "expired token removed");
        return Ok(None);
    }
    store.get_json::<User>(&user_key(&data.user_id))
}

pub fn authenticate(store: &Store, req: &Request) -> Result<Actor, ApiError> {
    let token = bearer_token(req).ok_or(ApiError::Unauthorized)?;
    match validate_token(store, &token)? {
        Some(user) => Ok(Actor::from(&user)),
        None => {
            tracing::warn!(path = %req.path(), "invalid or expired token");
            Err(ApiError::Unauthorized)
        }
    }
}
