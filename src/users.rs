use spin_sdk::http::{Request, Response};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::models::models::{Actor, Post, Profile, TokenData, User};
use crate::auth::authenticate;
use crate::core::db::{Store, Transaction};
use crate::core::errors::{ApiError, FieldErrors};
use crate::core::helpers::{hash_password, now_iso, validate_uuid, parse_json, json_response, no_content};
use crate::core::validation::{check_email, check_password, normalize_email};
use crate::profiles::remove_profile;
use crate::follow::remove_user_edges;
use crate::config::*;

#[derive(Deserialize, Default, Debug)]
pub struct AccountInput {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
struct UserView<'a> {
    id: &'a str,
    email: &'a str,
    is_staff: bool,
}

impl<'a> From<&'a User> for UserView<'a> {
    fn from(user: &'a User) -> Self {
        UserView { id: &user.id, email: &user.email, is_staff: user.is_staff }
    }
}

fn email_taken(tx: &Transaction<'_>, email: &str, except_id: Option<&str>) -> anyhow::Result<bool> {
    let ids: Vec<String> = tx.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    for id in ids.iter().filter(|id| Some(id.as_str()) != except_id) {
        if let Some(u) = tx.get_json::<User>(&user_key(id))? {
            if u.email == email {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn check_account(
    tx: &Transaction<'_>,
    email: Option<&str>,
    password: Option<&str>,
    except_id: Option<&str>,
) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    if let Some(email) = email {
        check_email(&mut errors, "email", email);
        if errors.get("email").is_none() && email_taken(tx, email, except_id)? {
            errors.add("email", "user with this email address already exists.");
        }
    }
    if let Some(password) = password {
        check_password(&mut errors, "password", password, MIN_PASSWORD_LENGTH);
    }
    errors.into_result()
}

pub fn register_user(store: &Store, input: AccountInput) -> Result<User, ApiError> {
    let email = normalize_email(input.email.as_deref().unwrap_or_default());
    let password = input.password.unwrap_or_default();
    // Hashing is slow; keep it outside the store lock.
    let password_hash = hash_password(&password)?;

    let user = store.transaction(|tx| -> Result<User, ApiError> {
        check_account(tx, Some(&email), Some(&password), None)?;
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            password: password_hash.clone(),
            is_staff: false,
            is_superuser: false,
            created_at: now_iso(),
        };
        tx.set_json(&user_key(&user.id), &user)?;
        tx.push_id(USERS_LIST_KEY, &user.id)?;
        Ok(user)
    })?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok(user)
}

pub fn update_account(store: &Store, actor: &Actor, input: AccountInput) -> Result<User, ApiError> {
    let email = input.email.as_deref().map(normalize_email);
    let password = input.password.as_deref().filter(|p| !p.is_empty());
    let password_hash = password.map(hash_password).transpose()?;

    store.transaction(|tx| -> Result<User, ApiError> {
        let mut user: User = tx
            .get_json(&user_key(&actor.user_id))?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        check_account(tx, email.as_deref(), password, Some(&actor.user_id))?;

        if let Some(email) = &email {
            user.email = email.clone();
        }
        if let Some(hash) = &password_hash {
            user.password = hash.clone();
        }
        tx.set_json(&user_key(&user.id), &user)?;
        Ok(user)
    })
}

/// Removes a user with everything hanging off it: posts, profile, follow
/// edges and issued tokens. Staff only.
pub fn delete_user(store: &Store, actor: &Actor, user_id: &str) -> Result<(), ApiError> {
    if !actor.is_staff {
        tracing::warn!(actor = %actor.user_id, target = %user_id, "user deletion by non-staff rejected");
        return Err(ApiError::Forbidden);
    }
    if !validate_uuid(user_id) {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    let removed_posts = store.transaction(|tx| -> Result<usize, ApiError> {
        if tx.get_json::<User>(&user_key(user_id))?.is_none() {
            return Err(ApiError::NotFound("User not found".to_string()));
        }

        let post_ids: Vec<String> = tx.get_json(POSTS_LIST_KEY)?.unwrap_or_default();
        let total = post_ids.len();
        let mut kept = Vec::with_capacity(post_ids.len());
        for post_id in post_ids {
            match tx.get_json::<Post>(&post_key(&post_id))? {
                Some(post) if post.author_id == user_id => tx.delete(&post_key(&post_id))?,
                _ => kept.push(post_id),
            }
        }
        let removed = total - kept.len();
        tx.set_json(POSTS_LIST_KEY, &kept)?;

        let profile = match tx.get_json::<String>(&user_profile_key(user_id))? {
            Some(profile_id) => tx.get_json::<Profile>(&profile_key(&profile_id))?,
            None => None,
        };
        match profile {
            Some(profile) => remove_profile(tx, &profile)?,
            None => {
                remove_user_edges(tx, user_id)?;
            }
        }

        let tokens: Vec<String> = tx.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
        let mut live_tokens = Vec::with_capacity(tokens.len());
        for token in tokens {
            match tx.get_json::<TokenData>(&token_key(&token))? {
                Some(data) if data.user_id == user_id => tx.delete(&token_key(&token))?,
                _ => live_tokens.push(token),
            }
        }
        tx.set_json(TOKENS_LIST_KEY, &live_tokens)?;

        tx.delete(&user_key(user_id))?;
        tx.remove_id(USERS_LIST_KEY, user_id)?;
        Ok(removed)
    })?;

    tracing::info!(user_id = %user_id, removed_posts, "user deleted");
    Ok(())
}

// === HTTP Handlers ===

pub fn create_user(store: &Store, req: &Request) -> Result<Response, ApiError> {
    let input: AccountInput = parse_json(req)?;
    let user = register_user(store, input)?;
    json_response(201, &UserView::from(&user))
}

pub fn get_me(store: &Store, req: &Request) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    let user: User = store
        .get_json(&user_key(&actor.user_id))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    json_response(200, &UserView::from(&user))
}

pub fn update_me(store: &Store, req: &Request) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    let input: AccountInput = parse_json(req)?;
    let user = update_account(store, &actor, input)?;
    json_response(200, &UserView::from(&user))
}

pub fn handle_delete(store: &Store, req: &Request, user_id: &str) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    delete_user(store, &actor, user_id)?;
    Ok(no_content())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::find_user_by_email;
    use crate::core::helpers::verify_password;

    fn account(email: &str, password: &str) -> AccountInput {
        AccountInput {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        }
    }

    #[test]
    fn stored_hash_matches_registered_and_changed_password() {
        let store = Store::memory();
        let user = register_user(&store, account("a@example.com", "first-secret")).unwrap();
        assert!(verify_password("first-secret", &user.password));

        let actor = Actor::from(&user);
        let input = AccountInput { email: None, password: Some("second-secret".to_string()) };
        update_account(&store, &actor, input).unwrap();

        let stored = find_user_by_email(&store, "a@example.com").unwrap().unwrap();
        assert!(verify_password("second-secret", &stored.password));
        assert!(!verify_password("first-secret", &stored.password));
    }

    #[test]
    fn rejected_registration_writes_nothing() {
        let store = Store::memory();
        register_user(&store, account("a@example.com", "first-secret")).unwrap();

        let err = register_user(&store, account("a@example.com", "other-secret")).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let ids: Vec<String> = store.get_json(USERS_LIST_KEY).unwrap().unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn empty_password_change_keeps_hash() {
        let store = Store::memory();
        let user = register_user(&store, account("a@example.com", "first-secret")).unwrap();
        let input = AccountInput { email: None, password: Some(String::new()) };
        let updated = update_account(&store, &Actor::from(&user), input).unwrap();
        assert_eq!(updated.password, user.password);
    }
}
