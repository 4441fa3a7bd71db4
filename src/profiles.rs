use std::collections::HashMap;
use spin_sdk::http::{Request, Response};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::models::models::{Actor, Profile, User};
use crate::access::{authorize, Action};
use crate::auth::authenticate;
use crate::core::db::{Store, Transaction, load_all};
use crate::core::errors::{ApiError, FieldErrors};
use crate::core::helpers::{validate_uuid, parse_json, json_response, no_content};
use crate::core::query_params::{parse_query_params, get_string};
use crate::core::validation::{check_text, check_optional_text, clean_text};
use crate::follow::{FollowGraph, load_graph, remove_user_edges};
use crate::config::*;

const MAX_IMAGE_LENGTH: usize = 500;

#[derive(Deserialize, Default, Debug)]
pub struct ProfileInput {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

/// Profile as rendered to clients; relationship sets are listed by email.
#[derive(Serialize, Debug)]
pub struct ProfileView {
    pub id: String,
    pub user: String,
    pub username: String,
    pub bio: String,
    pub image: Option<String>,
    pub followers: Vec<String>,
    pub following: Vec<String>,
}

#[derive(Serialize, Debug)]
struct ProfileDetailView {
    email: String,
    #[serde(flatten)]
    profile: ProfileView,
}

/// Substring filters for the profile listing. Matching is case-sensitive.
#[derive(Default, Debug)]
pub struct ProfileFilter {
    pub username: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
}

impl ProfileFilter {
    fn matches(&self, profile: &Profile, email: &str) -> bool {
        let contains = |filter: &Option<String>, value: &str| {
            filter.as_deref().map_or(true, |needle| value.contains(needle))
        };
        contains(&self.username, &profile.username)
            && contains(&self.email, email)
            && contains(&self.bio, &profile.bio)
    }
}

fn emails(ids: Vec<String>, users: &HashMap<String, User>) -> Vec<String> {
    ids.iter()
        .filter_map(|id| users.get(id))
        .map(|u| u.email.clone())
        .collect()
}

fn render(profile: &Profile, graph: &FollowGraph, users: &HashMap<String, User>) -> ProfileView {
    ProfileView {
        id: profile.id.clone(),
        user: users.get(&profile.user_id).map(|u| u.email.clone()).unwrap_or_default(),
        username: profile.username.clone(),
        bio: profile.bio.clone(),
        image: profile.image.clone(),
        followers: emails(graph.followers(&profile.user_id), users),
        following: emails(graph.following(&profile.user_id), users),
    }
}

fn user_index(store: &Store) -> anyhow::Result<HashMap<String, User>> {
    let users: Vec<User> = load_all(store, USERS_LIST_KEY, user_key)?;
    Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
}

fn read_profile(tx: &Transaction<'_>, profile_id: &str) -> Result<Profile, ApiError> {
    if !validate_uuid(profile_id) {
        return Err(ApiError::NotFound("Profile not found".to_string()));
    }
    tx.get_json::<Profile>(&profile_key(profile_id))?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))
}

pub fn load_profile(store: &Store, profile_id: &str) -> Result<Profile, ApiError> {
    store.transaction(|tx| read_profile(tx, profile_id))
}

/// The profile belonging to `user_id`, if one was created.
pub fn profile_of(store: &Store, user_id: &str) -> Result<Option<Profile>, ApiError> {
    match store.get_json::<String>(&user_profile_key(user_id))? {
        Some(profile_id) => Ok(store.get_json::<Profile>(&profile_key(&profile_id))?),
        None => Ok(None),
    }
}

fn username_taken(tx: &Transaction<'_>, username: &str, except_id: Option<&str>) -> anyhow::Result<bool> {
    let ids: Vec<String> = tx.get_json(PROFILES_LIST_KEY)?.unwrap_or_default();
    for id in ids.iter().filter(|id| Some(id.as_str()) != except_id) {
        if let Some(p) = tx.get_json::<Profile>(&profile_key(id))? {
            if p.username == username {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn validate_input(tx: &Transaction<'_>, input: &ProfileInput, partial: bool, except_id: Option<&str>) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    if partial {
        check_optional_text(&mut errors, "username", input.username.as_deref(), MAX_USERNAME_LENGTH);
        check_optional_text(&mut errors, "bio", input.bio.as_deref(), MAX_BIO_LENGTH);
    } else {
        check_text(&mut errors, "username", input.username.as_deref(), MAX_USERNAME_LENGTH);
        check_text(&mut errors, "bio", input.bio.as_deref(), MAX_BIO_LENGTH);
    }
    if input.image.as_deref().is_some_and(|i| i.len() > MAX_IMAGE_LENGTH) {
        errors.add("image", "Image reference is too long.");
    }
    if errors.get("username").is_none() {
        if let Some(username) = input.username.as_deref() {
            if username_taken(tx, &clean_text(username), except_id)? {
                errors.add("username", "profile with this username already exists.");
            }
        }
    }
    errors.into_result()
}

pub fn create_profile(store: &Store, actor: &Actor, input: ProfileInput) -> Result<Profile, ApiError> {
    let profile = store.transaction(|tx| -> Result<Profile, ApiError> {
        if tx.get_json::<String>(&user_profile_key(&actor.user_id))?.is_some() {
            return Err(ApiError::Validation(FieldErrors::single(
                "user",
                "profile with this user already exists.",
            )));
        }
        validate_input(tx, &input, false, None)?;

        let profile = Profile {
            id: Uuid::new_v4().to_string(),
            user_id: actor.user_id.clone(),
            username: clean_text(input.username.as_deref().unwrap_or_default()),
            bio: clean_text(input.bio.as_deref().unwrap_or_default()),
            image: input.image.clone().filter(|i| !i.is_empty()),
        };
        tx.set_json(&profile_key(&profile.id), &profile)?;
        tx.set_json(&user_profile_key(&actor.user_id), &profile.id)?;
        tx.push_id(PROFILES_LIST_KEY, &profile.id)?;
        Ok(profile)
    })?;

    tracing::info!(profile_id = %profile.id, user_id = %actor.user_id, "profile created");
    Ok(profile)
}

pub fn update_profile(store: &Store, actor: &Actor, profile_id: &str, input: ProfileInput, partial: bool) -> Result<Profile, ApiError> {
    let action = if partial { Action::PartialUpdate } else { Action::Update };

    let profile = store.transaction(|tx| -> Result<Profile, ApiError> {
        let mut profile = read_profile(tx, profile_id)?;
        authorize(actor, action, &profile)?;
        validate_input(tx, &input, partial, Some(profile_id))?;

        if let Some(username) = &input.username {
            profile.username = clean_text(username);
        }
        if let Some(bio) = &input.bio {
            profile.bio = clean_text(bio);
        }
        if input.image.is_some() || !partial {
            profile.image = input.image.clone().filter(|i| !i.is_empty());
        }
        tx.set_json(&profile_key(&profile.id), &profile)?;
        Ok(profile)
    })?;

    tracing::info!(profile_id = %profile.id, partial, "profile updated");
    Ok(profile)
}

/// Deletes the profile together with every follow edge of its user.
pub fn delete_profile(store: &Store, actor: &Actor, profile_id: &str) -> Result<(), ApiError> {
    store.transaction(|tx| -> Result<(), ApiError> {
        let profile = read_profile(tx, profile_id)?;
        authorize(actor, Action::Delete, &profile)?;
        remove_profile(tx, &profile)
    })?;

    tracing::info!(profile_id = %profile_id, "profile deleted");
    Ok(())
}

pub(crate) fn remove_profile(tx: &mut Transaction<'_>, profile: &Profile) -> Result<(), ApiError> {
    let dropped = remove_user_edges(tx, &profile.user_id)?;
    tx.delete(&profile_key(&profile.id))?;
    tx.delete(&user_profile_key(&profile.user_id))?;
    tx.remove_id(PROFILES_LIST_KEY, &profile.id)?;
    tracing::debug!(profile_id = %profile.id, dropped, "follow edges removed");
    Ok(())
}

pub fn list_profiles(store: &Store, filter: &ProfileFilter) -> anyhow::Result<Vec<ProfileView>> {
    let profiles: Vec<Profile> = load_all(store, PROFILES_LIST_KEY, profile_key)?;
    let users = user_index(store)?;
    let graph = load_graph(store)?;

    Ok(profiles
        .iter()
        .filter(|p| {
            let email = users.get(&p.user_id).map(|u| u.email.as_str()).unwrap_or_default();
            filter.matches(p, email)
        })
        .map(|p| render(p, &graph, &users))
        .collect())
}

// === HTTP Handlers ===

pub fn handle_list(store: &Store, req: &Request) -> Result<Response, ApiError> {
    authenticate(store, req)?;
    let params = parse_query_params(req.uri());
    let filter = ProfileFilter {
        username: get_string(&params, "username"),
        email: get_string(&params, "email"),
        bio: get_string(&params, "bio"),
    };
    json_response(200, &list_profiles(store, &filter)?)
}

pub fn handle_create(store: &Store, req: &Request) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    let input: ProfileInput = parse_json(req)?;
    let profile = create_profile(store, &actor, input)?;
    let view = render(&profile, &load_graph(store)?, &user_index(store)?);
    json_response(201, &view)
}

pub fn handle_retrieve(store: &Store, req: &Request, profile_id: &str) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    let profile = load_profile(store, profile_id)?;
    authorize(&actor, Action::Retrieve, &profile)?;

    let users = user_index(store)?;
    let view = render(&profile, &load_graph(store)?, &users);
    json_response(200, &ProfileDetailView { email: view.user.clone(), profile: view })
}

pub fn handle_update(store: &Store, req: &Request, profile_id: &str, partial: bool) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    let input: ProfileInput = parse_json(req)?;
    let profile = update_profile(store, &actor, profile_id, input, partial)?;
    let view = render(&profile, &load_graph(store)?, &user_index(store)?);
    json_response(200, &view)
}

pub fn handle_delete(store: &Store, req: &Request, profile_id: &str) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    delete_profile(store, &actor, profile_id)?;
    Ok(no_content())
}
