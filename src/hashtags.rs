use std::collections::BTreeMap;
use spin_sdk::http::{Request, Response};
use serde::Deserialize;
use uuid::Uuid;
use crate::models::models::{Hashtag, Post};
use crate::auth::authenticate;
use crate::core::db::{Store, Transaction, load_all};
use crate::core::errors::{ApiError, FieldErrors};
use crate::core::helpers::{validate_uuid, parse_json, json_response, no_content};
use crate::core::validation::check_text;
use crate::config::*;

#[derive(Deserialize, Debug)]
pub struct HashtagInput {
    pub name: Option<String>,
}

/// `POST /hashtags` accepts one object or an array of them.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum HashtagPayload {
    Batch(Vec<HashtagInput>),
    Single(HashtagInput),
}

/// Checks one name; `taken` holds names already claimed in this request.
fn check_name(
    tx: &Transaction<'_>,
    input: &HashtagInput,
    taken: &[String],
    except_id: Option<&str>,
) -> Result<FieldErrors, ApiError> {
    let mut errors = FieldErrors::new();
    check_text(&mut errors, "name", input.name.as_deref(), MAX_HASHTAG_LENGTH);
    if !errors.is_empty() {
        return Ok(errors);
    }

    let name = input.name.as_deref().unwrap_or_default().trim();
    let ids: Vec<String> = tx.get_json(HASHTAGS_LIST_KEY)?.unwrap_or_default();
    let mut exists = taken.iter().any(|t| t == name);
    if !exists {
        for id in ids.iter().filter(|id| Some(id.as_str()) != except_id) {
            if let Some(h) = tx.get_json::<Hashtag>(&hashtag_key(id))? {
                if h.name == name {
                    exists = true;
                    break;
                }
            }
        }
    }
    if exists {
        errors.add("name", "hashtag with this name already exists.");
    }
    Ok(errors)
}

fn load_hashtag(tx: &Transaction<'_>, hashtag_id: &str) -> Result<Hashtag, ApiError> {
    if !validate_uuid(hashtag_id) {
        return Err(ApiError::NotFound("Hashtag not found".to_string()));
    }
    tx.get_json::<Hashtag>(&hashtag_key(hashtag_id))?
        .ok_or_else(|| ApiError::NotFound("Hashtag not found".to_string()))
}

/// Creates every hashtag or none. Errors are keyed by item index.
pub fn create_hashtags(store: &Store, inputs: &[HashtagInput]) -> Result<Vec<Hashtag>, ApiError> {
    let created = store.transaction(|tx| -> Result<Vec<Hashtag>, ApiError> {
        let mut failures = BTreeMap::new();
        let mut taken: Vec<String> = Vec::new();
        let mut created = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.iter().enumerate() {
            let errors = check_name(tx, input, &taken, None)?;
            if !errors.is_empty() {
                failures.insert(index, errors);
                continue;
            }
            let hashtag = Hashtag {
                id: Uuid::new_v4().to_string(),
                name: input.name.as_deref().unwrap_or_default().trim().to_string(),
            };
            taken.push(hashtag.name.clone());
            tx.set_json(&hashtag_key(&hashtag.id), &hashtag)?;
            tx.push_id(HASHTAGS_LIST_KEY, &hashtag.id)?;
            created.push(hashtag);
        }

        if !failures.is_empty() {
            return Err(ApiError::BatchValidation(failures));
        }
        Ok(created)
    })?;

    tracing::info!(count = created.len(), "hashtags created");
    Ok(created)
}

pub fn rename_hashtag(store: &Store, hashtag_id: &str, input: &HashtagInput) -> Result<Hashtag, ApiError> {
    store.transaction(|tx| -> Result<Hashtag, ApiError> {
        let mut hashtag = load_hashtag(tx, hashtag_id)?;
        check_name(tx, input, &[], Some(hashtag_id))?.into_result()?;
        hashtag.name = input.name.as_deref().unwrap_or_default().trim().to_string();
        tx.set_json(&hashtag_key(&hashtag.id), &hashtag)?;
        Ok(hashtag)
    })
}

/// Deletes the hashtag and detaches it from every post carrying it.
pub fn delete_hashtag(store: &Store, hashtag_id: &str) -> Result<(), ApiError> {
    store.transaction(|tx| -> Result<(), ApiError> {
        let hashtag = load_hashtag(tx, hashtag_id)?;
        let post_ids: Vec<String> = tx.get_json(POSTS_LIST_KEY)?.unwrap_or_default();
        for post_id in post_ids {
            if let Some(mut post) = tx.get_json::<Post>(&post_key(&post_id))? {
                if post.hashtag_ids.contains(&hashtag.id) {
                    post.hashtag_ids.retain(|id| *id != hashtag.id);
                    tx.set_json(&post_key(&post.id), &post)?;
                }
            }
        }
        tx.delete(&hashtag_key(&hashtag.id))?;
        tx.remove_id(HASHTAGS_LIST_KEY, &hashtag.id)?;
        Ok(())
    })?;

    tracing::info!(hashtag_id = %hashtag_id, "hashtag deleted");
    Ok(())
}

// === HTTP Handlers ===

pub fn handle_list(store: &Store, req: &Request) -> Result<Response, ApiError> {
    authenticate(store, req)?;
    let hashtags: Vec<Hashtag> = load_all(store, HASHTAGS_LIST_KEY, hashtag_key)?;
    json_response(200, &hashtags)
}

pub fn handle_create(store: &Store, req: &Request) -> Result<Response, ApiError> {
    authenticate(store, req)?;
    match parse_json::<HashtagPayload>(req)? {
        HashtagPayload::Single(input) => {
            let created = create_hashtags(store, std::slice::from_ref(&input)).map_err(|err| match err {
                // A single object reports plain field errors.
                ApiError::BatchValidation(mut failures) => match failures.remove(&0) {
                    Some(errors) => ApiError::Validation(errors),
                    None => ApiError::BatchValidation(failures),
                },
                other => other,
            })?;
            let hashtag = created
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("hashtag was not created")))?;
            json_response(201, &hashtag)
        }
        HashtagPayload::Batch(inputs) => {
            let created = create_hashtags(store, &inputs)?;
            json_response(201, &created)
        }
    }
}

pub fn handle_retrieve(store: &Store, req: &Request, hashtag_id: &str) -> Result<Response, ApiError> {
    authenticate(store, req)?;
    let hashtag = store.transaction(|tx| load_hashtag(tx, hashtag_id))?;
    json_response(200, &hashtag)
}

pub fn handle_update(store: &Store, req: &Request, hashtag_id: &str) -> Result<Response, ApiError> {
    authenticate(store, req)?;
    let input: HashtagInput = parse_json(req)?;
    let hashtag = rename_hashtag(store, hashtag_id, &input)?;
    json_response(200, &hashtag)
}

pub fn handle_delete(store: &Store, req: &Request, hashtag_id: &str) -> Result<Response, ApiError> {
    authenticate(store, req)?;
    delete_hashtag(store, hashtag_id)?;
    Ok(no_content())
}
