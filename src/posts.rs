use spin_sdk::http::{Request, Response};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::models::models::{Actor, Hashtag, Post};
use crate::access::{authorize, Action};
use crate::auth::authenticate;
use crate::core::db::{Store, Transaction};
use crate::core::errors::{ApiError, FieldErrors};
use crate::core::helpers::{now_iso, validate_uuid, parse_json, json_response, no_content};
use crate::core::query_params::{parse_query_params, get_list, get_string};
use crate::core::validation::{check_text, check_optional_text, clean_text};
use crate::visibility::{visible_posts, hashtag_index};
use crate::config::*;

/// Incoming post payload. `author` and `created` are not part of it: the
/// author is always the actor and the timestamp is set by the server.
#[derive(Deserialize, Default, Debug)]
pub struct PostInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub hashtag: Option<Vec<String>>,
}

#[derive(Serialize)]
struct PostView<'a> {
    id: &'a str,
    title: &'a str,
    author: &'a str,
    content: &'a str,
    created: &'a str,
    hashtag: &'a [String],
}

impl<'a> From<&'a Post> for PostView<'a> {
    fn from(post: &'a Post) -> Self {
        PostView {
            id: &post.id,
            title: &post.title,
            author: &post.author_id,
            content: &post.content,
            created: &post.created_at,
            hashtag: &post.hashtag_ids,
        }
    }
}

#[derive(Serialize)]
struct PostDetailView<'a> {
    id: &'a str,
    title: &'a str,
    author: &'a str,
    content: &'a str,
    created: &'a str,
    updated: Option<&'a str>,
    hashtag: Vec<String>,
}

fn validate_input(input: &PostInput, partial: bool) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    if partial {
        check_optional_text(&mut errors, "title", input.title.as_deref(), MAX_POST_TITLE_LENGTH);
        check_optional_text(&mut errors, "content", input.content.as_deref(), MAX_POST_LENGTH);
    } else {
        check_text(&mut errors, "title", input.title.as_deref(), MAX_POST_TITLE_LENGTH);
        check_text(&mut errors, "content", input.content.as_deref(), MAX_POST_LENGTH);
    }
    errors.into_result()
}

/// Existing hashtag ids, deduplicated in input order. Unknown ids fail the
/// whole request; no hashtag is created here.
fn resolve_hashtags(tx: &Transaction<'_>, ids: &[String]) -> Result<Vec<String>, ApiError> {
    let mut errors = FieldErrors::new();
    let mut resolved: Vec<String> = Vec::new();
    for id in ids {
        if resolved.contains(id) {
            continue;
        }
        match tx.get_json::<Hashtag>(&hashtag_key(id))? {
            Some(_) => resolved.push(id.clone()),
            None => errors.add("hashtag", format!("Invalid id \"{}\" - object does not exist.", id)),
        }
    }
    errors.into_result()?;
    Ok(resolved)
}

fn load_post(tx: &Transaction<'_>, post_id: &str) -> Result<Post, ApiError> {
    if !validate_uuid(post_id) {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }
    tx.get_json::<Post>(&post_key(post_id))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))
}

pub fn create_post(store: &Store, actor: &Actor, input: PostInput) -> Result<Post, ApiError> {
    validate_input(&input, false)?;

    let post = store.transaction(|tx| -> Result<Post, ApiError> {
        let hashtag_ids = resolve_hashtags(tx, input.hashtag.as_deref().unwrap_or_default())?;
        let post = Post {
            id: Uuid::new_v4().to_string(),
            author_id: actor.user_id.clone(),
            title: clean_text(input.title.as_deref().unwrap_or_default()),
            content: clean_text(input.content.as_deref().unwrap_or_default()),
            created_at: now_iso(),
            updated_at: None,
            hashtag_ids,
        };
        tx.set_json(&post_key(&post.id), &post)?;
        tx.push_id(POSTS_LIST_KEY, &post.id)?;
        Ok(post)
    })?;

    tracing::info!(post_id = %post.id, author = %actor.user_id, "post created");
    Ok(post)
}

pub fn get_post(store: &Store, actor: &Actor, post_id: &str) -> Result<Post, ApiError> {
    let post = store.transaction(|tx| load_post(tx, post_id))?;
    authorize(actor, Action::Retrieve, &post)?;
    Ok(post)
}

/// PUT when `partial` is false (title and content required), PATCH otherwise.
/// Absent fields keep their value; the author and creation time never change.
pub fn update_post(store: &Store, actor: &Actor, post_id: &str, input: PostInput, partial: bool) -> Result<Post, ApiError> {
    let action = if partial { Action::PartialUpdate } else { Action::Update };

    let post = store.transaction(|tx| -> Result<Post, ApiError> {
        let mut post = load_post(tx, post_id)?;
        authorize(actor, action, &post)?;
        validate_input(&input, partial)?;

        if let Some(title) = &input.title {
            post.title = clean_text(title);
        }
        if let Some(content) = &input.content {
            post.content = clean_text(content);
        }
        if let Some(ids) = &input.hashtag {
            post.hashtag_ids = resolve_hashtags(tx, ids)?;
        }
        post.updated_at = Some(now_iso());

        tx.set_json(&post_key(&post.id), &post)?;
        Ok(post)
    })?;

    tracing::info!(post_id = %post.id, partial, "post updated");
    Ok(post)
}

pub fn delete_post(store: &Store, actor: &Actor, post_id: &str) -> Result<(), ApiError> {
    store.transaction(|tx| -> Result<(), ApiError> {
        let post = load_post(tx, post_id)?;
        authorize(actor, Action::Delete, &post)?;
        tx.delete(&post_key(&post.id))?;
        tx.remove_id(POSTS_LIST_KEY, &post.id)?;
        Ok(())
    })?;

    tracing::info!(post_id = %post_id, "post deleted");
    Ok(())
}

// === HTTP Handlers ===

pub fn handle_list(store: &Store, req: &Request) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    let params = parse_query_params(req.uri());

    let posts = visible_posts(
        store,
        &actor,
        get_list(&params, "author"),
        get_string(&params, "hashtag"),
    )?;
    let views: Vec<PostView<'_>> = posts.iter().map(PostView::from).collect();
    json_response(200, &views)
}

pub fn handle_create(store: &Store, req: &Request) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    let input: PostInput = parse_json(req)?;
    let post = create_post(store, &actor, input)?;
    json_response(201, &PostView::from(&post))
}

pub fn handle_retrieve(store: &Store, req: &Request, post_id: &str) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    let post = get_post(store, &actor, post_id)?;

    let index = hashtag_index(store)?;
    let view = PostDetailView {
        id: &post.id,
        title: &post.title,
        author: &post.author_id,
        content: &post.content,
        created: &post.created_at,
        updated: post.updated_at.as_deref(),
        hashtag: post
            .hashtag_ids
            .iter()
            .filter_map(|id| index.get(id))
            .map(|h| h.name.clone())
            .collect(),
    };
    json_response(200, &view)
}

pub fn handle_update(store: &Store, req: &Request, post_id: &str, partial: bool) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    let input: PostInput = parse_json(req)?;
    let post = update_post(store, &actor, post_id, input, partial)?;
    json_response(200, &PostView::from(&post))
}

pub fn handle_delete(store: &Store, req: &Request, post_id: &str) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    delete_post(store, &actor, post_id)?;
    Ok(no_content())
}
