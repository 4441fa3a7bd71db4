//! Which posts a viewer may list.
//!
//! A [`PostQuery`] starts from the visibility rule (own posts plus posts by
//! followed authors) and narrows it with optional predicates. All predicates
//! are evaluated together, in one pass over the posts.

use std::collections::{HashMap, HashSet};
use crate::models::models::{Actor, Hashtag, Post};
use crate::core::db::{Store, load_all};
use crate::follow::load_graph;
use crate::config::*;

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Author is the viewer or someone the viewer follows.
    VisibleTo { viewer: String, following: HashSet<String> },
    AuthorIn(HashSet<String>),
    /// Lowercased needle, matched against lowercased hashtag names.
    HashtagContains(String),
}

impl Predicate {
    fn matches(&self, post: &Post, hashtags: &HashMap<String, Hashtag>) -> bool {
        match self {
            Predicate::VisibleTo { viewer, following } => {
                post.author_id == *viewer || following.contains(&post.author_id)
            }
            Predicate::AuthorIn(authors) => authors.contains(&post.author_id),
            Predicate::HashtagContains(needle) => post
                .hashtag_ids
                .iter()
                .filter_map(|id| hashtags.get(id))
                .any(|tag| tag.name.to_lowercase().contains(needle.as_str())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PostQuery {
    predicates: Vec<Predicate>,
}

impl PostQuery {
    pub fn visible_to(viewer: &str, following: impl IntoIterator<Item = String>) -> Self {
        PostQuery {
            predicates: vec![Predicate::VisibleTo {
                viewer: viewer.to_string(),
                following: following.into_iter().collect(),
            }],
        }
    }

    pub fn authored_by(mut self, authors: Option<Vec<String>>) -> Self {
        if let Some(authors) = authors {
            self.predicates.push(Predicate::AuthorIn(authors.into_iter().collect()));
        }
        self
    }

    pub fn tagged_like(mut self, needle: Option<String>) -> Self {
        if let Some(needle) = needle.filter(|n| !n.is_empty()) {
            self.predicates.push(Predicate::HashtagContains(needle.to_lowercase()));
        }
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn matches(&self, post: &Post, hashtags: &HashMap<String, Hashtag>) -> bool {
        self.predicates.iter().all(|p| p.matches(post, hashtags))
    }

    /// Posts satisfying every predicate, in the order given.
    pub fn apply(&self, posts: Vec<Post>, hashtags: &HashMap<String, Hashtag>) -> Vec<Post> {
        let mut seen = HashSet::new();
        posts
            .into_iter()
            .filter(|p| self.matches(p, hashtags))
            .filter(|p| seen.insert(p.id.clone()))
            .collect()
    }
}

pub fn hashtag_index(store: &Store) -> anyhow::Result<HashMap<String, Hashtag>> {
    let hashtags: Vec<Hashtag> = load_all(store, HASHTAGS_LIST_KEY, hashtag_key)?;
    Ok(hashtags.into_iter().map(|h| (h.id.clone(), h)).collect())
}

/// Posts `actor` may see, oldest first, narrowed by the optional filters.
pub fn visible_posts(
    store: &Store,
    actor: &Actor,
    authors: Option<Vec<String>>,
    hashtag: Option<String>,
) -> anyhow::Result<Vec<Post>> {
    let following = load_graph(store)?.following(&actor.user_id);
    let query = PostQuery::visible_to(&actor.user_id, following)
        .authored_by(authors)
        .tagged_like(hashtag);

    let posts: Vec<Post> = load_all(store, POSTS_LIST_KEY, post_key)?;
    let visible = query.apply(posts, &hashtag_index(store)?);
    tracing::debug!(
        viewer = %actor.user_id,
        predicates = query.predicates().len(),
        matched = visible.len(),
        "post query evaluated"
    );
    Ok(visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, author: &str, tags: &[&str]) -> Post {
        Post {
            id: id.to_string(),
            author_id: author.to_string(),
            title: id.to_string(),
            content: String::new(),
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            updated_at: None,
            hashtag_ids: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn tags() -> HashMap<String, Hashtag> {
        [("h1", "Python"), ("h2", "tech")]
            .into_iter()
            .map(|(id, name)| (id.to_string(), Hashtag { id: id.to_string(), name: name.to_string() }))
            .collect()
    }

    fn ids(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.id.as_str()).collect()
    }

    fn sample() -> Vec<Post> {
        vec![
            post("own", "u", &["h1"]),
            post("followed", "a", &["h2"]),
            post("stranger", "c", &["h1", "h2"]),
        ]
    }

    #[test]
    fn visible_iff_own_or_followed() {
        let query = PostQuery::visible_to("u", vec!["a".to_string()]);
        assert_eq!(ids(&query.apply(sample(), &tags())), vec!["own", "followed"]);
    }

    #[test]
    fn hashtag_filter_is_case_insensitive_substring() {
        let query = PostQuery::visible_to("u", vec!["a".to_string()]).tagged_like(Some("yTH".to_string()));
        assert_eq!(ids(&query.apply(sample(), &tags())), vec!["own"]);

        let none = PostQuery::visible_to("u", vec!["a".to_string()]).tagged_like(Some("xyz".to_string()));
        assert!(none.apply(sample(), &tags()).is_empty());
    }

    #[test]
    fn author_filter_is_conjunctive_with_visibility() {
        let query = PostQuery::visible_to("u", vec!["a".to_string()])
            .authored_by(Some(vec!["a".to_string(), "c".to_string()]));
        assert_eq!(ids(&query.apply(sample(), &tags())), vec!["followed"]);
    }

    #[test]
    fn absent_filters_add_no_predicates() {
        let query = PostQuery::visible_to("u", Vec::new())
            .authored_by(None)
            .tagged_like(Some(String::new()));
        assert_eq!(query.predicates().len(), 1);
    }

    #[test]
    fn duplicate_posts_are_returned_once() {
        let mut posts = sample();
        posts.push(post("own", "u", &["h1"]));
        let query = PostQuery::visible_to("u", Vec::new());
        assert_eq!(ids(&query.apply(posts, &tags())), vec!["own"]);
    }
}
