//! The follow graph.
//!
//! Every follow relationship is a single `(follower, followee)` edge stored
//! under its own key. A user's `following` and `followers` sets are both read
//! off the same edges, so there is no second collection that could fall out
//! of step, and a toggle never rewrites anyone else's edges.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};
use spin_sdk::http::{Request, Response};
use crate::models::models::{Actor, Profile};
use crate::core::db::{Store, Transaction};
use crate::core::errors::{ApiError, FieldErrors};
use crate::core::helpers::json_response;
use crate::auth::authenticate;
use crate::profiles::load_profile;
use crate::config::*;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    pub follower: String,
    pub followee: String,
}

impl Edge {
    pub fn new(follower: &str, followee: &str) -> Self {
        Edge {
            follower: follower.to_string(),
            followee: followee.to_string(),
        }
    }

    fn touches(&self, user_id: &str) -> bool {
        self.follower == user_id || self.followee == user_id
    }
}

/// Read-only snapshot of every edge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FollowGraph {
    edges: BTreeSet<Edge>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    Follow,
    Unfollow,
}

impl FollowGraph {
    pub fn from_edges(edges: impl IntoIterator<Item = Edge>) -> Self {
        FollowGraph { edges: edges.into_iter().collect() }
    }

    pub fn is_following(&self, follower: &str, followee: &str) -> bool {
        self.edges.contains(&Edge::new(follower, followee))
    }

    /// Users `user_id` follows.
    pub fn following(&self, user_id: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|e| e.follower == user_id)
            .map(|e| e.followee.clone())
            .collect()
    }

    /// Users following `user_id`.
    pub fn followers(&self, user_id: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|e| e.followee == user_id)
            .map(|e| e.follower.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

pub fn load_graph(store: &Store) -> anyhow::Result<FollowGraph> {
    let mut edges = Vec::new();
    for key in store.keys_with_prefix(FOLLOW_EDGE_PREFIX)? {
        if let Some(edge) = store.get_json::<Edge>(&key)? {
            edges.push(edge);
        }
    }
    Ok(FollowGraph::from_edges(edges))
}

/// Drops every edge touching `user_id` and reports how many went.
pub(crate) fn remove_user_edges(tx: &mut Transaction<'_>, user_id: &str) -> anyhow::Result<usize> {
    let mut removed = 0;
    for key in tx.keys_with_prefix(FOLLOW_EDGE_PREFIX)? {
        if let Some(edge) = tx.get_json::<Edge>(&key)? {
            if edge.touches(user_id) {
                tx.delete(&key)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Follows or unfollows the owner of `target_profile_id` on behalf of `actor`.
///
/// The membership check and the write happen in one transaction and touch
/// only the edge key of this pair.
pub fn toggle_follow(store: &Store, actor: &Actor, target_profile_id: &str) -> Result<FollowStatus, ApiError> {
    store.transaction(|tx| -> Result<FollowStatus, ApiError> {
        let target: Profile = tx
            .get_json(&profile_key(target_profile_id))?
            .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

        if tx.get_json::<String>(&user_profile_key(&actor.user_id))?.is_none() {
            return Err(ApiError::BadRequest(
                "Create a profile before following others".to_string(),
            ));
        }

        if target.user_id == actor.user_id {
            return Err(ApiError::Validation(FieldErrors::single(
                "target",
                "You cannot follow yourself.",
            )));
        }

        let key = edge_key(&actor.user_id, &target.user_id);
        let status = if tx.get_json::<Edge>(&key)?.is_some() {
            tx.delete(&key)?;
            FollowStatus::Unfollow
        } else {
            tx.set_json(&key, &Edge::new(&actor.user_id, &target.user_id))?;
            FollowStatus::Follow
        };

        tracing::info!(
            follower = %actor.user_id,
            followee = %target.user_id,
            status = ?status,
            "follow switched"
        );
        Ok(status)
    })
}

// === HTTP Handlers ===

pub fn handle_follow_switch(store: &Store, req: &Request, profile_id: &str) -> Result<Response, ApiError> {
    let actor = authenticate(store, req)?;
    let status = toggle_follow(store, &actor, profile_id)?;
    json_response(200, &serde_json::json!({"status": status}))
}

/// Following/followers of the profile's user, as user ids.
pub fn handle_relations(store: &Store, req: &Request, profile_id: &str, followers: bool) -> Result<Response, ApiError> {
    authenticate(store, req)?;
    let profile = load_profile(store, profile_id)?;
    let graph = load_graph(store)?;
    let ids = if followers {
        graph.followers(&profile.user_id)
    } else {
        graph.following(&profile.user_id)
    };
    json_response(200, &ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn graph(pairs: &[(&str, &str)]) -> FollowGraph {
        FollowGraph::from_edges(pairs.iter().map(|(a, b)| Edge::new(a, b)))
    }

    /// Gives `user_id` a profile and returns the profile id.
    fn with_profile(store: &Store, user_id: &str) -> String {
        let profile = Profile {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            username: user_id.to_string(),
            bio: String::new(),
            image: None,
        };
        store
            .transaction(|tx| -> anyhow::Result<()> {
                tx.set_json(&profile_key(&profile.id), &profile)?;
                tx.set_json(&user_profile_key(user_id), &profile.id)
            })
            .unwrap();
        profile.id
    }

    #[test]
    fn edges_are_directed() {
        let g = graph(&[("a", "b")]);
        assert!(g.is_following("a", "b"));
        assert!(!g.is_following("b", "a"));
        assert_eq!(g.following("a"), vec!["b"]);
        assert_eq!(g.followers("b"), vec!["a"]);
        assert!(g.followers("a").is_empty());
    }

    #[test]
    fn toggle_twice_restores_both_directions() {
        let store = Store::memory();
        with_profile(&store, "a");
        let target = with_profile(&store, "b");
        let actor = Actor::new("a");

        assert_eq!(toggle_follow(&store, &actor, &target).unwrap(), FollowStatus::Follow);
        let g = load_graph(&store).unwrap();
        assert_eq!(g.following("a"), vec!["b"]);
        assert_eq!(g.followers("b"), vec!["a"]);

        assert_eq!(toggle_follow(&store, &actor, &target).unwrap(), FollowStatus::Unfollow);
        assert!(load_graph(&store).unwrap().is_empty());
    }

    #[test]
    fn remove_user_edges_drops_both_sides() {
        let store = Store::memory();
        store
            .transaction(|tx| -> anyhow::Result<()> {
                for (a, b) in [("a", "b"), ("b", "a"), ("c", "b"), ("c", "a")] {
                    tx.set_json(&edge_key(a, b), &Edge::new(a, b))?;
                }
                Ok(())
            })
            .unwrap();

        let removed = store.transaction(|tx| remove_user_edges(tx, "a")).unwrap();
        assert_eq!(removed, 3);
        let g = load_graph(&store).unwrap();
        assert_eq!(g.len(), 1);
        assert_eq!(g.followers("b"), vec!["c"]);
    }

    #[test]
    fn concurrent_toggles_are_not_lost() {
        let store = Arc::new(Store::memory());
        let targets: Vec<String> = (0..5).map(|i| with_profile(&store, &format!("t{}", i))).collect();
        let actors: Vec<String> = (0..6).map(|i| format!("a{}", i)).collect();
        for actor in &actors {
            with_profile(&store, actor);
        }
        with_profile(&store, "x");

        let mut handles = Vec::new();
        // Each actor toggles every target three times and ends up following it.
        for actor in actors.clone() {
            let store = Arc::clone(&store);
            let targets = targets.clone();
            handles.push(thread::spawn(move || {
                let actor = Actor::new(actor);
                for _ in 0..3 {
                    for target in &targets {
                        toggle_follow(&store, &actor, target).unwrap();
                    }
                }
            }));
        }
        // Four threads contend on one pair; twelve flips leave it unfollowed.
        for _ in 0..4 {
            let store = Arc::clone(&store);
            let target = targets[0].clone();
            handles.push(thread::spawn(move || {
                let actor = Actor::new("x");
                for _ in 0..3 {
                    toggle_follow(&store, &actor, &target).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let g = load_graph(&store).unwrap();
        assert_eq!(g.len(), 30);
        assert!(g.following("x").is_empty());
        for actor in &actors {
            assert_eq!(g.following(actor).len(), 5);
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        let body = serde_json::json!({"status": FollowStatus::Unfollow});
        assert_eq!(body["status"], "unfollow");
    }
}
