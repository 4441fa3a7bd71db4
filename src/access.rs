//! Ownership checks for posts and profiles.

use crate::models::models::{Actor, Post, Profile};
use crate::core::errors::ApiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    List,
    Retrieve,
    Update,
    PartialUpdate,
    Delete,
}

impl Action {
    pub fn is_read(self) -> bool {
        matches!(self, Action::List | Action::Retrieve)
    }
}

/// A resource permanently tied to the user that created it.
pub trait Owned {
    fn owner_id(&self) -> &str;
    fn kind(&self) -> &'static str;
}

impl Owned for Post {
    fn owner_id(&self) -> &str {
        &self.author_id
    }

    fn kind(&self) -> &'static str {
        "post"
    }
}

impl Owned for Profile {
    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn kind(&self) -> &'static str {
        "profile"
    }
}

/// Any authenticated actor may read; only the owner may write.
pub fn authorize<R: Owned + ?Sized>(actor: &Actor, action: Action, resource: &R) -> Result<(), ApiError> {
    if action.is_read() || resource.owner_id() == actor.user_id {
        return Ok(());
    }
    tracing::warn!(
        actor = %actor.user_id,
        owner = %resource.owner_id(),
        kind = resource.kind(),
        action = ?action,
        "write by non-owner rejected"
    );
    Err(ApiError::Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn post_by(author: &str) -> Post {
        Post {
            id: "p1".to_string(),
            author_id: author.to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            updated_at: None,
            hashtag_ids: vec![],
        }
    }

    fn profile_of(user: &str) -> Profile {
        Profile {
            id: "pr1".to_string(),
            user_id: user.to_string(),
            username: "someone".to_string(),
            bio: "bio".to_string(),
            image: None,
        }
    }

    #[rstest]
    #[case(Action::List, true)]
    #[case(Action::Retrieve, true)]
    #[case(Action::Update, false)]
    #[case(Action::PartialUpdate, false)]
    #[case(Action::Delete, false)]
    fn non_owner_may_only_read(#[case] action: Action, #[case] allowed: bool) {
        let stranger = Actor::new("stranger");
        assert_eq!(authorize(&stranger, action, &post_by("owner")).is_ok(), allowed);
        assert_eq!(authorize(&stranger, action, &profile_of("owner")).is_ok(), allowed);
    }

    #[rstest]
    #[case(Action::Update)]
    #[case(Action::PartialUpdate)]
    #[case(Action::Delete)]
    fn owner_may_write(#[case] action: Action) {
        let owner = Actor::new("owner");
        assert!(authorize(&owner, action, &post_by("owner")).is_ok());
        assert!(authorize(&owner, action, &profile_of("owner")).is_ok());
    }

    #[test]
    fn staff_gets_no_bypass() {
        let staff = Actor { user_id: "admin".to_string(), is_staff: true };
        assert!(matches!(
            authorize(&staff, Action::Delete, &post_by("owner")),
            Err(ApiError::Forbidden)
        ));
    }
}
