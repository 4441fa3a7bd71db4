use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub bio: String,
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub hashtag_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Hashtag {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: String,
}

/// The authenticated identity a request acts as.
#[derive(Clone, Debug, PartialEq)]
pub struct Actor {
    pub user_id: String,
    pub is_staff: bool,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Actor { user_id: user_id.into(), is_staff: false }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Actor { user_id: user.id.clone(), is_staff: user.is_staff }
    }
}
