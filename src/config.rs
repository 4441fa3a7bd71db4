pub const MAX_POST_TITLE_LENGTH: usize = 255;
pub const MAX_POST_LENGTH: usize = 5000;
pub const MAX_HASHTAG_LENGTH: usize = 120;
pub const MAX_USERNAME_LENGTH: usize = 25;
pub const MAX_BIO_LENGTH: usize = 200;
pub const MIN_PASSWORD_LENGTH: usize = 5;

pub const USERS_LIST_KEY: &str = "users_list";
pub const PROFILES_LIST_KEY: &str = "profiles_list";
pub const POSTS_LIST_KEY: &str = "posts_list";
pub const HASHTAGS_LIST_KEY: &str = "hashtags_list";
pub const TOKENS_LIST_KEY: &str = "tokens_list";
pub const FOLLOW_EDGE_PREFIX: &str = "follow:";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn profile_key(id: &str) -> String {
    format!("profile:{}", id)
}

/// Index from a user id to the id of that user's profile.
pub fn user_profile_key(user_id: &str) -> String {
    format!("user_profile:{}", user_id)
}

pub fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

pub fn hashtag_key(id: &str) -> String {
    format!("hashtag:{}", id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

/// One key per follow edge, so a toggle only ever touches its own pair.
pub fn edge_key(follower: &str, followee: &str) -> String {
    format!("{}{}:{}", FOLLOW_EDGE_PREFIX, follower, followee)
}

pub fn token_expiration_hours() -> i64 {
    std::env::var("FEEDLINE_TOKEN_EXPIRATION_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(24)
}

pub fn bind_addr() -> String {
    std::env::var("FEEDLINE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
}

pub fn seed_demo_data() -> bool {
    std::env::var("FEEDLINE_SEED_DEMO")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Credentials of the superuser created at startup, when both are set.
pub fn admin_credentials() -> Option<(String, String)> {
    let email = std::env::var("FEEDLINE_ADMIN_EMAIL").ok()?;
    let password = std::env::var("FEEDLINE_ADMIN_PASSWORD").ok()?;
    if email.is_empty() || password.is_empty() {
        return None;
    }
    Some((email, password))
}
