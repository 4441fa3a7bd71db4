use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use anyhow::anyhow;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;
use crate::models::models::{User, Profile, Post, Hashtag};
use crate::core::helpers::{hash_password, now_iso};
use crate::follow::Edge;
use crate::config::*;

enum Backend {
    Memory(Mutex<HashMap<String, Vec<u8>>>),
    #[cfg(target_arch = "wasm32")]
    Spin(spin_sdk::key_value::Store),
}

/// JSON document store over a key/value backend.
///
/// Reads go straight to the backend. Writes go through [`Store::transaction`],
/// which holds a store-wide lock, stages every write and commits the batch
/// only when the closure succeeds.
pub struct Store {
    backend: Backend,
    tx_lock: Mutex<()>,
}

impl Store {
    pub fn memory() -> Self {
        Store {
            backend: Backend::Memory(Mutex::new(HashMap::new())),
            tx_lock: Mutex::new(()),
        }
    }

    #[cfg(target_arch = "wasm32")]
    pub fn open_default() -> anyhow::Result<Self> {
        Ok(Store {
            backend: Backend::Spin(spin_sdk::key_value::Store::open_default()?),
            tx_lock: Mutex::new(()),
        })
    }

    fn get_raw(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match &self.backend {
            Backend::Memory(map) => Ok(lock(map)?.get(key).cloned()),
            #[cfg(target_arch = "wasm32")]
            Backend::Spin(store) => Ok(store.get(key)?),
        }
    }

    /// Keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut keys: Vec<String> = match &self.backend {
            Backend::Memory(map) => lock(map)?
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            #[cfg(target_arch = "wasm32")]
            Backend::Spin(store) => store
                .get_keys()?
                .into_iter()
                .filter(|k| k.starts_with(prefix))
                .collect(),
        };
        keys.sort();
        Ok(keys)
    }

    fn commit(&self, writes: BTreeMap<String, Option<Vec<u8>>>) -> anyhow::Result<()> {
        match &self.backend {
            Backend::Memory(map) => {
                let mut map = lock(map)?;
                for (key, value) in writes {
                    match value {
                        Some(bytes) => map.insert(key, bytes),
                        None => map.remove(&key),
                    };
                }
            }
            // Spin's key/value API has no multi-key commit; the batch is
            // applied in key order.
            #[cfg(target_arch = "wasm32")]
            Backend::Spin(store) => {
                for (key, value) in writes {
                    match value {
                        Some(bytes) => store.set(&key, &bytes)?,
                        None => store.delete(&key)?,
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Runs `f` as one unit of work. Nothing `f` writes is visible to others
    /// until it returns `Ok`; on `Err` the staged writes are dropped.
    pub fn transaction<R, E>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<R, E>) -> Result<R, E>
    where
        E: From<anyhow::Error>,
    {
        let _guard = lock(&self.tx_lock)?;
        let mut tx = Transaction { store: self, writes: BTreeMap::new() };
        let result = f(&mut tx)?;
        let staged = tx.writes.len();
        self.commit(tx.writes)?;
        tracing::trace!(staged, "transaction committed");
        Ok(result)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> anyhow::Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("store lock poisoned"))
}

pub struct Transaction<'a> {
    store: &'a Store,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl Transaction<'_> {
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let bytes = match self.writes.get(key) {
            Some(staged) => staged.clone(),
            None => self.store.get_raw(key)?,
        };
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        self.writes.insert(key.to_string(), Some(serde_json::to_vec(value)?));
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> anyhow::Result<()> {
        self.writes.insert(key.to_string(), None);
        Ok(())
    }

    /// Like [`Store::keys_with_prefix`], with this transaction's staged
    /// writes and deletes applied.
    pub fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut keys: BTreeSet<String> = self.store.keys_with_prefix(prefix)?.into_iter().collect();
        let staged = self
            .writes
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix));
        for (key, value) in staged {
            if value.is_some() {
                keys.insert(key.clone());
            } else {
                keys.remove(key);
            }
        }
        Ok(keys.into_iter().collect())
    }

    /// Appends `id` to the id list stored under `list_key`.
    pub fn push_id(&mut self, list_key: &str, id: &str) -> anyhow::Result<()> {
        let mut ids: Vec<String> = self.get_json(list_key)?.unwrap_or_default();
        ids.push(id.to_string());
        self.set_json(list_key, &ids)
    }

    pub fn remove_id(&mut self, list_key: &str, id: &str) -> anyhow::Result<()> {
        let mut ids: Vec<String> = self.get_json(list_key)?.unwrap_or_default();
        ids.retain(|existing| existing != id);
        self.set_json(list_key, &ids)
    }
}

/// Loads every document whose id is listed under `list_key`, in list order.
pub fn load_all<T: DeserializeOwned>(
    store: &Store,
    list_key: &str,
    key_fn: fn(&str) -> String,
) -> anyhow::Result<Vec<T>> {
    let ids: Vec<String> = store.get_json(list_key)?.unwrap_or_default();
    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(item) = store.get_json::<T>(&key_fn(&id))? {
            items.push(item);
        }
    }
    Ok(items)
}

pub fn find_user_by_email(store: &Store, email: &str) -> anyhow::Result<Option<User>> {
    let users: Vec<User> = load_all(store, USERS_LIST_KEY, user_key)?;
    Ok(users.into_iter().find(|u| u.email == email))
}

/// Creates the superuser named by the environment, if it does not exist yet.
pub fn ensure_admin(store: &Store, email: &str, password: &str) -> anyhow::Result<()> {
    if find_user_by_email(store, email)?.is_some() {
        return Ok(());
    }
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        password: hash_password(password)?,
        is_staff: true,
        is_superuser: true,
        created_at: now_iso(),
    };
    store.transaction(|tx| -> anyhow::Result<()> {
        tx.set_json(&user_key(&user.id), &user)?;
        tx.push_id(USERS_LIST_KEY, &user.id)
    })?;
    tracing::info!(user_id = %user.id, "admin user created");
    Ok(())
}

/// Seeds three demo accounts with profiles and posts; "test" follows "bob".
pub fn init_test_data(store: &Store) -> anyhow::Result<()> {
    if find_user_by_email(store, "test@feedline.local")?.is_some() {
        return Ok(());
    }

    let demo = [
        ("test", "Test user bio", "This is my first post!", "intro"),
        ("alice", "Hello, I'm Alice!", "Welcome to my board! Excited to share thoughts here.", "welcome"),
        ("bob", "Bob's corner of the internet", "Hey everyone! Just joined, looking forward to connecting.", "hello"),
    ];

    let mut user_ids = HashMap::new();
    store.transaction(|tx| -> anyhow::Result<()> {
        for (name, bio, content, tag) in demo {
            let user = User {
                id: Uuid::new_v4().to_string(),
                email: format!("{}@feedline.local", name),
                password: hash_password(name)?,
                is_staff: false,
                is_superuser: false,
                created_at: now_iso(),
            };
            let profile = Profile {
                id: Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                username: name.to_string(),
                bio: bio.to_string(),
                image: None,
            };
            let hashtag = Hashtag { id: Uuid::new_v4().to_string(), name: tag.to_string() };
            let post = Post {
                id: Uuid::new_v4().to_string(),
                author_id: user.id.clone(),
                title: format!("Hi from {}", name),
                content: content.to_string(),
                created_at: now_iso(),
                updated_at: None,
                hashtag_ids: vec![hashtag.id.clone()],
            };

            tx.set_json(&user_key(&user.id), &user)?;
            tx.push_id(USERS_LIST_KEY, &user.id)?;
            tx.set_json(&profile_key(&profile.id), &profile)?;
            tx.set_json(&user_profile_key(&user.id), &profile.id)?;
            tx.push_id(PROFILES_LIST_KEY, &profile.id)?;
            tx.set_json(&hashtag_key(&hashtag.id), &hashtag)?;
            tx.push_id(HASHTAGS_LIST_KEY, &hashtag.id)?;
            tx.set_json(&post_key(&post.id), &post)?;
            tx.push_id(POSTS_LIST_KEY, &post.id)?;
            user_ids.insert(name, user.id);
        }

        if let (Some(test_id), Some(bob_id)) = (user_ids.get("test"), user_ids.get("bob")) {
            tx.set_json(&edge_key(test_id, bob_id), &Edge::new(test_id, bob_id))?;
        }
        Ok(())
    })?;

    tracing::info!(users = user_ids.len(), "demo data seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_reads_its_own_writes() {
        let store = Store::memory();
        let seen: Option<String> = store
            .transaction(|tx| -> anyhow::Result<Option<String>> {
                tx.set_json("k", &"v".to_string())?;
                tx.get_json("k")
            })
            .unwrap();
        assert_eq!(seen.as_deref(), Some("v"));
        assert_eq!(store.get_json::<String>("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let store = Store::memory();
        let result = store.transaction(|tx| -> anyhow::Result<()> {
            tx.set_json("a", &1)?;
            tx.push_id("list", "x")?;
            Err(anyhow!("abort"))
        });
        assert!(result.is_err());
        assert!(store.get_json::<i32>("a").unwrap().is_none());
        assert!(store.get_json::<Vec<String>>("list").unwrap().is_none());
    }

    #[test]
    fn staged_delete_hides_value() {
        let store = Store::memory();
        store.transaction(|tx| tx.set_json("gone", &true)).unwrap();
        store
            .transaction(|tx| -> anyhow::Result<()> {
                tx.delete("gone")?;
                assert!(tx.get_json::<bool>("gone")?.is_none());
                Ok(())
            })
            .unwrap();
        assert!(store.get_json::<bool>("gone").unwrap().is_none());
    }

    #[test]
    fn id_lists_keep_insertion_order() {
        let store = Store::memory();
        store
            .transaction(|tx| -> anyhow::Result<()> {
                tx.push_id("ids", "1")?;
                tx.push_id("ids", "2")?;
                tx.push_id("ids", "3")?;
                tx.remove_id("ids", "2")
            })
            .unwrap();
        let ids: Vec<String> = store.get_json("ids").unwrap().unwrap();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn prefix_scan_sees_staged_writes() {
        let store = Store::memory();
        store
            .transaction(|tx| -> anyhow::Result<()> {
                tx.set_json("edge:a", &1)?;
                tx.set_json("edge:b", &2)?;
                tx.set_json("other", &3)
            })
            .unwrap();
        assert_eq!(store.keys_with_prefix("edge:").unwrap(), vec!["edge:a", "edge:b"]);

        store
            .transaction(|tx| -> anyhow::Result<()> {
                tx.delete("edge:a")?;
                tx.set_json("edge:c", &4)?;
                assert_eq!(tx.keys_with_prefix("edge:")?, vec!["edge:b", "edge:c"]);
                Ok(())
            })
            .unwrap();
        assert_eq!(store.keys_with_prefix("edge:").unwrap(), vec!["edge:b", "edge:c"]);
    }

    #[test]
    fn seed_is_idempotent() {
        let store = Store::memory();
        init_test_data(&store).unwrap();
        init_test_data(&store).unwrap();

        let users: Vec<User> = load_all(&store, USERS_LIST_KEY, user_key).unwrap();
        assert_eq!(users.len(), 3);
        let graph = crate::follow::load_graph(&store).unwrap();
        let test = users.iter().find(|u| u.email.starts_with("test@")).unwrap();
        let bob = users.iter().find(|u| u.email.starts_with("bob@")).unwrap();
        assert!(graph.is_following(&test.id, &bob.id));
    }

    #[test]
    fn admin_is_created_once() {
        let store = Store::memory();
        ensure_admin(&store, "root@feedline.local", "rootpass").unwrap();
        ensure_admin(&store, "root@feedline.local", "rootpass").unwrap();

        let users: Vec<User> = load_all(&store, USERS_LIST_KEY, user_key).unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].is_staff && users[0].is_superuser);
    }
}
