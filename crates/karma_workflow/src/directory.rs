//! User Directory - who can receive karma and what they are called.

use crate::error::DirectoryError;
use crate::types::DirectoryEntry;
use anyhow::{Context, Result};
use karma_ids::UserId;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

pub trait UserDirectory: Send + Sync {
    /// All known users except `excluding`, ordered by id.
    fn list_users(&self, excluding: Option<UserId>) -> Vec<DirectoryEntry>;

    fn name_of(&self, user: UserId) -> Result<String, DirectoryError>;

    fn exists(&self, user: UserId) -> bool;
}

/// Directory fixed at startup from a `{ "<user id>": "<name>" }` map.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: BTreeMap<UserId, String>,
}

impl StaticDirectory {
    pub fn new(users: impl IntoIterator<Item = (UserId, String)>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, String> =
            serde_json::from_str(json).context("User map must be a JSON object of id -> name")?;

        let mut users = BTreeMap::new();
        for (id, name) in raw {
            let id = UserId::parse(&id)
                .with_context(|| format!("Invalid user id in user map: {:?}", id))?;
            users.insert(id, name);
        }
        Ok(Self { users })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read user map: {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Failed to parse user map: {}", path.display()))
    }

    pub fn user_ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.users.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for StaticDirectory {
    fn list_users(&self, excluding: Option<UserId>) -> Vec<DirectoryEntry> {
        self.users
            .iter()
            .filter(|(id, _)| Some(**id) != excluding)
            .map(|(id, name)| DirectoryEntry {
                id: *id,
                name: name.clone(),
            })
            .collect()
    }

    fn name_of(&self, user: UserId) -> Result<String, DirectoryError> {
        self.users
            .get(&user)
            .cloned()
            .ok_or(DirectoryError::UnknownUser(user))
    }

    fn exists(&self, user: UserId) -> bool {
        self.users.contains_key(&user)
    }
}
