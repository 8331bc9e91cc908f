//! API key entity (spec §3, §6).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{EntityId, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: EntityId,
    /// Salted hash of the secret (never the secret itself).
    pub secret_hash: String,
    pub salt: String,
    /// First 12 chars of the plaintext key, used to locate the record before
    /// hashing the rest (spec §6 Authentication).
    pub prefix: String,
    pub name: String,
    pub active: bool,
    pub permissions: HashSet<Permission>,
    pub allowed_ip_patterns: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub usage_count: u64,
    pub last_used_at: Option<Instant>,
}

impl ApiKey {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.active && self.permissions.contains(&permission)
    }
}
