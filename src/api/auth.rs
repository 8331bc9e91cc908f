//! API-key authentication and authorization (spec §6).
//!
//! Resolution: the first 12 characters of the header value locate the
//! record via the key cache; the remaining secret is hashed with the
//! record's stored salt and compared in constant time. The IP-allow list
//! is matched by any; permission checks gate individual routes.

use std::net::IpAddr;
use std::str::FromStr;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use ipnet::IpNet;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::domain::{ApiKey, Permission};
use crate::AppError;

use super::state::SharedState;

const API_KEY_HEADER: &str = "x-api-key";
const PREFIX_LEN: usize = 12;

/// The authenticated key, inserted into request extensions by
/// [`authenticate`] for handlers to read permissions off of.
#[derive(Clone)]
pub struct AuthenticatedKey(pub ApiKey);

fn hash_secret(secret: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn ip_allowed(patterns: &[String], addr: IpAddr) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|pattern| {
        if let Ok(net) = IpNet::from_str(pattern) {
            net.contains(&addr)
        } else if let Ok(single) = pattern.parse::<IpAddr>() {
            single == addr
        } else {
            false
        }
    })
}

/// Axum middleware: resolves, authenticates, and IP-filters every
/// request before it reaches a handler.
pub async fn authenticate(
    State(state): State<SharedState>,
    ConnectInfo(remote): ConnectInfo<std::net::SocketAddr>,
    headers: HeaderMap,
    mut request: axum::extract::Request,
    next: Next,
) -> Result<Response, AppError> {
    let header_value = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if header_value.len() <= PREFIX_LEN {
        return Err(AppError::Unauthorized);
    }
    let (prefix, secret) = header_value.split_at(PREFIX_LEN);

    let key = state
        .key_cache
        .lookup_by_prefix(prefix)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !key.active {
        return Err(AppError::Unauthorized);
    }

    let expected = hash_secret(secret, &key.salt);
    if !constant_time_eq(&expected, &key.secret_hash) {
        return Err(AppError::Unauthorized);
    }

    if !ip_allowed(&key.allowed_ip_patterns, remote.ip()) {
        return Err(AppError::Forbidden);
    }

    if !state.rate_limiters.check(key.id, key.rate_limit_per_minute) {
        return Err(AppError::RateLimited { retry_after_secs: 60 });
    }

    record_usage_fire_and_forget(&state, key.id);

    request.extensions_mut().insert(AuthenticatedKey(key));
    Ok(next.run(request).await)
}

fn record_usage_fire_and_forget(state: &SharedState, key_id: uuid::Uuid) {
    let storage = state.storage.clone();
    let key_cache = state.key_cache.clone();
    tokio::spawn(async move {
        if let Err(error) = storage.record_api_key_usage(key_id).await {
            tracing::warn!(%error, "failed to record api key usage");
            return;
        }
        let _ = key_cache.refresh(key_id).await;
    });
}

pub fn require_permission(key: &ApiKey, permission: Permission) -> Result<(), AppError> {
    if key.has_permission(permission) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_allowed_matches_cidr() {
        let patterns = vec!["10.0.0.0/8".to_string()];
        assert!(ip_allowed(&patterns, "10.1.2.3".parse().unwrap()));
        assert!(!ip_allowed(&patterns, "192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn empty_pattern_list_allows_any_address() {
        assert!(ip_allowed(&[], "203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn hash_is_deterministic_for_same_salt_and_secret() {
        assert_eq!(hash_secret("s3cr3t", "salt"), hash_secret("s3cr3t", "salt"));
        assert_ne!(hash_secret("s3cr3t", "salt"), hash_secret("other", "salt"));
    }
}
