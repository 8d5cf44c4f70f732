// Copyright 2026 The Tollgate Project
// SPDX-License-Identifier: Apache-2.0

// Bearer credential acquisition.
//
// The relay only needs the capability to obtain a fresh bearer token
// before each upstream call. How the token is minted (cloud identity
// provider, workload identity, a credential sidecar) is deployment glue
// behind this trait. Tokens are never logged.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to acquire bearer token: {0}")]
    Acquire(String),
}

/// Provides a bearer token for the upstream API.
///
/// Called once per turn so short-lived credentials stay fresh.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, AuthError>;
}

/// Reads the token from a process environment variable on every call.
///
/// Suited to development and single-tenant deployments where a pre-minted
/// token is exported into the environment.
pub struct EnvTokenProvider {
    var_name: String,
}

impl EnvTokenProvider {
    pub fn new(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        match std::env::var(&self.var_name) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(AuthError::Acquire(format!(
                "environment variable {} is not set",
                self.var_name
            ))),
        }
    }
}

/// Serves a fixed token. Used in tests and by embedders that manage
/// credentials themselves.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}
