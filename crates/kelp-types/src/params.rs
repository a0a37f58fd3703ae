//! Per-request parameters shared by every object operation.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ContainerId, OwnerId};

/// Default hop budget for a client request.
pub const DEFAULT_TTL: u32 = 2;

/// Operation a session token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionVerb {
    Put,
    Get,
    Head,
    Search,
    Delete,
}

/// Session token: a delegated right to act on a container for a while.
///
/// The coordinator does not verify tokens; it forwards them unchanged and
/// uses the issuer as the owner of objects it creates on the caller's
/// behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Principal that issued the session.
    pub issuer: OwnerId,
    /// Container the session is bound to.
    pub container: ContainerId,
    /// Authorized operation.
    pub verb: SessionVerb,
    /// Last epoch the token is valid for.
    pub valid_until_epoch: u64,
    /// Opaque signed body.
    pub body: Bytes,
}

/// Bearer token: an opaque access grant forwarded to storage nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    /// Principal that issued the grant.
    pub issuer: OwnerId,
    /// Opaque signed body.
    pub body: Bytes,
}

/// Parameters attached to every request: TTL, tokens, local-only flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonParams {
    /// Remaining hop budget. Zero is rejected; one means "serve locally".
    pub ttl: u32,
    /// Optional session token.
    pub session_token: Option<SessionToken>,
    /// Optional bearer token.
    pub bearer_token: Option<BearerToken>,
    /// Restrict the operation to the local node.
    pub local_only: bool,
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            session_token: None,
            bearer_token: None,
            local_only: false,
        }
    }
}

impl CommonParams {
    /// Parameters for a local-only request.
    pub fn local() -> Self {
        Self {
            local_only: true,
            ..Self::default()
        }
    }

    /// Builder-style session token setter.
    pub fn with_session(mut self, token: SessionToken) -> Self {
        self.session_token = Some(token);
        self
    }

    /// Builder-style bearer token setter.
    pub fn with_bearer(mut self, token: BearerToken) -> Self {
        self.bearer_token = Some(token);
        self
    }

    /// Builder-style TTL setter.
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Parameters for a request forwarded to a storage node: TTL decremented,
    /// tokens kept.
    pub fn forwarded(&self) -> Self {
        Self {
            ttl: self.ttl.saturating_sub(1),
            ..self.clone()
        }
    }

    /// Whether the request must be served from the local node only.
    pub fn is_local(&self) -> bool {
        self.local_only || self.ttl == 1
    }

    /// Owner to attribute objects created on the caller's behalf to: the
    /// session issuer when a session is present.
    pub fn effective_owner(&self, fallback: OwnerId) -> OwnerId {
        self.session_token
            .as_ref()
            .map_or(fallback, |token| token.issuer)
    }
}
