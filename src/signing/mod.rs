//! Trust classification
//!
//! Computes a `SigningDescriptor` for an executable off the ingestion path:
//! - `codesign`: verification and entitlement extraction via the system tool
//! - `cache`: verdicts keyed by (path, modification time)
//! - `pool`: bounded worker pool writing verdicts back into the table

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::models::{SigningDescriptor, SigningState, SigningStatus};

pub mod cache;
pub mod codesign;
pub mod pool;

pub use cache::SigningCache;
pub use codesign::{CodesignEntitlements, CodesignVerifier};
pub use pool::ClassifierPool;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("{}: {source}", path.display())]
    Unreadable { path: PathBuf, source: io::Error },
    #[error("failed to run codesign: {0}")]
    Spawn(#[source] io::Error),
    #[error("codesign failed for {}: {message}", path.display())]
    Tool { path: PathBuf, message: String },
    #[error("failed to parse entitlements: {0}")]
    Plist(#[from] plist::Error),
}

/// Result of verifying one binary's signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub status: SigningStatus,
    /// Leaf first
    pub authorities: Vec<String>,
    pub is_apple: bool,
    pub is_apple_dev_id: bool,
}

/// Signature verification primitive
pub trait TrustVerifier: Send + Sync {
    fn verify(&self, path: &Path) -> Result<Verification, SigningError>;
}

/// Entitlement extraction primitive
pub trait EntitlementReader: Send + Sync {
    fn entitlements(&self, path: &Path) -> Result<HashMap<String, Value>, SigningError>;
}

/// Receipt left by the App Store inside the bundle enclosing `path`.
///
/// Only the presence of the receipt is checked. It is not parsed or
/// validated against this machine's GUID, so a copied receipt passes.
pub fn has_app_store_receipt(path: &Path) -> bool {
    path.ancestors()
        .find(|dir| dir.extension().map_or(false, |ext| ext == "app"))
        .map_or(false, |bundle| bundle.join("Contents/_MASReceipt/receipt").is_file())
}

/// Produces cached trust verdicts
pub struct Classifier {
    verifier: Arc<dyn TrustVerifier>,
    entitlements: Arc<dyn EntitlementReader>,
    cache: SigningCache,
    eager_entitlements: bool,
}

impl Classifier {
    pub fn new(
        verifier: Arc<dyn TrustVerifier>,
        entitlements: Arc<dyn EntitlementReader>,
        cache_capacity: usize,
        eager_entitlements: bool,
    ) -> Self {
        Self {
            verifier,
            entitlements,
            cache: SigningCache::new(cache_capacity),
            eager_entitlements,
        }
    }

    /// Classifier backed by the system `codesign` tool
    pub fn system(cache_capacity: usize, eager_entitlements: bool) -> Self {
        Self::new(
            Arc::new(CodesignVerifier::default()),
            Arc::new(CodesignEntitlements::default()),
            cache_capacity,
            eager_entitlements,
        )
    }

    /// Signing state for the binary at `path`. Failures degrade to
    /// `Unavailable` and are not cached.
    pub fn classify(&self, path: &Path) -> SigningState {
        let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(source) => {
                let err = SigningError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                };
                return SigningState::Unavailable(err.to_string());
            }
        };
        if let Some(descriptor) = self.cache.get(path, modified) {
            return SigningState::Resolved(descriptor);
        }
        match self.describe(path) {
            Ok(descriptor) => {
                self.cache.insert(path, modified, descriptor.clone());
                SigningState::Resolved(descriptor)
            }
            Err(err) => {
                debug!("Classification of {} failed: {}", path.display(), err);
                SigningState::Unavailable(err.to_string())
            }
        }
    }

    fn describe(&self, path: &Path) -> Result<SigningDescriptor, SigningError> {
        let verification = self.verifier.verify(path)?;
        let is_app_store = verification.is_apple_dev_id && has_app_store_receipt(path);
        let entitlements = if self.eager_entitlements && verification.status != SigningStatus::Unsigned {
            match self.entitlements.entitlements(path) {
                Ok(entitlements) => Some(entitlements),
                Err(err) => {
                    debug!("No entitlements for {}: {}", path.display(), err);
                    None
                }
            }
        } else {
            None
        };
        Ok(SigningDescriptor {
            status: verification.status,
            is_apple: verification.is_apple,
            is_apple_dev_id: verification.is_apple_dev_id,
            is_app_store,
            authorities: verification.authorities,
            entitlements,
        })
    }

    /// Entitlements of the binary at `path`, extracted on demand
    pub fn entitlements_of(&self, path: &Path) -> Result<HashMap<String, Value>, SigningError> {
        self.entitlements.entitlements(path)
    }

    pub fn cache(&self) -> &SigningCache {
        &self.cache
    }
}
