//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::asset::{AssetResolver, EncodedAsset, PALETTE};
use crate::error::HubError;

/// In-memory resolver: palette colours resolve to `asset:<colour>`, anything
/// else to `asset:heart`. Can be switched into a failing mode.
#[derive(Clone, Default)]
pub struct StaticResolver {
    failing: Arc<AtomicBool>,
}

impl StaticResolver {
    pub const DEFAULT: &'static str = "asset:heart";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let resolver = Self::default();
        resolver.set_failing(true);
        resolver
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, path: &str) -> Result<(), HubError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HubError::AssetResolution {
                path: path.to_string(),
                reason: "disk on fire".to_string(),
            });
        }
        Ok(())
    }
}

impl AssetResolver for StaticResolver {
    fn resolve(&self, attribute: &str) -> Result<EncodedAsset, HubError> {
        self.check(attribute)?;
        if PALETTE.contains(&attribute) {
            Ok(format!("asset:{attribute}"))
        } else {
            Ok(Self::DEFAULT.to_string())
        }
    }

    fn resolve_default(&self) -> Result<EncodedAsset, HubError> {
        self.check("heart")?;
        Ok(Self::DEFAULT.to_string())
    }
}
