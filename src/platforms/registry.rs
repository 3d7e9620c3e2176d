//! Platform registry
//!
//! In-memory registry mapping platform slugs to their implementations. The
//! registry is built once from configuration and carried in application
//! state; nothing here is process-global.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::config::AppConfig;
use crate::platforms::ReviewPlatform;
use crate::platforms::google::GooglePlatform;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Platform '{name}' not found")]
    PlatformNotFound { name: String },
}

/// Registry of review platform implementations keyed by slug
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    platforms: HashMap<String, Arc<dyn ReviewPlatform>>,
}

impl PlatformRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            platforms: HashMap::new(),
        }
    }

    /// Build a registry from configuration, registering every platform that
    /// has credentials available.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let mut registry = Self::new();

        if let (Some(client_id), Some(client_secret)) = (
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
        ) {
            let google = GooglePlatform::new(
                client_id,
                client_secret,
                config.google_authorize_base.clone(),
                config.google_oauth_base.clone(),
                config.google_api_base.clone(),
                config.http_timeout(),
            )?;
            registry.register(Arc::new(google));
        } else {
            warn!("Google platform not registered: missing client credentials");
        }

        Ok(registry)
    }

    /// Register a platform implementation under its slug.
    pub fn register(&mut self, platform: Arc<dyn ReviewPlatform>) {
        self.platforms
            .insert(platform.slug().to_string(), platform);
    }

    /// Look up a platform by slug.
    pub fn get(&self, slug: &str) -> Result<Arc<dyn ReviewPlatform>, RegistryError> {
        self.platforms
            .get(slug)
            .cloned()
            .ok_or_else(|| RegistryError::PlatformNotFound {
                name: slug.to_string(),
            })
    }

    /// Registered platform slugs, for discovery endpoints and logging.
    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.platforms.keys().cloned().collect();
        slugs.sort();
        slugs
    }

    /// True when no platforms are registered.
    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_lookup_fails() {
        let registry = PlatformRegistry::new();
        let result = registry.get("google");
        assert!(matches!(
            result,
            Err(RegistryError::PlatformNotFound { .. })
        ));
    }

    #[test]
    fn test_from_config_without_credentials_is_empty() {
        let config = AppConfig::default();
        let registry = PlatformRegistry::from_config(&config).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_config_registers_google() {
        let config = AppConfig {
            google_client_id: Some("client-id".to_string()),
            google_client_secret: Some("client-secret".to_string()),
            ..AppConfig::default()
        };
        let registry = PlatformRegistry::from_config(&config).unwrap();
        assert!(registry.get("google").is_ok());
        assert_eq!(registry.slugs(), vec!["google".to_string()]);
    }
}
