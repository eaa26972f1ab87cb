//! API credential lookup for the analysis service.

use std::fmt;

/// Environment variables consulted, in order, when no key is configured.
pub const CREDENTIAL_ENV_VARS: [&str; 2] = ["VISIONALLY_API_KEY", "GEMINI_API_KEY"];

/// An API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential(String);

impl ApiCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiCredential(***)")
    }
}

/// Present/absent credential lookup. Consulted at startup and again on
/// every capture completion, so a key can appear while the app is running.
pub trait CredentialSource: Send + Sync {
    fn lookup(&self) -> Option<ApiCredential>;
}

/// The configured `analysis.api_key`, falling back to the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigCredentials {
    configured: Option<String>,
}

impl ConfigCredentials {
    pub fn new(configured: Option<String>) -> Self {
        Self { configured }
    }
}

impl CredentialSource for ConfigCredentials {
    fn lookup(&self) -> Option<ApiCredential> {
        resolve(self.configured.as_deref(), |name| std::env::var(name).ok())
    }
}

/// A fixed answer; useful when the key is injected by the embedder.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Option<ApiCredential>);

impl CredentialSource for StaticCredentials {
    fn lookup(&self) -> Option<ApiCredential> {
        self.0.clone()
    }
}

/// First non-blank value of: the configured key, then each of
/// [`CREDENTIAL_ENV_VARS`].
fn resolve(configured: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Option<ApiCredential> {
    let non_blank = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| ApiCredential::new(s))
    };

    configured.and_then(non_blank).or_else(|| {
        CREDENTIAL_ENV_VARS
            .iter()
            .find_map(|name| env(*name).as_deref().and_then(non_blank))
    })
}
