//! Credential providers and the provider chain.
//!
//! A transport asks the [`AuthChain`] for a credential of a given
//! [`CredentialKind`] whenever the server challenges it. Providers are
//! consulted in order; the first one that produces a credential wins. When
//! the server rejects a credential, [`AuthChain::credentials`] keeps going:
//! interactive providers may prompt again up to their retry limit before the
//! next provider is asked.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::SvnError;

/// Parameter holding a username to use when no provider supplies one.
pub const SVN_AUTH_PARAM_DEFAULT_USERNAME: &str = "svn:auth:username";
/// Parameter holding a password to use when no provider supplies one.
pub const SVN_AUTH_PARAM_DEFAULT_PASSWORD: &str = "svn:auth:password";
/// When set, interactive providers are skipped.
pub const SVN_AUTH_PARAM_NON_INTERACTIVE: &str = "svn:auth:non-interactive";
/// When set, credentials must not be saved.
pub const SVN_AUTH_PARAM_NO_AUTH_CACHE: &str = "svn:auth:no-auth-cache";

/// The kind of credential being asked for.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialKind {
    /// A bare username.
    Username,
    /// A username and password.
    Simple,
    /// Acceptance of an untrusted server certificate.
    SslServerTrust,
    /// A client certificate file.
    SslClientCert,
    /// The passphrase of a client certificate.
    SslClientCertPassword,
}

impl CredentialKind {
    /// Subversion's name for this credential kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Username => "svn.username",
            Self::Simple => "svn.simple",
            Self::SslServerTrust => "svn.ssl.server",
            Self::SslClientCert => "svn.ssl.client-cert",
            Self::SslClientCertPassword => "svn.ssl.client-passphrase",
        }
    }
}

/// A credential produced by a provider.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// A bare username.
    Username {
        /// The username.
        username: String,
        /// Whether the credential may be cached.
        may_save: bool,
    },
    /// A username and password.
    Simple {
        /// The username.
        username: String,
        /// The password.
        password: String,
        /// Whether the credential may be cached.
        may_save: bool,
    },
    /// Acceptance of a server certificate despite `accepted_failures`.
    SslServerTrust {
        /// Bitmask of certificate failures the user accepted.
        accepted_failures: u32,
        /// Whether the decision may be cached.
        may_save: bool,
    },
    /// A client certificate.
    SslClientCert {
        /// Path of the certificate file.
        cert_file: String,
        /// Whether the credential may be cached.
        may_save: bool,
    },
    /// The passphrase of a client certificate.
    SslClientCertPassword {
        /// The passphrase.
        password: String,
        /// Whether the credential may be cached.
        may_save: bool,
    },
}

impl Credential {
    /// The kind this credential answers.
    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::Username { .. } => CredentialKind::Username,
            Self::Simple { .. } => CredentialKind::Simple,
            Self::SslServerTrust { .. } => CredentialKind::SslServerTrust,
            Self::SslClientCert { .. } => CredentialKind::SslClientCert,
            Self::SslClientCertPassword { .. } => CredentialKind::SslClientCertPassword,
        }
    }

    /// Whether the credential may be cached.
    pub fn may_save(&self) -> bool {
        match self {
            Self::Username { may_save, .. }
            | Self::Simple { may_save, .. }
            | Self::SslServerTrust { may_save, .. }
            | Self::SslClientCert { may_save, .. }
            | Self::SslClientCertPassword { may_save, .. } => *may_save,
        }
    }

    /// The username carried by the credential, if any.
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Username { username, .. } | Self::Simple { username, .. } => Some(username),
            _ => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Username { username, may_save } => f
                .debug_struct("Username")
                .field("username", username)
                .field("may_save", may_save)
                .finish(),
            Self::Simple {
                username, may_save, ..
            } => f
                .debug_struct("Simple")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("may_save", may_save)
                .finish(),
            Self::SslServerTrust {
                accepted_failures,
                may_save,
            } => f
                .debug_struct("SslServerTrust")
                .field("accepted_failures", accepted_failures)
                .field("may_save", may_save)
                .finish(),
            Self::SslClientCert {
                cert_file,
                may_save,
            } => f
                .debug_struct("SslClientCert")
                .field("cert_file", cert_file)
                .field("may_save", may_save)
                .finish(),
            Self::SslClientCertPassword { may_save, .. } => f
                .debug_struct("SslClientCertPassword")
                .field("password", &"<redacted>")
                .field("may_save", may_save)
                .finish(),
        }
    }
}

/// The server certificate presented during an SSL handshake.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SslServerCertInfo {
    /// Primary hostname of the certificate.
    pub hostname: String,
    /// SHA-1 fingerprint.
    pub fingerprint: String,
    /// Start of the validity period.
    pub valid_from: String,
    /// End of the validity period.
    pub valid_until: String,
    /// Distinguished name of the issuer.
    pub issuer_dname: String,
    /// Base64-encoded DER certificate.
    pub ascii_cert: String,
}

/// A source of credentials.
pub trait AuthProvider: Send + Sync {
    /// First credential for `realm`, or `None` if this provider has none.
    fn resolve(&self, realm: &str, kind: CredentialKind) -> Option<Credential>;

    /// Another credential after the server rejected the previous one.
    /// `attempt` counts retries from 1.
    fn retry(&self, _realm: &str, _kind: CredentialKind, _attempt: u32) -> Option<Credential> {
        None
    }

    /// Decision on an untrusted server certificate.
    fn trust_server(
        &self,
        _realm: &str,
        _failures: u32,
        _cert: &SslServerCertInfo,
    ) -> Option<Credential> {
        None
    }

    /// Whether credentials from this provider may be saved.
    fn may_save(&self) -> bool {
        false
    }

    /// Whether this provider asks a user.
    fn is_interactive(&self) -> bool {
        false
    }
}

/// Fixed credentials supplied by the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    username: String,
    password: Option<String>,
}

impl StaticCredentials {
    /// A username without a password.
    pub fn username(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
        }
    }

    /// A username and password.
    pub fn simple(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
        }
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AuthProvider for StaticCredentials {
    fn resolve(&self, _realm: &str, kind: CredentialKind) -> Option<Credential> {
        match (kind, &self.password) {
            (CredentialKind::Username, _) => Some(Credential::Username {
                username: self.username.clone(),
                may_save: false,
            }),
            (CredentialKind::Simple, Some(password)) => Some(Credential::Simple {
                username: self.username.clone(),
                password: password.clone(),
                may_save: false,
            }),
            _ => None,
        }
    }
}

type UsernamePromptFn = dyn Fn(&str, bool) -> Option<(String, bool)> + Send + Sync;
type SimplePromptFn = dyn Fn(&str, bool) -> Option<(String, String, bool)> + Send + Sync;
type TrustPromptFn =
    dyn Fn(&str, u32, &SslServerCertInfo, bool) -> Option<(u32, bool)> + Send + Sync;

/// Prompts for a username.
///
/// The closure receives the realm and whether saving is allowed, and returns
/// `(username, may_save)` or `None` to give up.
pub struct UsernamePrompt {
    prompt: Box<UsernamePromptFn>,
    retry_limit: u32,
}

impl UsernamePrompt {
    /// Wraps `prompt`, re-asking at most `retry_limit` times after rejection.
    pub fn new<F>(retry_limit: u32, prompt: F) -> Self
    where
        F: Fn(&str, bool) -> Option<(String, bool)> + Send + Sync + 'static,
    {
        Self {
            prompt: Box::new(prompt),
            retry_limit,
        }
    }
}

impl fmt::Debug for UsernamePrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsernamePrompt")
            .field("retry_limit", &self.retry_limit)
            .finish_non_exhaustive()
    }
}

impl AuthProvider for UsernamePrompt {
    fn resolve(&self, realm: &str, kind: CredentialKind) -> Option<Credential> {
        if kind != CredentialKind::Username {
            return None;
        }
        (self.prompt)(realm, true).map(|(username, may_save)| Credential::Username {
            username,
            may_save,
        })
    }

    fn retry(&self, realm: &str, kind: CredentialKind, attempt: u32) -> Option<Credential> {
        if attempt > self.retry_limit {
            return None;
        }
        self.resolve(realm, kind)
    }

    fn may_save(&self) -> bool {
        true
    }

    fn is_interactive(&self) -> bool {
        true
    }
}

/// Prompts for a username and password.
///
/// The closure receives the realm and whether saving is allowed, and returns
/// `(username, password, may_save)` or `None` to give up.
pub struct SimplePrompt {
    prompt: Box<SimplePromptFn>,
    retry_limit: u32,
}

impl SimplePrompt {
    /// Wraps `prompt`, re-asking at most `retry_limit` times after rejection.
    pub fn new<F>(retry_limit: u32, prompt: F) -> Self
    where
        F: Fn(&str, bool) -> Option<(String, String, bool)> + Send + Sync + 'static,
    {
        Self {
            prompt: Box::new(prompt),
            retry_limit,
        }
    }
}

impl fmt::Debug for SimplePrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimplePrompt")
            .field("retry_limit", &self.retry_limit)
            .finish_non_exhaustive()
    }
}

impl AuthProvider for SimplePrompt {
    fn resolve(&self, realm: &str, kind: CredentialKind) -> Option<Credential> {
        if kind != CredentialKind::Simple {
            return None;
        }
        (self.prompt)(realm, true).map(|(username, password, may_save)| Credential::Simple {
            username,
            password,
            may_save,
        })
    }

    fn retry(&self, realm: &str, kind: CredentialKind, attempt: u32) -> Option<Credential> {
        if attempt > self.retry_limit {
            return None;
        }
        self.resolve(realm, kind)
    }

    fn may_save(&self) -> bool {
        true
    }

    fn is_interactive(&self) -> bool {
        true
    }
}

/// Asks whether to trust a server certificate.
///
/// The closure receives the realm, the failure bitmask, the certificate and
/// whether saving is allowed, and returns `(accepted_failures, may_save)` or
/// `None` to reject the certificate.
pub struct SslServerTrustPrompt {
    prompt: Box<TrustPromptFn>,
}

impl SslServerTrustPrompt {
    /// Wraps `prompt`.
    pub fn new<F>(prompt: F) -> Self
    where
        F: Fn(&str, u32, &SslServerCertInfo, bool) -> Option<(u32, bool)> + Send + Sync + 'static,
    {
        Self {
            prompt: Box::new(prompt),
        }
    }
}

impl fmt::Debug for SslServerTrustPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslServerTrustPrompt").finish_non_exhaustive()
    }
}

impl AuthProvider for SslServerTrustPrompt {
    fn resolve(&self, _realm: &str, _kind: CredentialKind) -> Option<Credential> {
        None
    }

    fn trust_server(
        &self,
        realm: &str,
        failures: u32,
        cert: &SslServerCertInfo,
    ) -> Option<Credential> {
        (self.prompt)(realm, failures, cert, true).map(|(accepted_failures, may_save)| {
            Credential::SslServerTrust {
                accepted_failures,
                may_save,
            }
        })
    }

    fn may_save(&self) -> bool {
        true
    }

    fn is_interactive(&self) -> bool {
        true
    }
}

/// An ordered list of providers plus string parameters.
#[derive(Clone, Default)]
pub struct AuthChain {
    providers: Vec<Arc<dyn AuthProvider>>,
    parameters: BTreeMap<String, String>,
}

impl fmt::Debug for AuthChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthChain")
            .field("providers", &self.providers.len())
            .field("parameters", &self.parameters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AuthChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider.
    pub fn with_provider(mut self, provider: impl AuthProvider + 'static) -> Self {
        self.push(provider);
        self
    }

    /// Appends a provider.
    pub fn push(&mut self, provider: impl AuthProvider + 'static) {
        self.providers.push(Arc::new(provider));
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if the chain has no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Sets a parameter.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(name.into(), value.into());
    }

    /// Reads a parameter.
    pub fn get_parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Removes a parameter, returning its old value.
    pub fn remove_parameter(&mut self, name: &str) -> Option<String> {
        self.parameters.remove(name)
    }

    fn non_interactive(&self) -> bool {
        self.parameters.contains_key(SVN_AUTH_PARAM_NON_INTERACTIVE)
    }

    fn usable(&self) -> impl Iterator<Item = &Arc<dyn AuthProvider>> + '_ {
        let non_interactive = self.non_interactive();
        self.providers
            .iter()
            .filter(move |provider| !(non_interactive && provider.is_interactive()))
    }

    fn no_cache(&self, credential: Credential) -> Credential {
        if !self.parameters.contains_key(SVN_AUTH_PARAM_NO_AUTH_CACHE) {
            return credential;
        }
        match credential {
            Credential::Username { username, .. } => Credential::Username {
                username,
                may_save: false,
            },
            Credential::Simple {
                username, password, ..
            } => Credential::Simple {
                username,
                password,
                may_save: false,
            },
            Credential::SslServerTrust {
                accepted_failures, ..
            } => Credential::SslServerTrust {
                accepted_failures,
                may_save: false,
            },
            Credential::SslClientCert { cert_file, .. } => Credential::SslClientCert {
                cert_file,
                may_save: false,
            },
            Credential::SslClientCertPassword { password, .. } => {
                Credential::SslClientCertPassword {
                    password,
                    may_save: false,
                }
            }
        }
    }

    fn default_credential(&self, kind: CredentialKind) -> Option<Credential> {
        let username = self.get_parameter(SVN_AUTH_PARAM_DEFAULT_USERNAME)?;
        match kind {
            CredentialKind::Username => Some(Credential::Username {
                username: username.to_string(),
                may_save: false,
            }),
            CredentialKind::Simple => {
                let password = self.get_parameter(SVN_AUTH_PARAM_DEFAULT_PASSWORD)?;
                Some(Credential::Simple {
                    username: username.to_string(),
                    password: password.to_string(),
                    may_save: false,
                })
            }
            _ => None,
        }
    }

    /// First credential of `kind` for `realm`.
    ///
    /// Default username/password parameters take precedence over providers.
    pub fn resolve(&self, realm: &str, kind: CredentialKind) -> Option<Credential> {
        self.credentials(realm, kind).next()
    }

    /// Like [`AuthChain::resolve`], failing with [`SvnError::AuthUnavailable`].
    pub fn require(&self, realm: &str, kind: CredentialKind) -> Result<Credential, SvnError> {
        self.resolve(realm, kind).ok_or_else(|| {
            debug!(realm, kind = kind.as_str(), "no provider supplied a credential");
            SvnError::AuthUnavailable(realm.to_string())
        })
    }

    /// Every credential the chain can offer, in the order a transport should
    /// try them after successive rejections.
    pub fn credentials<'a>(&'a self, realm: &'a str, kind: CredentialKind) -> Credentials<'a> {
        Credentials {
            chain: self,
            realm,
            kind,
            providers: self.usable().collect(),
            provider: 0,
            attempt: 0,
            defaults_done: false,
        }
    }

    /// Asks the providers whether to trust a server certificate.
    pub fn trust_server(
        &self,
        realm: &str,
        failures: u32,
        cert: &SslServerCertInfo,
    ) -> Option<Credential> {
        self.usable()
            .find_map(|provider| provider.trust_server(realm, failures, cert))
            .map(|credential| self.no_cache(credential))
    }
}

/// Iterator returned by [`AuthChain::credentials`].
pub struct Credentials<'a> {
    chain: &'a AuthChain,
    realm: &'a str,
    kind: CredentialKind,
    providers: Vec<&'a Arc<dyn AuthProvider>>,
    provider: usize,
    attempt: u32,
    defaults_done: bool,
}

impl fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("realm", &self.realm)
            .field("kind", &self.kind)
            .field("provider", &self.provider)
            .field("attempt", &self.attempt)
            .finish()
    }
}

impl Iterator for Credentials<'_> {
    type Item = Credential;

    fn next(&mut self) -> Option<Credential> {
        if !self.defaults_done {
            self.defaults_done = true;
            if let Some(credential) = self.chain.default_credential(self.kind) {
                return Some(credential);
            }
        }
        while let Some(provider) = self.providers.get(self.provider) {
            let credential = if self.attempt == 0 {
                provider.resolve(self.realm, self.kind)
            } else {
                provider.retry(self.realm, self.kind, self.attempt)
            };
            match credential {
                Some(credential) => {
                    self.attempt += 1;
                    return Some(self.chain.no_cache(credential));
                }
                None => {
                    self.provider += 1;
                    self.attempt = 0;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn providers_are_consulted_in_order() {
        let chain = AuthChain::new()
            .with_provider(StaticCredentials::username("anon"))
            .with_provider(StaticCredentials::simple("alice", "secret"));
        assert_eq!(
            chain.resolve("realm", CredentialKind::Simple),
            Some(Credential::Simple {
                username: "alice".into(),
                password: "secret".into(),
                may_save: false,
            })
        );
        assert_eq!(
            chain
                .resolve("realm", CredentialKind::Username)
                .unwrap()
                .username(),
            Some("anon")
        );
        assert!(matches!(
            chain.require("realm", CredentialKind::SslClientCert),
            Err(SvnError::AuthUnavailable(_))
        ));
    }

    #[test]
    fn prompt_retries_up_to_its_limit() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let chain = AuthChain::new().with_provider(SimplePrompt::new(2, move |realm, may_save| {
            assert_eq!(realm, "<svn://host:3690> repo");
            assert!(may_save);
            let n = seen.fetch_add(1, Ordering::Relaxed);
            Some((format!("user{n}"), "pw".to_string(), true))
        }));

        let names: Vec<String> = chain
            .credentials("<svn://host:3690> repo", CredentialKind::Simple)
            .map(|c| c.username().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["user0", "user1", "user2"]);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn non_interactive_skips_prompts_and_no_cache_clears_may_save() {
        let mut chain = AuthChain::new()
            .with_provider(UsernamePrompt::new(0, |_, _| Some(("prompted".into(), true))));
        assert!(chain.resolve("r", CredentialKind::Username).unwrap().may_save());

        chain.set_parameter(SVN_AUTH_PARAM_NO_AUTH_CACHE, "1");
        assert!(!chain.resolve("r", CredentialKind::Username).unwrap().may_save());

        chain.set_parameter(SVN_AUTH_PARAM_NON_INTERACTIVE, "1");
        assert_eq!(chain.resolve("r", CredentialKind::Username), None);
        assert_eq!(chain.get_parameter(SVN_AUTH_PARAM_NON_INTERACTIVE), Some("1"));
        assert_eq!(
            chain.remove_parameter(SVN_AUTH_PARAM_NON_INTERACTIVE).as_deref(),
            Some("1")
        );
    }

    #[test]
    fn default_parameters_come_first() {
        let mut chain = AuthChain::new().with_provider(StaticCredentials::simple("alice", "pw"));
        chain.set_parameter(SVN_AUTH_PARAM_DEFAULT_USERNAME, "bob");
        chain.set_parameter(SVN_AUTH_PARAM_DEFAULT_PASSWORD, "hunter2");
        let all: Vec<Credential> = chain.credentials("r", CredentialKind::Simple).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].username(), Some("bob"));
        assert_eq!(all[1].username(), Some("alice"));
    }

    #[test]
    fn server_trust_prompt_sees_certificate() {
        let chain = AuthChain::new().with_provider(SslServerTrustPrompt::new(
            |_realm, failures, cert, _may_save| {
                (cert.hostname == "svn.example.com").then_some((failures, false))
            },
        ));
        let cert = SslServerCertInfo {
            hostname: "svn.example.com".into(),
            ..SslServerCertInfo::default()
        };
        assert_eq!(
            chain.trust_server("realm", 0x8, &cert),
            Some(Credential::SslServerTrust {
                accepted_failures: 0x8,
                may_save: false,
            })
        );
        assert_eq!(chain.resolve("realm", CredentialKind::SslServerTrust), None);
    }

    #[test]
    fn debug_output_redacts_passwords() {
        let credential = Credential::Simple {
            username: "alice".into(),
            password: "secret".into(),
            may_save: false,
        };
        let text = format!("{credential:?} {:?}", StaticCredentials::simple("a", "secret"));
        assert!(!text.contains("secret"));
        assert_eq!(CredentialKind::Simple.as_str(), "svn.simple");
        assert_eq!(credential.kind(), CredentialKind::Simple);
    }
}
