use std::collections::BTreeMap;

/// Settings handed to a [`Connector`](crate::Connector) when a session opens.
///
/// `options` is a free-form `section:name` map (for example
/// `"servers:http-compression"`). The session core does not interpret it;
/// transports read whatever keys they understand.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Client name reported to the server.
    pub ra_client: String,
    /// Transport options.
    pub options: BTreeMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ra_client: concat!("svn-ra/", env!("CARGO_PKG_VERSION")).to_string(),
            options: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with the default client name and no options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the client name reported to the server.
    ///
    /// When the server supports ephemeral transaction properties, commits
    /// carry this name as `svn:txn-user-agent`.
    pub fn with_ra_client(mut self, ra_client: impl Into<String>) -> Self {
        self.ra_client = ra_client.into();
        self
    }

    /// Sets a transport option.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Reads a transport option.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    /// Reads a boolean option; `yes`, `true`, `on` and `1` count as true.
    pub fn option_bool(&self, name: &str, default: bool) -> bool {
        match self.option(name) {
            Some(value) => matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "yes" | "true" | "on" | "1"
            ),
            None => default,
        }
    }
}
