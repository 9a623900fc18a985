use crate::SvnError;

const SCHEMES: [(&str, u16); 5] = [
    ("svn+ssh://", 22),
    ("svn://", 3690),
    ("https://", 443),
    ("http://", 80),
    ("file://", 0),
];

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// A normalized Subversion repository URL.
///
/// Supported schemes are `svn://` (default port `3690`), `svn+ssh://`
/// (`22`), `http://` (`80`), `https://` (`443`) and `file://`.
///
/// Network URLs are normalized to include an explicit port. All URLs are
/// normalized to an explicit path without a trailing slash (the root is `/`).
pub struct SvnUrl {
    /// Scheme without the `://` separator, lowercased.
    pub scheme: String,
    /// Hostname (or IP) portion of the URL. Empty for local `file://` URLs.
    pub host: String,
    /// TCP port portion of the URL (`0` for `file://`).
    pub port: u16,
    /// Normalized path, always starting with `/`.
    pub path: String,
    /// Full normalized URL string.
    pub url: String,
}

impl SvnUrl {
    /// Parses and normalizes a repository URL.
    ///
    /// # Examples
    ///
    /// ```
    /// # use svn_ra::SvnUrl;
    /// let url = SvnUrl::parse("svn://example.com/repo/").unwrap();
    /// assert_eq!(url.url, "svn://example.com:3690/repo");
    /// ```
    pub fn parse(input: &str) -> Result<Self, SvnError> {
        let input = input.trim();
        let Some((prefix, default_port)) = SCHEMES.iter().copied().find(|(prefix, _)| {
            input.len() >= prefix.len() && input[..prefix.len()].eq_ignore_ascii_case(prefix)
        }) else {
            return Err(SvnError::InvalidUrl(format!("unsupported url scheme: {input}")));
        };
        let scheme = prefix.trim_end_matches("://").to_string();
        let rest = &input[prefix.len()..];

        let (authority, raw_path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        let path = normalize_path(raw_path)?;

        if scheme == "file" {
            if !authority.is_empty() && !authority.eq_ignore_ascii_case("localhost") {
                return Err(SvnError::InvalidUrl(format!(
                    "file:// urls must be local: {input}"
                )));
            }
            let host = authority.to_ascii_lowercase();
            let url = format!("file://{host}{path}");
            return Ok(Self {
                scheme,
                host,
                port: 0,
                path,
                url,
            });
        }

        let (username, hostport) = if let Some((user, hostport)) = authority.rsplit_once('@') {
            if user.contains(':') {
                return Err(SvnError::InvalidUrl(
                    "URL passwords are not supported (use user@host, not user:pass@host)"
                        .to_string(),
                ));
            }
            if user.trim().is_empty() {
                return Err(SvnError::InvalidUrl(format!(
                    "invalid url (empty username): {input}"
                )));
            }
            (Some(user.to_string()), hostport)
        } else {
            (None, authority)
        };

        let (host, port) = parse_host_port(hostport, default_port, input)?;

        let host_url = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.clone()
        };
        let user_url = username
            .as_deref()
            .map(|u| format!("{u}@"))
            .unwrap_or_default();
        let url = format!("{scheme}://{user_url}{host_url}:{port}{path}");
        Ok(Self {
            scheme,
            host,
            port,
            path,
            url,
        })
    }

    /// Returns `true` if `self` is `root` or lies below it.
    ///
    /// Scheme, host and port must match; the path must be `root.path` or
    /// start with `root.path` followed by `/`.
    pub fn is_within(&self, root: &SvnUrl) -> bool {
        self.relative_to(root).is_some()
    }

    /// Returns the path of `self` relative to `root` (empty for `root`
    /// itself), or `None` if `self` is outside `root`.
    pub fn relative_to(&self, root: &SvnUrl) -> Option<String> {
        if self.scheme != root.scheme || self.host != root.host || self.port != root.port {
            return None;
        }
        if self.path == root.path {
            return Some(String::new());
        }
        let base = if root.path == "/" { "" } else { root.path.as_str() };
        let rest = self.path.strip_prefix(base)?.strip_prefix('/')?;
        Some(rest.to_string())
    }

    /// Appends a relative path, returning a new normalized URL.
    pub fn join(&self, rel: &str) -> Result<Self, SvnError> {
        let rel = crate::path::validate_rel_dir_path(rel)?;
        if rel.is_empty() {
            return Ok(self.clone());
        }
        if self.path == "/" {
            Self::parse(&format!("{}{rel}", self.url))
        } else {
            Self::parse(&format!("{}/{rel}", self.url))
        }
    }
}

fn normalize_path(raw: &str) -> Result<String, SvnError> {
    if raw.contains('\0') {
        return Err(SvnError::InvalidUrl("url path contains NUL".into()));
    }
    let segments: Vec<&str> = raw.split('/').filter(|seg| !seg.is_empty()).collect();
    if segments.iter().any(|seg| *seg == "..") {
        return Err(SvnError::InvalidUrl(format!("url path is not canonical: {raw}")));
    }
    Ok(format!("/{}", segments.join("/")))
}

fn parse_host_port(
    hostport: &str,
    default_port: u16,
    input: &str,
) -> Result<(String, u16), SvnError> {
    let (host, port) = if let Some(hostport) = hostport.strip_prefix('[') {
        let Some(end) = hostport.find(']') else {
            return Err(SvnError::InvalidUrl(format!("invalid url: {input}")));
        };
        let host = &hostport[..end];
        let after = &hostport[end + 1..];
        if after.is_empty() {
            (host.to_string(), default_port)
        } else if let Some(port_str) = after.strip_prefix(':') {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| SvnError::InvalidUrl(format!("invalid port in url: {input}")))?;
            (host.to_string(), port)
        } else {
            return Err(SvnError::InvalidUrl(format!("invalid url: {input}")));
        }
    } else {
        match hostport.matches(':').count() {
            0 => (hostport.to_string(), default_port),
            1 => {
                let (h, port_str) = hostport
                    .rsplit_once(':')
                    .ok_or_else(|| SvnError::InvalidUrl(format!("invalid url: {input}")))?;
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| SvnError::InvalidUrl(format!("invalid port in url: {input}")))?;
                (h.to_string(), port)
            }
            _ => {
                return Err(SvnError::InvalidUrl(
                    "IPv6 addresses must be enclosed in brackets (e.g. svn://[::1]/repo)"
                        .to_string(),
                ));
            }
        }
    };

    if host.trim().is_empty() {
        return Err(SvnError::InvalidUrl(format!("missing host in url: {input}")));
    }
    Ok((host.to_ascii_lowercase(), port))
}

impl std::fmt::Display for SvnUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

impl std::str::FromStr for SvnUrl {
    type Err = SvnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
