//! Catalog configuration loaded from a `.properties` file.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use url::Url;

use crate::error::ConfigError;

pub const CONNECTOR_NAME: &str = "teradata";

pub const CONNECTOR_NAME_KEY: &str = "connector.name";
pub const CONNECTION_URL_KEY: &str = "connection-url";
pub const CONNECTION_USER_KEY: &str = "connection-user";
pub const CONNECTION_PASSWORD_KEY: &str = "connection-password";
pub const TERADATA_URL_KEY: &str = "teradata.url";
pub const TERADATA_USER_KEY: &str = "teradata.user";
pub const TERADATA_PASSWORD_KEY: &str = "teradata.password";

const DIALECT_PREFIX: &str = "teradata.";

/// Dialect option: rewrite trailing `LIMIT n` into `SELECT TOP n`.
pub const REWRITE_LIMIT_OPTION: &str = "rewrite-limit";
/// Dialect option: quote string used around identifiers in generated SQL.
pub const IDENTIFIER_QUOTE_OPTION: &str = "identifier-quote";
/// Dialect option: whether the database stores identifiers upper-case.
pub const UPPER_CASE_IDENTIFIERS_OPTION: &str = "stores-upper-case-identifiers";
/// Dialect option: default database for new sessions.
pub const DEFAULT_DATABASE_OPTION: &str = "default-database";

/// Default port of the Teradata Query Service.
const QUERY_SERVICE_PORT: u16 = 1443;

/// Connection parameters for one catalog. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    endpoint_url: String,
    user: String,
    password: String,
    dialect_options: HashMap<String, String>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("user", &self.user)
            .field("password", &"****")
            .field("dialect_options", &self.dialect_options)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn new(
        endpoint_url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        dialect_options: HashMap<String, String>,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            user: user.into(),
            password: password.into(),
            dialect_options,
        }
    }

    /// Build from catalog properties.
    ///
    /// `teradata.url`, `teradata.user` and `teradata.password` take precedence
    /// over the generic `connection-*` keys. Every other `teradata.*` key is
    /// kept as a dialect option with the prefix stripped.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, ConfigError> {
        if let Some(name) = properties.get(CONNECTOR_NAME_KEY) {
            if name != CONNECTOR_NAME {
                return Err(ConfigError::InvalidValue {
                    key: CONNECTOR_NAME_KEY.to_string(),
                    message: format!("expected '{}', got '{}'", CONNECTOR_NAME, name),
                });
            }
        }

        let lookup = |specific: &str, generic: &str| {
            properties
                .get(specific)
                .or_else(|| properties.get(generic))
                .cloned()
        };

        let (url_key, raw_url) = match properties.get(TERADATA_URL_KEY) {
            Some(url) => (TERADATA_URL_KEY, url.clone()),
            None => (
                CONNECTION_URL_KEY,
                properties
                    .get(CONNECTION_URL_KEY)
                    .cloned()
                    .ok_or_else(|| ConfigError::MissingProperty(CONNECTION_URL_KEY.to_string()))?,
            ),
        };
        let endpoint_url = normalize_endpoint(url_key, &raw_url)?;

        let user = lookup(TERADATA_USER_KEY, CONNECTION_USER_KEY)
            .ok_or_else(|| ConfigError::MissingProperty(CONNECTION_USER_KEY.to_string()))?;
        let password = lookup(TERADATA_PASSWORD_KEY, CONNECTION_PASSWORD_KEY).unwrap_or_default();

        let dialect_options = properties
            .iter()
            .filter(|(k, _)| {
                !matches!(
                    k.as_str(),
                    TERADATA_URL_KEY | TERADATA_USER_KEY | TERADATA_PASSWORD_KEY
                )
            })
            .filter_map(|(k, v)| {
                k.strip_prefix(DIALECT_PREFIX)
                    .map(|option| (option.to_string(), v.clone()))
            })
            .collect();

        Ok(Self {
            endpoint_url,
            user,
            password,
            dialect_options,
        })
    }

    /// Read and parse a catalog properties file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let properties = load_properties(path)?;
        Self::from_properties(&properties)
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn dialect_options(&self) -> &HashMap<String, String> {
        &self.dialect_options
    }

    pub fn dialect_option(&self, option: &str) -> Option<&str> {
        self.dialect_options.get(option).map(String::as_str)
    }

    /// Read a boolean dialect option, falling back to `default` when unset.
    pub fn dialect_flag(&self, option: &str, default: bool) -> Result<bool, ConfigError> {
        match self.dialect_option(option) {
            None => Ok(default),
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                other => Err(ConfigError::InvalidValue {
                    key: format!("{}{}", DIALECT_PREFIX, option),
                    message: format!("expected a boolean, got '{}'", other),
                }),
            },
        }
    }
}

/// Accept `http(s)://` Query Service URLs as-is and expand the short form
/// `teradata://host[:port]/system` into `https://host:port/systems/system`.
fn normalize_endpoint(key: &str, raw: &str) -> Result<String, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    };

    let parsed = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.as_str().trim_end_matches('/').to_string()),
        "teradata" => {
            let host = parsed
                .host_str()
                .ok_or_else(|| invalid("missing host".to_string()))?;
            let system = parsed.path().trim_matches('/');
            if system.is_empty() {
                return Err(invalid("missing system name in path".to_string()));
            }
            let port = parsed.port().unwrap_or(QUERY_SERVICE_PORT);
            Ok(format!("https://{}:{}/systems/{}", host, port, system))
        }
        other => Err(invalid(format!("unsupported URL scheme '{}'", other))),
    }
}

/// Parse a properties file: `key=value`, `key: value` or `key value` per
/// line, `#` and `!` comment lines, and `\` line continuations. Other
/// backslash escapes are kept as written.
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    logical_lines(content)
        .into_iter()
        .filter_map(|line| split_property(&line))
        .collect()
}

/// Join continued lines and drop blanks and comments.
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending: Option<String> = None;
    for raw in content.lines() {
        let line = raw.trim_start();
        let mut current = match pending.take() {
            Some(mut head) => {
                head.push_str(line);
                head
            }
            None if line.is_empty() || line.starts_with('#') || line.starts_with('!') => continue,
            None => line.to_string(),
        };
        let trailing = current.len() - current.trim_end_matches('\\').len();
        if trailing % 2 == 1 {
            current.pop();
            pending = Some(current);
        } else {
            lines.push(current);
        }
    }
    lines.extend(pending);
    lines
}

fn split_property(line: &str) -> Option<(String, String)> {
    let Some(idx) = line.find(|c: char| c == '=' || c == ':' || c.is_whitespace()) else {
        return Some((line.to_string(), String::new()));
    };
    let key = &line[..idx];
    if key.is_empty() {
        return None;
    }
    let mut value = line[idx..].trim_start();
    if line[idx..].starts_with(char::is_whitespace) {
        if let Some(rest) = value.strip_prefix(['=', ':']) {
            value = rest.trim_start();
        }
    } else {
        value = value[1..].trim_start();
    }
    Some((key.to_string(), value.trim_end().to_string()))
}

pub fn load_properties(path: impl AsRef<Path>) -> Result<HashMap<String, String>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_properties(&content))
}
