//! Connection descriptors
//!
//! A [`ConnectionDescriptor`] names an engine and a catalog. It hands out two
//! views:
//!
//! - [`EngineDescriptor`]: the engine without a catalog. Existence checks,
//!   creation and drops go through this view, because a connection that names
//!   a catalog cannot be opened before that catalog exists.
//! - [`CatalogDescriptor`]: the engine plus the catalog, used for script
//!   installation and sessions once the catalog is there.
//!
//! Both render to (and parse from) an ADO-style connection string.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const DATA_SOURCE: &str = "Data Source";
const INITIAL_CATALOG: &str = "Initial Catalog";
const INTEGRATED_SECURITY: &str = "Integrated Security";
const USER_ID: &str = "User ID";
const PASSWORD: &str = "Password";
const PERSIST_SECURITY_INFO: &str = "Persist Security Info";
const ENCRYPT: &str = "Encrypt";
const MARS: &str = "MultipleActiveResultSets";
const CURRENT_LANGUAGE: &str = "Current Language";

/// How the connection authenticates against the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    /// Use the identity of the running process
    Integrated,
    /// Explicit credentials
    Credentials {
        /// User name
        user: String,
        /// Password
        password: String,
    },
}

/// Connection options carried alongside the address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionFlags {
    /// Encrypt traffic to the engine
    pub encrypt: bool,
    /// Keep credentials in the connection string after opening
    pub persist_security_info: bool,
    /// Allow several active result sets per connection
    pub multiple_active_result_sets: bool,
    /// Session language
    pub language: String,
}

impl Default for ConnectionFlags {
    fn default() -> Self {
        Self {
            encrypt: false,
            persist_security_info: false,
            multiple_active_result_sets: true,
            language: "English".to_string(),
        }
    }
}

/// Engine-level view: no catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDescriptor {
    address: String,
    auth: AuthMode,
    flags: ConnectionFlags,
}

impl EngineDescriptor {
    /// Describe an engine at `address` with integrated auth and default flags
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            auth: AuthMode::Integrated,
            flags: ConnectionFlags::default(),
        }
    }

    /// Replace the authentication mode
    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    /// Replace the connection flags
    pub fn with_flags(mut self, flags: ConnectionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Engine address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Authentication mode
    pub fn auth(&self) -> &AuthMode {
        &self.auth
    }

    /// Connection flags
    pub fn flags(&self) -> &ConnectionFlags {
        &self.flags
    }

    /// Qualify this engine with a catalog
    pub fn with_catalog(&self, catalog: impl Into<String>) -> CatalogDescriptor {
        CatalogDescriptor {
            engine: self.clone(),
            catalog: catalog.into(),
        }
    }

    /// Render as a connection string
    pub fn connection_string(&self) -> String {
        render(self, None)
    }

    /// Parse a connection string, ignoring any catalog it names
    pub fn parse(s: &str) -> Result<Self> {
        parse(s).map(|(engine, _)| engine)
    }
}

impl fmt::Display for EngineDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connection_string())
    }
}

/// Catalog-qualified view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDescriptor {
    engine: EngineDescriptor,
    catalog: String,
}

impl CatalogDescriptor {
    /// Engine part of this descriptor
    pub fn engine(&self) -> &EngineDescriptor {
        &self.engine
    }

    /// Catalog name
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    /// Render as a connection string
    pub fn connection_string(&self) -> String {
        render(&self.engine, Some(&self.catalog))
    }

    /// Parse a connection string that must name a catalog
    pub fn parse(s: &str) -> Result<Self> {
        match parse(s)? {
            (engine, Some(catalog)) if !catalog.is_empty() => Ok(Self { engine, catalog }),
            _ => Err(Error::InvalidConnectionString(format!(
                "'{}' is required",
                INITIAL_CATALOG
            ))),
        }
    }
}

impl fmt::Display for CatalogDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connection_string())
    }
}

/// Full description of an isolated host's store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    engine: EngineDescriptor,
    catalog_name: String,
}

impl ConnectionDescriptor {
    /// Combine an engine with a catalog name
    pub fn new(engine: EngineDescriptor, catalog_name: impl Into<String>) -> Self {
        Self {
            engine,
            catalog_name: catalog_name.into(),
        }
    }

    /// Catalog name
    pub fn catalog_name(&self) -> &str {
        &self.catalog_name
    }

    /// View used for existence checks, creation and drops
    pub fn engine_view(&self) -> &EngineDescriptor {
        &self.engine
    }

    /// View used once the catalog exists
    pub fn catalog_view(&self) -> CatalogDescriptor {
        self.engine.with_catalog(self.catalog_name.clone())
    }

    /// Catalog-qualified connection string
    pub fn connection_string(&self) -> String {
        render(&self.engine, Some(&self.catalog_name))
    }
}

fn render(engine: &EngineDescriptor, catalog: Option<&str>) -> String {
    let mut parts = vec![pair(DATA_SOURCE, &engine.address)];
    if let Some(catalog) = catalog {
        parts.push(pair(INITIAL_CATALOG, catalog));
    }
    match &engine.auth {
        AuthMode::Integrated => parts.push(pair(INTEGRATED_SECURITY, "True")),
        AuthMode::Credentials { user, password } => {
            parts.push(pair(USER_ID, user));
            parts.push(pair(PASSWORD, password));
        }
    }
    parts.push(pair(
        PERSIST_SECURITY_INFO,
        bool_str(engine.flags.persist_security_info),
    ));
    parts.push(pair(ENCRYPT, bool_str(engine.flags.encrypt)));
    parts.push(pair(MARS, bool_str(engine.flags.multiple_active_result_sets)));
    parts.push(pair(CURRENT_LANGUAGE, &engine.flags.language));
    parts.join(";")
}

fn pair(key: &str, value: &str) -> String {
    if value.contains(';') || value.contains('"') || value.contains('=') {
        format!("{}=\"{}\"", key, value.replace('"', "\"\""))
    } else {
        format!("{}={}", key, value)
    }
}

fn bool_str(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "sspi" => Ok(true),
        "false" | "no" => Ok(false),
        _ => Err(Error::InvalidConnectionString(format!(
            "'{}' expects a boolean, got '{}'",
            key, value
        ))),
    }
}

/// Split `key=value;key="quoted;value"` into pairs
fn tokenize(s: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = s.chars().peekable();

    loop {
        let mut key = String::new();
        let mut has_value = false;
        for c in chars.by_ref() {
            match c {
                '=' => {
                    has_value = true;
                    break;
                }
                ';' => break,
                _ => key.push(c),
            }
        }
        let key = key.trim().to_string();
        if !has_value {
            if chars.peek().is_none() && key.is_empty() {
                break;
            }
            // Bare keys carry no value; empty segments are skipped
            if !key.is_empty() {
                pairs.push((key, String::new()));
            }
            continue;
        }

        let mut value = String::new();
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        value.push('"');
                    }
                    Some('"') => break,
                    Some(c) => value.push(c),
                    None => {
                        return Err(Error::InvalidConnectionString(format!(
                            "unterminated quote in value of '{}'",
                            key
                        )));
                    }
                }
            }
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
            }
        } else {
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
                value.push(c);
            }
            value = value.trim().to_string();
        }

        if key.is_empty() {
            return Err(Error::InvalidConnectionString(
                "empty key in connection string".to_string(),
            ));
        }
        pairs.push((key, value));
    }

    Ok(pairs)
}

fn parse(s: &str) -> Result<(EngineDescriptor, Option<String>)> {
    let mut address = None;
    let mut catalog = None;
    let mut user = None;
    let mut password = None;
    let mut flags = ConnectionFlags::default();

    for (key, value) in tokenize(s)? {
        if value.is_empty() {
            continue;
        }
        match key.to_ascii_lowercase().as_str() {
            "data source" | "server" | "address" => address = Some(value),
            "initial catalog" | "database" => catalog = Some(value),
            "integrated security" | "trusted_connection" => {
                parse_bool(&key, &value)?;
            }
            "user id" | "uid" => user = Some(value),
            "password" | "pwd" => password = Some(value),
            "persist security info" => flags.persist_security_info = parse_bool(&key, &value)?,
            "encrypt" => flags.encrypt = parse_bool(&key, &value)?,
            "multipleactiveresultsets" => {
                flags.multiple_active_result_sets = parse_bool(&key, &value)?
            }
            "current language" | "language" => flags.language = value,
            other => tracing::debug!("Ignoring unknown connection string key '{}'", other),
        }
    }

    let address = address
        .filter(|a| !a.is_empty())
        .ok_or_else(|| Error::InvalidConnectionString(format!("'{}' is required", DATA_SOURCE)))?;

    let auth = match user {
        Some(user) => AuthMode::Credentials {
            user,
            password: password.unwrap_or_default(),
        },
        None => AuthMode::Integrated,
    };

    Ok((
        EngineDescriptor {
            address,
            auth,
            flags,
        },
        catalog,
    ))
}
