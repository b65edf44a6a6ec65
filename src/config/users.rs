use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- UsersConfig -----------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct UsersConfig {
    by_key: HashMap<UserKey, UserRecord>,
}

// -----------------------------------------------------------------------------
// ----- UsersConfig: Static ---------------------------------------------------

impl UsersConfig {
    pub fn parse(raw: &str) -> Result<UsersConfig, UsersError> {
        let mut doc: UsersFile = toml::from_str(raw).map_err(|e| UsersError::Toml { source: e })?;

        if doc.users.is_empty() {
            return Err(UsersError::EmptyConfig);
        }

        let mut by_key = HashMap::with_capacity(doc.users.len());
        for user in doc.users.drain(..) {
            validate(&user)?;

            let record = UserRecord {
                client_username: user.username.clone(),
                client_password: SecretString::new(user.password.into_boxed_str()),
                pooler_mode: user.pooler_mode.unwrap_or(PoolerMode::Session),
            };

            let key = UserKey::new(&record.client_username);
            if by_key.insert(key, record).is_some() {
                return Err(UsersError::DuplicateUser {
                    username: user.username,
                });
            }
        }

        Ok(UsersConfig { by_key })
    }
}

// -----------------------------------------------------------------------------
// ----- UsersConfig: Public ---------------------------------------------------

impl UsersConfig {
    pub fn authenticate(
        &self,
        client_username: &str,
        client_password: &str,
    ) -> Result<&UserRecord, UsersError> {
        let key = UserKey::new(client_username);

        let user = self
            .by_key
            .get(&key)
            .ok_or_else(|| UsersError::UnknownUser {
                username: client_username.to_string(),
            })?;

        if user.client_password.expose_secret() != client_password {
            return Err(UsersError::BadPassword);
        }

        Ok(user)
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: map/key -----------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct UserKey {
    client_username: String,
}

impl UserKey {
    fn new(client_username: &str) -> Self {
        Self {
            client_username: client_username.to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PoolerMode ------------------------------------------------------------

/// How long a session keeps its backend connection.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PoolerMode {
    /// Returned to the pool whenever the backend reports an idle ReadyForQuery.
    Transaction,
    /// Held until disconnect or until routing moves the session elsewhere.
    Session,
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UsersFileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct UsersFileEntry {
    #[serde(alias = "name")]
    username: String,

    password: String,

    #[serde(default)]
    pooler_mode: Option<PoolerMode>,
}

// -----------------------------------------------------------------------------
// ----- UserRecord ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub client_username: String,
    pub client_password: SecretString,
    pub pooler_mode: PoolerMode,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn validate(u: &UsersFileEntry) -> Result<(), UsersError> {
    if u.username.trim().is_empty() {
        return Err(UsersError::InvalidField("username".into()));
    }
    if u.password.is_empty() {
        return Err(UsersError::InvalidField("password".into()));
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum UsersError {
    #[error("users config is empty")]
    EmptyConfig,

    #[error("duplicate [[users]] entry for user '{username}'")]
    DuplicateUser { username: String },

    #[error("unknown user '{username}'")]
    UnknownUser { username: String },

    #[error("invalid or missing field '{0}'")]
    InvalidField(String),

    #[error("bad password")]
    BadPassword,

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
