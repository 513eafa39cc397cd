use crate::SecurityError;

pub const PASSWORD_ENV: &str = "MAILPING_PASSWORD";

#[derive(Debug, Clone)]
pub struct SecretStore {
    service_name: String,
}

#[derive(Debug, Clone)]
pub struct SecretKey {
    pub namespace: String,
    pub id: String,
}

impl SecretKey {
    pub fn imap(address: &str) -> Self {
        Self {
            namespace: "imap".to_string(),
            id: address.to_string(),
        }
    }

    pub fn as_username(&self) -> String {
        format!("{}:{}", self.namespace, self.id)
    }
}

impl SecretStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn get(&self, key: &SecretKey) -> Result<Option<String>, SecurityError> {
        let entry = keyring::Entry::new(&self.service_name, &key.as_username())?;
        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Environment override first, then the keychain.
    pub fn imap_password(&self, address: &str) -> Result<String, SecurityError> {
        let from_env = std::env::var(PASSWORD_ENV).ok();
        resolve_password(from_env, || self.get(&SecretKey::imap(address)), address)
    }
}

fn resolve_password<F>(
    from_env: Option<String>,
    keychain: F,
    address: &str,
) -> Result<String, SecurityError>
where
    F: FnOnce() -> Result<Option<String>, SecurityError>,
{
    if let Some(secret) = from_env.filter(|value| !value.is_empty()) {
        tracing::debug!(account = %address, "using IMAP password from environment");
        return Ok(secret);
    }

    keychain()?.ok_or_else(|| SecurityError::MissingSecret(address.to_string()))
}
