use std::env;
use tracing::warn;

use crate::config::MirrorConfig;
use crate::error::Error;

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Supplies the password for a configured login.
///
/// The engine never reads passwords from the configuration directly, so the
/// CLI can swap in an interactive prompt and tests can inject fixed values.
pub trait SecretProvider: Send + Sync {
    fn password(&self, config: &MirrorConfig) -> Result<String, Error>;

    fn credentials(&self, config: &MirrorConfig) -> Result<Credentials, Error> {
        Ok(Credentials {
            username: config.username.clone(),
            password: self.password(config)?,
        })
    }
}

/// Reads `password_env` first, then the literal `password`, else an empty
/// password for anonymous logins.
pub struct ConfigSecretProvider;

impl SecretProvider for ConfigSecretProvider {
    fn password(&self, config: &MirrorConfig) -> Result<String, Error> {
        if let Some(var) = &config.password_env {
            return env::var(var).map_err(|e| {
                Error::Credentials(format!("cannot read password from ${}: {}", var, e))
            });
        }

        if let Some(password) = &config.password {
            warn!("Using a literal password from the configuration; prefer password_env");
            return Ok(password.clone());
        }

        Ok(String::new())
    }
}

/// Fixed password, mostly for tests and embedding.
pub struct StaticSecretProvider(pub String);

impl SecretProvider for StaticSecretProvider {
    fn password(&self, _config: &MirrorConfig) -> Result<String, Error> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_wins_over_literal() {
        let mut config = MirrorConfig::new("ftp.test");
        config.password = Some("literal".to_string());
        config.password_env = Some("FTP_MIRROR_TEST_SECRET_A".to_string());
        env::set_var("FTP_MIRROR_TEST_SECRET_A", "from-env");

        let password = ConfigSecretProvider.password(&config).unwrap();
        assert_eq!(password, "from-env");
    }

    #[test]
    fn test_missing_env_var_is_an_error() {
        let mut config = MirrorConfig::new("ftp.test");
        config.password_env = Some("FTP_MIRROR_TEST_SECRET_UNSET".to_string());
        env::remove_var("FTP_MIRROR_TEST_SECRET_UNSET");

        let err = ConfigSecretProvider.password(&config).unwrap_err();
        assert!(matches!(err, Error::Credentials(_)));
    }

    #[test]
    fn test_anonymous_gets_empty_password() {
        let config = MirrorConfig::new("ftp.test");
        let creds = ConfigSecretProvider.credentials(&config).unwrap();
        assert_eq!(creds.username, "anonymous");
        assert!(creds.password.is_empty());
        assert!(!format!("{:?}", creds).contains("secret"));
    }
}
