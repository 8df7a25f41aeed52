use ftp_mirror_core::{Error, MirrorConfig, SecretProvider};

/// Asks for the password on the terminal.
pub struct PromptSecretProvider;

impl SecretProvider for PromptSecretProvider {
    fn password(&self, config: &MirrorConfig) -> Result<String, Error> {
        let prompt = format!("Password for {}@{}: ", config.username, config.host);
        rpassword::prompt_password(prompt)
            .map_err(|e| Error::Credentials(format!("cannot read password: {}", e)))
    }
}
