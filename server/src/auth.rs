use crate::ApiError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use constant_time_eq::constant_time_eq;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha512;
use std::path::PathBuf;
use tracing::error;

/// Request header carrying the plain API key.
pub const API_KEY_HEADER: &str = "access_token";

const HASH_PREFIX: &str = "$pbkdf2-sha512$1$$";

type HmacSha512 = Hmac<Sha512>;

/// Hash an API key the way the key file stores it: PBKDF2-SHA512 with an
/// empty salt and a single round, in passlib's modular crypt format.
///
/// With one round and no salt, PBKDF2 reduces to one HMAC over the block
/// index.
pub fn hash_api_key(api_key: &str) -> Option<String> {
    let mut mac = HmacSha512::new_from_slice(api_key.as_bytes()).ok()?;
    mac.update(&1u32.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    // passlib's "adapted base64" swaps '+' for '.'.
    let encoded = STANDARD_NO_PAD.encode(digest).replace('+', ".");
    Some(format!("{HASH_PREFIX}{encoded}"))
}

/// The file of accepted key hashes, one per line.
///
/// Read on every check so keys can be added or revoked while running.
#[derive(Debug, Clone)]
pub struct ApiKeyFile {
    path: PathBuf,
}

impl ApiKeyFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn load_hashes(&self) -> std::io::Result<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Check the value of the [`API_KEY_HEADER`] header, if one was sent.
    pub async fn verify(&self, presented: Option<&str>) -> Result<(), ApiError> {
        let Some(presented) = presented.filter(|key| !key.is_empty()) else {
            return Err(ApiError::MissingApiKey);
        };
        let hashes = self.load_hashes().await.map_err(|err| {
            error!("failed to read API key file {}: {err}", self.path.display());
            ApiError::Internal("API keys are unavailable".to_string())
        })?;
        let Some(hashed) = hash_api_key(presented) else {
            return Err(ApiError::InvalidApiKey);
        };
        // Compare against every entry so timing does not reveal the match.
        let matched = hashes
            .iter()
            .fold(false, |found, stored| {
                constant_time_eq(hashed.as_bytes(), stored.as_bytes()) | found
            });
        if matched {
            Ok(())
        } else {
            Err(ApiError::InvalidApiKey)
        }
    }
}
