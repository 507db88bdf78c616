//! Process-level configuration
//!
//! An explicit, immutable value constructed once at startup and injected
//! where needed; there is no module-level singleton. The service refuses
//! to start without a well-formed master key.

use crate::credentials::S3Credentials;
use crate::error::{Error, Result};
use crate::vault::MasterKey;

/// Environment variable holding the 64-hex-character master key
pub const MASTER_KEY_ENV: &str = "STOWAGE_MASTER_KEY";

/// Startup configuration for the storage core
#[derive(Debug)]
pub struct Settings {
    /// Key the credential vault encrypts under
    pub master_key: MasterKey,

    /// Credentials of the system-default S3 backend, for deployments that
    /// provision one out of the box
    pub default_s3: Option<S3Credentials>,
}

impl Settings {
    pub fn new(master_key: MasterKey) -> Self {
        Self {
            master_key,
            default_s3: None,
        }
    }

    /// Load from the environment.
    ///
    /// `STOWAGE_MASTER_KEY` is mandatory; the default backend is only
    /// picked up when all four of its variables are present.
    pub fn from_env() -> Result<Self> {
        let raw = std::env::var(MASTER_KEY_ENV)
            .map_err(|_| Error::Configuration(format!("{MASTER_KEY_ENV} is not set")))?;
        let master_key = MasterKey::from_hex(&raw)?;

        let default_s3 = match (
            std::env::var("STOWAGE_S3_ACCESS_KEY"),
            std::env::var("STOWAGE_S3_SECRET_KEY"),
            std::env::var("STOWAGE_S3_REGION"),
            std::env::var("STOWAGE_S3_BUCKET"),
        ) {
            (Ok(access_key), Ok(secret_key), Ok(region), Ok(bucket)) => Some(S3Credentials {
                access_key,
                secret_key,
                region,
                bucket,
                endpoint: std::env::var("STOWAGE_S3_ENDPOINT").ok(),
                force_path_style: false,
            }),
            _ => None,
        };

        Ok(Self {
            master_key,
            default_s3,
        })
    }
}
