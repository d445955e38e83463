use std::collections::HashMap;

use config::{Config as ConfigLib, ConfigError, Environment as EnvSource, File};
use secrecy::SecretString;
use serde::Deserialize;

/// Target environment of the national NFS-e API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Live environment (`tpAmb` 1).
    Producao,
    /// Restricted-production / homologation environment (`tpAmb` 2).
    Homologacao,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Producao => "https://www.nfse.gov.br",
            Environment::Homologacao => "https://www.producaorestrita.nfse.gov.br",
        }
    }

    /// Value carried in the `tpAmb` element of outgoing documents.
    pub fn flag(&self) -> u8 {
        match self {
            Environment::Producao => 1,
            Environment::Homologacao => 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub certificate: Option<CertificateConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub environment: Environment,
    pub timeout_secs: u64,
}

/// Location of the PKCS#12 container and its password.
///
/// The password never appears in `Debug` output or log lines.
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateConfig {
    pub path: String,
    pub password: SecretString,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("api.environment", "homologacao")?
            .set_default("api.timeout_secs", 30)?
            .add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format NFSE_API__ENVIRONMENT or
            // NFSE_CERTIFICATE__PATH
            builder = builder.add_source(
                EnvSource::with_prefix("NFSE")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}
