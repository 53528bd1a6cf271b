//! Server Configuration
//!
//! Read once at startup. Stripe and S3 are optional groups: leaving a group
//! out disables its endpoints, setting only part of it is an error.

use beats_media::S3Config;
use beats_payments::StripeConfig;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_DATABASE_URL: &str = "sqlite://beats.db?mode=rwc";
const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_AUTH_HEADER: &str = "x-user-id";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error("{group} is partially configured; missing {missing}")]
    Partial { group: &'static str, missing: String },
}

/// Everything the server needs, resolved from the environment
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,

    /// Public origin used to build checkout redirect URLs
    pub base_url: String,

    /// Header carrying the authenticated buyer id
    pub auth_header: String,

    pub stripe: Option<StripeConfig>,
    pub s3: Option<S3Config>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let stripe = match group(&get, "Stripe", &["STRIPE_SECRET_KEY", "STRIPE_WEBHOOK_SECRET"])? {
            Some(values) => {
                let mut config = StripeConfig::new(values[0].clone(), values[1].clone());
                if let Some(secs) = parse_var(&get, "STRIPE_TIMEOUT_SECS")? {
                    config.timeout = Duration::from_secs(secs);
                }
                if let Some(retries) = parse_var(&get, "STRIPE_MAX_RETRIES")? {
                    config.max_retries = retries;
                }
                if let Some(secs) = parse_var(&get, "STRIPE_WEBHOOK_TOLERANCE_SECS")? {
                    config.webhook_tolerance = Duration::from_secs(secs);
                }
                Some(config)
            }
            None => None,
        };

        let s3 = match group(
            &get,
            "S3",
            &["AWS_REGION", "AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "AWS_BUCKET_NAME"],
        )? {
            Some(values) => {
                let mut config =
                    S3Config::new(values[0].clone(), values[1].clone(), values[2].clone(), values[3].clone())
                        .with_endpoint(get("S3_ENDPOINT"));
                if let Some(secs) = parse_var(&get, "UPLOAD_URL_TTL_SECS")? {
                    config.upload_ttl = Duration::from_secs(secs);
                }
                if let Some(secs) = parse_var(&get, "DOWNLOAD_URL_TTL_SECS")? {
                    config.download_ttl = Duration::from_secs(secs);
                }
                Some(config)
            }
            None => None,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            base_url: get("BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            auth_header: get("AUTH_HEADER")
                .unwrap_or_else(|| DEFAULT_AUTH_HEADER.into())
                .to_ascii_lowercase(),
            stripe,
            s3,
        })
    }

    /// `DATABASE_URL` without credentials or query string, for logs
    pub fn database_location(&self) -> String {
        let url = self.database_url.as_str();
        let url = url.split(['?', '#']).next().unwrap_or(url);
        let Some((scheme, rest)) = url.split_once("://") else {
            return url.to_string();
        };
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        if path.is_empty() {
            format!("{scheme}://{host}")
        } else {
            format!("{scheme}://{host}/{path}")
        }
    }
}

/// All of `keys` or none of them
fn group(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    keys: &[&str],
) -> Result<Option<Vec<String>>, ConfigError> {
    let values: Vec<Option<String>> = keys.iter().map(|k| get(*k)).collect();
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }

    let missing: Vec<&str> = keys
        .iter()
        .zip(&values)
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| *k)
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::Partial {
            group: name,
            missing: missing.join(", "),
        });
    }

    Ok(Some(values.into_iter().flatten().collect()))
}

fn parse_var<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(var)
        .map(|raw| raw.parse().map_err(|_| ConfigError::Invalid { var, value: raw }))
        .transpose()
}
