//! Voice service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP/WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default root directory for persisted inbound audio.
pub const DEFAULT_AUDIO_DIR: &str = "/tmp/user_audio";

/// Default lower bound of the notification delay, in milliseconds.
pub const DEFAULT_NOTIFY_DELAY_MIN_MS: u64 = 2_000;

/// Default upper bound of the notification delay, in milliseconds.
pub const DEFAULT_NOTIFY_DELAY_MAX_MS: u64 = 8_000;

/// Default probability that a notification is a product flag.
pub const DEFAULT_NOTIFY_PRODUCT_PROBABILITY: f64 = 0.7;

/// Default time allowed for the first inbound frame, in seconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECONDS: u64 = 30;

/// Default grace period for the sibling pump after one pump exits, in milliseconds.
pub const DEFAULT_CANCEL_GRACE_MS: u64 = 250;

/// Default embedding vector length (DINOv2 base).
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// Default object storage bucket for product images.
pub const DEFAULT_PRODUCT_IMAGE_BUCKET: &str = "product-images";

/// Default catalog table.
pub const DEFAULT_PRODUCT_TABLE: &str = "products";

/// Voice service configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// HTTP/WebSocket bind address (default: "0.0.0.0:8000").
    pub bind_address: String,

    /// Root directory for inbound audio chunks (`USER_AUDIO_DIR`).
    pub audio_dir: PathBuf,

    /// Lower bound of the jittered notification delay.
    pub notify_delay_min: Duration,

    /// Upper bound of the jittered notification delay.
    pub notify_delay_max: Duration,

    /// Probability in `[0, 1]` that a notification is a product flag.
    pub notify_product_probability: f64,

    /// Seed for the notification policy. Unset means entropy-seeded.
    pub notify_seed: Option<u64>,

    /// Echo each received audio chunk back to the client.
    pub echo_audio: bool,

    /// Time allowed for the client's first frame.
    pub handshake_timeout: Duration,

    /// How long to wait for the second pump after the first one exits.
    pub cancel_grace: Duration,

    /// Supabase project URL (storage + REST).
    pub supabase_url: String,

    /// Supabase service-role key.
    /// Protected by `SecretString` to prevent accidental logging.
    pub supabase_key: SecretString,

    /// Image embedding service endpoint.
    pub embedding_service_url: String,

    /// Expected embedding vector length.
    pub embedding_dimension: usize,

    /// Bucket for uploaded product images.
    pub product_image_bucket: String,

    /// Table receiving catalog records.
    pub product_table: String,

    /// Emit JSON-formatted logs.
    pub log_json: bool,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("audio_dir", &self.audio_dir)
            .field("notify_delay_min", &self.notify_delay_min)
            .field("notify_delay_max", &self.notify_delay_max)
            .field(
                "notify_product_probability",
                &self.notify_product_probability,
            )
            .field("notify_seed", &self.notify_seed)
            .field("echo_audio", &self.echo_audio)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("cancel_grace", &self.cancel_grace)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_key", &"[REDACTED]")
            .field("embedding_service_url", &self.embedding_service_url)
            .field("embedding_dimension", &self.embedding_dimension)
            .field("product_image_bucket", &self.product_image_bucket)
            .field("product_table", &self.product_table)
            .field("log_json", &self.log_json)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let supabase_url = required(vars, "SUPABASE_URL")?;
        let supabase_key = SecretString::from(required(vars, "SUPABASE_SERVICE_ROLE_KEY")?);
        let embedding_service_url = required(vars, "EMBEDDING_SERVICE_URL")?;

        let bind_address = vars
            .get("VOICE_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let audio_dir = PathBuf::from(
            vars.get("USER_AUDIO_DIR")
                .cloned()
                .unwrap_or_else(|| DEFAULT_AUDIO_DIR.to_string()),
        );

        let notify_delay_min = Duration::from_millis(parse_or(
            vars,
            "VOICE_NOTIFY_DELAY_MIN_MS",
            DEFAULT_NOTIFY_DELAY_MIN_MS,
        )?);
        let notify_delay_max = Duration::from_millis(parse_or(
            vars,
            "VOICE_NOTIFY_DELAY_MAX_MS",
            DEFAULT_NOTIFY_DELAY_MAX_MS,
        )?);
        if notify_delay_min > notify_delay_max {
            return Err(ConfigError::InvalidValue(format!(
                "VOICE_NOTIFY_DELAY_MIN_MS ({}) exceeds VOICE_NOTIFY_DELAY_MAX_MS ({})",
                notify_delay_min.as_millis(),
                notify_delay_max.as_millis()
            )));
        }

        let notify_product_probability = parse_or(
            vars,
            "VOICE_NOTIFY_PRODUCT_PROBABILITY",
            DEFAULT_NOTIFY_PRODUCT_PROBABILITY,
        )?;
        if !(0.0..=1.0).contains(&notify_product_probability) {
            return Err(ConfigError::InvalidValue(format!(
                "VOICE_NOTIFY_PRODUCT_PROBABILITY must be within [0, 1], got {notify_product_probability}"
            )));
        }

        let notify_seed = match vars.get("VOICE_NOTIFY_SEED") {
            Some(raw) => Some(raw.parse().map_err(|_| {
                ConfigError::InvalidValue(format!("VOICE_NOTIFY_SEED is not a u64: {raw}"))
            })?),
            None => None,
        };

        let echo_audio = parse_or(vars, "VOICE_ECHO_AUDIO", true)?;

        let handshake_timeout = Duration::from_secs(parse_or(
            vars,
            "VOICE_HANDSHAKE_TIMEOUT_SECONDS",
            DEFAULT_HANDSHAKE_TIMEOUT_SECONDS,
        )?);

        let cancel_grace = Duration::from_millis(parse_or(
            vars,
            "VOICE_CANCEL_GRACE_MS",
            DEFAULT_CANCEL_GRACE_MS,
        )?);

        let embedding_dimension =
            parse_or(vars, "EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue(
                "EMBEDDING_DIMENSION must be positive".to_string(),
            ));
        }

        let product_image_bucket = vars
            .get("PRODUCT_IMAGE_BUCKET")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PRODUCT_IMAGE_BUCKET.to_string());

        let product_table = vars
            .get("PRODUCT_TABLE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PRODUCT_TABLE.to_string());

        let log_json = parse_or(vars, "VOICE_LOG_JSON", false)?;

        Ok(Config {
            bind_address,
            audio_dir,
            notify_delay_min,
            notify_delay_max,
            notify_product_probability,
            notify_seed,
            echo_audio,
            handshake_timeout,
            cancel_grace,
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_key,
            embedding_service_url,
            embedding_dimension,
            product_image_bucket,
            product_table,
            log_json,
        })
    }
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    vars.get(key)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parse an optional variable, falling back to `default` when unset.
/// A present but unparsable value is an error rather than a silent default.
fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}
