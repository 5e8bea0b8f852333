//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use these types
//! for credentials such as the object storage service-role key.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` while holding a secret gets safe logging for free.
//! The inner value is zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct StorageCredentials {
//!     project_url: String,
//!     service_key: SecretString,
//! }
//!
//! let creds = StorageCredentials {
//!     project_url: "https://project.supabase.co".to_string(),
//!     service_key: SecretString::from("service-role-key"),
//! };
//!
//! // Debug output shows the URL but redacts the key
//! println!("{:?}", creds);
//!
//! let key: &str = creds.service_key.expose_secret();
//! assert_eq!(key, "service-role-key");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
