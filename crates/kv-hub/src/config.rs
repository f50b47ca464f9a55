//! Centralized configuration constants for the client hub.

/// Hub-level configuration.
pub struct HubConfig;

impl HubConfig {
    /// Name used by `default_client()` unless overridden.
    pub const DEFAULT_CLIENT_NAME: &'static str = "default";
    /// Key stripped from `init` payloads and applied as the default name.
    pub const DEFAULT_CLIENT_NAME_KEY: &'static str = "defaultClientName";
    /// `tracing` target used when log entries are mirrored to the console.
    pub const LOG_TARGET: &'static str = "kv_hub";
}

/// Defaults for the Redis/Valkey collaborator.
pub struct RedisConfig;

impl RedisConfig {
    pub const SCHEME: &'static str = "redis";
    pub const TLS_SCHEME: &'static str = "rediss";
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 6379;
}
