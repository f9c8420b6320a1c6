//! Centralised configuration for the Postern core.
//!
//! Every tunable lives here. Components take a `Config` (or the values they
//! need) explicitly; the process-global instance exists for binaries that want
//! one place to initialise from the environment.

use std::sync::OnceLock;

static GLOBAL_CONFIG: OnceLock<Config> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // ============================================
    // KEY LIFETIMES
    // ============================================
    /// How long a decrypted long-term private key stays cached after login (seconds)
    pub private_key_ttl_secs: i64,

    /// How long a handshake-derived session key stays valid (seconds)
    pub session_key_ttl_secs: i64,

    /// Interval of the optional background sweep of expired cache entries (seconds)
    pub cache_sweep_interval_secs: u64,

    // ============================================
    // PASSWORD KEY DERIVATION (Argon2id)
    // ============================================
    /// Memory cost in KiB
    pub argon2_memory_kib: u32,

    /// Number of passes
    pub argon2_iterations: u32,

    /// Degree of parallelism
    pub argon2_parallelism: u32,

    // ============================================
    // PRIMITIVES
    // ============================================
    /// Allow the classical X25519 stand-in when the post-quantum KEM is
    /// unavailable. When false, startup fails instead.
    pub allow_insecure_fallback: bool,

    /// Prefer message-level (recipient KEM) encryption over transport encryption
    pub message_level_encryption: bool,

    /// Largest accepted outgoing plaintext (bytes)
    pub max_plaintext_bytes: usize,

    // ============================================
    // DELIVERY
    // ============================================
    /// Events buffered for the realtime notifier before new ones are dropped
    pub delivery_queue_capacity: usize,

    /// Upper bound for a single notifier call (milliseconds)
    pub delivery_timeout_ms: u64,

    // ============================================
    // LOGIN THROTTLING
    // ============================================
    /// Login attempts allowed per user within `login_window_secs`
    pub login_max_attempts: usize,

    pub login_window_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            private_key_ttl_secs: 3600,
            session_key_ttl_secs: 3600,
            cache_sweep_interval_secs: 300,

            // OWASP baseline for Argon2id
            argon2_memory_kib: 19 * 1024,
            argon2_iterations: 2,
            argon2_parallelism: 1,

            allow_insecure_fallback: true,
            message_level_encryption: true,
            max_plaintext_bytes: 64 * 1024,

            delivery_queue_capacity: 1024,
            delivery_timeout_ms: 2000,

            login_max_attempts: 5,
            login_window_secs: 60,
        }
    }
}

impl Config {
    /// Defaults overridden by `POSTERN_*` environment variables, when set and parseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        override_from_env("POSTERN_PRIVATE_KEY_TTL_SECS", &mut config.private_key_ttl_secs);
        override_from_env("POSTERN_SESSION_KEY_TTL_SECS", &mut config.session_key_ttl_secs);
        override_from_env("POSTERN_CACHE_SWEEP_INTERVAL_SECS", &mut config.cache_sweep_interval_secs);
        override_from_env("POSTERN_ARGON2_MEMORY_KIB", &mut config.argon2_memory_kib);
        override_from_env("POSTERN_ARGON2_ITERATIONS", &mut config.argon2_iterations);
        override_from_env("POSTERN_ARGON2_PARALLELISM", &mut config.argon2_parallelism);
        override_from_env("POSTERN_ALLOW_INSECURE_FALLBACK", &mut config.allow_insecure_fallback);
        override_from_env("POSTERN_MESSAGE_LEVEL_ENCRYPTION", &mut config.message_level_encryption);
        override_from_env("POSTERN_MAX_PLAINTEXT_BYTES", &mut config.max_plaintext_bytes);
        override_from_env("POSTERN_DELIVERY_QUEUE_CAPACITY", &mut config.delivery_queue_capacity);
        override_from_env("POSTERN_DELIVERY_TIMEOUT_MS", &mut config.delivery_timeout_ms);
        override_from_env("POSTERN_LOGIN_MAX_ATTEMPTS", &mut config.login_max_attempts);
        override_from_env("POSTERN_LOGIN_WINDOW_SECS", &mut config.login_window_secs);

        config
    }

    pub fn private_key_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.private_key_ttl_secs)
    }

    pub fn session_key_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_key_ttl_secs)
    }

    pub fn login_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.login_window_secs)
    }

    pub fn delivery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Global instance, initialised with defaults on first use.
    pub fn global() -> &'static Config {
        GLOBAL_CONFIG.get_or_init(Config::default)
    }

    /// # Errors
    ///
    /// Fails if the global config was already initialised.
    pub fn init() -> Result<(), &'static str> {
        Self::init_with(Self::default())
    }

    /// # Errors
    ///
    /// Fails if the global config was already initialised.
    pub fn init_from_env() -> Result<(), &'static str> {
        Self::init_with(Self::from_env())
    }

    /// # Errors
    ///
    /// Fails if the global config was already initialised.
    pub fn init_with(config: Config) -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(config)
            .map_err(|_| "Config already initialized")
    }
}

fn override_from_env<T: std::str::FromStr>(name: &str, slot: &mut T) {
    if let Ok(val) = std::env::var(name) {
        if let Ok(parsed) = val.parse() {
            *slot = parsed;
        }
    }
}
