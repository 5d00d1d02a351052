//! Environment-driven configuration.

/// Runtime configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub app_port: u16,
    pub app_env: String,

    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,

    pub db_host: String,
    pub db_port: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_sslmode: String,

    pub s3_endpoint: String,
    pub s3_bucket: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub s3_region: String,
    pub s3_force_path_style: bool,

    pub block_size_mb: usize,
}

impl Config {
    /// Read configuration from the environment. Panics on missing required
    /// variables so the process fails fast at startup.
    pub fn from_env() -> Self {
        let mut block_size_mb = get_env_int("BLOCK_SIZE_MB", 8) as usize;
        if !(1..=64).contains(&block_size_mb) {
            tracing::warn!(
                block_size_mb,
                "BLOCK_SIZE_MB outside valid range 1-64, using default 8"
            );
            block_size_mb = 8;
        }

        Self {
            app_port: get_env_int("APP_PORT", 8080) as u16,
            app_env: get_env("APP_ENV", "development"),

            jwt_secret: must_get_env("JWT_SECRET"),
            jwt_expiry_hours: get_env_int("JWT_EXPIRY_HOURS", 24),

            db_host: get_env("DB_HOST", "localhost"),
            db_port: get_env("DB_PORT", "5432"),
            db_name: get_env("DB_NAME", "blockbox"),
            db_user: get_env("DB_USER", "postgres"),
            db_password: get_env("DB_PASSWORD", "postgres"),
            db_sslmode: get_env("DB_SSLMODE", "disable"),

            s3_endpoint: must_get_env("S3_ENDPOINT"),
            s3_bucket: must_get_env("S3_BUCKET"),
            s3_access_key: must_get_env("S3_ACCESS_KEY"),
            s3_secret_key: must_get_env("S3_SECRET_KEY"),
            s3_region: get_env("S3_REGION", "us-east-1"),
            s3_force_path_style: get_env_bool("S3_FORCE_PATH_STYLE", true),

            block_size_mb,
        }
    }

    /// Connection URL for the metadata store. `DATABASE_URL` overrides the
    /// individual `DB_*` parts when set.
    pub fn database_url(&self) -> String {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                return url;
            }
        }
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name,
            self.db_sslmode,
        )
    }

    pub fn block_size_bytes(&self) -> usize {
        self.block_size_mb * 1024 * 1024
    }
}

fn get_env(key: &str, fallback: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => fallback.to_string(),
    }
}

fn must_get_env(key: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => panic!("required environment variable {key} is not set"),
    }
}

fn get_env_int(key: &str, fallback: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

fn get_env_bool(key: &str, fallback: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_helpers() {
        std::env::set_var("BLOCKBOX_TEST_INT", "42");
        assert_eq!(get_env_int("BLOCKBOX_TEST_INT", 7), 42);
        assert_eq!(get_env_int("BLOCKBOX_TEST_INT_MISSING", 7), 7);

        std::env::set_var("BLOCKBOX_TEST_BOOL", "true");
        assert!(get_env_bool("BLOCKBOX_TEST_BOOL", false));
        assert!(!get_env_bool("BLOCKBOX_TEST_BOOL_MISSING", false));

        std::env::set_var("BLOCKBOX_TEST_STR", "");
        assert_eq!(get_env("BLOCKBOX_TEST_STR", "fallback"), "fallback");
    }
}
