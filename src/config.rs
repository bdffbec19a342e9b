use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    /// Prefix for relative image paths, e.g. a CDN bucket URL.
    pub storage_base_url: Option<String>,
    /// Empty means any origin is allowed.
    pub cors_origins: Vec<String>,
    pub low_stock_threshold: i32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_ttl_hours = env::var("JWT_TTL_HOURS")
            .ok()
            .and_then(|h| h.parse::<i64>().ok())
            .filter(|h| *h > 0)
            .unwrap_or(24);
        let storage_base_url = env::var("STORAGE_BASE_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        let cors_origins = env::var("CORS_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or_default();
        let low_stock_threshold = env::var("LOW_STOCK_THRESHOLD")
            .ok()
            .and_then(|t| t.parse::<i32>().ok())
            .unwrap_or(5);
        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            jwt_ttl_hours,
            storage_base_url,
            cors_origins,
            low_stock_threshold,
        })
    }

    /// Config for tests and tools that never read the environment.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: "test-secret-key-that-is-long-enough".to_string(),
            jwt_ttl_hours: 1,
            storage_base_url: None,
            cors_origins: Vec::new(),
            low_stock_threshold: 5,
        }
    }

    /// Absolute URL for an image path; absolute URLs pass through untouched.
    pub fn asset_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        match &self.storage_base_url {
            Some(base) => format!("{}/{}", base, path.trim_start_matches('/')),
            None => path.to_string(),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed_and_empty_entries_dropped() {
        assert_eq!(
            parse_origins(" https://dfixkart.in, ,http://localhost:5173 "),
            vec!["https://dfixkart.in", "http://localhost:5173"]
        );
    }

    #[test]
    fn asset_url_prefixes_relative_paths() {
        let mut config = AppConfig::for_tests("postgres://localhost/test");
        assert_eq!(config.asset_url("/img/a.png"), "/img/a.png");

        config.storage_base_url = Some("https://cdn.dfixkart.in".into());
        assert_eq!(config.asset_url("/img/a.png"), "https://cdn.dfixkart.in/img/a.png");
        assert_eq!(
            config.asset_url("https://other.example/b.png"),
            "https://other.example/b.png"
        );
    }
}
