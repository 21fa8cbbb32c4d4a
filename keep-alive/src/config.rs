use anyhow::Context;
use serde::Deserialize;
use std::fs;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_TABLE: &str = "keep_alive";

const CONFIG_PATH_VAR: &str = "KEEP_ALIVE_CONFIG";
const DATABASE_URL_VAR: &str = "SUPABASE_URL";
const SERVICE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";
const PORT_VAR: &str = "PORT";

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    pub listen: Option<String>,
    // Base URL of the hosted database, e.g. https://<project>.supabase.co
    pub database_url: Option<String>,
    // Privileged service-role key used for both `apikey` and bearer auth.
    pub service_key: Option<String>,
    // Sentinel table name. Defaults to `keep_alive`.
    pub table: Option<String>,
    // Total timeout for each database request in seconds.
    // If not set, no client-side timeout is applied and the platform bounds the invocation.
    pub timeout_secs: Option<u64>,
    // Connection timeout in seconds for reaching the database.
    pub connect_timeout_secs: Option<u64>,
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let cfg_str =
            fs::read_to_string(path).with_context(|| format!("reading config file '{}'", path))?;
        toml::from_str(&cfg_str).with_context(|| format!("parsing config file '{}'", path))
    }

    /// Loads the file named by `KEEP_ALIVE_CONFIG` (if any) and applies the
    /// process environment on top of it.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Config::from_file(&path)?,
            Err(_) => Config::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Overrides file values with environment values obtained through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DATABASE_URL_VAR) {
            self.database_url = Some(url);
        }
        if let Some(key) = lookup(SERVICE_KEY_VAR) {
            self.service_key = Some(key);
        }
        if let Some(port) = lookup(PORT_VAR) {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("invalid {} value '{}'", PORT_VAR, port))?;
            let listen = self.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
            let host = listen.rsplit_once(':').map(|(h, _)| h).unwrap_or(listen);
            self.listen = Some(format!("{}:{}", host, port));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> &str {
        self.listen.as_deref().unwrap_or(DEFAULT_LISTEN)
    }

    pub fn table_name(&self) -> &str {
        match self.table.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => DEFAULT_TABLE,
        }
    }

    /// Both secrets, or `None` if either is missing or empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let url = self.database_url.as_deref().filter(|s| !s.is_empty())?;
        let key = self.service_key.as_deref().filter(|s| !s.is_empty())?;
        Some((url, key))
    }
}
