use crate::auth::AdminCredentials;
use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines `.env`, environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub admin: AdminCredentials,
    pub in_memory: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Personal file drive with public and private files")]
pub struct Args {
    /// Host to bind to (overrides PERSONAL_DRIVE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PERSONAL_DRIVE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where file payloads are stored (overrides PERSONAL_DRIVE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PERSONAL_DRIVE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Keep files in memory only; nothing survives a restart
    #[arg(long)]
    pub in_memory: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse `.env`, environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // A missing .env is the normal case outside development.
        let _ = dotenvy::dotenv();

        let args = Args::parse();
        let cfg = Self::merge(&args, |name| env::var(name).ok())?;
        Ok((cfg, args.migrate))
    }

    /// Layer CLI flags over the variables `env` resolves, then over defaults.
    fn merge(args: &Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env("PERSONAL_DRIVE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match env("PERSONAL_DRIVE_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PERSONAL_DRIVE_PORT value `{}`", value))?,
            None => 3000,
        };
        let env_storage =
            env("PERSONAL_DRIVE_STORAGE_DIR").unwrap_or_else(|| "./data/drive".into());
        let env_db = env("PERSONAL_DRIVE_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/drive.db".into());

        let admin = AdminCredentials::new(
            env("ADMIN_USERNAME").unwrap_or_else(|| "demo".into()),
            env("ADMIN_PASSWORD").unwrap_or_else(|| "demo".into()),
        );

        // --- Merge ---
        Ok(Self {
            host: args.host.clone().unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.clone().unwrap_or(env_storage),
            database_url: args.database_url.clone().unwrap_or(env_db),
            admin,
            in_memory: args.in_memory,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn cli_flags_override_environment() {
        let args = Args::parse_from([
            "personal-drive",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--storage-dir",
            "/tmp/drive",
            "--in-memory",
        ]);
        let env = lookup(&[
            ("PERSONAL_DRIVE_HOST", "10.0.0.1"),
            ("PERSONAL_DRIVE_PORT", "9000"),
            ("PERSONAL_DRIVE_DATABASE_URL", "sqlite://other.db"),
        ]);
        let cfg = AppConfig::merge(&args, env).unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert_eq!(cfg.storage_dir, "/tmp/drive");
        assert_eq!(cfg.database_url, "sqlite://other.db");
        assert!(cfg.in_memory);
        assert!(!args.migrate);
    }

    #[test]
    fn defaults_to_demo_credentials() {
        let args = Args::parse_from(["personal-drive"]);
        let cfg = AppConfig::merge(&args, lookup(&[])).unwrap();
        assert!(cfg.admin.is_demo());
        assert_eq!(cfg.admin.username, "demo");
        assert_eq!(cfg.admin.password, "demo");
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.storage_dir, "./data/drive");
        assert_eq!(cfg.database_url, "sqlite://./data/meta/drive.db");
    }

    #[test]
    fn admin_credentials_come_from_environment() {
        let args = Args::parse_from(["personal-drive"]);
        let env = lookup(&[("ADMIN_USERNAME", "alice"), ("ADMIN_PASSWORD", "s3cret")]);
        let cfg = AppConfig::merge(&args, env).unwrap();
        assert!(!cfg.admin.is_demo());
        assert!(cfg.admin.verify("alice", "s3cret"));
    }

    #[test]
    fn unparsable_port_is_an_error() {
        let args = Args::parse_from(["personal-drive"]);
        let err = AppConfig::merge(&args, lookup(&[("PERSONAL_DRIVE_PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("PERSONAL_DRIVE_PORT"));
    }
}
