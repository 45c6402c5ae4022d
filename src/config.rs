use crate::services::placement::{Shard, ShardSet};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::{collections::BTreeMap, env, fs, path::PathBuf, time::Duration};

/// Cluster topology shared by every role, read from the JSON config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub chunk_size: usize,
    pub api_port: u16,
    pub meta_port: u16,
    pub stat_port: u16,

    /// Shard name -> port.
    #[serde(alias = "storage_port")]
    pub shards: BTreeMap<String, u16>,

    #[serde(default = "default_meta_host")]
    pub meta_host: String,

    /// Host every shard is reached at. Defaults to the shard's own name.
    #[serde(default)]
    pub shard_host: Option<String>,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_meta_host() -> String {
    "localhost".into()
}

fn default_database_url() -> String {
    "sqlite://./data/meta/shardstore.db".into()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Centralized application configuration.
/// Combines the cluster file, environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub cluster: ClusterConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Sharded chunk object store")]
pub struct Args {
    /// Path to the cluster config file (overrides SHARDSTORE_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Host to bind to (overrides SHARDSTORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    #[command(subcommand)]
    pub role: Role,
}

/// Which server this process runs.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Client-facing bucket/file API
    Gateway,
    /// Metadata authority
    Meta {
        /// Run migrations and exit
        #[arg(long)]
        migrate: bool,
    },
    /// Blob storage shard
    Shard {
        /// Shard name as listed in the config's shard table
        name: String,
    },
    /// Per-shard statistics proxy
    Stats,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the role.
    pub fn from_env_and_args() -> Result<(Self, Role)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let config_path = match args.config {
            Some(path) => path,
            None => env::var("SHARDSTORE_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.json")),
        };
        let env_host = env::var("SHARDSTORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let raw = fs::read_to_string(&config_path)
            .with_context(|| format!("reading config file `{}`", config_path.display()))?;
        let mut cluster = ClusterConfig::parse(&raw)
            .with_context(|| format!("parsing config file `{}`", config_path.display()))?;
        if let Ok(url) = env::var("SHARDSTORE_DATABASE_URL") {
            cluster.database_url = url;
        }

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            cluster,
        };
        if let Role::Shard { name } = &args.role {
            cfg.shard_port(name)?;
        }

        Ok((cfg, args.role))
    }

    pub fn addr(&self, port: u16) -> String {
        format!("{}:{}", self.host, port)
    }

    pub fn meta_url(&self) -> String {
        format!("http://{}:{}", self.cluster.meta_host, self.cluster.meta_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster.request_timeout_secs)
    }

    pub fn shard_port(&self, name: &str) -> Result<u16> {
        match self.cluster.shards.get(name) {
            Some(port) => Ok(*port),
            None => bail!("shard `{}` is not in the configured shard table", name),
        }
    }

    /// Data directory of one shard: `{data_dir}/data_{name}`.
    pub fn shard_dir(&self, name: &str) -> PathBuf {
        self.cluster.data_dir.join(format!("data_{}", name))
    }

    pub fn shard_set(&self) -> Result<ShardSet> {
        let shards = self
            .cluster
            .shards
            .iter()
            .map(|(name, port)| {
                let host = self.cluster.shard_host.as_deref().unwrap_or(name);
                Shard::new(name.as_str(), host, *port)
            })
            .collect();
        Ok(ShardSet::new(shards)?)
    }
}

impl ClusterConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        let cluster: ClusterConfig = serde_json::from_str(raw)?;
        if cluster.chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        if cluster.shards.is_empty() {
            bail!("at least one storage shard must be configured");
        }
        Ok(cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(raw: &str) -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            cluster: ClusterConfig::parse(raw).unwrap(),
        }
    }

    #[test]
    fn parses_storage_port_table_with_defaults() {
        let cfg = app(r#"{
            "chunk_size": 4, "api_port": 8080, "meta_port": 50051, "stat_port": 8090,
            "storage_port": { "s2": 9002, "s1": 9001 }
        }"#);

        assert_eq!(cfg.cluster.chunk_size, 4);
        assert_eq!(cfg.meta_url(), "http://localhost:50051");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.shard_port("s2").unwrap(), 9002);
        assert!(cfg.shard_port("s3").is_err());
        assert_eq!(cfg.shard_dir("s1"), PathBuf::from("./data/data_s1"));

        let shards = cfg.shard_set().unwrap();
        let names: Vec<_> = shards.iter().map(|s| s.base_url()).collect();
        assert_eq!(names, vec!["http://s1:9001", "http://s2:9002"]);
    }

    #[test]
    fn shard_host_override_applies_to_every_shard() {
        let cfg = app(r#"{
            "chunk_size": 4, "api_port": 8080, "meta_port": 50051, "stat_port": 8090,
            "shards": { "s1": 9001, "s2": 9002 }, "shard_host": "127.0.0.1"
        }"#);

        let shards = cfg.shard_set().unwrap();
        assert!(shards.iter().all(|s| s.host == "127.0.0.1"));
    }

    #[test]
    fn rejects_invalid_topologies() {
        let zero_chunk = r#"{ "chunk_size": 0, "api_port": 1, "meta_port": 2,
            "stat_port": 3, "shards": { "s1": 9001 } }"#;
        let no_shards = r#"{ "chunk_size": 4, "api_port": 1, "meta_port": 2,
            "stat_port": 3, "shards": {} }"#;

        assert!(ClusterConfig::parse(zero_chunk).is_err());
        assert!(ClusterConfig::parse(no_shards).is_err());
        assert!(ClusterConfig::parse("{}").is_err());
    }
}
