use serde::Deserialize;

/// Specifies which store implementation to use
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    #[default]
    Postgres,
    InMemory,
}

/// Configuration for the relational store
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Store backend: "postgres" (default) or "in-memory"
    pub backend: StoreKind,

    /// Postgres connection string
    pub url: String,

    /// Maximum pool size (default: 10)
    pub max_connections: u32,

    /// Connections kept open while idle (default: 1)
    pub min_connections: u32,

    /// Apply the embedded migrations at startup (default: true)
    pub run_migrations: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreKind::Postgres,
            url: "postgres://localhost:5432/hook".to_string(),
            max_connections: 10,
            min_connections: 1,
            run_migrations: true,
        }
    }
}
