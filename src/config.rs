//! Declarative extraction configuration
//!
//! A serde-friendly mirror of the [`TableExtract`](crate::extract::TableExtract)
//! builder for callers driving runs from configuration files. Strategy hooks
//! (adapters, bulk readers) are code, not configuration; they are attached on
//! the builder after the config is applied.

use serde::{Deserialize, Serialize};

use crate::backend::{BulkExport, TableBackend};
use crate::engine::{ConnectionDescriptor, Credentials, Engine};
use crate::error::{Error, Result};
use crate::extract::TableExtract;
use crate::schema::ReflectionLevel;
use crate::types::TableMetadata;

/// Credentials as they appear in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CredentialsConfig {
    /// A complete connection URL
    Url(String),
    /// A structured descriptor
    Descriptor(ConnectionDescriptor),
}

impl From<CredentialsConfig> for Credentials {
    fn from(config: CredentialsConfig) -> Self {
        match config {
            CredentialsConfig::Url(url) => Credentials::Url(url),
            CredentialsConfig::Descriptor(d) => Credentials::Descriptor(d),
        }
    }
}

/// Output backend by name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Row mappings
    #[default]
    Rows,
    /// Tabular frames
    Frame,
    /// Columnar batches
    Arrow,
    /// Delegated bulk export
    Bulk,
}

/// Configuration record for one table extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Database credentials
    pub credentials: CredentialsConfig,
    /// Table name
    pub table: String,
    /// Schema/namespace
    #[serde(default)]
    pub schema: Option<String>,
    /// Rows per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Output backend
    #[serde(default)]
    pub backend: BackendKind,
    /// Reflect table metadata at run time instead of up front
    #[serde(default)]
    pub defer_table_reflect: bool,
    /// How much type detail the derived column mapping carries
    #[serde(default)]
    pub reflection_level: ReflectionLevel,
    /// Restrict extraction to these columns; empty keeps all
    #[serde(default)]
    pub included_columns: Vec<String>,
}

fn default_chunk_size() -> usize {
    50_000
}

impl ExtractConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.table.is_empty() {
            return Err(Error::config("table name must not be empty"));
        }
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than zero"));
        }
        Ok(())
    }

    /// Resolve the configured backend
    ///
    /// The bulk backend comes back unconfigured; attach a reader before
    /// running or the load will fail with instructions.
    pub fn to_backend(&self) -> TableBackend {
        match self.backend {
            BackendKind::Rows => TableBackend::Rows,
            BackendKind::Frame => TableBackend::Frame,
            BackendKind::Arrow => TableBackend::Arrow(Default::default()),
            BackendKind::Bulk => TableBackend::Bulk(BulkExport::unconfigured()),
        }
    }

    /// Build an extraction run for `engine` from this configuration
    ///
    /// With `defer_table_reflect` unset the table must have been reflected
    /// up front and its metadata passed in; deferring reflection to run time
    /// takes `None` and makes the run emit a schema-hints control record.
    pub fn to_extract(
        &self,
        engine: Engine,
        metadata: Option<TableMetadata>,
    ) -> Result<TableExtract> {
        self.validate()?;
        if !self.defer_table_reflect && metadata.is_none() {
            return Err(Error::config(
                "defer_table_reflect is off but no table metadata was supplied; \
                 reflect the table up front or set defer_table_reflect",
            ));
        }
        let mut extract = TableExtract::new(engine, self.table.clone())
            .with_backend(self.to_backend())
            .with_chunk_size(self.chunk_size)
            .with_reflection_level(self.reflection_level)
            .with_included_columns(self.included_columns.clone());
        if let Some(schema) = &self.schema {
            extract = extract.with_schema(schema.clone());
        }
        if let Some(metadata) = metadata {
            extract = extract.with_metadata(metadata);
        }
        Ok(extract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_config() {
        let config: ExtractConfig = serde_json::from_str(
            r#"{"credentials": "postgresql://localhost/db", "table": "events"}"#,
        )
        .unwrap();

        assert_eq!(config.chunk_size, 50_000);
        assert_eq!(config.backend, BackendKind::Rows);
        assert_eq!(config.reflection_level, ReflectionLevel::Full);
        assert!(!config.defer_table_reflect);
        assert!(config.included_columns.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_descriptor_credentials() {
        let config: ExtractConfig = serde_json::from_str(
            r#"{
                "credentials": {"scheme": "postgresql", "host": "db.internal", "database": "warehouse"},
                "table": "orders",
                "schema": "sales",
                "backend": "arrow",
                "chunk_size": 1000
            }"#,
        )
        .unwrap();

        assert!(matches!(
            config.credentials,
            CredentialsConfig::Descriptor(_)
        ));
        assert!(matches!(config.to_backend(), TableBackend::Arrow(_)));
        assert_eq!(config.chunk_size, 1000);
    }

    #[test]
    fn test_defer_table_reflect_gates_metadata() {
        use crate::connection::ConnectionFactory;
        use crate::engine::EngineOptions;
        use crate::testing::MemoryConnectionFactory;
        use std::sync::Arc;

        let factory = Arc::new(MemoryConnectionFactory::new());
        let engine = || {
            Engine::new(
                "memory://test",
                Arc::clone(&factory) as Arc<dyn ConnectionFactory>,
                true,
                &EngineOptions::default(),
            )
        };
        let config: ExtractConfig = serde_json::from_str(
            r#"{"credentials": "memory://test", "table": "events"}"#,
        )
        .unwrap();

        // Up-front reflection without the metadata to show for it.
        let err = config.to_extract(engine(), None).unwrap_err();
        assert!(err.to_string().contains("defer_table_reflect"));

        let metadata = TableMetadata::new("events");
        assert!(config.to_extract(engine(), Some(metadata)).is_ok());

        let deferred: ExtractConfig = serde_json::from_str(
            r#"{"credentials": "memory://test", "table": "events", "defer_table_reflect": true}"#,
        )
        .unwrap();
        assert!(deferred.to_extract(engine(), None).is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config: ExtractConfig = serde_json::from_str(
            r#"{"credentials": "postgresql://localhost/db", "table": "events"}"#,
        )
        .unwrap();

        config.chunk_size = 0;
        assert!(config.validate().is_err());

        config.chunk_size = 100;
        config.table = String::new();
        assert!(config.validate().is_err());
    }
}
