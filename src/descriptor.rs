//! Connection descriptors and the registry that shares them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::classify::{DefaultClassifier, StatementClassifier};
use crate::config::{ConnectionStringSource, parse_connection_string, resolve_connection_string};
use crate::driver::DbDriver;
use crate::error::SqlBatchError;
use crate::types::DriverKind;

/// Bound parameters allowed in one physical round-trip unless a descriptor overrides it.
pub const DEFAULT_PARAMETER_CEILING: usize = 2000;

/// Everything a batch needs to reach one logical database.
///
/// Built once, then shared behind an `Arc`; the builder methods consume `self` so a shared
/// descriptor cannot change.
#[derive(Clone)]
pub struct ConnectionDescriptor {
    name: String,
    connection_string: String,
    driver: Arc<dyn DbDriver>,
    parameter_prefix: String,
    command_timeout_secs: u64,
    retries: u32,
    database_name: Option<String>,
    parameter_ceiling: usize,
    classifier: Arc<dyn StatementClassifier>,
}

impl ConnectionDescriptor {
    /// Build a descriptor from an already-resolved connection string.
    ///
    /// Timeout, retry count and database name are read from the string on a best-effort basis.
    ///
    /// # Errors
    /// Returns `SqlBatchError::ConfigError` if the connection string is empty.
    pub fn new(
        name: impl Into<String>,
        connection_string: impl Into<String>,
        driver: Arc<dyn DbDriver>,
    ) -> Result<Self, SqlBatchError> {
        let name = name.into();
        let connection_string = connection_string.into();
        if connection_string.trim().is_empty() {
            return Err(SqlBatchError::ConfigError(format!(
                "connection \"{name}\" has an empty connection string"
            )));
        }
        let info = parse_connection_string(&connection_string);
        Ok(Self {
            parameter_prefix: driver.parameter_prefix().to_string(),
            name,
            connection_string,
            driver,
            command_timeout_secs: info.command_timeout_secs,
            retries: info.retries,
            database_name: info.database_name,
            parameter_ceiling: DEFAULT_PARAMETER_CEILING,
            classifier: Arc::new(DefaultClassifier::new()),
        })
    }

    /// Resolve `name` through `source` and build a descriptor for it.
    ///
    /// A retry count configured in the source wins over one in the connection string.
    ///
    /// # Errors
    /// Returns `SqlBatchError::ConfigError` if the name cannot be resolved.
    pub fn resolve(
        name: &str,
        source: &dyn ConnectionStringSource,
        driver: Arc<dyn DbDriver>,
    ) -> Result<Self, SqlBatchError> {
        let connection_string = resolve_connection_string(source, name)?;
        let descriptor = Self::new(name, connection_string, driver)?;
        Ok(match source.retries(name) {
            Some(retries) => descriptor.with_retries(retries),
            None => descriptor,
        })
    }

    /// Build a descriptor using the built-in driver for `kind`.
    ///
    /// # Errors
    /// Returns `SqlBatchError::ConfigError` for `DriverKind::Custom`, which has no built-in driver.
    pub fn for_kind(
        kind: DriverKind,
        name: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Result<Self, SqlBatchError> {
        let driver: Arc<dyn DbDriver> = match kind {
            #[cfg(feature = "sqlite")]
            DriverKind::Sqlite => Arc::new(crate::driver::sqlite::SqliteDriver::new()),
            #[cfg(feature = "mssql")]
            DriverKind::Mssql => Arc::new(crate::driver::mssql::MssqlDriver::new()),
            DriverKind::Custom => {
                return Err(SqlBatchError::ConfigError(
                    "custom drivers must be passed to ConnectionDescriptor::new".into(),
                ));
            }
        };
        Self::new(name, connection_string, driver)
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, seconds: u64) -> Self {
        self.command_timeout_secs = seconds;
        self
    }

    /// Override the per-chunk parameter ceiling. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_parameter_ceiling(mut self, ceiling: usize) -> Self {
        self.parameter_ceiling = ceiling.max(1);
        self
    }

    #[must_use]
    pub fn with_parameter_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.parameter_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn StatementClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<dyn DbDriver> {
        &self.driver
    }

    #[must_use]
    pub fn parameter_prefix(&self) -> &str {
        &self.parameter_prefix
    }

    #[must_use]
    pub fn command_timeout_secs(&self) -> u64 {
        self.command_timeout_secs
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    #[must_use]
    pub fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    #[must_use]
    pub fn parameter_ceiling(&self) -> usize {
        self.parameter_ceiling
    }

    #[must_use]
    pub fn classifier(&self) -> &dyn StatementClassifier {
        self.classifier.as_ref()
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The connection string may carry credentials.
        f.debug_struct("ConnectionDescriptor")
            .field("name", &self.name)
            .field("driver", &self.driver.kind())
            .field("parameter_prefix", &self.parameter_prefix)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .field("retries", &self.retries)
            .field("database_name", &self.database_name)
            .field("parameter_ceiling", &self.parameter_ceiling)
            .finish_non_exhaustive()
    }
}

/// Descriptors keyed by logical name, shared by every helper built from the registry.
///
/// Insertion is first-writer-wins: once a name is registered, later inserts for it return the
/// registered descriptor and discard their own.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    descriptors: RwLock<HashMap<String, Arc<ConnectionDescriptor>>>,
}

impl DescriptorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ConnectionDescriptor>> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Register `descriptor` under its name unless the name is taken; return the registered one.
    pub fn insert(&self, descriptor: ConnectionDescriptor) -> Arc<ConnectionDescriptor> {
        let mut map = self.descriptors.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(descriptor.name().to_string())
                .or_insert_with(|| Arc::new(descriptor)),
        )
    }

    /// Look up `name`, building and registering a descriptor if it is missing.
    ///
    /// `build` runs without the lock held, so two callers racing on a new name may both build;
    /// only the first to register is kept.
    ///
    /// # Errors
    /// Propagates the error from `build`.
    pub fn get_or_insert_with<F>(&self, name: &str, build: F) -> Result<Arc<ConnectionDescriptor>, SqlBatchError>
    where
        F: FnOnce() -> Result<ConnectionDescriptor, SqlBatchError>,
    {
        if let Some(found) = self.get(name) {
            return Ok(found);
        }
        let descriptor = build()?;
        let mut map = self.descriptors.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            map.entry(name.to_string()).or_insert_with(|| Arc::new(descriptor)),
        ))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingDriver;

    fn driver() -> Arc<dyn DbDriver> {
        Arc::new(RecordingDriver::new())
    }

    #[test]
    fn parses_connection_string_defaults() {
        let d = ConnectionDescriptor::new("main", "Server=x;Database=Shop;Command Timeout=12", driver()).unwrap();
        assert_eq!(d.command_timeout_secs(), 12);
        assert_eq!(d.database_name(), Some("Shop"));
        assert_eq!(d.retries(), 0);
        assert_eq!(d.parameter_ceiling(), DEFAULT_PARAMETER_CEILING);
        assert_eq!(d.parameter_prefix(), "@");
    }

    #[test]
    fn empty_connection_string_fails_fast() {
        let err = ConnectionDescriptor::new("main", "  ", driver()).unwrap_err();
        assert!(matches!(err, SqlBatchError::ConfigError(_)));
    }

    #[test]
    fn custom_kind_needs_explicit_driver() {
        let err = ConnectionDescriptor::for_kind(DriverKind::Custom, "x", "Data Source=x.db").unwrap_err();
        assert!(matches!(err, SqlBatchError::ConfigError(_)));
    }

    #[test]
    fn registry_first_writer_wins() {
        let registry = DescriptorRegistry::new();
        let first = registry.insert(ConnectionDescriptor::new("db", "Server=a", driver()).unwrap());
        let second = registry.insert(ConnectionDescriptor::new("db", "Server=b", driver()).unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.connection_string(), "Server=a");

        let third = registry
            .get_or_insert_with("db", || ConnectionDescriptor::new("db", "Server=c", driver()))
            .unwrap();
        assert_eq!(third.connection_string(), "Server=a");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_concurrent_inserts_agree() {
        let registry = Arc::new(DescriptorRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .get_or_insert_with("shared", || {
                            ConnectionDescriptor::new("shared", format!("Server=s{i}"), driver())
                        })
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|d| Arc::ptr_eq(d, &results[0])));
    }
}
