//! The query engine facade.
//!
//! [`Engine`] owns metadata, access control, limits, the date resolver and an
//! optional compiled-query cache, and runs the pipeline:
//!
//! ```text
//! text → length check → cache lookup → parse → validate → compile → cache store
//!                                                        └→ resolve dates (prepare_and_resolve)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use soql::{Engine, QueryContext};
//!
//! let engine = Engine::builder()
//!     .metadata(metadata)
//!     .with_memory_cache()
//!     .build();
//!
//! let compiled = engine.prepare_and_resolve(&QueryContext::new(), "SELECT Id FROM Account WHERE CreatedDate = TODAY")?;
//! ```

mod builder;

pub use builder::QueryBuilder;

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::access::{AccessController, AllowAll};
use crate::cache::{MemoryQueryCache, QueryCache};
use crate::compiler::{CompiledQuery, Compiler};
use crate::config::{Settings, SettingsError};
use crate::context::QueryContext;
use crate::dates::DateResolver;
use crate::error::{SoqlError, SoqlResult};
use crate::limits::Limits;
use crate::metadata::{MetadataProvider, StaticMetadata};
use crate::report::ValidationReport;
use crate::syntax::{self, Query};
use crate::validation::{ValidatedQuery, Validator};

/// Parses, validates and compiles queries against shared metadata.
///
/// `Engine` is `Send + Sync`; share it behind an `Arc` across threads.
pub struct Engine {
    metadata: RwLock<Arc<dyn MetadataProvider>>,
    access: Arc<dyn AccessController>,
    limits: Limits,
    dates: DateResolver,
    cache: Option<Arc<dyn QueryCache>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("limits", &self.limits)
            .field("dates", &self.dates)
            .field("cached", &self.cache_len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Build an engine from a settings file and a metadata source.
    pub fn from_settings(
        settings: &Settings,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Result<Self, SettingsError> {
        let mut builder = Engine::builder()
            .metadata_arc(metadata)
            .limits(settings.limits())
            .date_resolver(settings.date_resolver()?);
        if let Some(cache) = settings.cache.build() {
            builder = builder.cache(cache);
        }
        Ok(builder.build())
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn date_resolver(&self) -> &DateResolver {
        &self.dates
    }

    /// The current metadata snapshot.
    pub fn metadata(&self) -> Arc<dyn MetadataProvider> {
        Arc::clone(&self.metadata.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the metadata and clear the cache.
    ///
    /// The cache is cleared while the write lock is held, so no `prepare`
    /// can observe an entry compiled against the old metadata.
    pub fn set_metadata(&self, metadata: Arc<dyn MetadataProvider>) {
        let mut guard = self.metadata.write().unwrap_or_else(PoisonError::into_inner);
        *guard = metadata;
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
        info!("metadata replaced, query cache cleared");
    }

    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate();
            debug!("query cache invalidated");
        }
    }

    /// Cached entries; 0 when caching is disabled.
    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.len())
    }

    /// Parse query text after checking its length.
    pub fn parse(&self, text: &str) -> SoqlResult<Query> {
        self.limits.check_query_length(text.len())?;
        Ok(syntax::parse(text)?)
    }

    /// Parse and validate without compiling.
    pub fn validate_query(&self, ctx: &QueryContext, text: &str) -> SoqlResult<ValidatedQuery> {
        let query = self.parse(text)?;
        let metadata = self.metadata.read().unwrap_or_else(PoisonError::into_inner);
        Validator::new(metadata.as_ref(), self.access.as_ref(), &self.limits).validate(ctx, &query)
    }

    /// Validate query text and report the outcome.
    pub fn validate(&self, ctx: &QueryContext, text: &str) -> ValidationReport {
        ValidationReport::from_result(&self.validate_query(ctx, text))
    }

    /// Parse, validate and compile, consulting the cache first.
    ///
    /// Relative dates stay unresolved; see [`Engine::prepare_and_resolve`].
    pub fn prepare(&self, ctx: &QueryContext, text: &str) -> SoqlResult<Arc<CompiledQuery>> {
        if ctx.is_cancelled() {
            return Err(SoqlError::Cancelled);
        }
        self.limits.check_query_length(text.len())?;

        // Held until the result is stored so `set_metadata` cannot interleave.
        let metadata = self.metadata.read().unwrap_or_else(PoisonError::into_inner);

        let cache = self.cache.as_ref().and_then(|cache| {
            let key = self.cache_key(ctx, text);
            if key.is_none() {
                debug!("access decisions depend on the request, bypassing query cache");
            }
            key.map(|key| (cache, key))
        });
        if let Some((cache, key)) = &cache {
            if let Some(hit) = cache.get(key) {
                debug!("query cache hit");
                return Ok(hit);
            }
            debug!("query cache miss");
        }

        let query = syntax::parse(text)?;
        let validated = Validator::new(metadata.as_ref(), self.access.as_ref(), &self.limits)
            .validate(ctx, &query)?;
        let compiled = Arc::new(Compiler::new(self.limits).compile(&validated)?);

        if let Some((cache, key)) = cache {
            cache.put(key, Arc::clone(&compiled));
        }
        Ok(compiled)
    }

    /// Cache key for `text` within the access policy's partition for `ctx`.
    ///
    /// Plain text when the policy ignores the context. `None` when the
    /// request must not share cached compilations.
    fn cache_key(&self, ctx: &QueryContext, text: &str) -> Option<String> {
        let partition = self.access.cache_key(ctx)?;
        if partition.is_empty() {
            Some(text.to_string())
        } else {
            Some(format!("{}\u{0}{}", partition, text))
        }
    }

    /// Prepare, then resolve relative dates against the clock.
    ///
    /// Resolution runs on a copy made after the cache lookup, so cached
    /// entries never hold absolute dates.
    pub fn prepare_and_resolve(&self, ctx: &QueryContext, text: &str) -> SoqlResult<CompiledQuery> {
        let mut compiled = (*self.prepare(ctx, text)?).clone();
        self.dates.resolve_all(&mut compiled)?;
        Ok(compiled)
    }

    /// Start a fluent query bound to `ctx`.
    pub fn query(&self, ctx: &QueryContext) -> QueryBuilder<'_> {
        QueryBuilder::new(self, ctx.clone())
    }
}

/// Configures an [`Engine`].
///
/// Defaults: empty metadata, [`AllowAll`] access, recommended limits, a UTC
/// date resolver on the system clock, and no cache.
pub struct EngineBuilder {
    metadata: Arc<dyn MetadataProvider>,
    access: Arc<dyn AccessController>,
    limits: Limits,
    dates: DateResolver,
    cache: Option<Arc<dyn QueryCache>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            metadata: Arc::new(StaticMetadata::new()),
            access: Arc::new(AllowAll),
            limits: Limits::recommended(),
            dates: DateResolver::default(),
            cache: None,
        }
    }
}

impl EngineBuilder {
    pub fn metadata(self, metadata: impl MetadataProvider + 'static) -> Self {
        self.metadata_arc(Arc::new(metadata))
    }

    pub fn metadata_arc(mut self, metadata: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn access_controller(mut self, access: impl AccessController + 'static) -> Self {
        self.access = Arc::new(access);
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn date_resolver(mut self, dates: DateResolver) -> Self {
        self.dates = dates;
        self
    }

    pub fn cache(mut self, cache: impl QueryCache + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Use an unbounded [`MemoryQueryCache`].
    pub fn with_memory_cache(self) -> Self {
        self.cache(MemoryQueryCache::new())
    }

    pub fn build(self) -> Engine {
        Engine {
            metadata: RwLock::new(self.metadata),
            access: self.access,
            limits: self.limits,
            dates: self.dates,
            cache: self.cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FieldMeta, FieldType, ObjectMeta};

    fn metadata() -> StaticMetadata {
        StaticMetadata::new().with_object(
            ObjectMeta::new("Account", "accounts")
                .with_field(FieldMeta::new("Id", FieldType::Id))
                .with_field(FieldMeta::new("Name", FieldType::String)),
        )
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    #[test]
    fn test_prepare_without_cache() {
        let engine = Engine::builder().metadata(metadata()).build();
        let ctx = QueryContext::new();
        let a = engine.prepare(&ctx, "SELECT Name FROM Account").unwrap();
        let b = engine.prepare(&ctx, "SELECT Name FROM Account").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
        assert_eq!(engine.cache_len(), 0);
    }

    #[test]
    fn test_query_length_checked_first() {
        let limits = Limits {
            max_query_length: 10,
            ..Limits::default()
        };
        let engine = Engine::builder().metadata(metadata()).limits(limits).build();
        let err = engine
            .prepare(&QueryContext::new(), "SELECT Name FROM Account WHERE")
            .unwrap_err();
        assert_eq!(err.code(), "MAX_QUERY_LENGTH");
    }

    #[test]
    fn test_cache_partitioned_by_access_key() {
        use crate::access::CallbackAccess;
        use crate::error::AccessError;

        let access = CallbackAccess::new(
            |ctx: &QueryContext, object: &str| match ctx.attribute("role") {
                Some("admin") => Ok(()),
                _ => Err(AccessError::object(object)),
            },
            |_ctx: &QueryContext, _object: &str, _field: &str| Ok(()),
        )
        .with_cache_key(|ctx| ctx.attribute("role").unwrap_or_default().to_string());
        let engine = Engine::builder()
            .metadata(metadata())
            .access_controller(access)
            .with_memory_cache()
            .build();

        let admin = QueryContext::new().with_attribute("role", "admin");
        let a = engine.prepare(&admin, "SELECT Name FROM Account").unwrap();
        let b = engine.prepare(&admin, "SELECT Name FROM Account").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(engine.cache_len(), 1);

        let guest = QueryContext::new().with_attribute("role", "guest");
        assert!(matches!(
            engine.prepare(&guest, "SELECT Name FROM Account"),
            Err(SoqlError::Access(_))
        ));
        assert_eq!(engine.cache_len(), 1);
    }

    #[test]
    fn test_cancelled_before_cache() {
        let engine = Engine::builder().metadata(metadata()).with_memory_cache().build();
        let ctx = QueryContext::new();
        engine.prepare(&ctx, "SELECT Name FROM Account").unwrap();

        ctx.cancel();
        let err = engine.prepare(&ctx, "SELECT Name FROM Account").unwrap_err();
        assert!(matches!(err, SoqlError::Cancelled));
    }
}
