//! Bootstrap and shared persistence state
//!
//! [`Persistence`] owns everything the layer needs at runtime: configuration,
//! the counter store, one [`ModelHandle`] per entity and the repositories bound
//! to them. Repositories are created on first use and then reused, so their
//! dialect is decided once per process.

use std::collections::BTreeMap;
use std::sync::Arc;

use mongodb::Database;
use once_cell::sync::OnceCell;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::aggregate::AggregateGateway;
use crate::backends::{MongoCollection, PgTable};
use crate::config::Config;
use crate::degraded::DegradedCounters;
use crate::dialect::ModelHandle;
use crate::error::Result;
use crate::health::{self, PersistenceHealth, PoolHealth};
use crate::repository::{
    Entity, FilterDescription, OrderRepository, Orders, ProductRepository, Products, Repository,
    UserRepository, Users,
};

const ENTITIES: [&str; 3] = [Users::PLURAL, Products::PLURAL, Orders::PLURAL];

/// Shared persistence state
///
/// Cheap to share behind an `Arc`; every accessor takes `&self`.
pub struct Persistence {
    config: Arc<Config>,
    counters: Arc<DegradedCounters>,
    handles: BTreeMap<&'static str, ModelHandle>,
    pg_pool: Option<PgPool>,
    document_db: Option<Database>,
    aggregates: AggregateGateway,
    cancel: CancellationToken,
    users: OnceCell<UserRepository>,
    products: OnceCell<ProductRepository>,
    orders: OnceCell<OrderRepository>,
}

impl Persistence {
    /// Create a new builder for Persistence
    pub fn builder() -> PersistenceBuilder {
        PersistenceBuilder::new()
    }

    /// Connect every backend named in `config` with default settings
    pub async fn connect(config: Config) -> Result<Self> {
        Self::builder().config(config).build().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn counters(&self) -> &Arc<DegradedCounters> {
        &self.counters
    }

    pub fn aggregates(&self) -> &AggregateGateway {
        &self.aggregates
    }

    /// PostgreSQL pool, when one was connected or injected
    pub fn pg_pool(&self) -> Option<&PgPool> {
        self.pg_pool.as_ref()
    }

    /// MongoDB database, when one was connected or injected
    pub fn document_db(&self) -> Option<&Database> {
        self.document_db.as_ref()
    }

    /// Storage handles of entity `E`
    pub fn handle<E: Entity>(&self) -> ModelHandle {
        self.handles.get(E::PLURAL).cloned().unwrap_or_default()
    }

    pub fn users(&self) -> &UserRepository {
        self.users.get_or_init(|| self.bind::<Users>())
    }

    pub fn products(&self) -> &ProductRepository {
        self.products.get_or_init(|| self.bind::<Products>())
    }

    pub fn orders(&self) -> &OrderRepository {
        self.orders.get_or_init(|| self.bind::<Orders>())
    }

    /// Number of `E` records matching `filter`, or its counter in degraded mode
    pub async fn count<E: Entity>(&self, filter: &FilterDescription) -> u64 {
        self.aggregates.count_of::<E>(&self.handle::<E>(), filter).await
    }

    /// Sum of `field` over `E` records matching `filter`
    pub async fn sum<E: Entity>(&self, field: &str, filter: &FilterDescription) -> f64 {
        self.aggregates
            .sum_of::<E>(&self.handle::<E>(), field, filter)
            .await
    }

    /// Probe every configured backend
    pub async fn health(&self) -> PersistenceHealth {
        let timeout = self.config.repository.query_timeout();
        let mut dependencies = BTreeMap::new();
        let mut pool = None;

        if let Some(db_config) = &self.config.database {
            let status = match &self.pg_pool {
                Some(pg) => {
                    pool = Some(PoolHealth::from_pool(pg, db_config));
                    health::probe_database(pg, timeout, db_config.optional).await
                }
                None => health::DependencyStatus::down(db_config.optional, "Not connected"),
            };
            dependencies.insert("database", status);
        }

        if let Some(doc_config) = &self.config.document_store {
            let status = match &self.document_db {
                Some(db) => health::probe_document_store(db, timeout, doc_config.optional).await,
                None => health::DependencyStatus::down(doc_config.optional, "Not connected"),
            };
            dependencies.insert("document_store", status);
        }

        let entities = ENTITIES
            .into_iter()
            .map(|plural| {
                let dialect = self
                    .handles
                    .get(plural)
                    .map_or(crate::dialect::Dialect::Unavailable, |h| h.resolve().dialect());
                (plural, dialect)
            })
            .collect();

        PersistenceHealth {
            ready: PersistenceHealth::compute_ready(&dependencies),
            service: self.config.service.name.clone(),
            entities,
            dependencies,
            pool,
            counters: self.counters.snapshot(),
        }
    }

    /// Cancel in-flight repository calls and close the pool
    ///
    /// Calls made afterwards fail fast with a cancellation error.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(pool) = &self.pg_pool {
            pool.close().await;
        }
        tracing::info!(service = %self.config.service.name, "persistence shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn bind<E: Entity>(&self) -> Repository<E> {
        Repository::new(&self.handle::<E>(), Arc::clone(&self.counters))
            .with_settings(self.config.repository.clone())
            .with_cancellation(self.cancel.child_token())
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("service", &self.config.service.name)
            .field("handles", &self.handles)
            .field("db_available", &self.counters.is_db_available())
            .finish_non_exhaustive()
    }
}

/// Builder for Persistence
pub struct PersistenceBuilder {
    config: Option<Config>,
    counters: Option<Arc<DegradedCounters>>,
    pg_pool: Option<PgPool>,
    document_db: Option<Database>,
    handles: BTreeMap<&'static str, ModelHandle>,
    enable_tracing: bool,
}

impl PersistenceBuilder {
    /// Create a new builder
    ///
    /// By default config falls back to `Config::default()`, a fresh counter
    /// store is created, and tracing is auto-initialized if not already set up.
    pub fn new() -> Self {
        Self {
            config: None,
            counters: None,
            pg_pool: None,
            document_db: None,
            handles: BTreeMap::new(),
            enable_tracing: true,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Share an existing counter store
    pub fn counters(mut self, counters: Arc<DegradedCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Use this pool instead of connecting `config.database`
    pub fn pg_pool(mut self, pool: PgPool) -> Self {
        self.pg_pool = Some(pool);
        self
    }

    /// Use this database instead of connecting `config.document_store`
    pub fn document_db(mut self, database: Database) -> Self {
        self.document_db = Some(database);
        self
    }

    /// Use `handle` for entity `E` instead of the configured backends
    pub fn handle<E: Entity>(mut self, handle: ModelHandle) -> Self {
        self.handles.insert(E::PLURAL, handle);
        self
    }

    pub fn with_tracing(mut self) -> Self {
        self.enable_tracing = true;
        self
    }

    /// Disable automatic tracing initialization
    ///
    /// Use this if the application installs its own subscriber, for example
    /// through [`init_tracing`](crate::observability::init_tracing).
    pub fn without_tracing(mut self) -> Self {
        self.enable_tracing = false;
        self
    }

    /// Plain subscriber with sensible defaults, installed at most once
    fn init_tracing() {
        use std::sync::Once;
        static INIT: Once = Once::new();

        INIT.call_once(|| {
            let installed = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::INFO)
                .with_target(false)
                .try_init()
                .is_ok();
            if installed {
                tracing::debug!("Tracing initialized with default configuration");
            }
        });
    }

    /// Connect configured backends and bind the entity handles
    ///
    /// A backend marked `optional` that cannot be reached is logged and left
    /// out; a required one fails the build. The database flag of the counter
    /// store is enabled when at least one entity has a live backend.
    pub async fn build(self) -> Result<Persistence> {
        if self.enable_tracing {
            Self::init_tracing();
        }

        let config = self.config.unwrap_or_default();

        let pg_pool = match (self.pg_pool, &config.database) {
            (Some(pool), _) => Some(pool),
            (None, Some(db_config)) => match crate::database::create_pool(db_config).await {
                Ok(pool) => Some(pool),
                Err(e) if db_config.optional => {
                    tracing::warn!("Optional database connection failed: {}. Continuing without database.", e);
                    None
                }
                Err(e) => return Err(e),
            },
            (None, None) => None,
        };

        let document_db = match (self.document_db, &config.document_store) {
            (Some(db), _) => Some(db),
            (None, Some(doc_config)) => match crate::document_store::connect(doc_config).await {
                Ok(db) => Some(db),
                Err(e) if doc_config.optional => {
                    tracing::warn!("Optional document store connection failed: {}. Continuing without it.", e);
                    None
                }
                Err(e) => return Err(e),
            },
            (None, None) => None,
        };

        let mut handles = self.handles;
        for plural in ENTITIES {
            if handles.contains_key(plural) {
                continue;
            }
            let Some(name) = config.tables.name_for(plural) else {
                continue;
            };

            let mut handle = ModelHandle::none();
            if let Some(pool) = &pg_pool {
                match PgTable::connect(pool.clone(), name).await {
                    Ok(table) => handle = handle.with_relational(Arc::new(table)),
                    Err(e) if config.database.as_ref().map_or(true, |db| db.optional) => {
                        tracing::warn!(entity = plural, table = name, "skipping relational backend: {}", e);
                    }
                    Err(e) => return Err(e),
                }
            }
            if let Some(db) = &document_db {
                handle = handle.with_document(Arc::new(MongoCollection::new(db, name)));
            }
            handles.insert(plural, handle);
        }

        let counters = self.counters.unwrap_or_default();
        if handles.values().any(ModelHandle::is_live) {
            counters.enable_db();
        } else {
            tracing::warn!("no live backend, serving degraded answers");
        }

        let aggregates = AggregateGateway::new(Arc::clone(&counters)).with_settings(&config.repository);

        Ok(Persistence {
            config: Arc::new(config),
            counters,
            handles,
            pg_pool,
            document_db,
            aggregates,
            cancel: CancellationToken::new(),
            users: OnceCell::new(),
            products: OnceCell::new(),
            orders: OnceCell::new(),
        })
    }
}

impl Default for PersistenceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
