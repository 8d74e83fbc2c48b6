use crate::Error;
use docrel_config::EngineConfig;
use docrel_core::{
    catalog::{Catalog, IdentifierPolicy, MemoryMetaStore, MetaStore},
    connection::ConnectionFactory,
    executor::{Executor, Job, JobHandle, JobOp, JobOutput},
    value::Document,
};
use std::sync::Arc;
use tracing::info;

///
/// Engine
///
/// One catalog plus the worker pool that writes through it. Collections
/// without a database name go to `catalog.default_database`.
///

pub struct Engine {
    config: EngineConfig,
    catalog: Arc<Catalog>,
    executor: Executor,
}

impl Engine {
    /// Validate `config`, rebuild the catalog from `store` and start the
    /// workers.
    pub fn start(
        config: EngineConfig,
        store: Arc<dyn MetaStore>,
        factory: &dyn ConnectionFactory,
    ) -> Result<Self, Error> {
        config.validate()?;

        let policy = IdentifierPolicy::new(config.max_identifier_length);
        let catalog = Arc::new(Catalog::load(store, policy)?);
        let executor = Executor::start(&config, Arc::clone(&catalog), factory)?;
        info!(
            workers = executor.workers(),
            catalog_version = catalog.version(),
            entries = catalog.snapshot().len(),
            "engine started"
        );

        Ok(Self {
            config,
            catalog,
            executor,
        })
    }

    /// [`Engine::start`] over an empty in-memory catalog store.
    pub fn in_memory(config: EngineConfig, factory: &dyn ConnectionFactory) -> Result<Self, Error> {
        Self::start(config, Arc::new(MemoryMetaStore::new()), factory)
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    #[must_use]
    pub const fn executor(&self) -> &Executor {
        &self.executor
    }

    ///
    /// JOBS
    ///

    /// Queue a job and return its handle.
    pub fn submit(&self, job: Job) -> Result<JobHandle, Error> {
        Ok(self.executor.submit(job)?)
    }

    /// Queue a job and block until it finishes.
    pub fn run(&self, job: Job) -> Result<JobOutput, Error> {
        Ok(self.submit(job)?.wait()?)
    }

    /// Insert into a collection of the default database.
    pub fn insert(&self, collection: &str, documents: Vec<Document>) -> Result<JobOutput, Error> {
        self.insert_into(&self.config.catalog.default_database, collection, documents)
    }

    pub fn insert_into(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<JobOutput, Error> {
        self.run(Job::insert(database, collection, documents))
    }

    pub fn create_collection(&self, collection: &str) -> Result<JobOutput, Error> {
        self.run(Job::new(JobOp::CreateCollection {
            database: self.default_database(),
            collection: collection.to_string(),
        }))
    }

    pub fn drop_collection(&self, collection: &str) -> Result<JobOutput, Error> {
        self.run(Job::new(JobOp::DropCollection {
            database: self.default_database(),
            collection: collection.to_string(),
        }))
    }

    pub fn drop_database(&self, database: &str) -> Result<JobOutput, Error> {
        self.run(Job::new(JobOp::DropDatabase {
            database: database.to_string(),
        }))
    }

    /// One view per doc part of the collection, columns labelled by path.
    pub fn create_path_views(&self, collection: &str) -> Result<JobOutput, Error> {
        self.run(Job::new(JobOp::CreatePathViews {
            database: self.default_database(),
            collection: collection.to_string(),
        }))
    }

    pub fn drop_path_views(&self, collection: &str) -> Result<JobOutput, Error> {
        self.run(Job::new(JobOp::DropPathViews {
            database: self.default_database(),
            collection: collection.to_string(),
        }))
    }

    /// Finish queued jobs and stop the workers.
    pub fn shutdown(mut self) {
        self.executor.shutdown();
        info!("engine stopped");
    }

    fn default_database(&self) -> String {
        self.config.catalog.default_database.clone()
    }
}
