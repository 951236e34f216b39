//! Common test utilities
#![allow(dead_code)]

use std::time::Duration;

use matzip::domain::OperationContext;
use matzip::events::{DispatchConfig, Dispatcher, Executor, HandlerRegistry};
use matzip::handlers::{CreatePostCommand, Handlers, RegisterMemberCommand};
use matzip::listeners;
use matzip::store::{MemoryStore, Store};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Executor settings that keep failing tests fast
pub fn fast_dispatch() -> DispatchConfig {
    DispatchConfig {
        handler_timeout: Duration::from_secs(2),
        max_attempts: 2,
        retry_backoff: Duration::from_millis(5),
        concurrency: 64,
    }
}

/// Store, executor and command handlers wired together
pub struct Engine<S: Store> {
    pub store: S,
    pub executor: Executor<S>,
    pub dispatcher: Dispatcher<S>,
    pub handlers: Handlers<S>,
    pub ctx: OperationContext,
}

impl<S: Store> Engine<S> {
    pub fn with_registry(store: S, registry: HandlerRegistry<S::Tx>, config: DispatchConfig) -> Self {
        let executor = Executor::new(store.clone(), registry, config);
        let dispatcher = Dispatcher::new(store.clone(), executor.clone());
        Self {
            store,
            executor,
            handlers: Handlers::new(dispatcher.clone()),
            dispatcher,
            ctx: OperationContext::new(),
        }
    }

    /// Engine with every built-in listener registered
    pub fn standard(store: S) -> Self {
        let mut registry = HandlerRegistry::new();
        listeners::register_all(&mut registry).unwrap();
        Self::with_registry(store, registry, fast_dispatch())
    }

    /// Register and activate a member
    pub async fn member(&self, nickname: &str) -> Uuid {
        let email = format!("{}-{}@matzip.kr", nickname, Uuid::new_v4().simple());
        let command = RegisterMemberCommand::new(email, nickname.to_string());
        let id = self.handlers.members.register(command, &self.ctx).await.unwrap();
        self.handlers.members.activate(id, &self.ctx).await.unwrap();
        id
    }

    pub async fn post(&self, author_id: Uuid) -> Uuid {
        let command = CreatePostCommand::new(
            author_id,
            "Woo Lae Oak".to_string(),
            "Bulgogi and cold noodles".to_string(),
        );
        self.handlers.posts.create(command, &self.ctx).await.unwrap()
    }

    pub async fn settle(&self) {
        self.executor.wait_idle().await;
    }
}

pub fn memory_engine() -> Engine<MemoryStore> {
    Engine::standard(MemoryStore::new())
}

/// Connect to the test database, or `None` when `DATABASE_URL` is unset
/// or the schema has not been migrated.
///
/// Tests share the database and run in parallel, so each one works on
/// freshly generated ids and asserts only on its own rows.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    if !matzip::db::check_schema(&pool).await.expect("Failed to inspect schema") {
        eprintln!("skipping: run migrations/001_schema.sql first");
        return None;
    }

    Some(pool)
}
