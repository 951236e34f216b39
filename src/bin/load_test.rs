//! Load Testing Tool
//!
//! Fires concurrent hearts at one post and checks that the counter
//! lands on exactly one per member.
//!
//! Run with: cargo run --bin load_test --release -- --members 500

use std::sync::Arc;
use std::time::Instant;

use sqlx::postgres::PgPoolOptions;

use matzip::domain::OperationContext;
use matzip::events::{Dispatcher, Executor, HandlerRegistry};
use matzip::handlers::{CreatePostCommand, Handlers, RegisterMemberCommand};
use matzip::store::postgres::PgTransaction;
use matzip::store::{PgStore, PostRepository, Store, Transaction};
use matzip::{listeners, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let member_count: usize = args
        .iter()
        .position(|a| a == "--members")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(500);

    let config = Config::from_env()?;

    println!("Load Test - {} concurrent hearts on one post", member_count);
    println!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let store = PgStore::new(pool.clone());

    let mut registry = HandlerRegistry::<PgTransaction>::new();
    listeners::register_all(&mut registry)?;
    let executor = Executor::new(store.clone(), registry, config.dispatch());
    let handlers = Arc::new(Handlers::new(Dispatcher::new(store.clone(), executor.clone())));
    let ctx = OperationContext::new();

    let run = uuid::Uuid::new_v4().simple().to_string();
    let author = register(&handlers, &ctx, &format!("author-{run}")).await?;
    let post_id = handlers
        .posts
        .create(
            CreatePostCommand::new(author, "Load test".to_string(), "Hearts incoming".to_string()),
            &ctx,
        )
        .await?;

    let mut members = Vec::with_capacity(member_count);
    for i in 0..member_count {
        members.push(register(&handlers, &ctx, &format!("fan{i}-{run}")).await?);
        if (i + 1) % 100 == 0 {
            println!("Registered {} members...", i + 1);
        }
    }

    let start = Instant::now();
    let mut tasks = Vec::with_capacity(member_count);
    for member_id in members {
        let handlers = handlers.clone();
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            handlers.posts.add_heart(post_id, member_id, &ctx).await
        }));
    }

    let mut success_count = 0usize;
    for task in tasks {
        if let Ok(Ok(true)) = task.await {
            success_count += 1;
        }
    }
    executor.wait_idle().await;
    let elapsed = start.elapsed();

    let mut tx = store.begin().await?;
    let heart_count = tx.find_post(post_id).await?.map(|p| p.heart_count()).unwrap_or(0);
    tx.rollback().await?;

    let rate = success_count as f64 / elapsed.as_secs_f64();

    println!("\n=== Load Test Results ===");
    println!("Hearts accepted: {}", success_count);
    println!("Heart counter: {}", heart_count);
    println!("Time elapsed: {:.2?}", elapsed);
    println!("Throughput: {:.2} hearts/sec", rate);

    if heart_count != success_count as i64 {
        anyhow::bail!("counter drifted: {} accepted, {} counted", success_count, heart_count);
    }

    pool.close().await;
    Ok(())
}

async fn register(
    handlers: &Handlers<PgStore>,
    ctx: &OperationContext,
    nickname: &str,
) -> anyhow::Result<uuid::Uuid> {
    let command = RegisterMemberCommand::new(format!("{nickname}@matzip.kr"), nickname.to_string());
    let id = handlers.members.register(command, ctx).await?;
    handlers.members.activate(id, ctx).await?;
    Ok(id)
}
