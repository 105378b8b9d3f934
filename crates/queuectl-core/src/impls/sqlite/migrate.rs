use sqlx::{SqlitePool, query, query_scalar};
use tracing::info;

/// Schema migrations, applied in order. Each inner slice runs in one
/// transaction and is recorded in `queuectl_migrations` once it commits.
const MIGRATIONS: &[&[&str]] = &[
    &[
        r#"
            create table if not exists jobs (
                id text primary key,
                command text not null,
                state text not null default 'pending',
                attempts integer not null default 0,
                max_retries integer not null default 3,
                created_at integer not null,
                updated_at integer not null,
                next_retry_at integer
            )
        "#,
        "create index if not exists idx_jobs_state on jobs(state)",
        "create index if not exists idx_jobs_next_retry_at on jobs(next_retry_at)",
    ],
    &["create index if not exists idx_jobs_created_at on jobs(created_at)"],
];

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    query(
        r#"
            create table if not exists queuectl_migrations (
                id integer primary key,
                applied_at integer not null
            )
        "#,
    )
    .execute(pool)
    .await?;

    let last_migration: Option<i64> =
        query_scalar("select max(id) from queuectl_migrations")
            .fetch_one(pool)
            .await?;

    for (i, statements) in MIGRATIONS.iter().enumerate() {
        let migration_number = (i + 1) as i64;
        if last_migration.is_some_and(|last| migration_number <= last) {
            continue;
        }

        info!(migration_number, "Executing migration");
        let mut tx = pool.begin().await?;
        for statement in statements.iter() {
            query(statement).execute(&mut *tx).await?;
        }
        query("insert or ignore into queuectl_migrations (id, applied_at) values (?1, ?2)")
            .bind(migration_number)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database")
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let pool = memory_pool().await;

        migrate(&pool).await.expect("Failed to migrate");
        migrate(&pool).await.expect("Failed to migrate twice");

        let applied: i64 = query_scalar("select count(*) from queuectl_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);

        let jobs: i64 = query_scalar("select count(*) from jobs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(jobs, 0);
    }
}
