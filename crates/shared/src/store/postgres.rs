//! PostgreSQL-backed queue store

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use super::QueueStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{PersistedQueue, TicketNumber, UserId, UserRecord};

#[derive(Debug, Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    number: Option<i32>,
    has_reserved: bool,
    reserved_at: Option<OffsetDateTime>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let number = row.number.map(|n| to_ticket(i64::from(n))).transpose()?;
        Ok(UserRecord {
            id: UserId::from(row.id),
            number,
            has_reserved: row.has_reserved,
            reserved_at: row.reserved_at,
        })
    }
}

fn to_ticket(value: i64) -> StoreResult<TicketNumber> {
    TicketNumber::try_from(value).map_err(StoreError::InvalidNumber)
}

fn to_column(number: TicketNumber) -> StoreResult<i32> {
    let value = i64::from(number);
    i32::try_from(value).map_err(|_| StoreError::InvalidNumber(value))
}

async fn load_numbers(pool: &PgPool, query: &str) -> StoreResult<Vec<TicketNumber>> {
    let rows: Vec<i32> = sqlx::query_scalar(query).fetch_all(pool).await?;
    rows.into_iter().map(|n| to_ticket(i64::from(n))).collect()
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn load_queue(&self) -> StoreResult<PersistedQueue> {
        let serving = load_numbers(
            &self.pool,
            "SELECT number FROM serving_numbers ORDER BY position ASC",
        )
        .await?;
        let waiting = load_numbers(
            &self.pool,
            "SELECT number FROM waiting_numbers ORDER BY position ASC",
        )
        .await?;

        Ok(PersistedQueue { serving, waiting })
    }

    async fn load_reserved_users(&self) -> StoreResult<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, number, has_reserved, reserved_at
            FROM users
            WHERE has_reserved = TRUE
            ORDER BY reserved_at ASC NULLS LAST
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRecord::try_from).collect()
    }

    async fn find_user(&self, id: &UserId) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, number, has_reserved, reserved_at FROM users WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn upsert_user(&self, user: &UserRecord) -> StoreResult<()> {
        let number = user.number.map(to_column).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO users (id, number, has_reserved, reserved_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
              number = EXCLUDED.number,
              has_reserved = EXCLUDED.has_reserved,
              reserved_at = EXCLUDED.reserved_at
            "#,
        )
        .bind(user.id.as_str())
        .bind(number)
        .bind(user.has_reserved)
        .bind(user.reserved_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace_queue(&self, queue: &PersistedQueue) -> StoreResult<()> {
        let serving = queue
            .serving
            .iter()
            .copied()
            .map(to_column)
            .collect::<StoreResult<Vec<i32>>>()?;
        let waiting = queue
            .waiting
            .iter()
            .copied()
            .map(to_column)
            .collect::<StoreResult<Vec<i32>>>()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM serving_numbers")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO serving_numbers (position, number)
            SELECT ord::INTEGER, num FROM UNNEST($1::INTEGER[]) WITH ORDINALITY AS t(num, ord)
            "#,
        )
        .bind(&serving)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM waiting_numbers")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO waiting_numbers (position, number)
            SELECT ord::INTEGER, num FROM UNNEST($1::INTEGER[]) WITH ORDINALITY AS t(num, ord)
            "#,
        )
        .bind(&waiting)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            serving = serving.len(),
            waiting = waiting.len(),
            "Queue snapshot written"
        );

        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};

    fn n(value: u32) -> TicketNumber {
        TicketNumber::new(value).unwrap()
    }

    #[test]
    fn test_user_row_conversion_rejects_invalid_number() {
        let row = UserRow {
            id: "alice".to_string(),
            number: Some(0),
            has_reserved: true,
            reserved_at: None,
        };
        assert!(matches!(
            UserRecord::try_from(row),
            Err(StoreError::InvalidNumber(0))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_queue_round_trip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url, 2).await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let store = PgQueueStore::new(pool);

        let queue = PersistedQueue {
            serving: vec![n(2), n(1), n(5)],
            waiting: vec![n(9), n(3)],
        };
        store.replace_queue(&queue).await.unwrap();
        assert_eq!(store.load_queue().await.unwrap(), queue);

        let mut user = UserRecord::idle(UserId::from("pg-round-trip"));
        user.reserve(n(9), OffsetDateTime::now_utc());
        store.upsert_user(&user).await.unwrap();

        let loaded = store.find_user(&user.id).await.unwrap().unwrap();
        assert_eq!(loaded.number, Some(n(9)));
        assert!(loaded.has_reserved);
    }
}
