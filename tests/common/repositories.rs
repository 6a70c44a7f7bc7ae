use sqlx::Row;
use uuid::Uuid;

use repository_unit_of_work::{PgExecutor, UnitOfWorkResult};

use super::entities::{Order, User};

/// User Repository bound to the transaction of a unit of work
#[derive(Clone)]
pub struct UserRepository {
    executor: PgExecutor,
}

impl UserRepository {
    pub fn new(executor: PgExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &PgExecutor {
        &self.executor
    }

    pub async fn create(&self, user: &User) -> UnitOfWorkResult<()> {
        let mut tx = self.executor.lock().await?;
        sqlx::query("INSERT INTO users (id, username, email) VALUES ($1, $2, $3)")
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .execute(tx.connection()?)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> UnitOfWorkResult<Option<User>> {
        let mut tx = self.executor.lock().await?;
        let row = sqlx::query("SELECT id, username, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(tx.connection()?)
            .await?;

        Ok(row.map(|r| User {
            id: r.get("id"),
            username: r.get("username"),
            email: r.get("email"),
        }))
    }

    pub async fn count(&self) -> UnitOfWorkResult<i64> {
        let mut tx = self.executor.lock().await?;
        let row = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(tx.connection()?)
            .await?;
        Ok(row.get("count"))
    }
}

/// Order Repository bound to the transaction of a unit of work
#[derive(Clone)]
pub struct OrderRepository {
    executor: PgExecutor,
}

impl OrderRepository {
    pub fn new(executor: PgExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &PgExecutor {
        &self.executor
    }

    pub async fn create(&self, order: &Order) -> UnitOfWorkResult<()> {
        let mut tx = self.executor.lock().await?;
        sqlx::query(
            "INSERT INTO orders (id, user_id, product_name, amount) VALUES ($1, $2, $3, $4)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.product_name)
        .bind(order.amount)
        .execute(tx.connection()?)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> UnitOfWorkResult<Option<Order>> {
        let mut tx = self.executor.lock().await?;
        let row = sqlx::query(
            "SELECT id, user_id, product_name, amount FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(tx.connection()?)
        .await?;

        Ok(row.map(|r| Order {
            id: r.get("id"),
            user_id: r.get("user_id"),
            product_name: r.get("product_name"),
            amount: r.get("amount"),
        }))
    }

    pub async fn count(&self) -> UnitOfWorkResult<i64> {
        let mut tx = self.executor.lock().await?;
        let row = sqlx::query("SELECT COUNT(*) as count FROM orders")
            .fetch_one(tx.connection()?)
            .await?;
        Ok(row.get("count"))
    }
}
