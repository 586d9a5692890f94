use async_trait::async_trait;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::repo_types::User;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("a user with this email already exists")]
    Conflict,
    #[error("malformed user id")]
    InvalidId,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Persistence contract for user records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts a fully formed record and returns it as stored.
    async fn create_user(&self, user: &User) -> Result<User, RepoError>;
    /// `Ok(None)` when no record matches.
    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, RepoError>;
    /// `email` must already be normalized.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, user: &User) -> Result<User, RepoError> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, username, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
            e => {
                error!(error = %e, user_id = %user.id, "insert user failed");
                RepoError::Database(e)
            }
        })?;
        Ok(created)
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, RepoError> {
        let id = Uuid::parse_str(id).map_err(|_| RepoError::InvalidId)?;
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}


#[cfg(test)]
mod pg_tests {
    use std::sync::Arc;

    use time::OffsetDateTime;

    use super::*;

    fn user(email: &str) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            username: "JohnDoe123".into(),
            email: email.into(),
            password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn insert_returns_the_stored_row(db: PgPool) {
        let repo = PgUserRepository::new(db);
        let u = user("johndoe@gmail.com");

        let created = repo.create_user(&u).await.expect("insert");
        assert_eq!(created.id, u.id);
        assert_eq!(created.username, u.username);
        assert_eq!(created.email, u.email);
        assert_eq!(created.password_hash, u.password_hash);
        // timestamptz keeps microseconds only
        assert_eq!(created.created_at.unix_timestamp(), u.created_at.unix_timestamp());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn duplicate_email_is_conflict(db: PgPool) {
        let repo = PgUserRepository::new(db);
        repo.create_user(&user("dup@x.com")).await.expect("first insert");

        let err = repo.create_user(&user("dup@x.com")).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict), "{err:?}");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn finds_by_id_and_email(db: PgPool) {
        let repo = PgUserRepository::new(db);
        let u = user("find@x.com");
        repo.create_user(&u).await.unwrap();

        let by_id = repo.get_user_by_id(&u.id.to_string()).await.unwrap();
        assert_eq!(by_id.map(|found| found.email), Some(u.email.clone()));

        let by_email = repo.get_user_by_email("find@x.com").await.unwrap();
        assert_eq!(by_email.map(|found| found.id), Some(u.id));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn missing_rows_are_none(db: PgPool) {
        let repo = PgUserRepository::new(db);

        let by_id = repo.get_user_by_id(&Uuid::new_v4().to_string()).await.unwrap();
        assert!(by_id.is_none());
        let by_email = repo.get_user_by_email("nobody@x.com").await.unwrap();
        assert!(by_email.is_none());

        let err = repo.get_user_by_id("not-a-uuid").await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidId));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn concurrent_inserts_with_same_email_keep_one_row(db: PgPool) {
        let repo = Arc::new(PgUserRepository::new(db.clone()));
        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.create_user(&user("race@x.com")).await })
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in attempts {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(RepoError::Conflict) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((ok, conflicts), (1, 7));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = $1")
            .bind("race@x.com")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }
}
