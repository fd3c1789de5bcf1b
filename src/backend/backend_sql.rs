use std::future::Future;
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{query, query_as, Sqlite, Transaction};

use log::{error, info};

use super::{FindError, Repository, WriteError};
use crate::feedback::{Feedback, FeedbackId};
use crate::session::{Flash, Session, SessionId};
use crate::time::Timestamp;
use crate::user::{UniqueField, User};

pub struct SqlBackend(pub SqlitePool);

fn into_sql(path: &Path) -> PathBuf {
    path.join("feedback.sql")
}

impl SqlBackend {
    pub async fn open(data_dir: &Path) -> Result<Self, ()> {
        let path = into_sql(data_dir);
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            error!("couldn't open {}: {e}", path.display());
        })?;

        info!("Using {}", path.display());
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, ()> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                error!("migration: {e}");
            })?;

        Ok(Self(pool))
    }
}

impl SqlBackend {
    async fn transact<R, T, F>(&self, transaction: T) -> Result<R, WriteError>
    where
        T: FnOnce(Transaction<'static, Sqlite>) -> F,
        F: Future<Output = Result<(Transaction<'static, Sqlite>, R), WriteError>>,
    {
        let tx = self.0.begin().await.map_err(|e| {
            error!("error beginning transaction: {e:?}");
            WriteError::Internal
        })?;

        // an early return drops `tx`, rolling it back
        let (tx, r) = transaction(tx).await?;

        tx.commit().await.map_err(|e| {
            error!("error committing transaction: {e:?}");
            WriteError::Internal
        })?;

        Ok(r)
    }
}

fn find_error(e: sqlx::Error) -> FindError {
    if matches!(e, sqlx::Error::RowNotFound) {
        FindError::NotFound
    } else {
        error!("database read: {e}");
        FindError::Internal
    }
}

fn write_error(e: sqlx::Error) -> WriteError {
    if let sqlx::Error::Database(ref db_err) = e {
        let message = db_err.message();

        if db_err.is_unique_violation() || message.starts_with("UNIQUE constraint failed") {
            if message.contains("users.email") {
                return WriteError::Taken(UniqueField::Email);
            }
            if message.contains("users.username") {
                return WriteError::Taken(UniqueField::Username);
            }
        }
    }

    error!("database write: {e}");
    WriteError::Internal
}

impl Repository for SqlBackend {
    async fn find_user(&self, username: &str) -> Result<User, FindError> {
        query_as::<_, User>(
            "
            SELECT username, pwhash, email, first_name, last_name
            FROM users
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_one(&self.0)
        .await
        .map_err(find_error)
    }

    async fn insert_user(&self, user: &User) -> Result<(), WriteError> {
        self.transact(|mut tx| async move {
            query(
                "
                INSERT INTO users
                (username, pwhash, email, first_name, last_name)
                VALUES
                (?, ?, ?, ?, ?)
                ",
            )
            .bind(&user.username)
            .bind(&user.pwhash)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

            Ok((tx, ()))
        })
        .await
    }

    async fn delete_user(&self, username: &str) -> Result<u64, WriteError> {
        let removed = self
            .transact(|mut tx| async move {
                let feedback = query("DELETE FROM feedback WHERE username = ?")
                    .bind(username)
                    .execute(&mut *tx)
                    .await
                    .map_err(write_error)?
                    .rows_affected();

                query("DELETE FROM sessions WHERE username = ?")
                    .bind(username)
                    .execute(&mut *tx)
                    .await
                    .map_err(write_error)?;

                let users = query("DELETE FROM users WHERE username = ?")
                    .bind(username)
                    .execute(&mut *tx)
                    .await
                    .map_err(write_error)?
                    .rows_affected();

                if users == 0 {
                    return Err(WriteError::NotFound);
                }

                Ok((tx, feedback))
            })
            .await?;

        info!("{username} deleted, along with {removed} feedback");
        Ok(removed)
    }

    async fn feedback_for(&self, username: &str) -> Result<Vec<Feedback>, FindError> {
        query_as::<_, Feedback>(
            "
            SELECT id, title, content, username
            FROM feedback
            WHERE username = ?
            ORDER BY id
            ",
        )
        .bind(username)
        .fetch_all(&self.0)
        .await
        .map_err(find_error)
    }

    async fn find_feedback(&self, id: FeedbackId) -> Result<Feedback, FindError> {
        query_as::<_, Feedback>(
            "
            SELECT id, title, content, username
            FROM feedback
            WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_one(&self.0)
        .await
        .map_err(find_error)
    }

    async fn insert_feedback(
        &self,
        username: &str,
        title: &str,
        content: &str,
    ) -> Result<Feedback, WriteError> {
        let id = self
            .transact(|mut tx| async move {
                let id = query(
                    "
                    INSERT INTO feedback
                    (title, content, username)
                    VALUES
                    (?, ?, ?)
                    ",
                )
                .bind(title)
                .bind(content)
                .bind(username)
                .execute(&mut *tx)
                .await
                .map_err(write_error)?
                .last_insert_rowid();

                Ok((tx, id))
            })
            .await?;

        Ok(Feedback {
            id,
            title: title.into(),
            content: content.into(),
            username: username.into(),
        })
    }

    async fn update_feedback(
        &self,
        id: FeedbackId,
        title: &str,
        content: &str,
    ) -> Result<(), WriteError> {
        self.transact(|mut tx| async move {
            let updated = query(
                "
                UPDATE feedback
                SET title = ?, content = ?
                WHERE id = ?
                ",
            )
            .bind(title)
            .bind(content)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?
            .rows_affected();

            if updated == 0 {
                return Err(WriteError::NotFound);
            }

            Ok((tx, ()))
        })
        .await
    }

    async fn delete_feedback(&self, id: FeedbackId) -> Result<(), WriteError> {
        self.transact(|mut tx| async move {
            let deleted = query("DELETE FROM feedback WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(write_error)?
                .rows_affected();

            if deleted == 0 {
                return Err(WriteError::NotFound);
            }

            Ok((tx, ()))
        })
        .await
    }

    async fn find_session(&self, id: SessionId, now: Timestamp) -> Result<Session, FindError> {
        let id = id.to_string();

        let (username,) = query_as::<_, (Option<String>,)>(
            "
            SELECT username
            FROM sessions
            WHERE id = ? AND expires > ?
            ",
        )
        .bind(&id)
        .bind(now)
        .fetch_one(&self.0)
        .await
        .map_err(find_error)?;

        let flashes = query_as::<_, (String, String)>(
            "
            SELECT category, message
            FROM flashes
            WHERE session = ?
            ORDER BY id
            ",
        )
        .bind(&id)
        .fetch_all(&self.0)
        .await
        .map_err(find_error)?
        .into_iter()
        .map(|(category, message)| {
            let category = category.parse().map_err(|()| {
                error!("session {id}: unknown notice category {category:?}");
                FindError::Internal
            })?;
            Ok(Flash { category, message })
        })
        .collect::<Result<Vec<_>, FindError>>()?;

        Ok(Session::restore(username, flashes))
    }

    async fn save_session(
        &self,
        id: SessionId,
        session: &Session,
        expires: Timestamp,
    ) -> Result<(), WriteError> {
        let id = id.to_string();

        self.transact(|mut tx| async move {
            query(
                "
                INSERT INTO sessions
                (id, username, expires)
                VALUES
                (?, ?, ?)
                ON CONFLICT (id) DO UPDATE
                SET username = excluded.username, expires = excluded.expires
                ",
            )
            .bind(&id)
            .bind(session.username())
            .bind(expires)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

            query("DELETE FROM flashes WHERE session = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(write_error)?;

            for flash in session.flashes() {
                query(
                    "
                    INSERT INTO flashes
                    (session, category, message)
                    VALUES
                    (?, ?, ?)
                    ",
                )
                .bind(&id)
                .bind(flash.category.as_str())
                .bind(&flash.message)
                .execute(&mut *tx)
                .await
                .map_err(write_error)?;
            }

            Ok((tx, ()))
        })
        .await
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), WriteError> {
        let id = id.to_string();

        self.transact(|mut tx| async move {
            query("DELETE FROM sessions WHERE id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(write_error)?;

            Ok((tx, ()))
        })
        .await
    }

    async fn purge_sessions(&self, now: Timestamp) -> Result<u64, WriteError> {
        self.transact(|mut tx| async move {
            let purged = query("DELETE FROM sessions WHERE expires <= ?")
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(write_error)?
                .rows_affected();

            Ok((tx, purged))
        })
        .await
    }
}
