use std::future::Future;

use crate::feedback::{Feedback, FeedbackId};
use crate::session::{Session, SessionId};
use crate::time::Timestamp;
use crate::user::{UniqueField, User};

mod backend_sql;
pub use backend_sql::SqlBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindError {
    NotFound,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    Taken(UniqueField),
    NotFound,
    Internal,
}

/// Storage for users, their feedback and their sessions.
///
/// Every write is atomic: it either lands completely or leaves
/// the store as it was.
pub trait Repository: Send + Sync {
    fn find_user(&self, username: &str) -> impl Future<Output = Result<User, FindError>> + Send;

    fn insert_user(&self, user: &User) -> impl Future<Output = Result<(), WriteError>> + Send;

    /// Removes the user, all of their feedback and every session logged in
    /// as them together, returning how many feedback items went with them.
    fn delete_user(&self, username: &str) -> impl Future<Output = Result<u64, WriteError>> + Send;

    fn feedback_for(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Vec<Feedback>, FindError>> + Send;

    fn find_feedback(
        &self,
        id: FeedbackId,
    ) -> impl Future<Output = Result<Feedback, FindError>> + Send;

    fn insert_feedback(
        &self,
        username: &str,
        title: &str,
        content: &str,
    ) -> impl Future<Output = Result<Feedback, WriteError>> + Send;

    fn update_feedback(
        &self,
        id: FeedbackId,
        title: &str,
        content: &str,
    ) -> impl Future<Output = Result<(), WriteError>> + Send;

    fn delete_feedback(
        &self,
        id: FeedbackId,
    ) -> impl Future<Output = Result<(), WriteError>> + Send;

    /// `NotFound` once the session has expired.
    fn find_session(
        &self,
        id: SessionId,
        now: Timestamp,
    ) -> impl Future<Output = Result<Session, FindError>> + Send;

    /// Inserts or replaces the session, identity and notices both.
    fn save_session(
        &self,
        id: SessionId,
        session: &Session,
        expires: Timestamp,
    ) -> impl Future<Output = Result<(), WriteError>> + Send;

    /// Deleting an unknown session is not an error.
    fn delete_session(&self, id: SessionId) -> impl Future<Output = Result<(), WriteError>> + Send;

    /// Drops every session that expired by `now`, returning how many.
    fn purge_sessions(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<u64, WriteError>> + Send;
}

#[cfg(test)]
pub use backend_sql::test::{create_db, session_count};
