use sqlx::FromRow;

pub type FeedbackId = i64;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Feedback {
    pub id: FeedbackId,
    pub title: String,
    pub content: String,
    /// owner
    pub username: String,
}
