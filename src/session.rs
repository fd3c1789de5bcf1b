use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::{error, trace};
use uuid::Uuid;

use crate::backend::{FindError, Repository};
use crate::time::Timestamp;

/// Idle time after which a session without a login is forgotten.
pub const ANONYMOUS_LIFETIME: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for SessionId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s).map(Self).map_err(|_| ())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Success,
    Error,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub category: Category,
    pub message: String,
}

/// Per-connection state: who is logged in, plus notices waiting to be shown.
#[derive(Debug, Default, Clone)]
pub struct Session {
    username: Option<String>,
    flashes: Vec<Flash>,
}

impl Session {
    pub fn restore(username: Option<String>, flashes: Vec<Flash>) -> Self {
        Self { username, flashes }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Replaces any previous identity.
    pub fn login(&mut self, username: &str) {
        self.username = Some(username.into());
    }

    pub fn logout(&mut self) {
        self.username = None;
    }

    pub fn flash(&mut self, category: Category, message: impl Into<String>) {
        self.flashes.push(Flash {
            category,
            message: message.into(),
        });
    }

    pub fn flashes(&self) -> &[Flash] {
        &self.flashes
    }

    pub fn take_flashes(&mut self) -> Vec<Flash> {
        std::mem::take(&mut self.flashes)
    }

    fn is_empty(&self) -> bool {
        self.username.is_none() && self.flashes.is_empty()
    }
}

/// Keeps sessions in the repository, expiring idle ones.
pub struct Sessions {
    login_lifetime: Duration,
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new(Duration::from_secs(14 * 24 * 60 * 60))
    }
}

impl Sessions {
    pub fn new(login_lifetime: Duration) -> Self {
        Self { login_lifetime }
    }

    fn lifetime(&self, session: &Session) -> Duration {
        if session.username.is_some() {
            self.login_lifetime
        } else {
            ANONYMOUS_LIFETIME
        }
    }

    /// Unknown, expired or missing ids get a fresh id and an anonymous session.
    pub async fn load<R: Repository>(
        &self,
        repo: &R,
        id: Option<SessionId>,
    ) -> (SessionId, Session) {
        match Timestamp::now() {
            Ok(now) => self.load_at(repo, id, now).await,
            Err(()) => fresh(),
        }
    }

    async fn load_at<R: Repository>(
        &self,
        repo: &R,
        id: Option<SessionId>,
        now: Timestamp,
    ) -> (SessionId, Session) {
        if let Some(id) = id {
            match repo.find_session(id, now).await {
                Ok(session) => return (id, session),
                Err(FindError::NotFound) => trace!("session {id} unknown or expired"),
                Err(FindError::Internal) => {}
            }
        }

        fresh()
    }

    /// Writes `session` back under `id`. `replaces` is an id the session was
    /// known by earlier in the request, which stops resolving.
    pub async fn store<R: Repository>(
        &self,
        repo: &R,
        id: SessionId,
        session: &Session,
        replaces: Option<SessionId>,
    ) {
        if let Ok(now) = Timestamp::now() {
            self.store_at(repo, id, session, replaces, now).await;
        }
    }

    async fn store_at<R: Repository>(
        &self,
        repo: &R,
        id: SessionId,
        session: &Session,
        replaces: Option<SessionId>,
        now: Timestamp,
    ) {
        if let Some(old) = replaces {
            if let Err(e) = repo.delete_session(old).await {
                error!("couldn't drop replaced session {old}: {e:?}");
            }
        }

        let result = if session.is_empty() {
            repo.delete_session(id).await
        } else {
            let expires = now.after(self.lifetime(session));
            trace!("session {id} kept until {expires}");
            repo.save_session(id, session, expires).await
        };
        if let Err(e) = result {
            error!("couldn't store session {id}: {e:?}");
        }

        match repo.purge_sessions(now).await {
            Ok(0) => {}
            Ok(n) => trace!("expired {n} sessions"),
            Err(e) => error!("couldn't expire sessions: {e:?}"),
        }
    }
}

fn fresh() -> (SessionId, Session) {
    let id = SessionId::new();
    trace!("new session {id}");
    (id, Session::default())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::{create_db, session_count};

    #[test]
    fn session_id_round_trips_through_cookie_text() {
        let id = SessionId::new();

        assert_eq!(id.to_string().parse::<SessionId>(), Ok(id));
        assert_eq!("nonsense".parse::<SessionId>(), Err(()));
    }

    #[test]
    fn category_names() {
        for category in [Category::Success, Category::Error] {
            assert_eq!(category.as_str().parse(), Ok(category));
        }
        assert_eq!("warning".parse::<Category>(), Err(()));
    }

    #[test]
    fn one_identity_at_a_time() {
        let mut session = Session::default();
        assert_eq!(session.username(), None);

        session.login("alice");
        session.login("bob");
        assert_eq!(session.username(), Some("bob"));

        session.logout();
        assert_eq!(session.username(), None);

        // logging out twice is harmless
        session.logout();
        assert_eq!(session.username(), None);
    }

    #[test]
    fn flashes_are_drained() {
        let mut session = Session::default();
        session.flash(Category::Success, "one");
        session.flash(Category::Error, "two");

        let flashes = session.take_flashes();
        assert_eq!(flashes.len(), 2);
        assert_eq!(flashes[1].category, Category::Error);
        assert_eq!(flashes[1].message, "two");

        assert!(session.take_flashes().is_empty());
    }

    fn anonymous_with_notice() -> Session {
        let mut session = Session::default();
        session.flash(Category::Success, "You are logged out.");
        session
    }

    #[tokio::test]
    async fn store_and_load() {
        let db = create_db().await;
        let sessions = Sessions::default();

        let (id, mut session) = sessions.load(&db, None).await;
        session.flash(Category::Error, "first");
        session.flash(Category::Success, "second");
        sessions.store(&db, id, &session, None).await;

        let (again, mut loaded) = sessions.load(&db, Some(id)).await;
        assert_eq!(again, id);
        assert_eq!(loaded.username(), None);
        assert_eq!(loaded.take_flashes(), session.take_flashes());
    }

    #[tokio::test]
    async fn unknown_id_is_replaced() {
        let db = create_db().await;
        let sessions = Sessions::default();
        let stale = SessionId::new();

        let (id, session) = sessions.load(&db, Some(stale)).await;
        assert_ne!(id, stale);
        assert_eq!(session.username(), None);
    }

    #[tokio::test]
    async fn empty_sessions_are_dropped() {
        let db = create_db().await;
        let sessions = Sessions::default();

        let (id, mut session) = sessions.load(&db, None).await;
        session.flash(Category::Success, "hi");
        sessions.store(&db, id, &session, None).await;
        assert_eq!(session_count(&db).await, 1);

        session.take_flashes();
        sessions.store(&db, id, &session, None).await;
        assert_eq!(session_count(&db).await, 0);

        let (fresh, _) = sessions.load(&db, Some(id)).await;
        assert_ne!(fresh, id);
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let db = create_db().await;
        let sessions = Sessions::new(ANONYMOUS_LIFETIME * 24);
        let t0 = Timestamp::now().unwrap();
        let later = t0.after(ANONYMOUS_LIFETIME);

        let anon = SessionId::new();
        sessions
            .store_at(&db, anon, &anonymous_with_notice(), None, t0)
            .await;

        let (id, _) = sessions.load_at(&db, Some(anon), later).await;
        assert_ne!(id, anon);

        // an abandoned anonymous session is cleared out by later traffic
        sessions
            .store_at(&db, SessionId::new(), &anonymous_with_notice(), None, later)
            .await;
        assert_eq!(session_count(&db).await, 1);
    }

    #[tokio::test]
    async fn replaced_ids_stop_resolving() {
        let db = create_db().await;
        let sessions = Sessions::default();

        let (old, _) = sessions.load(&db, None).await;
        let session = anonymous_with_notice();
        sessions.store(&db, old, &session, None).await;
        assert_eq!(sessions.load(&db, Some(old)).await.0, old);

        let new = SessionId::new();
        sessions.store(&db, new, &session, Some(old)).await;

        assert_ne!(sessions.load(&db, Some(old)).await.0, old);
        assert_eq!(sessions.load(&db, Some(new)).await.0, new);
    }
}
