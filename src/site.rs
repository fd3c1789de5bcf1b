use std::result;

use log::{error, info, warn};

use crate::auth::{self, Denied};
use crate::backend::{FindError, Repository, WriteError};
use crate::feedback::{Feedback, FeedbackId};
use crate::password::Hasher;
use crate::session::Session;
use crate::user::{Registration, UniqueField, User};

pub struct Site<R> {
    backend: R,
    hasher: Hasher,
}

/// Proof that the session owns `username`'s resources.
pub struct Authed<'s, R> {
    site: &'s Site<R>,
    username: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Internal,
    NotFound,
    /// no one is logged in
    Unauthorized,
    /// someone else is logged in
    Forbidden,
    Taken(UniqueField),
}

pub type Result<T> = result::Result<T, Error>;

impl From<Denied> for Error {
    fn from(denied: Denied) -> Self {
        match denied {
            Denied::Anonymous => Self::Unauthorized,
            Denied::WrongUser => Self::Forbidden,
        }
    }
}

impl From<FindError> for Error {
    fn from(e: FindError) -> Self {
        match e {
            FindError::NotFound => Self::NotFound,
            FindError::Internal => Self::Internal,
        }
    }
}

impl From<WriteError> for Error {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::Taken(field) => Self::Taken(field),
            WriteError::NotFound => Self::NotFound,
            WriteError::Internal => Self::Internal,
        }
    }
}

impl<R: Repository> Site<R> {
    pub fn new(backend: R, hasher: Hasher) -> Self {
        Self { backend, hasher }
    }

    pub async fn register(&self, registration: Registration) -> Result<User> {
        let user = User::register(&self.hasher, registration).map_err(|()| Error::Internal)?;
        let username = &user.username;

        self.backend.insert_user(&user).await.map_err(|e| {
            match e {
                WriteError::Taken(field) => {
                    info!("{username} registration: {} taken", field.name())
                }
                _ => error!("couldn't register {username}: {e:?}"),
            }
            Error::from(e)
        })?;

        info!("{username} registered");
        Ok(user)
    }

    /// `Ok(None)` for an unknown user or a wrong password.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>> {
        let user = match self.backend.find_user(username).await {
            Ok(user) => user,
            Err(FindError::NotFound) => {
                info!("rejecting non-existent user {username}");
                return Ok(None);
            }
            Err(e) => {
                error!("couldn't authenticate user {username}: {e:?}");
                return Err(e.into());
            }
        };

        if !self
            .hasher
            .verify(password, &user.pwhash)
            .map_err(|()| Error::Internal)?
        {
            info!("wrong password for user {username}");
            return Ok(None);
        }

        info!("{username} login");
        Ok(Some(user))
    }

    pub fn backend(&self) -> &R {
        &self.backend
    }

    pub async fn user(&self, username: &str) -> Result<User> {
        Ok(self.backend.find_user(username).await?)
    }

    pub async fn feedback(&self, id: FeedbackId) -> Result<Feedback> {
        Ok(self.backend.find_feedback(id).await?)
    }

    /// Grants access to `owner`'s resources if the session is logged in as `owner`.
    pub fn authorize(&self, session: &Session, owner: &str) -> Result<Authed<'_, R>> {
        match auth::check(session.username(), owner) {
            Ok(()) => Ok(Authed {
                site: self,
                username: owner.into(),
            }),
            Err(denied) => {
                warn!(
                    "denied access to {owner}'s resources: {denied:?} (session: {})",
                    session.username().unwrap_or("<anonymous>"),
                );
                Err(denied.into())
            }
        }
    }
}

impl<R: Repository> Authed<'_, R> {
    pub fn username(&self) -> &str {
        &self.username
    }

    fn owns(&self, fb: &Feedback) -> Result<()> {
        if auth::is_authorized(Some(self.username.as_str()), &fb.username) {
            Ok(())
        } else {
            error!(
                "{} tried to touch feedback {} owned by {}",
                self.username, fb.id, fb.username
            );
            Err(Error::Forbidden)
        }
    }

    pub async fn feedback(&self) -> Result<Vec<Feedback>> {
        Ok(self.site.backend.feedback_for(&self.username).await?)
    }

    pub async fn add_feedback(&self, title: &str, content: &str) -> Result<Feedback> {
        let username = &self.username;

        let fb = self
            .site
            .backend
            .insert_feedback(username, title, content)
            .await
            .map_err(|e| {
                error!("{username} couldn't add feedback: {e:?}");
                Error::from(e)
            })?;

        info!("{username} added feedback {}", fb.id);
        Ok(fb)
    }

    /// Replaces both title and content.
    pub async fn update_feedback(
        &self,
        fb: Feedback,
        title: &str,
        content: &str,
    ) -> Result<Feedback> {
        self.owns(&fb)?;
        let username = &self.username;

        self.site
            .backend
            .update_feedback(fb.id, title, content)
            .await
            .map_err(|e| {
                error!("{username} couldn't update feedback {}: {e:?}", fb.id);
                Error::from(e)
            })?;

        info!("{username} updated feedback {}", fb.id);
        Ok(Feedback {
            title: title.into(),
            content: content.into(),
            ..fb
        })
    }

    pub async fn delete_feedback(&self, fb: Feedback) -> Result<()> {
        self.owns(&fb)?;
        let username = &self.username;

        self.site
            .backend
            .delete_feedback(fb.id)
            .await
            .map_err(|e| {
                error!("{username} couldn't delete feedback {}: {e:?}", fb.id);
                Error::from(e)
            })?;

        info!("{username} deleted feedback {}", fb.id);
        Ok(())
    }

    /// Removes the account and every piece of its feedback, or nothing at all.
    pub async fn delete_account(self) -> Result<u64> {
        let username = &self.username;

        self.site.backend.delete_user(username).await.map_err(|e| {
            error!("couldn't delete {username}: {e:?}");
            Error::from(e)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock;

    fn session_for(username: Option<&str>) -> Session {
        let mut session = Session::default();
        if let Some(username) = username {
            session.login(username);
        }
        session
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let site = mock::site().await;

        for (username, password) in [("alice", "pw1"), ("bob", "hunter2"), ("c.d-e_f", "p w ☃")] {
            let user = site
                .register(mock::registration(username, password))
                .await
                .unwrap();
            assert_eq!(user.username, username);
            assert_ne!(user.pwhash, password);

            let found = site.authenticate(username, password).await.unwrap().unwrap();
            assert_eq!(found.username, username);

            let wrong = format!("{password}x");
            assert!(site.authenticate(username, &wrong).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn authenticate_unknown_user() {
        let site = mock::site().await;

        assert!(site.authenticate("nobody", "pw").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn register_duplicates() {
        let site = mock::site().await;
        site.register(mock::registration("alice", "pw1")).await.unwrap();

        let mut same_username = mock::registration("alice", "pw2");
        same_username.email = "someone.else@example.com".into();
        let again = site.register(same_username).await;
        assert_eq!(again.unwrap_err(), Error::Taken(UniqueField::Username));

        let mut same_email = mock::registration("bob", "pw2");
        same_email.email = "alice@example.com".into();
        let again = site.register(same_email).await;
        assert_eq!(again.unwrap_err(), Error::Taken(UniqueField::Email));

        // the original password still works, nothing was overwritten
        assert!(site.authenticate("alice", "pw1").await.unwrap().is_some());
        assert_eq!(site.user("bob").await.unwrap_err(), Error::NotFound);
    }

    #[tokio::test]
    async fn authorize() {
        let site = mock::site().await;

        assert_eq!(
            site.authorize(&session_for(None), "alice").err(),
            Some(Error::Unauthorized)
        );
        assert_eq!(
            site.authorize(&session_for(Some("bob")), "alice").err(),
            Some(Error::Forbidden)
        );

        let authed = site.authorize(&session_for(Some("alice")), "alice").unwrap();
        assert_eq!(authed.username(), "alice");
    }

    #[tokio::test]
    async fn only_the_owner_edits() {
        let site = mock::site().await;
        site.register(mock::registration("alice", "pw")).await.unwrap();
        site.register(mock::registration("bob", "pw")).await.unwrap();

        let alice = site.authorize(&session_for(Some("alice")), "alice").unwrap();
        let fb = alice.add_feedback("Hi", "Hello").await.unwrap();

        let bob = site.authorize(&session_for(Some("bob")), "bob").unwrap();
        assert_eq!(
            bob.update_feedback(fb.clone(), "Pwned", "!").await.unwrap_err(),
            Error::Forbidden
        );
        assert_eq!(
            bob.delete_feedback(fb.clone()).await.unwrap_err(),
            Error::Forbidden
        );
        assert_eq!(site.feedback(fb.id).await.unwrap(), fb);

        let edited = alice.update_feedback(fb.clone(), "Bye", "Goodbye").await.unwrap();
        assert_eq!(edited.id, fb.id);
        assert_eq!(site.feedback(fb.id).await.unwrap(), edited);

        alice.delete_feedback(edited).await.unwrap();
        assert_eq!(site.feedback(fb.id).await.unwrap_err(), Error::NotFound);
    }

    #[tokio::test]
    async fn delete_account_takes_feedback_along() {
        let site = mock::site().await;
        site.register(mock::registration("alice", "pw")).await.unwrap();

        let alice = site.authorize(&session_for(Some("alice")), "alice").unwrap();
        for i in 0..4 {
            alice.add_feedback(&format!("#{i}"), "text").await.unwrap();
        }
        assert_eq!(alice.feedback().await.unwrap().len(), 4);

        assert_eq!(alice.delete_account().await.unwrap(), 4);

        assert_eq!(site.user("alice").await.unwrap_err(), Error::NotFound);
        let alice = site.authorize(&session_for(Some("alice")), "alice").unwrap();
        assert!(alice.feedback().await.unwrap().is_empty());
    }
}
