use sqlx::FromRow;

use crate::password::Hasher;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub username: String,
    pub pwhash: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Cleaned sign-up details, the password still in plaintext.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Columns that must not repeat across users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
}

impl UniqueField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
        }
    }
}

impl User {
    /// Builds the record to be stored; nothing is persisted here.
    pub fn register(hasher: &Hasher, registration: Registration) -> Result<Self, ()> {
        let Registration {
            username,
            password,
            email,
            first_name,
            last_name,
        } = registration;

        Ok(Self {
            pwhash: hasher.hash(&password)?,
            username,
            email,
            first_name,
            last_name,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock;

    #[test]
    fn register_hashes_the_password() {
        let hasher = mock::hasher();
        let user = User::register(&hasher, mock::registration("alice", "pw1")).unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
        assert_ne!(user.pwhash, "pw1");
        assert_eq!(hasher.verify("pw1", &user.pwhash), Ok(true));
    }
}
