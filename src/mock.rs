use crate::backend::{self, SqlBackend};
use crate::password::Hasher;
use crate::site::Site;
use crate::user::Registration;

pub fn hasher() -> Hasher {
    Hasher::new(8, 1).unwrap()
}

pub fn registration(username: &str, password: &str) -> Registration {
    Registration {
        username: username.into(),
        password: password.into(),
        email: format!("{username}@example.com"),
        first_name: "First".into(),
        last_name: "Last".into(),
    }
}

pub async fn site() -> Site<SqlBackend> {
    Site::new(backend::create_db().await, hasher())
}
