/// Why an identity was refused access to something it doesn't own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    Anonymous,
    WrongUser,
}

pub fn check(session_username: Option<&str>, owner: &str) -> Result<(), Denied> {
    match session_username {
        None => Err(Denied::Anonymous),
        Some(username) if username == owner => Ok(()),
        Some(_) => Err(Denied::WrongUser),
    }
}

pub fn is_authorized(session_username: Option<&str>, owner: &str) -> bool {
    check(session_username, owner).is_ok()
}
