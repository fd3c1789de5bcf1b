use argon2::{
    password_hash::{
        self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use log::error;

/// Salted argon2id hashing. The cost only applies to new hashes,
/// stored hashes are verified with the parameters they carry.
pub struct Hasher(Argon2<'static>);

impl Hasher {
    pub fn new(memory_kib: u32, iterations: u32) -> Result<Self, argon2::Error> {
        let params = Params::new(memory_kib, iterations, 1, None)?;

        Ok(Self(Argon2::new(Algorithm::Argon2id, Version::V0x13, params)))
    }

    pub fn hash(&self, password: &str) -> Result<String, ()> {
        let salt = SaltString::generate(&mut OsRng);

        self.0
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!("couldn't hash password: {e}");
            })
    }

    /// `Ok(false)` for a wrong password, `Err` only if the stored hash is unusable.
    pub fn verify(&self, password: &str, pwhash: &str) -> Result<bool, ()> {
        let parsed = PasswordHash::new(pwhash).map_err(|e| {
            error!("invalid stored password hash: {e}");
        })?;

        match self.0.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => {
                error!("couldn't verify password: {e}");
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hasher() -> Hasher {
        Hasher::new(8, 1).unwrap()
    }

    #[test]
    fn hash_is_not_the_password() {
        let hash = hasher().hash("pw1").unwrap();

        assert_ne!(hash, "pw1");
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = hasher();

        assert_ne!(hasher.hash("pw1").unwrap(), hasher.hash("pw1").unwrap());
    }

    #[test]
    fn verify() {
        let hasher = hasher();
        let hash = hasher.hash("correct horse").unwrap();

        assert_eq!(hasher.verify("correct horse", &hash), Ok(true));
        assert_eq!(hasher.verify("correct horse ", &hash), Ok(false));
        assert_eq!(hasher.verify("", &hash), Ok(false));
    }

    #[test]
    fn verify_survives_cost_change() {
        let hash = hasher().hash("pw").unwrap();
        let stronger = Hasher::new(16, 2).unwrap();

        assert_eq!(stronger.verify("pw", &hash), Ok(true));
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert_eq!(hasher().verify("pw", "not a hash"), Err(()));
    }

    #[test]
    fn rejects_tiny_memory_cost() {
        assert!(Hasher::new(1, 1).is_err());
    }
}
