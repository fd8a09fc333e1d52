use crate::error::{AppError, Result};

/// The single place passwords are hashed and checked.
pub trait CredentialHasher: Clone + Send + Sync + 'static {
    fn hash(&self, password: &str) -> Result<String>;

    fn verify(&self, password: &str, hash: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl CredentialHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String> {
        bcrypt::hash(password, self.cost).map_err(|_| AppError::InternalError)
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        bcrypt::verify(password, hash)
            .map_err(|_| AppError::Authentication("Invalid password".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = BcryptHasher::new(4);
        let hash = hasher.hash("correct horse").unwrap();

        assert_ne!(hash, "correct horse");
        assert!(hasher.verify("correct horse", &hash).unwrap());
        assert!(!hasher.verify("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = BcryptHasher::new(4);
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn test_malformed_hash_is_auth_error() {
        let err = BcryptHasher::new(4).verify("pw", "not-a-hash").unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }
}
