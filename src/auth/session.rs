use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::Result;
use crate::user::{Role, User};

/// The signed-in user, passed explicitly into every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: Uuid,
    pub role: Role,
    pub username: String,
}

impl From<&User> for Session {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            username: user.username.clone(),
        }
    }
}

/// Where the current session survives restarts.
pub trait SessionStore: Clone + Send + Sync + 'static {
    fn load(&self) -> impl Future<Output = Result<Option<Session>>> + Send;

    fn save(&self, session: &Session) -> impl Future<Output = Result<()>> + Send;

    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Keeps the session as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<Session>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let path = std::env::temp_dir().join(format!("session-{}.json", Uuid::new_v4()));
        let store = FileSessionStore::new(&path);
        let session = Session {
            user_id: Uuid::new_v4(),
            role: Role::Teacher,
            username: "jdoe".to_string(),
        };

        assert_eq!(store.load().await.unwrap(), None);

        store.save(&session).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(session));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        // Clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let path = std::env::temp_dir().join(format!("session-{}.json", Uuid::new_v4()));
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = FileSessionStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, crate::error::AppError::Serialization(_)));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
