use estate_moderation::config::{StoreConfig, StoreKind};
use estate_moderation::moderation::{MemoryStore, ModerationStore, Role, SqliteStore, StoreError};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Backend chosen at startup; handlers and commands only see the trait object.
pub(crate) type SharedStore = Arc<dyn ModerationStore>;

pub(crate) fn open_store(config: &StoreConfig) -> Result<SharedStore, StoreError> {
    match config.kind {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::default())),
        StoreKind::Sqlite => {
            let store = SqliteStore::open(&config.sqlite_path, config.busy_timeout())?;
            Ok(Arc::new(store))
        }
    }
}

pub(crate) fn parse_role(raw: &str) -> Result<Role, String> {
    Role::from_label(&raw.trim().to_ascii_lowercase())
        .ok_or_else(|| format!("unknown role '{raw}' (expected 'user' or 'admin')"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use estate_moderation::moderation::store::UserDirectory;
    use estate_moderation::moderation::{UserAccount, UserId};
    use std::path::PathBuf;

    #[test]
    fn parse_role_accepts_known_labels() {
        assert_eq!(parse_role("admin"), Ok(Role::Admin));
        assert_eq!(parse_role(" User "), Ok(Role::User));
        assert!(parse_role("owner").is_err());
    }

    #[test]
    fn memory_backend_starts_empty() {
        let config = StoreConfig {
            kind: StoreKind::Memory,
            sqlite_path: PathBuf::from("unused.db"),
            busy_timeout_ms: 100,
            read_attempts: 1,
        };
        let store = open_store(&config).expect("memory store opens");
        assert!(store.admin_ids().expect("admin ids").is_empty());

        store
            .upsert_user(UserAccount::new("a1", "Support Desk", Role::Admin))
            .expect("user stored");
        assert_eq!(
            store.admin_ids().expect("admin ids"),
            vec![UserId::new("a1")]
        );
    }
}
