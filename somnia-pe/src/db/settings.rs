//! Reader preference persistence
//!
//! Key-value settings table access. Only two preferences exist: whether
//! auto-advance is enabled and the page layout orientation. They are read
//! once at session mount and written synchronously on every user-driven
//! change; no other session state is persisted.

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

/// Persisted preference: auto-advance to the next page when narration ends
pub const KEY_AUTO_ADVANCE: &str = "auto_advance_enabled";

/// Persisted preference: landscape (two-page) layout instead of portrait
pub const KEY_PAGE_LAYOUT_LANDSCAPE: &str = "page_layout_landscape";

const DEFAULT_AUTO_ADVANCE: bool = true;
const DEFAULT_PAGE_LAYOUT_LANDSCAPE: bool = false;

/// Store for the two persisted reader preferences
///
/// Backed by any sqlite pool; production uses the on-disk database, tests
/// an in-memory one.
#[derive(Clone)]
pub struct PreferenceStore {
    db: Pool<Sqlite>,
}

impl PreferenceStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// Auto-advance preference, writing the default on first read
    pub async fn auto_advance_enabled(&self) -> Result<bool> {
        match get_setting::<bool>(&self.db, KEY_AUTO_ADVANCE).await? {
            Some(enabled) => Ok(enabled),
            None => {
                set_setting(&self.db, KEY_AUTO_ADVANCE, DEFAULT_AUTO_ADVANCE).await?;
                Ok(DEFAULT_AUTO_ADVANCE)
            }
        }
    }

    pub async fn set_auto_advance_enabled(&self, enabled: bool) -> Result<()> {
        set_setting(&self.db, KEY_AUTO_ADVANCE, enabled).await
    }

    /// Page layout orientation preference, writing the default on first read
    pub async fn page_layout_landscape(&self) -> Result<bool> {
        match get_setting::<bool>(&self.db, KEY_PAGE_LAYOUT_LANDSCAPE).await? {
            Some(landscape) => Ok(landscape),
            None => {
                set_setting(
                    &self.db,
                    KEY_PAGE_LAYOUT_LANDSCAPE,
                    DEFAULT_PAGE_LAYOUT_LANDSCAPE,
                )
                .await?;
                Ok(DEFAULT_PAGE_LAYOUT_LANDSCAPE)
            }
        }
    }

    pub async fn set_page_layout_landscape(&self, landscape: bool) -> Result<()> {
        set_setting(&self.db, KEY_PAGE_LAYOUT_LANDSCAPE, landscape).await
    }
}

/// Generic setting getter
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates the setting.
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
