use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use storytime_core::domain::event::{ActorFilter, DateWindow, Event, ItemCount, RareItem};
use storytime_core::domain::item::{Item, ItemId};
use storytime_core::domain::person::{Person, PersonId, PersonRole, MAX_NAME_BYTES};

pub mod library;
pub mod memory;

pub use library::SqlLibraryRepository;
pub use memory::InMemoryLibraryRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid value: {0}")]
    Invalid(String),
}

/// Storage for books, family members and reading sessions.
///
/// List operations return rows sorted by name so callers can index into them
/// and rely on a stable rotation order.
#[async_trait]
pub trait LibraryRepository: Send + Sync {
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Fails with [`RepositoryError::Conflict`] when the name is taken.
    async fn create_item(&self, name: &str) -> Result<ItemId, RepositoryError>;

    async fn list_readable_items(&self) -> Result<Vec<Item>, RepositoryError>;

    async fn list_people(&self) -> Result<Vec<Person>, RepositoryError>;

    /// Fails with [`RepositoryError::Invalid`] when the name is empty or too long.
    async fn add_person(&self, name: &str, role: PersonRole) -> Result<PersonId, RepositoryError>;

    /// Fails with [`RepositoryError::NotFound`] when no item has that name.
    async fn create_event(
        &self,
        date: NaiveDate,
        item_name: &str,
        actor_name: &str,
    ) -> Result<(), RepositoryError>;

    /// Newest date first; sessions on the same date newest insert first.
    async fn last_events(&self, limit: u32) -> Result<Vec<Event>, RepositoryError>;

    /// Read counts per item inside the inclusive window, highest first, ties by name.
    async fn ranked_items(
        &self,
        limit: u32,
        window: DateWindow,
        filter: &ActorFilter,
    ) -> Result<Vec<ItemCount>, RepositoryError>;

    /// Readable items nobody has read for the longest time. Never-read items
    /// come first. `days_since` is measured against `today`.
    async fn rarely_read_items(
        &self,
        limit: u32,
        follows_only: bool,
        today: NaiveDate,
    ) -> Result<Vec<RareItem>, RepositoryError>;
}

pub(crate) fn normalize_name(name: &str) -> Result<String, RepositoryError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RepositoryError::Invalid("name must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Person names also end up in button payloads, so they are length-capped.
pub(crate) fn normalize_person_name(name: &str) -> Result<String, RepositoryError> {
    let name = normalize_name(name)?;
    if name.len() > MAX_NAME_BYTES {
        return Err(RepositoryError::Invalid(format!(
            "person name must be at most {MAX_NAME_BYTES} bytes, got {}",
            name.len()
        )));
    }
    Ok(name)
}

pub(crate) fn rare_item(item_name: String, last_date: Option<NaiveDate>, today: NaiveDate) -> RareItem {
    let days_since = last_date.map(|date| (today - date).num_days());
    RareItem { item_name, last_date, days_since }
}
