use chrono::NaiveDate;
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use storytime_core::domain::event::{ActorFilter, DateWindow, Event, ItemCount, RareItem};
use storytime_core::domain::item::{Item, ItemId};
use storytime_core::domain::person::{Person, PersonId, PersonRole};

use super::{normalize_name, normalize_person_name, rare_item, LibraryRepository, RepositoryError};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqlLibraryRepository {
    pool: DbPool,
}

impl SqlLibraryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LibraryRepository for SqlLibraryRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_item(&self, name: &str) -> Result<ItemId, RepositoryError> {
        let name = normalize_name(name)?;
        let id = ItemId(format!("ITEM-{}", Uuid::new_v4()));

        sqlx::query("INSERT INTO item (id, name, readable) VALUES (?, ?, 1)")
            .bind(&id.0)
            .bind(&name)
            .execute(&self.pool)
            .await
            .map_err(|error| conflict_or_database(error, format!("item `{name}` already exists")))?;

        Ok(id)
    }

    async fn list_readable_items(&self) -> Result<Vec<Item>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, readable
             FROM item
             WHERE readable = 1
             ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(item_from_row).collect()
    }

    async fn list_people(&self) -> Result<Vec<Person>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, role
             FROM person
             ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(person_from_row).collect()
    }

    async fn add_person(&self, name: &str, role: PersonRole) -> Result<PersonId, RepositoryError> {
        let name = normalize_person_name(name)?;
        let id = PersonId(format!("PERSON-{}", Uuid::new_v4()));

        sqlx::query("INSERT INTO person (id, name, role) VALUES (?, ?, ?)")
            .bind(&id.0)
            .bind(&name)
            .bind(role.as_str())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                conflict_or_database(error, format!("person `{name}` already exists"))
            })?;

        Ok(id)
    }

    async fn create_event(
        &self,
        date: NaiveDate,
        item_name: &str,
        actor_name: &str,
    ) -> Result<(), RepositoryError> {
        let actor_name = normalize_name(actor_name)?;
        let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM item WHERE name = ?")
            .bind(item_name)
            .fetch_one(&self.pool)
            .await?;
        if known == 0 {
            return Err(RepositoryError::NotFound(format!("item `{item_name}`")));
        }

        sqlx::query("INSERT INTO event (event_date, item_name, actor_name) VALUES (?, ?, ?)")
            .bind(date.format(DATE_FORMAT).to_string())
            .bind(item_name)
            .bind(&actor_name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn last_events(&self, limit: u32) -> Result<Vec<Event>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT event_date, item_name, actor_name
             FROM event
             ORDER BY event_date DESC, id DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }

    async fn ranked_items(
        &self,
        limit: u32,
        window: DateWindow,
        filter: &ActorFilter,
    ) -> Result<Vec<ItemCount>, RepositoryError> {
        let start = window.start.format(DATE_FORMAT).to_string();
        let end = window.end.format(DATE_FORMAT).to_string();

        let rows = match filter {
            ActorFilter::AllFollows => {
                sqlx::query(
                    "SELECT e.item_name AS item_name, COUNT(*) AS read_count
                     FROM event e
                     JOIN person p ON p.name = e.actor_name AND p.role = 'follows'
                     WHERE e.event_date BETWEEN ? AND ?
                     GROUP BY e.item_name
                     ORDER BY read_count DESC, e.item_name ASC
                     LIMIT ?",
                )
                .bind(&start)
                .bind(&end)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            ActorFilter::Person(name) => {
                sqlx::query(
                    "SELECT item_name, COUNT(*) AS read_count
                     FROM event
                     WHERE event_date BETWEEN ? AND ? AND actor_name = ?
                     GROUP BY item_name
                     ORDER BY read_count DESC, item_name ASC
                     LIMIT ?",
                )
                .bind(&start)
                .bind(&end)
                .bind(name)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|row| -> Result<ItemCount, RepositoryError> {
                let count = row.try_get::<i64, _>("read_count")?;
                Ok(ItemCount {
                    item_name: row.try_get("item_name")?,
                    count: u32::try_from(count).map_err(|_| {
                        RepositoryError::Decode(format!("read count `{count}` out of range"))
                    })?,
                })
            })
            .collect()
    }

    async fn rarely_read_items(
        &self,
        limit: u32,
        follows_only: bool,
        today: NaiveDate,
    ) -> Result<Vec<RareItem>, RepositoryError> {
        let query = if follows_only {
            "SELECT i.name AS item_name, MAX(e.event_date) AS last_date
             FROM item i
             LEFT JOIN event e
                ON e.item_name = i.name
               AND e.actor_name IN (SELECT name FROM person WHERE role = 'follows')
             WHERE i.readable = 1
             GROUP BY i.name
             ORDER BY last_date IS NOT NULL, last_date ASC, i.name ASC
             LIMIT ?"
        } else {
            "SELECT i.name AS item_name, MAX(e.event_date) AS last_date
             FROM item i
             LEFT JOIN event e ON e.item_name = i.name
             WHERE i.readable = 1
             GROUP BY i.name
             ORDER BY last_date IS NOT NULL, last_date ASC, i.name ASC
             LIMIT ?"
        };

        let rows = sqlx::query(query).bind(i64::from(limit)).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| -> Result<RareItem, RepositoryError> {
                let item_name: String = row.try_get("item_name")?;
                let last_date = row
                    .try_get::<Option<String>, _>("last_date")?
                    .map(|raw| parse_date("last_date", &raw))
                    .transpose()?;
                Ok(rare_item(item_name, last_date, today))
            })
            .collect()
    }
}

fn conflict_or_database(error: sqlx::Error, message: String) -> RepositoryError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(message),
        _ => RepositoryError::Database(error),
    }
}

fn item_from_row(row: SqliteRow) -> Result<Item, RepositoryError> {
    Ok(Item {
        id: ItemId(row.try_get("id")?),
        name: row.try_get("name")?,
        readable: row.try_get::<i64, _>("readable")? != 0,
    })
}

fn person_from_row(row: SqliteRow) -> Result<Person, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = role_raw
        .parse::<PersonRole>()
        .map_err(|_| RepositoryError::Decode(format!("unknown person role `{role_raw}`")))?;

    Ok(Person { id: PersonId(row.try_get("id")?), name: row.try_get("name")?, role })
}

fn event_from_row(row: SqliteRow) -> Result<Event, RepositoryError> {
    let raw_date = row.try_get::<String, _>("event_date")?;
    Ok(Event {
        date: parse_date("event_date", &raw_date)?,
        item_name: row.try_get("item_name")?,
        actor_name: row.try_get("actor_name")?,
    })
}

fn parse_date(column: &str, raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|error| RepositoryError::Decode(format!("invalid {column} `{raw}`: {error}")))
}
