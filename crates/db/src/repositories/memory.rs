use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::RwLock;
use uuid::Uuid;

use storytime_core::domain::event::{ActorFilter, DateWindow, Event, ItemCount, RareItem};
use storytime_core::domain::item::{Item, ItemId};
use storytime_core::domain::person::{Person, PersonId, PersonRole};

use super::{normalize_name, normalize_person_name, rare_item, LibraryRepository, RepositoryError};

#[derive(Default)]
struct Library {
    items: Vec<Item>,
    people: Vec<Person>,
    /// Insert order is kept; the index breaks same-date ties.
    events: Vec<Event>,
}

impl Library {
    fn follows_names(&self) -> Vec<&str> {
        self.people
            .iter()
            .filter(|person| person.is_follows())
            .map(|person| person.name.as_str())
            .collect()
    }
}

/// Process-local library used for development runs and tests.
#[derive(Default)]
pub struct InMemoryLibraryRepository {
    library: RwLock<Library>,
}

impl InMemoryLibraryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two children and two parents, no books.
    pub fn with_default_family() -> Self {
        let people = [
            ("Alice", PersonRole::Follows),
            ("Bob", PersonRole::Follows),
            ("Dad", PersonRole::Leads),
            ("Mom", PersonRole::Leads),
        ]
        .into_iter()
        .enumerate()
        .map(|(index, (name, role))| Person {
            id: PersonId(format!("PERSON-SEED-{}", index + 1)),
            name: name.to_string(),
            role,
        })
        .collect();

        Self { library: RwLock::new(Library { people, ..Library::default() }) }
    }
}

#[async_trait::async_trait]
impl LibraryRepository for InMemoryLibraryRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn create_item(&self, name: &str) -> Result<ItemId, RepositoryError> {
        let name = normalize_name(name)?;
        let mut library = self.library.write().await;
        if library.items.iter().any(|item| item.name == name) {
            return Err(RepositoryError::Conflict(format!("item `{name}` already exists")));
        }

        let id = ItemId(format!("ITEM-{}", Uuid::new_v4()));
        library.items.push(Item { id: id.clone(), name, readable: true });
        library.items.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(id)
    }

    async fn list_readable_items(&self) -> Result<Vec<Item>, RepositoryError> {
        let library = self.library.read().await;
        Ok(library.items.iter().filter(|item| item.readable).cloned().collect())
    }

    async fn list_people(&self) -> Result<Vec<Person>, RepositoryError> {
        let library = self.library.read().await;
        Ok(library.people.clone())
    }

    async fn add_person(&self, name: &str, role: PersonRole) -> Result<PersonId, RepositoryError> {
        let name = normalize_person_name(name)?;
        let mut library = self.library.write().await;
        if library.people.iter().any(|person| person.name == name) {
            return Err(RepositoryError::Conflict(format!("person `{name}` already exists")));
        }

        let id = PersonId(format!("PERSON-{}", Uuid::new_v4()));
        library.people.push(Person { id: id.clone(), name, role });
        library.people.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(id)
    }

    async fn create_event(
        &self,
        date: NaiveDate,
        item_name: &str,
        actor_name: &str,
    ) -> Result<(), RepositoryError> {
        let actor_name = normalize_name(actor_name)?;
        let mut library = self.library.write().await;
        if !library.items.iter().any(|item| item.name == item_name) {
            return Err(RepositoryError::NotFound(format!("item `{item_name}`")));
        }

        library.events.push(Event { date, item_name: item_name.to_string(), actor_name });
        Ok(())
    }

    async fn last_events(&self, limit: u32) -> Result<Vec<Event>, RepositoryError> {
        let library = self.library.read().await;
        let mut indexed: Vec<(usize, &Event)> = library.events.iter().enumerate().collect();
        indexed.sort_by_key(|(index, event)| (Reverse(event.date), Reverse(*index)));

        Ok(indexed.into_iter().take(limit as usize).map(|(_, event)| event.clone()).collect())
    }

    async fn ranked_items(
        &self,
        limit: u32,
        window: DateWindow,
        filter: &ActorFilter,
    ) -> Result<Vec<ItemCount>, RepositoryError> {
        let library = self.library.read().await;
        let follows = library.follows_names();

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for event in library.events.iter().filter(|event| window.contains(event.date)) {
            let counted = match filter {
                ActorFilter::AllFollows => follows.contains(&event.actor_name.as_str()),
                ActorFilter::Person(name) => event.actor_name == *name,
            };
            if counted {
                *counts.entry(event.item_name.as_str()).or_default() += 1;
            }
        }

        let mut ranked: Vec<ItemCount> = counts
            .into_iter()
            .map(|(item_name, count)| ItemCount { item_name: item_name.to_string(), count })
            .collect();
        ranked.sort_by(|left, right| {
            right.count.cmp(&left.count).then_with(|| left.item_name.cmp(&right.item_name))
        });
        ranked.truncate(limit as usize);
        Ok(ranked)
    }

    async fn rarely_read_items(
        &self,
        limit: u32,
        follows_only: bool,
        today: NaiveDate,
    ) -> Result<Vec<RareItem>, RepositoryError> {
        let library = self.library.read().await;
        let follows = library.follows_names();

        let mut rows: Vec<(String, Option<NaiveDate>)> = library
            .items
            .iter()
            .filter(|item| item.readable)
            .map(|item| {
                let last_date = library
                    .events
                    .iter()
                    .filter(|event| event.item_name == item.name)
                    .filter(|event| !follows_only || follows.contains(&event.actor_name.as_str()))
                    .map(|event| event.date)
                    .max();
                (item.name.clone(), last_date)
            })
            .collect();

        // `None` sorts before any date, which puts never-read items first.
        rows.sort_by(|left, right| left.1.cmp(&right.1).then_with(|| left.0.cmp(&right.0)));
        rows.truncate(limit as usize);

        Ok(rows.into_iter().map(|(name, last_date)| rare_item(name, last_date, today)).collect())
    }
}
