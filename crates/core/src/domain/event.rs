use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One recorded reading session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub date: NaiveDate,
    pub item_name: String,
    pub actor_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCount {
    pub item_name: String,
    pub count: u32,
}

/// Readable item with the date it was last read, `None` when never read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RareItem {
    pub item_name: String,
    pub last_date: Option<NaiveDate>,
    pub days_since: Option<i64>,
}

/// Inclusive date range used by ranked queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorFilter {
    AllFollows,
    Person(String),
}

impl ActorFilter {
    pub fn from_payload(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Self::AllFollows
        } else {
            Self::Person(trimmed.to_owned())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::AllFollows => "All children",
            Self::Person(name) => name,
        }
    }
}
