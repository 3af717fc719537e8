//! Button payloads. Every inline button carries `prefix:value`; the prefix
//! picks the step that may consume it.

use storytime_core::dialog::ReportPeriod;
use storytime_core::domain::event::ActorFilter;
use thiserror::Error;

/// Date buttons offered by the log-event dialog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateChoice {
    /// Days before today; 0 is today.
    DaysAgo(u32),
    Custom,
}

impl DateChoice {
    pub const PRESETS: [(DateChoice, &'static str); 4] = [
        (DateChoice::DaysAgo(0), "Today"),
        (DateChoice::DaysAgo(1), "Yesterday"),
        (DateChoice::DaysAgo(2), "2 days ago"),
        (DateChoice::DaysAgo(3), "3 days ago"),
    ];

    fn parse(value: &str) -> Option<Self> {
        match value {
            "today" => Some(Self::DaysAgo(0)),
            "yesterday" => Some(Self::DaysAgo(1)),
            "2daysago" => Some(Self::DaysAgo(2)),
            "3daysago" => Some(Self::DaysAgo(3)),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    fn value(&self) -> String {
        match self {
            Self::DaysAgo(0) => "today".to_owned(),
            Self::DaysAgo(1) => "yesterday".to_owned(),
            Self::DaysAgo(days) => format!("{days}daysago"),
            Self::Custom => "custom".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    Date(DateChoice),
    /// Position in the readable-item list as it was rendered.
    Item(usize),
    Page(usize),
    Actor(String),
    Period(ReportPeriod),
    Filter(ActorFilter),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ButtonParseError {
    #[error("button payload `{0}` has no known prefix")]
    UnknownPrefix(String),
    #[error("button payload `{0}` has an invalid value")]
    InvalidValue(String),
}

impl ButtonAction {
    pub fn parse(payload: &str) -> Result<Self, ButtonParseError> {
        let invalid = || ButtonParseError::InvalidValue(payload.to_owned());
        let Some((prefix, value)) = payload.split_once(':') else {
            return Err(ButtonParseError::UnknownPrefix(payload.to_owned()));
        };

        match prefix {
            "date" => DateChoice::parse(value).map(Self::Date).ok_or_else(invalid),
            "item" => value.parse().map(Self::Item).map_err(|_| invalid()),
            "page" => value.parse().map(Self::Page).map_err(|_| invalid()),
            "actor" if !value.trim().is_empty() => Ok(Self::Actor(value.to_owned())),
            "actor" => Err(invalid()),
            "period" => ReportPeriod::from_payload(value).map(Self::Period).ok_or_else(invalid),
            "filter" => Ok(Self::Filter(ActorFilter::from_payload(value))),
            _ => Err(ButtonParseError::UnknownPrefix(payload.to_owned())),
        }
    }

    pub fn payload(&self) -> String {
        match self {
            Self::Date(choice) => format!("date:{}", choice.value()),
            Self::Item(index) => format!("item:{index}"),
            Self::Page(page) => format!("page:{page}"),
            Self::Actor(name) => format!("actor:{name}"),
            Self::Period(period) => format!("period:{}", period.payload()),
            Self::Filter(ActorFilter::AllFollows) => "filter:".to_owned(),
            Self::Filter(ActorFilter::Person(name)) => format!("filter:{name}"),
        }
    }
}
