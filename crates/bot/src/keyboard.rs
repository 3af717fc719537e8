use serde::Serialize;
use storytime_core::dialog::{ReplySurface, ReportPeriod};
use storytime_core::domain::event::ActorFilter;
use storytime_core::domain::item::Item;
use storytime_core::domain::person::Person;

use crate::callbacks::{ButtonAction, DateChoice};

pub const ITEMS_PER_PAGE: usize = 20;
/// Bot API limit for `callback_data`, in bytes.
pub const CALLBACK_DATA_LIMIT: usize = 64;
const ITEM_COLUMNS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, action: &ButtonAction) -> Self {
        Self { text: text.into(), callback_data: action.payload() }
    }
}

/// Inline keyboard in the Bot API shape: rows of buttons.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Keyboard {
    pub inline_keyboard: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.inline_keyboard.iter().flatten()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub surface: ReplySurface,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

pub struct MessageBuilder {
    surface: ReplySurface,
    text: String,
    rows: Vec<Vec<Button>>,
}

impl MessageBuilder {
    pub fn new(surface: ReplySurface, text: impl Into<String>) -> Self {
        Self { surface, text: text.into(), rows: Vec::new() }
    }

    pub fn row<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut RowBuilder),
    {
        let mut builder = RowBuilder::default();
        build(&mut builder);
        if !builder.buttons.is_empty() {
            self.rows.push(builder.buttons);
        }
        self
    }

    /// Lays buttons out left to right, `columns` per row.
    pub fn grid(mut self, buttons: Vec<Button>, columns: usize) -> Self {
        let mut buttons = buttons.into_iter().peekable();
        while buttons.peek().is_some() {
            self.rows.push(buttons.by_ref().take(columns.max(1)).collect());
        }
        self
    }

    pub fn build(self) -> OutboundMessage {
        let keyboard =
            (!self.rows.is_empty()).then_some(Keyboard { inline_keyboard: self.rows });
        OutboundMessage { surface: self.surface, text: self.text, keyboard }
    }
}

#[derive(Default)]
pub struct RowBuilder {
    buttons: Vec<Button>,
}

impl RowBuilder {
    pub fn button(&mut self, text: impl Into<String>, action: ButtonAction) -> &mut Self {
        self.buttons.push(Button::new(text, &action));
        self
    }
}

pub fn text_message(surface: ReplySurface, text: impl Into<String>) -> OutboundMessage {
    MessageBuilder::new(surface, text).build()
}

pub fn date_picker(surface: ReplySurface) -> OutboundMessage {
    let [today, yesterday, two, three] = DateChoice::PRESETS;
    MessageBuilder::new(surface, "Select the reading date:")
        .row(|row| {
            row.button(today.1, ButtonAction::Date(today.0))
                .button(yesterday.1, ButtonAction::Date(yesterday.0));
        })
        .row(|row| {
            row.button(two.1, ButtonAction::Date(two.0))
                .button(three.1, ButtonAction::Date(three.0));
        })
        .row(|row| {
            row.button("Custom date", ButtonAction::Date(DateChoice::Custom));
        })
        .build()
}

pub fn page_count(item_count: usize) -> usize {
    item_count.div_ceil(ITEMS_PER_PAGE).max(1)
}

/// One page of the book grid. Buttons carry the absolute index into `items`.
pub fn item_grid(surface: ReplySurface, text: &str, items: &[Item], page: usize) -> OutboundMessage {
    let pages = page_count(items.len());
    let page = page.min(pages - 1);
    let start = page * ITEMS_PER_PAGE;

    let buttons = items
        .iter()
        .enumerate()
        .skip(start)
        .take(ITEMS_PER_PAGE)
        .map(|(index, item)| Button::new(item.name.clone(), &ButtonAction::Item(index)))
        .collect();

    let heading = if pages > 1 { format!("{text} (page {}/{pages})", page + 1) } else { text.to_owned() };
    MessageBuilder::new(surface, heading)
        .grid(buttons, ITEM_COLUMNS)
        .row(|row| {
            if page > 0 {
                row.button("« Previous", ButtonAction::Page(page - 1));
            }
            if page + 1 < pages {
                row.button("Next »", ButtonAction::Page(page + 1));
            }
        })
        .build()
}

pub fn actor_picker(surface: ReplySurface, people: &[Person]) -> OutboundMessage {
    let mut builder = MessageBuilder::new(surface, "Who read?");
    for person in people {
        let label = if person.is_follows() {
            person.name.clone()
        } else {
            format!("{} (parent)", person.name)
        };
        builder = builder.row(|row| {
            row.button(label, ButtonAction::Actor(person.name.clone()));
        });
    }
    builder.build()
}

pub fn period_picker(surface: ReplySurface) -> OutboundMessage {
    MessageBuilder::new(surface, "Select the period for statistics:")
        .row(|row| {
            row.button("Specific month", ButtonAction::Period(ReportPeriod::SpecificMonth))
                .button("Calendar year", ButtonAction::Period(ReportPeriod::SpecificYear));
        })
        .row(|row| {
            row.button("Last 2 months", ButtonAction::Period(ReportPeriod::LastMonths(2)))
                .button("Last 3 months", ButtonAction::Period(ReportPeriod::LastMonths(3)));
        })
        .row(|row| {
            row.button("Last 6 months", ButtonAction::Period(ReportPeriod::LastMonths(6)))
                .button("Last 12 months", ButtonAction::Period(ReportPeriod::LastMonths(12)));
        })
        .build()
}

pub fn filter_picker(surface: ReplySurface, people: &[Person]) -> OutboundMessage {
    let mut builder = MessageBuilder::new(surface, "Select participant:").row(|row| {
        row.button(ActorFilter::AllFollows.label(), ButtonAction::Filter(ActorFilter::AllFollows));
    });
    for person in people.iter().filter(|person| person.is_follows()) {
        builder = builder.row(|row| {
            row.button(
                person.name.clone(),
                ButtonAction::Filter(ActorFilter::Person(person.name.clone())),
            );
        });
    }
    builder.build()
}
