//! Per-user conversation state.
//!
//! Each multi-step command owns a variant holding exactly the values its later
//! steps read, so a step can never observe a missing field.

pub mod period;
pub mod store;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::event::DateWindow;

pub use period::{ReportPeriod, ResolvedPeriod};
pub use store::{ConversationStore, UserId};

/// The closed set of commands that run as dialogs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogCommand {
    RegisterItem,
    LogEvent,
    Report,
}

impl DialogCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterItem => "register_item",
            Self::LogEvent => "log_event",
            Self::Report => "report",
        }
    }
}

/// Where replies for a dialog go: the chat plus an optional forum thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySurface {
    pub chat_id: i64,
    pub thread_id: Option<i32>,
}

impl ReplySurface {
    pub fn new(chat_id: i64, thread_id: Option<i32>) -> Self {
        Self { chat_id, thread_id: thread_id.filter(|id| *id != 0) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterItemStep {
    AwaitingName,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogEventStep {
    /// `custom_entry` is set once the user picked "custom date" and free text is expected.
    AwaitingDate { custom_entry: bool },
    AwaitingItem { date: NaiveDate, page: usize },
    AwaitingActor { date: NaiveDate, item: String },
}

/// Free-text entry the report dialog is waiting for after a `period:month` or `period:year` click.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeriodEntry {
    Month,
    Year,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportStep {
    AwaitingPeriod { pending: Option<PeriodEntry> },
    AwaitingActorFilter { window: DateWindow, label: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dialog {
    RegisterItem(RegisterItemStep),
    LogEvent(LogEventStep),
    Report(ReportStep),
    /// The dialog finished and must be removed before anything else reads it.
    Completed(DialogCommand),
}

impl Dialog {
    pub const COMPLETED_STEP: i32 = -1;

    pub fn command(&self) -> DialogCommand {
        match self {
            Self::RegisterItem(_) => DialogCommand::RegisterItem,
            Self::LogEvent(_) => DialogCommand::LogEvent,
            Self::Report(_) => DialogCommand::Report,
            Self::Completed(command) => *command,
        }
    }

    /// Positive for in-progress steps, [`Dialog::COMPLETED_STEP`] once finished.
    pub fn step(&self) -> i32 {
        match self {
            Self::RegisterItem(RegisterItemStep::AwaitingName) => 1,
            Self::LogEvent(LogEventStep::AwaitingDate { .. }) => 1,
            Self::LogEvent(LogEventStep::AwaitingItem { .. }) => 2,
            Self::LogEvent(LogEventStep::AwaitingActor { .. }) => 3,
            Self::Report(ReportStep::AwaitingPeriod { .. }) => 1,
            Self::Report(ReportStep::AwaitingActorFilter { .. }) => 2,
            Self::Completed(_) => Self::COMPLETED_STEP,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn register_item() -> Self {
        Self::RegisterItem(RegisterItemStep::AwaitingName)
    }

    pub fn log_event() -> Self {
        Self::LogEvent(LogEventStep::AwaitingDate { custom_entry: false })
    }

    pub fn report() -> Self {
        Self::Report(ReportStep::AwaitingPeriod { pending: None })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationState {
    pub dialog: Dialog,
    pub surface: ReplySurface,
}

impl ConversationState {
    pub fn new(dialog: Dialog, surface: ReplySurface) -> Self {
        Self { dialog, surface }
    }

    pub fn command(&self) -> DialogCommand {
        self.dialog.command()
    }

    pub fn step(&self) -> i32 {
        self.dialog.step()
    }
}
