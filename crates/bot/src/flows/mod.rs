//! Step machines for the multi-step commands.
//!
//! A step handler takes the current dialog and one input and returns the next
//! dialog plus the replies to send. Handlers never touch the conversation
//! store; the dispatcher persists whatever they return.

pub mod log_event;
pub mod register_item;
pub mod report;

use storytime_core::clock::Clock;
use storytime_core::dialog::{Dialog, DialogCommand, ReplySurface};
use storytime_db::{LibraryRepository, RepositoryError};
use thiserror::Error;

use crate::callbacks::ButtonAction;
use crate::keyboard::{text_message, OutboundMessage};

pub struct FlowContext<'a> {
    pub repo: &'a dyn LibraryRepository,
    pub clock: &'a dyn Clock,
    pub surface: ReplySurface,
}

impl FlowContext<'_> {
    pub fn text(&self, text: impl Into<String>) -> OutboundMessage {
        text_message(self.surface, text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepInput<'a> {
    Text(&'a str),
    Button(&'a ButtonAction),
}

#[derive(Debug)]
pub struct StepOutcome {
    pub dialog: Dialog,
    pub replies: Vec<OutboundMessage>,
}

impl StepOutcome {
    pub fn next(dialog: Dialog, reply: OutboundMessage) -> Self {
        Self { dialog, replies: vec![reply] }
    }

    pub fn complete(command: DialogCommand, reply: OutboundMessage) -> Self {
        Self { dialog: Dialog::Completed(command), replies: vec![reply] }
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Store(#[from] RepositoryError),
    /// The button belongs to another command or an earlier step.
    #[error("button does not belong to the active {command} step {step}")]
    InactiveButton { command: &'static str, step: i32 },
}

impl FlowError {
    pub fn inactive(dialog: &Dialog) -> Self {
        Self::InactiveButton { command: dialog.command().as_str(), step: dialog.step() }
    }
}

/// Entry point of a dialog command. The returned dialog may already be
/// completed when there is nothing to ask.
pub async fn start(
    ctx: &FlowContext<'_>,
    command: DialogCommand,
) -> Result<StepOutcome, FlowError> {
    match command {
        DialogCommand::RegisterItem => Ok(register_item::start(ctx)),
        DialogCommand::LogEvent => log_event::start(ctx).await,
        DialogCommand::Report => Ok(report::start(ctx)),
    }
}

pub async fn advance(
    ctx: &FlowContext<'_>,
    dialog: Dialog,
    input: StepInput<'_>,
) -> Result<StepOutcome, FlowError> {
    match dialog {
        Dialog::RegisterItem(step) => register_item::advance(ctx, step, input).await,
        Dialog::LogEvent(step) => log_event::advance(ctx, step, input).await,
        Dialog::Report(step) => report::advance(ctx, step, input).await,
        Dialog::Completed(command) => {
            Ok(StepOutcome { dialog: Dialog::Completed(command), replies: Vec::new() })
        }
    }
}
