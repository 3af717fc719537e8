//! Top-level `/command` tokens and the one-shot commands that answer in a
//! single message.

use std::fmt::Write as _;

use storytime_core::dialog::DialogCommand;
use storytime_core::domain::event::RareItem;
use storytime_core::rotation::next_actor;
use tracing::info;

use crate::flows::{FlowContext, FlowError};
use crate::keyboard::OutboundMessage;

pub const HELP_TEXT: &str = "Welcome to the Home Library Bot!

Available commands:
/new_book - Register a new book
/read - Record a reading event
/who_is_next - See who should read next
/last - Show last 10 reading events
/stats - View reading statistics
/rare - Show rarely read books";

pub const UNKNOWN_HINT: &str = "Unknown command. Use /start to see available commands.";
pub const IDLE_HINT: &str = "Use /start to see available commands.";

const LAST_LIMIT: u32 = 10;
const RARE_LIMIT: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Dialog(DialogCommand),
    WhoIsNext,
    Last,
    Rare,
    Unknown(String),
}

impl BotCommand {
    /// Returns `None` when `text` is not a command token at all.
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?.strip_prefix('/')?;
        let name = token.split_once('@').map_or(token, |(name, _bot)| name);

        Some(match name {
            "start" | "help" => Self::Start,
            "new_book" => Self::Dialog(DialogCommand::RegisterItem),
            "read" => Self::Dialog(DialogCommand::LogEvent),
            "stats" => Self::Dialog(DialogCommand::Report),
            "who_is_next" => Self::WhoIsNext,
            "last" => Self::Last,
            "rare" => Self::Rare,
            other => Self::Unknown(other.to_owned()),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Dialog(command) => command.as_str(),
            Self::WhoIsNext => "who_is_next",
            Self::Last => "last",
            Self::Rare => "rare",
            Self::Unknown(name) => name,
        }
    }
}

/// Runs a command that needs no dialog. Dialog commands are routed through
/// `flows::start` by the dispatcher instead.
pub async fn run_one_shot(
    ctx: &FlowContext<'_>,
    command: &BotCommand,
) -> Result<Vec<OutboundMessage>, FlowError> {
    let reply = match command {
        BotCommand::Start => ctx.text(HELP_TEXT),
        BotCommand::WhoIsNext => who_is_next(ctx).await?,
        BotCommand::Last => last(ctx).await?,
        BotCommand::Rare => rare(ctx).await?,
        BotCommand::Unknown(_) | BotCommand::Dialog(_) => ctx.text(UNKNOWN_HINT),
    };
    Ok(vec![reply])
}

async fn who_is_next(ctx: &FlowContext<'_>) -> Result<OutboundMessage, FlowError> {
    let people = ctx.repo.list_people().await?;
    if people.is_empty() {
        return Ok(ctx.text("No participants found in database"));
    }

    let last_events = ctx.repo.last_events(1).await?;
    let last_actor = last_events.first().map(|event| event.actor_name.as_str()).unwrap_or("");

    Ok(match next_actor(&people, last_actor) {
        Some(next) => {
            info!(
                event_name = "rotation.next_actor.computed",
                last_actor = %last_actor,
                next_actor = %next,
                "computed next reader"
            );
            ctx.text(format!("Next to read: {next}"))
        }
        None => ctx.text("No child participants found in database"),
    })
}

async fn last(ctx: &FlowContext<'_>) -> Result<OutboundMessage, FlowError> {
    let events = ctx.repo.last_events(LAST_LIMIT).await?;
    if events.is_empty() {
        return Ok(ctx.text("No reading events recorded yet."));
    }

    let mut text = String::from("Last reading events:\n\n");
    for (index, event) in events.iter().enumerate() {
        let _ = writeln!(
            text,
            "{}. {} - {} ({})",
            index + 1,
            event.date.format("%Y-%m-%d"),
            event.item_name,
            event.actor_name
        );
    }
    Ok(ctx.text(text))
}

async fn rare(ctx: &FlowContext<'_>) -> Result<OutboundMessage, FlowError> {
    let today = ctx.clock.today();
    let by_follows = ctx.repo.rarely_read_items(RARE_LIMIT, true, today).await?;
    let overall = ctx.repo.rarely_read_items(RARE_LIMIT, false, today).await?;

    let mut text = String::from("Rarely read books:\n\n");
    text.push_str("By children's choice:\n");
    push_rare_section(&mut text, &by_follows);
    text.push_str("\nOverall (all participants):\n");
    push_rare_section(&mut text, &overall);
    Ok(ctx.text(text))
}

fn push_rare_section(text: &mut String, items: &[RareItem]) {
    if items.is_empty() {
        text.push_str("No data available\n");
        return;
    }
    for (index, item) in items.iter().enumerate() {
        let _ = match (item.last_date, item.days_since) {
            (Some(last), Some(days)) => writeln!(
                text,
                "{}. {} ({days} days ago, last: {})",
                index + 1,
                item.item_name,
                last.format("%Y-%m-%d")
            ),
            _ => writeln!(text, "{}. {} (never read)", index + 1, item.item_name),
        };
    }
}
