use chrono::{Days, NaiveDate};
use storytime_core::dialog::period::parse_exact_date;
use storytime_core::dialog::{Dialog, DialogCommand, LogEventStep};
use storytime_core::domain::person::find_person;
use tracing::{info, warn};

use super::{FlowContext, FlowError, StepInput, StepOutcome};
use crate::callbacks::{ButtonAction, DateChoice};
use crate::keyboard::{actor_picker, date_picker, item_grid, page_count};

const NO_ITEMS: &str = "No readable books available. Please add books first with /new_book";
const NO_PEOPLE: &str = "No participants found in database";
const SELECT_ITEM: &str = "Select a book:";

pub async fn start(ctx: &FlowContext<'_>) -> Result<StepOutcome, FlowError> {
    if ctx.repo.list_readable_items().await?.is_empty() {
        return Ok(StepOutcome::complete(DialogCommand::LogEvent, ctx.text(NO_ITEMS)));
    }

    Ok(StepOutcome::next(Dialog::log_event(), date_picker(ctx.surface)))
}

pub async fn advance(
    ctx: &FlowContext<'_>,
    step: LogEventStep,
    input: StepInput<'_>,
) -> Result<StepOutcome, FlowError> {
    match step {
        LogEventStep::AwaitingDate { custom_entry } => awaiting_date(ctx, custom_entry, input).await,
        LogEventStep::AwaitingItem { date, page } => awaiting_item(ctx, date, page, input).await,
        LogEventStep::AwaitingActor { date, item } => awaiting_actor(ctx, date, item, input).await,
    }
}

async fn awaiting_date(
    ctx: &FlowContext<'_>,
    custom_entry: bool,
    input: StepInput<'_>,
) -> Result<StepOutcome, FlowError> {
    let current = Dialog::LogEvent(LogEventStep::AwaitingDate { custom_entry });
    match input {
        StepInput::Button(ButtonAction::Date(DateChoice::Custom)) => Ok(StepOutcome::next(
            Dialog::LogEvent(LogEventStep::AwaitingDate { custom_entry: true }),
            ctx.text("Please enter the date in format YYYY-MM-DD\n\nExample: 2024-01-15"),
        )),
        StepInput::Button(ButtonAction::Date(DateChoice::DaysAgo(days))) => {
            // Read the clock now, not when the dialog started.
            let today = ctx.clock.today();
            let date = today.checked_sub_days(Days::new(u64::from(*days))).unwrap_or(today);
            show_items(ctx, date, 0).await
        }
        StepInput::Button(_) => Err(FlowError::inactive(&current)),
        StepInput::Text(text) if custom_entry => {
            let text = text.trim();
            let parsed = if text.eq_ignore_ascii_case("today") {
                Ok(ctx.clock.today())
            } else {
                parse_exact_date(text)
            };
            match parsed {
                Ok(date) => show_items(ctx, date, 0).await,
                Err(_) => Ok(StepOutcome::next(
                    current,
                    ctx.text("Invalid date format. Please use YYYY-MM-DD\n\nExample: 2024-01-15"),
                )),
            }
        }
        StepInput::Text(_) => Ok(StepOutcome { dialog: current, replies: vec![date_picker(ctx.surface)] }),
    }
}

async fn show_items(
    ctx: &FlowContext<'_>,
    date: NaiveDate,
    page: usize,
) -> Result<StepOutcome, FlowError> {
    let items = ctx.repo.list_readable_items().await?;
    if items.is_empty() {
        return Ok(StepOutcome::complete(DialogCommand::LogEvent, ctx.text(NO_ITEMS)));
    }

    let page = page.min(page_count(items.len()) - 1);
    Ok(StepOutcome::next(
        Dialog::LogEvent(LogEventStep::AwaitingItem { date, page }),
        item_grid(ctx.surface, SELECT_ITEM, &items, page),
    ))
}

async fn awaiting_item(
    ctx: &FlowContext<'_>,
    date: NaiveDate,
    page: usize,
    input: StepInput<'_>,
) -> Result<StepOutcome, FlowError> {
    let current = Dialog::LogEvent(LogEventStep::AwaitingItem { date, page });
    match input {
        StepInput::Button(ButtonAction::Page(next_page)) => show_items(ctx, date, *next_page).await,
        StepInput::Button(ButtonAction::Item(index)) => {
            // Re-read the list; the grid the user clicked may be stale.
            let items = ctx.repo.list_readable_items().await?;
            let Some(item) = items.get(*index) else {
                let mut replies = vec![ctx.text("Invalid book selection. Please choose a book from the list.")];
                if !items.is_empty() {
                    replies.push(item_grid(ctx.surface, SELECT_ITEM, &items, page));
                }
                return Ok(StepOutcome { dialog: current, replies });
            };

            let people = ctx.repo.list_people().await?;
            if people.is_empty() {
                return Ok(StepOutcome::complete(DialogCommand::LogEvent, ctx.text(NO_PEOPLE)));
            }

            Ok(StepOutcome::next(
                Dialog::LogEvent(LogEventStep::AwaitingActor { date, item: item.name.clone() }),
                actor_picker(ctx.surface, &people),
            ))
        }
        StepInput::Button(_) => Err(FlowError::inactive(&current)),
        StepInput::Text(_) => Ok(StepOutcome::next(
            current,
            ctx.text("Please choose a book using the buttons above."),
        )),
    }
}

async fn awaiting_actor(
    ctx: &FlowContext<'_>,
    date: NaiveDate,
    item: String,
    input: StepInput<'_>,
) -> Result<StepOutcome, FlowError> {
    let name = match input {
        StepInput::Button(ButtonAction::Actor(name)) => name,
        StepInput::Button(_) => {
            return Err(FlowError::inactive(&Dialog::LogEvent(LogEventStep::AwaitingActor {
                date,
                item,
            })))
        }
        StepInput::Text(_) => {
            return Ok(StepOutcome::next(
                Dialog::LogEvent(LogEventStep::AwaitingActor { date, item }),
                ctx.text("Please choose who read using the buttons above."),
            ))
        }
    };

    let people = ctx.repo.list_people().await?;
    if let Err(error) = find_person(&people, name) {
        warn!(event_name = "dialog.actor.rejected", error = %error, "reader not on the family list");
        return Ok(StepOutcome::next(
            Dialog::LogEvent(LogEventStep::AwaitingActor { date, item }),
            ctx.text("Unknown reader. Please choose someone from the list."),
        ));
    }

    ctx.repo.create_event(date, &item, name).await?;
    info!(
        event_name = "library.event.created",
        event_date = %date,
        item_name = %item,
        actor_name = %name,
        "recorded reading session"
    );

    Ok(StepOutcome::complete(
        DialogCommand::LogEvent,
        ctx.text(format!(
            "Reading event recorded!\n\nDate: {}\nBook: {item}\nReader: {name}",
            date.format("%Y-%m-%d")
        )),
    ))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use storytime_core::dialog::{Dialog, DialogCommand, LogEventStep};
    use storytime_db::{InMemoryLibraryRepository, LibraryRepository};

    use super::{advance, start};
    use crate::callbacks::{ButtonAction, DateChoice};
    use crate::flows::testing::{clock, library, surface, today};
    use crate::flows::{FlowContext, FlowError, StepInput};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[tokio::test]
    async fn start_without_books_creates_no_dialog() {
        let repo = InMemoryLibraryRepository::with_default_family();
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };

        let outcome = start(&ctx).await.expect("start");
        assert_eq!(outcome.dialog, Dialog::Completed(DialogCommand::LogEvent));
        assert!(outcome.replies[0].text.contains("/new_book"));
    }

    #[tokio::test]
    async fn full_walk_records_event() {
        let repo = library(&["Matilda"]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };

        let started = start(&ctx).await.expect("start");
        assert_eq!(started.dialog.step(), 1);

        let today_button = ButtonAction::Date(DateChoice::DaysAgo(0));
        let step2 = advance(
            &ctx,
            LogEventStep::AwaitingDate { custom_entry: false },
            StepInput::Button(&today_button),
        )
        .await
        .expect("date");
        assert_eq!(step2.dialog, Dialog::LogEvent(LogEventStep::AwaitingItem { date: today(), page: 0 }));
        assert!(step2.replies[0].keyboard.is_some());

        let item_button = ButtonAction::Item(0);
        let step3 = advance(
            &ctx,
            LogEventStep::AwaitingItem { date: today(), page: 0 },
            StepInput::Button(&item_button),
        )
        .await
        .expect("item");
        assert_eq!(
            step3.dialog,
            Dialog::LogEvent(LogEventStep::AwaitingActor { date: today(), item: "Matilda".into() })
        );

        let actor_button = ButtonAction::Actor("Alice".into());
        let done = advance(
            &ctx,
            LogEventStep::AwaitingActor { date: today(), item: "Matilda".into() },
            StepInput::Button(&actor_button),
        )
        .await
        .expect("actor");
        assert!(done.dialog.is_completed());

        let events = repo.last_events(1).await.expect("events");
        assert_eq!(events[0].date, today());
        assert_eq!(events[0].item_name, "Matilda");
        assert_eq!(events[0].actor_name, "Alice");
    }

    #[tokio::test]
    async fn preset_offsets_count_back_from_today() {
        let repo = library(&["Matilda"]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let button = ButtonAction::Date(DateChoice::DaysAgo(3));

        let outcome = advance(
            &ctx,
            LogEventStep::AwaitingDate { custom_entry: false },
            StepInput::Button(&button),
        )
        .await
        .expect("date");
        assert_eq!(
            outcome.dialog,
            Dialog::LogEvent(LogEventStep::AwaitingItem { date: date(2024, 5, 12), page: 0 })
        );
    }

    #[tokio::test]
    async fn custom_date_reprompts_on_bad_text() {
        let repo = library(&["Matilda"]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let custom = ButtonAction::Date(DateChoice::Custom);

        let waiting = advance(
            &ctx,
            LogEventStep::AwaitingDate { custom_entry: false },
            StepInput::Button(&custom),
        )
        .await
        .expect("custom");
        assert_eq!(waiting.dialog, Dialog::LogEvent(LogEventStep::AwaitingDate { custom_entry: true }));

        let bad = advance(&ctx, LogEventStep::AwaitingDate { custom_entry: true }, StepInput::Text("15/05/2024"))
            .await
            .expect("bad text");
        assert_eq!(bad.dialog, Dialog::LogEvent(LogEventStep::AwaitingDate { custom_entry: true }));
        assert!(bad.replies[0].text.starts_with("Invalid date format"));

        let good = advance(&ctx, LogEventStep::AwaitingDate { custom_entry: true }, StepInput::Text("2024-02-29"))
            .await
            .expect("good text");
        assert_eq!(good.dialog.step(), 2);

        let literal = advance(&ctx, LogEventStep::AwaitingDate { custom_entry: true }, StepInput::Text("today"))
            .await
            .expect("today");
        assert_eq!(literal.dialog, Dialog::LogEvent(LogEventStep::AwaitingItem { date: today(), page: 0 }));
    }

    #[tokio::test]
    async fn out_of_range_item_stays_on_step_two() {
        let repo = library(&["Gruffalo", "Matilda", "Zog"]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let button = ButtonAction::Item(999);
        let step = LogEventStep::AwaitingItem { date: today(), page: 0 };

        let outcome = advance(&ctx, step.clone(), StepInput::Button(&button)).await.expect("item");
        assert_eq!(outcome.dialog, Dialog::LogEvent(step));
        assert!(outcome.replies[0].text.starts_with("Invalid book selection"));
        assert!(repo.last_events(10).await.expect("events").is_empty());
    }

    #[tokio::test]
    async fn page_button_keeps_step() {
        let books: Vec<String> = (0..25).map(|index| format!("Book {index:02}")).collect();
        let titles: Vec<&str> = books.iter().map(String::as_str).collect();
        let repo = library(&titles).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let button = ButtonAction::Page(1);

        let outcome = advance(
            &ctx,
            LogEventStep::AwaitingItem { date: today(), page: 0 },
            StepInput::Button(&button),
        )
        .await
        .expect("page");
        assert_eq!(outcome.dialog, Dialog::LogEvent(LogEventStep::AwaitingItem { date: today(), page: 1 }));
        assert_eq!(outcome.dialog.step(), 2);
    }

    #[tokio::test]
    async fn unknown_actor_is_rejected_without_writing() {
        let repo = library(&["Matilda"]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let button = ButtonAction::Actor("Grandpa".into());
        let step = LogEventStep::AwaitingActor { date: today(), item: "Matilda".into() };

        let outcome = advance(&ctx, step.clone(), StepInput::Button(&button)).await.expect("actor");
        assert_eq!(outcome.dialog, Dialog::LogEvent(step));
        assert!(repo.last_events(10).await.expect("events").is_empty());
    }

    #[tokio::test]
    async fn report_buttons_are_inactive_here() {
        let repo = library(&["Matilda"]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let button = ButtonAction::Filter(storytime_core::domain::event::ActorFilter::AllFollows);

        let result = advance(
            &ctx,
            LogEventStep::AwaitingItem { date: today(), page: 0 },
            StepInput::Button(&button),
        )
        .await;
        assert!(matches!(result, Err(FlowError::InactiveButton { command: "log_event", step: 2 })));
    }
}
