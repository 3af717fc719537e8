use storytime_core::dialog::period::{last_months, parse_month, parse_year, ResolvedPeriod};
use storytime_core::dialog::{Dialog, DialogCommand, PeriodEntry, ReportPeriod, ReportStep};
use storytime_core::domain::event::{ActorFilter, DateWindow, ItemCount};

use super::{FlowContext, FlowError, StepInput, StepOutcome};
use crate::callbacks::ButtonAction;
use crate::keyboard::{filter_picker, period_picker};

pub const TOP_ITEMS: u32 = 10;

const MONTH_PROMPT: &str = "Please enter the month in format YYYY-MM\n\nExample: 2024-11";
const YEAR_PROMPT: &str = "Please enter the year\n\nExample: 2024";

pub fn start(ctx: &FlowContext<'_>) -> StepOutcome {
    StepOutcome::next(Dialog::report(), period_picker(ctx.surface))
}

pub async fn advance(
    ctx: &FlowContext<'_>,
    step: ReportStep,
    input: StepInput<'_>,
) -> Result<StepOutcome, FlowError> {
    match step {
        ReportStep::AwaitingPeriod { pending } => awaiting_period(ctx, pending, input).await,
        ReportStep::AwaitingActorFilter { window, label } => {
            awaiting_filter(ctx, window, label, input).await
        }
    }
}

async fn awaiting_period(
    ctx: &FlowContext<'_>,
    pending: Option<PeriodEntry>,
    input: StepInput<'_>,
) -> Result<StepOutcome, FlowError> {
    let current = Dialog::Report(ReportStep::AwaitingPeriod { pending });
    match (input, pending) {
        (StepInput::Button(ButtonAction::Period(period)), _) => match period {
            ReportPeriod::SpecificMonth => Ok(StepOutcome::next(
                Dialog::Report(ReportStep::AwaitingPeriod { pending: Some(PeriodEntry::Month) }),
                ctx.text(MONTH_PROMPT),
            )),
            ReportPeriod::SpecificYear => Ok(StepOutcome::next(
                Dialog::Report(ReportStep::AwaitingPeriod { pending: Some(PeriodEntry::Year) }),
                ctx.text(YEAR_PROMPT),
            )),
            ReportPeriod::LastMonths(months) => {
                show_filters(ctx, last_months(ctx.clock.today(), *months)).await
            }
        },
        (StepInput::Button(_), _) => Err(FlowError::inactive(&current)),
        (StepInput::Text(text), Some(PeriodEntry::Month)) => match parse_month(text.trim()) {
            Ok(period) => show_filters(ctx, period).await,
            Err(_) => Ok(StepOutcome::next(
                current,
                ctx.text("Invalid month format. Please use YYYY-MM\n\nExample: 2024-11"),
            )),
        },
        (StepInput::Text(text), Some(PeriodEntry::Year)) => match parse_year(text.trim()) {
            Ok(period) => show_filters(ctx, period).await,
            Err(_) => Ok(StepOutcome::next(
                current,
                ctx.text("Invalid year. Please enter a valid year\n\nExample: 2024"),
            )),
        },
        (StepInput::Text(_), None) => {
            Ok(StepOutcome::next(current, period_picker(ctx.surface)))
        }
    }
}

async fn show_filters(
    ctx: &FlowContext<'_>,
    period: ResolvedPeriod,
) -> Result<StepOutcome, FlowError> {
    let people = ctx.repo.list_people().await?;
    Ok(StepOutcome::next(
        Dialog::Report(ReportStep::AwaitingActorFilter {
            window: period.window,
            label: period.label,
        }),
        filter_picker(ctx.surface, &people),
    ))
}

async fn awaiting_filter(
    ctx: &FlowContext<'_>,
    window: DateWindow,
    label: String,
    input: StepInput<'_>,
) -> Result<StepOutcome, FlowError> {
    let filter = match input {
        StepInput::Button(ButtonAction::Filter(filter)) => filter,
        StepInput::Button(_) => {
            return Err(FlowError::inactive(&Dialog::Report(ReportStep::AwaitingActorFilter {
                window,
                label,
            })))
        }
        StepInput::Text(_) => {
            let people = ctx.repo.list_people().await?;
            return Ok(StepOutcome::next(
                Dialog::Report(ReportStep::AwaitingActorFilter { window, label }),
                filter_picker(ctx.surface, &people),
            ));
        }
    };

    let ranked = ctx.repo.ranked_items(TOP_ITEMS, window, filter).await?;
    let text = if ranked.is_empty() {
        "No reading events found for the selected period.".to_owned()
    } else {
        render_report(&label, window, filter, &ranked)
    };
    Ok(StepOutcome::complete(DialogCommand::Report, ctx.text(text)))
}

pub fn render_report(
    label: &str,
    window: DateWindow,
    filter: &ActorFilter,
    ranked: &[ItemCount],
) -> String {
    let mut text = format!(
        "Reading Statistics\n\nPeriod: {label}\n   {} - {}\n\nParticipant: {}\n\nTop {TOP_ITEMS} Books:\n\n",
        window.start.format("%Y-%m-%d"),
        window.end.format("%Y-%m-%d"),
        filter.label(),
    );
    for (index, entry) in ranked.iter().enumerate() {
        let noun = if entry.count == 1 { "read" } else { "reads" };
        text.push_str(&format!("{}. {} - {} {noun}\n", index + 1, entry.item_name, entry.count));
    }
    text
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use storytime_core::dialog::{Dialog, DialogCommand, PeriodEntry, ReportPeriod, ReportStep};
    use storytime_core::domain::event::{ActorFilter, DateWindow};
    use storytime_db::LibraryRepository;

    use super::{advance, start};
    use crate::callbacks::ButtonAction;
    use crate::flows::testing::{clock, library, surface};
    use crate::flows::{FlowContext, StepInput};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn may_2024() -> ReportStep {
        ReportStep::AwaitingActorFilter {
            window: DateWindow::new(date(2024, 5, 1), date(2024, 5, 31)),
            label: "May 2024".into(),
        }
    }

    #[tokio::test]
    async fn start_shows_period_picker() {
        let repo = library(&[]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };

        let outcome = start(&ctx);
        assert_eq!(outcome.dialog, Dialog::report());
        assert_eq!(outcome.dialog.step(), 1);
        let keyboard = outcome.replies[0].keyboard.as_ref().expect("keyboard");
        assert!(keyboard.buttons().any(|button| button.callback_data == "period:last3"));
    }

    #[tokio::test]
    async fn month_entry_moves_to_filter_step() {
        let repo = library(&[]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let month = ButtonAction::Period(ReportPeriod::SpecificMonth);

        let prompt = advance(&ctx, ReportStep::AwaitingPeriod { pending: None }, StepInput::Button(&month))
            .await
            .expect("period");
        assert_eq!(
            prompt.dialog,
            Dialog::Report(ReportStep::AwaitingPeriod { pending: Some(PeriodEntry::Month) })
        );

        let pending = ReportStep::AwaitingPeriod { pending: Some(PeriodEntry::Month) };
        let invalid = advance(&ctx, pending.clone(), StepInput::Text("2024/05")).await.expect("bad");
        assert_eq!(invalid.dialog, Dialog::Report(pending.clone()));
        assert!(invalid.replies[0].text.starts_with("Invalid month format"));

        let filters = advance(&ctx, pending, StepInput::Text("2024-05")).await.expect("month");
        assert_eq!(filters.dialog, Dialog::Report(may_2024()));
        let keyboard = filters.replies[0].keyboard.as_ref().expect("keyboard");
        let payloads: Vec<&str> = keyboard.buttons().map(|button| button.callback_data.as_str()).collect();
        assert_eq!(payloads, vec!["filter:", "filter:Alice", "filter:Bob"]);
    }

    #[tokio::test]
    async fn year_entry_rejects_out_of_range() {
        let repo = library(&[]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let pending = ReportStep::AwaitingPeriod { pending: Some(PeriodEntry::Year) };

        let invalid = advance(&ctx, pending.clone(), StepInput::Text("1850")).await.expect("bad");
        assert_eq!(invalid.dialog, Dialog::Report(pending.clone()));

        let valid = advance(&ctx, pending, StepInput::Text("2023")).await.expect("year");
        assert_eq!(
            valid.dialog,
            Dialog::Report(ReportStep::AwaitingActorFilter {
                window: DateWindow::new(date(2023, 1, 1), date(2023, 12, 31)),
                label: "Year 2023".into(),
            })
        );
    }

    #[tokio::test]
    async fn relative_period_counts_back_from_today() {
        let repo = library(&[]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let button = ButtonAction::Period(ReportPeriod::LastMonths(3));

        let outcome = advance(&ctx, ReportStep::AwaitingPeriod { pending: None }, StepInput::Button(&button))
            .await
            .expect("period");
        assert_eq!(
            outcome.dialog,
            Dialog::Report(ReportStep::AwaitingActorFilter {
                window: DateWindow::new(date(2024, 2, 15), date(2024, 5, 15)),
                label: "Last 3 months".into(),
            })
        );
    }

    #[tokio::test]
    async fn all_children_report_ranks_follows_only() {
        let repo = library(&["Matilda", "Zog"]).await;
        for (day, item, actor) in [
            (3, "Zog", "Alice"),
            (4, "Zog", "Bob"),
            (5, "Matilda", "Alice"),
            (6, "Matilda", "Mom"),
            (7, "Matilda", "Mom"),
        ] {
            repo.create_event(date(2024, 5, day), item, actor).await.expect("event");
        }
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let button = ButtonAction::Filter(ActorFilter::AllFollows);

        let outcome = advance(&ctx, may_2024(), StepInput::Button(&button)).await.expect("report");
        assert_eq!(outcome.dialog, Dialog::Completed(DialogCommand::Report));
        let text = &outcome.replies[0].text;
        assert!(text.starts_with("Reading Statistics\n\nPeriod: May 2024\n   2024-05-01 - 2024-05-31"));
        assert!(text.contains("Participant: All children"));
        assert!(text.contains("1. Zog - 2 reads"));
        assert!(text.contains("2. Matilda - 1 read"));
    }

    #[tokio::test]
    async fn empty_window_reports_no_events() {
        let repo = library(&["Matilda"]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let button = ButtonAction::Filter(ActorFilter::Person("Bob".into()));

        let outcome = advance(&ctx, may_2024(), StepInput::Button(&button)).await.expect("report");
        assert!(outcome.dialog.is_completed());
        assert_eq!(outcome.replies[0].text, "No reading events found for the selected period.");
    }
}
