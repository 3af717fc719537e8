use storytime_core::dialog::{Dialog, DialogCommand, RegisterItemStep};
use storytime_db::RepositoryError;
use tracing::info;

use super::{FlowContext, FlowError, StepInput, StepOutcome};

pub fn start(ctx: &FlowContext<'_>) -> StepOutcome {
    StepOutcome::next(Dialog::register_item(), ctx.text("Please enter the book name:"))
}

pub async fn advance(
    ctx: &FlowContext<'_>,
    step: RegisterItemStep,
    input: StepInput<'_>,
) -> Result<StepOutcome, FlowError> {
    let name = match input {
        StepInput::Text(text) => text.trim(),
        StepInput::Button(_) => return Err(FlowError::inactive(&Dialog::RegisterItem(step))),
    };

    if name.is_empty() {
        return Ok(StepOutcome::next(
            Dialog::RegisterItem(step),
            ctx.text("The book name cannot be empty. Please enter the book name:"),
        ));
    }

    match ctx.repo.create_item(name).await {
        Ok(id) => {
            info!(event_name = "library.item.created", item_id = %id.0, "registered book");
            Ok(StepOutcome::complete(
                DialogCommand::RegisterItem,
                ctx.text(format!("Book added: {name}")),
            ))
        }
        Err(RepositoryError::Conflict(_)) => Ok(StepOutcome::complete(
            DialogCommand::RegisterItem,
            ctx.text(format!("A book named \"{name}\" is already on the shelf.")),
        )),
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use storytime_core::dialog::{Dialog, RegisterItemStep};
    use storytime_db::LibraryRepository;

    use super::{advance, start};
    use crate::callbacks::ButtonAction;
    use crate::flows::testing::{clock, library, surface};
    use crate::flows::{FlowContext, FlowError, StepInput};

    #[tokio::test]
    async fn name_is_stored_and_dialog_completes() {
        let repo = library(&[]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };

        let started = start(&ctx);
        assert_eq!(started.dialog.step(), 1);

        let outcome = advance(&ctx, RegisterItemStep::AwaitingName, StepInput::Text(" Matilda "))
            .await
            .expect("advance");
        assert!(outcome.dialog.is_completed());
        assert_eq!(outcome.replies[0].text, "Book added: Matilda");

        let items = repo.list_readable_items().await.expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Matilda");
    }

    #[tokio::test]
    async fn blank_name_reprompts() {
        let repo = library(&[]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };

        let outcome = advance(&ctx, RegisterItemStep::AwaitingName, StepInput::Text("   "))
            .await
            .expect("advance");
        assert_eq!(outcome.dialog, Dialog::register_item());
        assert!(repo.list_readable_items().await.expect("items").is_empty());
    }

    #[tokio::test]
    async fn duplicate_name_completes_with_notice() {
        let repo = library(&["Matilda"]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };

        let outcome = advance(&ctx, RegisterItemStep::AwaitingName, StepInput::Text("Matilda"))
            .await
            .expect("advance");
        assert!(outcome.dialog.is_completed());
        assert!(outcome.replies[0].text.contains("already on the shelf"));
    }

    #[tokio::test]
    async fn buttons_are_not_accepted() {
        let repo = library(&[]).await;
        let clock = clock();
        let ctx = FlowContext { repo: &repo, clock: &clock, surface: surface() };
        let action = ButtonAction::Item(0);

        let result =
            advance(&ctx, RegisterItemStep::AwaitingName, StepInput::Button(&action)).await;
        assert!(matches!(result, Err(FlowError::InactiveButton { step: 1, .. })));
    }
}
