use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use storytime_core::clock::{Clock, SystemClock};
use storytime_core::dialog::{
    ConversationState, ConversationStore, DialogCommand, ReplySurface, UserId,
};
use storytime_core::errors::ApplicationError;
use storytime_db::LibraryRepository;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::callbacks::ButtonAction;
use crate::commands::{self, BotCommand, IDLE_HINT};
use crate::flows::{self, FlowContext, FlowError, StepInput, StepOutcome};
use crate::gateway::MessageGateway;
use crate::keyboard::{text_message, OutboundMessage};

pub const DENIED_TEXT: &str = "Sorry, you are not allowed to use this bot.";
pub const INACTIVE_BUTTON_TEXT: &str = "This button is no longer active.";

/// One inbound event, already decoded from whichever transport delivered it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub user: UserId,
    pub surface: ReplySurface,
    pub kind: UpdateKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    Text(String),
    Button { callback_id: String, payload: String },
}

impl UpdateKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Button { .. } => "button",
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Button { payload, .. } => payload,
        }
    }
}

pub trait Authorizer: Send + Sync {
    fn is_allowed(&self, user: UserId) -> bool;
}

#[derive(Clone, Debug, Default)]
pub struct AllowList {
    users: HashSet<i64>,
}

impl AllowList {
    pub fn new(users: impl IntoIterator<Item = i64>) -> Self {
        Self { users: users.into_iter().collect() }
    }
}

impl Authorizer for AllowList {
    fn is_allowed(&self, user: UserId) -> bool {
        self.users.contains(&user.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sender is not on the allow list; the state store was not touched.
    Denied,
    Ignored,
    /// A one-shot command or a hint was answered.
    Replied,
    DialogActive { command: DialogCommand, step: i32 },
    DialogFinished { command: DialogCommand },
    /// The button belongs to another command or step.
    Rejected,
    /// A store call failed; any active dialog was dropped.
    Aborted,
    /// Handling panicked and was contained.
    Faulted,
}

/// Routes inbound updates to commands and dialog step handlers.
///
/// Updates from one user are handled one at a time through a per-user lane;
/// different users never wait on each other.
pub struct Dispatcher {
    store: ConversationStore,
    lanes: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
    authorizer: Arc<dyn Authorizer>,
    repo: Arc<dyn LibraryRepository>,
    gateway: Arc<dyn MessageGateway>,
    clock: Arc<dyn Clock>,
    notify_denied: bool,
}

impl Dispatcher {
    pub fn new(
        repo: Arc<dyn LibraryRepository>,
        gateway: Arc<dyn MessageGateway>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            store: ConversationStore::new(),
            lanes: Mutex::new(HashMap::new()),
            authorizer,
            repo,
            gateway,
            clock: Arc::new(SystemClock),
            notify_denied: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_denial_notice(mut self, notify_denied: bool) -> Self {
        self.notify_denied = notify_denied;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Handles one update to completion. Never panics and never returns an
    /// error; faults are logged and answered with a generic reply.
    pub async fn dispatch(self: &Arc<Self>, update: InboundUpdate) -> DispatchOutcome {
        let correlation_id = update.update_id;
        let user_id = update.user.0;
        debug!(
            event_name = "ingress.update.received",
            correlation_id,
            user_id,
            kind = update.kind.label(),
            "received update"
        );

        if !self.authorizer.is_allowed(update.user) {
            info!(event_name = "ingress.update.denied", correlation_id, user_id, "rejected unauthorized user");
            if let UpdateKind::Button { callback_id, .. } = &update.kind {
                self.acknowledge(correlation_id, callback_id).await;
            }
            if self.notify_denied {
                self.deliver(correlation_id, vec![text_message(update.surface, DENIED_TEXT)]).await;
            }
            return DispatchOutcome::Denied;
        }

        let lane = self.lane(update.user);
        let outcome = {
            let _turn = lane.lock().await;
            let active = self.store.get(update.user);
            let handler = Arc::clone(self);
            let task_update = update.clone();
            match tokio::spawn(async move { handler.handle(task_update).await }).await {
                Ok(outcome) => outcome,
                Err(fault) => self.recover(&update, active, fault).await,
            }
        };
        drop(lane);
        self.release_lane(update.user);
        outcome
    }

    async fn handle(&self, update: InboundUpdate) -> DispatchOutcome {
        match &update.kind {
            UpdateKind::Text(text) => self.handle_text(&update, text).await,
            UpdateKind::Button { callback_id, payload } => {
                self.handle_button(&update, callback_id, payload).await
            }
        }
    }

    async fn handle_text(&self, update: &InboundUpdate, text: &str) -> DispatchOutcome {
        if let Some(command) = BotCommand::parse(text) {
            if let Some(previous) = self.store.delete(update.user) {
                info!(
                    event_name = "dialog.preempted",
                    correlation_id = update.update_id,
                    user_id = update.user.0,
                    command = previous.command().as_str(),
                    step = previous.step(),
                    next_command = command.name(),
                    "new command replaced active dialog"
                );
            }
            return self.run_command(update, command).await;
        }

        let Some(state) = self.store.get(update.user) else {
            self.deliver(update.update_id, vec![text_message(update.surface, IDLE_HINT)]).await;
            return DispatchOutcome::Replied;
        };
        if state.dialog.is_completed() {
            self.store.delete(update.user);
            self.deliver(update.update_id, vec![text_message(update.surface, IDLE_HINT)]).await;
            return DispatchOutcome::Replied;
        }

        self.advance(update, state, StepInput::Text(text)).await
    }

    async fn handle_button(
        &self,
        update: &InboundUpdate,
        callback_id: &str,
        payload: &str,
    ) -> DispatchOutcome {
        self.acknowledge(update.update_id, callback_id).await;

        let Some(state) = self.store.get(update.user) else {
            debug!(
                event_name = "dialog.button.ignored",
                correlation_id = update.update_id,
                user_id = update.user.0,
                payload,
                "button pressed without an active dialog"
            );
            return DispatchOutcome::Ignored;
        };
        if state.dialog.is_completed() {
            self.store.delete(update.user);
            return DispatchOutcome::Ignored;
        }

        let action = match ButtonAction::parse(payload) {
            Ok(action) => action,
            Err(error) => {
                warn!(
                    event_name = "dialog.button.malformed",
                    correlation_id = update.update_id,
                    user_id = update.user.0,
                    payload,
                    error = %error,
                    "dropped malformed button payload"
                );
                return DispatchOutcome::Ignored;
            }
        };

        self.advance(update, state, StepInput::Button(&action)).await
    }

    async fn run_command(&self, update: &InboundUpdate, command: BotCommand) -> DispatchOutcome {
        let ctx = self.context(update.surface);
        let BotCommand::Dialog(dialog_command) = command else {
            return match commands::run_one_shot(&ctx, &command).await {
                Ok(replies) => {
                    self.deliver(update.update_id, replies).await;
                    DispatchOutcome::Replied
                }
                Err(error) => self.abort(update, update.surface, error).await,
            };
        };

        match flows::start(&ctx, dialog_command).await {
            Ok(outcome) => self.settle(update, dialog_command, update.surface, outcome).await,
            Err(error) => self.abort(update, update.surface, error).await,
        }
    }

    async fn advance(
        &self,
        update: &InboundUpdate,
        state: ConversationState,
        input: StepInput<'_>,
    ) -> DispatchOutcome {
        let command = state.command();
        let surface = state.surface;
        let ctx = self.context(surface);
        match flows::advance(&ctx, state.dialog, input).await {
            Ok(outcome) => self.settle(update, command, surface, outcome).await,
            Err(error) => self.abort(update, surface, error).await,
        }
    }

    /// Stores the next dialog (or drops a finished one), then sends replies.
    async fn settle(
        &self,
        update: &InboundUpdate,
        command: DialogCommand,
        surface: ReplySurface,
        outcome: StepOutcome,
    ) -> DispatchOutcome {
        let StepOutcome { dialog, replies } = outcome;
        let result = if dialog.is_completed() {
            self.store.delete(update.user);
            info!(
                event_name = "dialog.step.completed",
                correlation_id = update.update_id,
                user_id = update.user.0,
                command = command.as_str(),
                "dialog finished"
            );
            DispatchOutcome::DialogFinished { command }
        } else {
            let step = dialog.step();
            self.store.set(update.user, ConversationState::new(dialog, surface));
            debug!(
                event_name = "dialog.step.advanced",
                correlation_id = update.update_id,
                user_id = update.user.0,
                command = command.as_str(),
                step,
                "dialog waiting for input"
            );
            DispatchOutcome::DialogActive { command, step }
        };

        self.deliver(update.update_id, replies).await;
        result
    }

    async fn abort(
        &self,
        update: &InboundUpdate,
        surface: ReplySurface,
        error: FlowError,
    ) -> DispatchOutcome {
        match error {
            FlowError::InactiveButton { command, step } => {
                info!(
                    event_name = "dialog.button.inactive",
                    correlation_id = update.update_id,
                    user_id = update.user.0,
                    command,
                    step,
                    payload = update.kind.payload(),
                    "button does not match the active step"
                );
                self.deliver(update.update_id, vec![text_message(surface, INACTIVE_BUTTON_TEXT)])
                    .await;
                DispatchOutcome::Rejected
            }
            FlowError::Store(source) => {
                let dropped = self.store.delete(update.user);
                warn!(
                    event_name = "dialog.step.aborted",
                    correlation_id = update.update_id,
                    user_id = update.user.0,
                    command = dropped.as_ref().map_or("none", |state| state.command().as_str()),
                    error = %source,
                    "store call failed"
                );
                let reply = ApplicationError::Persistence(source.to_string())
                    .into_interface(update.update_id.to_string());
                self.deliver(update.update_id, vec![text_message(surface, reply.user_message())])
                    .await;
                DispatchOutcome::Aborted
            }
        }
    }

    async fn recover(
        &self,
        update: &InboundUpdate,
        active: Option<ConversationState>,
        fault: JoinError,
    ) -> DispatchOutcome {
        let reply = ApplicationError::Fault(fault.to_string())
            .into_interface(update.update_id.to_string());
        error!(
            event_name = "dispatch.update.faulted",
            correlation_id = reply.correlation_id(),
            user_id = update.user.0,
            payload = update.kind.payload(),
            command = active.as_ref().map_or("none", |state| state.command().as_str()),
            step = active.as_ref().map_or(0, ConversationState::step),
            error = %reply,
            "update handler panicked"
        );
        self.store.delete(update.user);
        let surface = active.map_or(update.surface, |state| state.surface);
        self.deliver(update.update_id, vec![text_message(surface, reply.user_message())]).await;
        DispatchOutcome::Faulted
    }

    async fn deliver(&self, correlation_id: i64, replies: Vec<OutboundMessage>) {
        for reply in replies {
            if let Err(error) = self.gateway.send(&reply).await {
                let failure = ApplicationError::Delivery(error.to_string());
                warn!(
                    event_name = "egress.message.failed",
                    correlation_id,
                    chat_id = reply.surface.chat_id,
                    error = %failure,
                    "failed to send reply"
                );
            }
        }
    }

    async fn acknowledge(&self, correlation_id: i64, callback_id: &str) {
        if let Err(error) = self.gateway.acknowledge(callback_id).await {
            let failure = ApplicationError::Delivery(error.to_string());
            warn!(
                event_name = "egress.callback.ack_failed",
                correlation_id,
                error = %failure,
                "failed to acknowledge button"
            );
        }
    }

    fn context(&self, surface: ReplySurface) -> FlowContext<'_> {
        FlowContext { repo: self.repo.as_ref(), clock: self.clock.as_ref(), surface }
    }

    fn lane(&self, user: UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(lanes.entry(user).or_default())
    }

    fn release_lane(&self, user: UserId) {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        if lanes.get(&user).is_some_and(|lane| Arc::strong_count(lane) == 1) {
            lanes.remove(&user);
        }
    }

    #[cfg(test)]
    fn lane_count(&self) -> usize {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
