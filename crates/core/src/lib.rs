pub mod clock;
pub mod config;
pub mod dialog;
pub mod domain;
pub mod errors;
pub mod rotation;
pub mod webapp;

pub use clock::{Clock, FixedClock, SystemClock};
pub use dialog::{
    ConversationState, ConversationStore, Dialog, DialogCommand, ReplySurface, UserId,
};
pub use domain::event::{ActorFilter, DateWindow, Event, ItemCount, RareItem};
pub use domain::item::{Item, ItemId};
pub use domain::person::{Person, PersonId, PersonRole};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use rotation::next_actor;
