//! Telegram interface for storytime
//!
//! - **Dispatcher** (`events`) - authorization, per-user ordering, dialog routing, fault recovery
//! - **Commands** (`commands`) - `/read`, `/stats`, `/who_is_next` and friends
//! - **Buttons** (`callbacks`) - `prefix:value` payloads carried by inline keyboards
//! - **Flows** (`flows`) - one step machine per multi-step command
//! - **Keyboards** (`keyboard`) - outbound messages and inline button grids
//! - **Transport** (`telegram`, `polling`, `gateway`) - Bot API client, long polling loop
//!
//! # Architecture
//!
//! ```text
//! getUpdates / webhook → InboundUpdate → Dispatcher → Flows → LibraryRepository
//!                                           ↓
//!                        MessageGateway ← OutboundMessage
//! ```

pub mod callbacks;
pub mod commands;
pub mod events;
pub mod flows;
pub mod gateway;
pub mod keyboard;
pub mod polling;
pub mod telegram;

pub use events::{AllowList, Authorizer, DispatchOutcome, Dispatcher, InboundUpdate, UpdateKind};
pub use gateway::{GatewayError, MessageGateway, RecordingGateway};
pub use keyboard::{Button, Keyboard, OutboundMessage};
pub use polling::{PollingError, PollingRunner, ReconnectPolicy, TransportError, UpdateSource};
pub use telegram::{TelegramClient, TelegramError, TelegramUpdateSource, Update};
