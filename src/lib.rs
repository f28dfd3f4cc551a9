pub mod chat;
pub mod config;
pub mod conversation;
pub mod gateway;
pub mod session;
pub mod settings;
pub mod view;
pub mod web_server;

pub use config::Config;
pub use conversation::{Conversation, Message, Role};
pub use gateway::{CompletionError, CompletionGateway};
pub use session::{ChatService, Event, Session, SessionError, TurnOutcome};
pub use settings::{Model, Settings, Temperature};
