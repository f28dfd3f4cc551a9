//! Session state and the per-turn interaction cycle.
//!
//! A turn moves `Idle -> Pending -> Idle`. The user message is appended when the
//! turn begins; the assistant reply is appended only if the completion call
//! succeeds. A failed call leaves the user message unanswered and records a
//! transient notice instead.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{Config, API_KEY_VAR};
use crate::conversation::{Conversation, Message, Role};
use crate::gateway::{CompletionError, CompletionGateway};
use crate::settings::{Model, Settings, SettingsError, Temperature};
use crate::view::SessionView;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Halted(String),
    #[error("a reply is still pending; wait for it before sending another message")]
    Busy,
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Error,
    Fatal,
}

/// A user-facing message about something that went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Fatal,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Pending { turn: u64 },
}

/// State mutation requests, from the browser or the terminal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Submit { text: String },
    UpdateSettings { model: String, temperature: String },
    Reset,
}

/// Everything the gateway needs for one call, captured when the turn begins.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub turn: u64,
    pub history: Vec<Message>,
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input; nothing happened.
    Ignored,
    Replied(String),
    Failed(String),
    /// The conversation was reset while the call was in flight.
    Discarded,
}

#[derive(Debug)]
pub struct Session {
    conversation: Conversation,
    settings: Settings,
    phase: Phase,
    next_turn: u64,
    notice: Option<Notice>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        info!("Initializing new chat session");
        Self {
            conversation: Conversation::new(),
            settings: Settings::default(),
            phase: Phase::Idle,
            next_turn: 1,
            notice: None,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Removes the transient notice so it is shown exactly once.
    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Appends the user message and moves to `Pending`. Blank text is ignored.
    pub fn begin_turn(&mut self, text: &str) -> Result<Option<PendingTurn>, SessionError> {
        if text.trim().is_empty() {
            debug!("Ignoring blank submission");
            return Ok(None);
        }
        if let Phase::Pending { turn } = self.phase {
            warn!(turn, "Submission rejected while a reply is pending");
            self.notice = Some(Notice::error(format!("Error: {}", SessionError::Busy)));
            return Err(SessionError::Busy);
        }

        let turn = self.next_turn;
        self.next_turn += 1;
        self.notice = None;
        self.conversation.append(Role::User, text);
        self.phase = Phase::Pending { turn };
        self.log_state("user message appended");

        Ok(Some(PendingTurn {
            turn,
            history: self.conversation.messages().to_vec(),
            settings: self.settings,
        }))
    }

    /// Applies the gateway result for `turn` and returns to `Idle`.
    pub fn finish_turn(
        &mut self,
        turn: u64,
        result: Result<String, CompletionError>,
    ) -> TurnOutcome {
        if self.phase != (Phase::Pending { turn }) {
            warn!(turn, phase = ?self.phase, "Discarding completion for a stale turn");
            return TurnOutcome::Discarded;
        }
        self.phase = Phase::Idle;

        match result {
            Ok(text) => {
                self.conversation.append(Role::Assistant, text.clone());
                self.log_state("assistant message appended");
                TurnOutcome::Replied(text)
            }
            Err(e) => {
                let notice = e.notice();
                error!(error = %e, "Completion failed; user message left unanswered");
                self.notice = Some(Notice::error(notice.clone()));
                TurnOutcome::Failed(notice)
            }
        }
    }

    /// Returns a turn that never produced a result to `Idle`, leaving the user
    /// message unanswered as a failed call would.
    pub fn abandon_turn(&mut self, turn: u64) -> TurnOutcome {
        if self.phase != (Phase::Pending { turn }) {
            return TurnOutcome::Discarded;
        }
        self.phase = Phase::Idle;
        let notice = "Error: the reply was lost before it arrived".to_string();
        self.notice = Some(Notice::error(notice.clone()));
        warn!(turn, "Turn abandoned; user message left unanswered");
        TurnOutcome::Failed(notice)
    }

    /// Clears the transcript. Model and temperature are kept.
    pub fn reset(&mut self) {
        if let Phase::Pending { turn } = self.phase {
            info!(turn, "Reset while a reply is pending; it will be discarded");
        }
        self.conversation.reset();
        self.phase = Phase::Idle;
        self.notice = None;
        self.log_state("conversation reset");
    }

    pub fn set_model(&mut self, model: Model) {
        self.settings.model = model;
        debug!(%model, "Model changed");
    }

    pub fn set_temperature(&mut self, temperature: Temperature) {
        self.settings.temperature = temperature;
        debug!(%temperature, "Temperature changed");
    }

    /// Validates settings-panel input; invalid input changes nothing and leaves a notice.
    pub fn update_settings(&mut self, model: &str, temperature: &str) -> Result<(), SessionError> {
        match Settings::parse(model, temperature) {
            Ok(settings) => {
                self.settings = settings;
                debug!(model = %settings.model, temperature = %settings.temperature, "Settings updated");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Rejected settings update");
                self.notice = Some(Notice::error(format!("Error: {e}")));
                Err(e.into())
            }
        }
    }

    fn log_state(&self, what: &str) {
        debug!(
            messages = self.conversation.len(),
            phase = ?self.phase,
            model = %self.settings.model,
            temperature = %self.settings.temperature,
            "{what}"
        );
    }
}

/// The process-wide session context: either usable, or halted at startup.
#[derive(Debug)]
pub enum ChatService {
    Ready {
        session: Arc<Mutex<Session>>,
        gateway: CompletionGateway,
    },
    Halted {
        notice: Notice,
    },
}

impl ChatService {
    pub fn from_config(config: &Config) -> Self {
        match &config.api_key {
            Some(key) => Self::new(CompletionGateway::new(key.clone(), &config.api_base)),
            None => {
                let message = format!("{API_KEY_VAR} not found in environment variables!");
                error!("{message}");
                Self::Halted {
                    notice: Notice::fatal(message),
                }
            }
        }
    }

    pub fn new(gateway: CompletionGateway) -> Self {
        Self::Ready {
            session: Arc::new(Mutex::new(Session::new())),
            gateway,
        }
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted { .. })
    }

    fn ready(&self) -> Result<(&Arc<Mutex<Session>>, &CompletionGateway), SessionError> {
        match self {
            Self::Ready { session, gateway } => Ok((session, gateway)),
            Self::Halted { notice } => Err(SessionError::Halted(notice.message.clone())),
        }
    }

    /// Runs one full turn. The session lock is released while the call is in flight.
    ///
    /// The call and its bookkeeping run on their own task, so a caller that goes
    /// away mid-turn (a closed browser tab) still lets the session return to `Idle`.
    pub async fn submit(&self, text: &str) -> Result<TurnOutcome, SessionError> {
        let (session, gateway) = self.ready()?;

        let pending = match session.lock().await.begin_turn(text)? {
            Some(pending) => pending,
            None => return Ok(TurnOutcome::Ignored),
        };
        let turn = pending.turn;

        let task_session = Arc::clone(session);
        let gateway = gateway.clone();
        let handle = tokio::spawn(async move {
            let result = gateway.complete(&pending.history, &pending.settings).await;
            task_session.lock().await.finish_turn(pending.turn, result)
        });

        match handle.await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(turn, error = %e, "Completion task did not finish");
                Ok(session.lock().await.abandon_turn(turn))
            }
        }
    }

    pub async fn set_model(&self, model: Model) -> Result<(), SessionError> {
        let (session, _) = self.ready()?;
        session.lock().await.set_model(model);
        Ok(())
    }

    pub async fn set_temperature(&self, temperature: Temperature) -> Result<(), SessionError> {
        let (session, _) = self.ready()?;
        session.lock().await.set_temperature(temperature);
        Ok(())
    }

    pub async fn reset(&self) -> Result<(), SessionError> {
        let (session, _) = self.ready()?;
        session.lock().await.reset();
        Ok(())
    }

    pub async fn update_settings(&self, model: &str, temperature: &str) -> Result<(), SessionError> {
        let (session, _) = self.ready()?;
        session.lock().await.update_settings(model, temperature)
    }

    /// Single entry point for state mutations.
    pub async fn handle(&self, event: Event) -> Result<(), SessionError> {
        debug!(?event, "Handling session event");
        match event {
            Event::Submit { text } => self.submit(&text).await.map(|_| ()),
            Event::UpdateSettings { model, temperature } => {
                self.update_settings(&model, &temperature).await
            }
            Event::Reset => self.reset().await,
        }
    }

    /// Renders the current state, consuming any transient notice.
    pub async fn snapshot(&self) -> SessionView {
        match self {
            Self::Ready { session, .. } => {
                let mut session = session.lock().await;
                let notice = session.take_notice();
                SessionView::from_session(&session, notice)
            }
            Self::Halted { notice } => SessionView::halted(notice.clone()),
        }
    }

    /// Renders the current state, leaving the notice for the next snapshot.
    pub async fn peek(&self) -> SessionView {
        match self {
            Self::Ready { session, .. } => {
                let session = session.lock().await;
                SessionView::from_session(&session, session.notice().cloned())
            }
            Self::Halted { notice } => SessionView::halted(notice.clone()),
        }
    }
}
