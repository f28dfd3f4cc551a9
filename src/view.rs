//! What the UI shows, derived from session state from scratch on every render.

use serde::Serialize;

use crate::conversation::Role;
use crate::session::{Notice, Phase, Session};
use crate::settings::{Model, TEMPERATURE_MAX, TEMPERATURE_MIN, TEMPERATURE_STEP};

pub const PAGE_TITLE: &str = "AI Chatbot";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MessageView {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusView {
    pub connection: &'static str,
    pub connected: bool,
    pub message_count: usize,
    pub model: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelOption {
    pub id: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SettingsView {
    pub model: &'static str,
    pub models: Vec<ModelOption>,
    pub temperature: f64,
    pub temperature_label: String,
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub temperature_step: f64,
}

impl SettingsView {
    fn new(selected: Model, temperature: f64, temperature_label: String) -> Self {
        Self {
            model: selected.id(),
            models: Model::ALL
                .into_iter()
                .map(|m| ModelOption {
                    id: m.id(),
                    label: m.label(),
                    selected: m == selected,
                })
                .collect(),
            temperature,
            temperature_label,
            temperature_min: TEMPERATURE_MIN,
            temperature_max: TEMPERATURE_MAX,
            temperature_step: TEMPERATURE_STEP,
        }
    }
}

/// A full render of one session.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionView {
    pub title: &'static str,
    pub messages: Vec<MessageView>,
    pub status: StatusView,
    pub settings: SettingsView,
    pub notice: Option<Notice>,
    pub pending: bool,
    pub halted: bool,
}

impl SessionView {
    pub fn from_session(session: &Session, notice: Option<Notice>) -> Self {
        let conversation = session.conversation();
        let settings = session.settings();
        Self {
            title: PAGE_TITLE,
            messages: conversation
                .visible_messages()
                .map(|m| MessageView {
                    role: m.role(),
                    content: m.content().to_string(),
                })
                .collect(),
            status: StatusView {
                connection: "Connected",
                connected: true,
                message_count: conversation.visible_len(),
                model: settings.model.label(),
            },
            settings: SettingsView::new(
                settings.model,
                settings.temperature.value(),
                settings.temperature.to_string(),
            ),
            notice,
            pending: matches!(session.phase(), Phase::Pending { .. }),
            halted: false,
        }
    }

    /// The only thing a halted session can show.
    pub fn halted(notice: Notice) -> Self {
        let defaults = crate::settings::Settings::default();
        Self {
            title: PAGE_TITLE,
            messages: Vec::new(),
            status: StatusView {
                connection: "Disconnected",
                connected: false,
                message_count: 0,
                model: defaults.model.label(),
            },
            settings: SettingsView::new(
                defaults.model,
                defaults.temperature.value(),
                defaults.temperature.to_string(),
            ),
            notice: Some(notice),
            pending: false,
            halted: true,
        }
    }
}
