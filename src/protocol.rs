//! Chat view state machine: optimistic sends and their reconciliation.
//!
//! The controller never performs I/O. Intents and results go in, `Command`s
//! for the dispatcher come out.

use crate::event::AppEvent;
use crate::nav::Route;
use crate::session::state::SessionState;
use crate::session::{ChatSession, ChatSummary, Message, OutgoingMessage};
use crate::table::Table;
use crate::transport::{Command, ErrorKind, TransportError};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("type a message or attach a table first")]
    Empty,
    #[error("wait for the assistant to reply before sending again")]
    Busy,
}

/// What to show after a failed send to an existing chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinueFailurePolicy {
    /// Roll back to the last server-confirmed session and refetch it.
    #[default]
    Restore,
    /// Drop the local session entirely; the chat stays selected.
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Composing,
    WithChat,
    ComposeFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub message: String,
}

impl Notice {
    fn transport(context: &str, err: &TransportError) -> Self {
        let title = match err.kind() {
            ErrorKind::Offline => "Cannot reach the server",
            ErrorKind::Timeout => "The server took too long to answer",
            ErrorKind::Server => "The server returned an error",
            ErrorKind::Protocol => "Unexpected server response",
        };
        Self {
            title,
            message: format!("{context}: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Loading,
    Ready(Table),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Submit(OutgoingMessage),
    SwitchModel(String),
    SetHistoryOpen(bool),
    ToggleHistory,
    OpenChat(String),
    NewChat,
    DismissNotice,
}

/// Read-only snapshot handed to the presentation layer.
pub struct ChatView<'a> {
    pub route: &'a Route,
    pub chat: Option<&'a ChatSession>,
    pub composing: bool,
    pub active: bool,
    pub phase: Phase,
    pub revision: u64,
    pub history: &'a [ChatSummary],
    pub history_open: bool,
    pub notice: Option<&'a Notice>,
    pub files: &'a BTreeMap<String, FileState>,
}

pub struct ChatController {
    route: Route,
    session: SessionState,
    active: bool,
    send_failed: bool,
    epoch: u64,
    confirmed: Option<ChatSession>,
    history: Vec<ChatSummary>,
    history_open: bool,
    history_limit: usize,
    files: BTreeMap<String, FileState>,
    notice: Option<Notice>,
    policy: ContinueFailurePolicy,
}

impl ChatController {
    pub fn new(route: Route, history_limit: usize, policy: ContinueFailurePolicy) -> Self {
        Self {
            route,
            session: SessionState::default(),
            active: false,
            send_failed: false,
            epoch: 0,
            confirmed: None,
            history: Vec::new(),
            history_open: false,
            history_limit,
            files: BTreeMap::new(),
            notice: None,
            policy,
        }
    }

    /// Initial loads for the route the view was opened with.
    pub fn start(&mut self) -> Vec<Command> {
        let mut commands = vec![self.fetch_history()];
        if let Some(chat_id) = self.route.chat_id.clone() {
            self.active = true;
            commands.push(self.fetch_chat(chat_id));
        }
        commands
    }

    pub fn composing(&self) -> bool {
        self.session.composing()
    }

    pub fn active(&self) -> bool {
        self.active
    }

    #[cfg(test)]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn phase(&self) -> Phase {
        if self.session.composing() {
            Phase::Composing
        } else if !self.active {
            Phase::Idle
        } else if self.send_failed {
            Phase::ComposeFailed
        } else {
            Phase::WithChat
        }
    }

    pub fn view(&self) -> ChatView<'_> {
        ChatView {
            route: &self.route,
            chat: self.session.chat(),
            composing: self.session.composing(),
            active: self.active,
            phase: self.phase(),
            revision: self.session.revision(),
            history: &self.history,
            history_open: self.history_open,
            notice: self.notice.as_ref(),
            files: &self.files,
        }
    }

    pub fn handle(&mut self, intent: Intent) -> Result<Vec<Command>, InputError> {
        match intent {
            Intent::Submit(message) => self.submit(message),
            Intent::SwitchModel(model) => Ok(self.switch_model(model)),
            Intent::SetHistoryOpen(open) => {
                self.history_open = open;
                Ok(Vec::new())
            }
            Intent::ToggleHistory => {
                self.history_open = !self.history_open;
                Ok(Vec::new())
            }
            Intent::OpenChat(chat_id) => Ok(self.open_chat(chat_id)),
            Intent::NewChat => Ok(self.new_chat()),
            Intent::DismissNotice => {
                self.notice = None;
                Ok(Vec::new())
            }
        }
    }

    pub fn apply(&mut self, event: AppEvent) -> Vec<Command> {
        match event {
            AppEvent::ChatStarted { epoch, result } => {
                if self.is_stale(epoch, "chat start") {
                    return Vec::new();
                }
                match result {
                    Ok(chat) => {
                        tracing::info!(chat_id = ?chat.chat_id, "chat created");
                        self.route.chat_id = chat.chat_id.clone();
                        self.active = true;
                        let mut commands = self.adopt(chat);
                        commands.push(self.fetch_history());
                        commands
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to start chat");
                        self.session.clear();
                        self.confirmed = None;
                        self.active = false;
                        self.route.chat_id = None;
                        self.notice = Some(Notice::transport("Could not start the chat", &err));
                        Vec::new()
                    }
                }
            }
            AppEvent::ChatContinued { epoch, result } => {
                if self.is_stale(epoch, "chat continue") {
                    return Vec::new();
                }
                match result {
                    Ok(chat) => {
                        let mut commands = self.adopt(chat);
                        commands.push(self.fetch_history());
                        commands
                    }
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            policy = ?self.policy,
                            "failed to continue chat"
                        );
                        self.send_failed = true;
                        self.notice = Some(Notice::transport("Could not send the message", &err));
                        match self.policy {
                            ContinueFailurePolicy::Restore => {
                                self.session.restore(self.confirmed.clone());
                                self.route
                                    .chat_id
                                    .clone()
                                    .map(|chat_id| vec![self.fetch_chat(chat_id)])
                                    .unwrap_or_default()
                            }
                            ContinueFailurePolicy::Discard => {
                                self.session.clear();
                                Vec::new()
                            }
                        }
                    }
                }
            }
            AppEvent::ChatLoaded {
                epoch,
                chat_id,
                result,
            } => {
                if self.is_stale(epoch, "chat load")
                    || self.route.chat_id.as_deref() != Some(chat_id.as_str())
                    || self.session.composing()
                {
                    return Vec::new();
                }
                match result {
                    Ok(chat) => self.adopt(chat),
                    Err(err) => {
                        tracing::warn!(error = %err, %chat_id, "failed to load chat");
                        self.notice = Some(Notice::transport("Could not load the chat", &err));
                        Vec::new()
                    }
                }
            }
            AppEvent::HistoryLoaded { model, result } => {
                if model != self.route.model {
                    tracing::debug!(%model, "dropping history for inactive model");
                    return Vec::new();
                }
                match result {
                    Ok(history) => self.history = history,
                    Err(err) => tracing::warn!(error = %err, "failed to load chat history"),
                }
                Vec::new()
            }
            AppEvent::FileLoaded {
                model,
                file_path,
                result,
            } => {
                if model != self.route.model {
                    return Vec::new();
                }
                if let Some(state) = self.files.get_mut(&file_path) {
                    *state = match result {
                        Ok(table) => FileState::Ready(table),
                        Err(err) => {
                            tracing::warn!(error = %err, %file_path, "failed to load message file");
                            FileState::Failed(err.to_string())
                        }
                    };
                }
                Vec::new()
            }
        }
    }

    fn submit(&mut self, message: OutgoingMessage) -> Result<Vec<Command>, InputError> {
        if message.is_empty() {
            return Err(InputError::Empty);
        }
        if self.session.composing() {
            return Err(InputError::Busy);
        }

        self.send_failed = false;
        self.active = true;
        self.session.push_provisional(Message::provisional(&message));

        let command = match self.route.chat_id.clone() {
            None => Command::StartChat {
                epoch: self.epoch,
                model: self.route.model.clone(),
                message,
            },
            Some(chat_id) => Command::ContinueChat {
                epoch: self.epoch,
                model: self.route.model.clone(),
                chat_id,
                message,
            },
        };
        Ok(vec![command])
    }

    fn open_chat(&mut self, chat_id: String) -> Vec<Command> {
        self.begin_view();
        self.route.chat_id = Some(chat_id.clone());
        self.active = true;
        self.history_open = false;
        vec![self.fetch_chat(chat_id)]
    }

    fn new_chat(&mut self) -> Vec<Command> {
        self.begin_view();
        self.route.chat_id = None;
        self.active = false;
        self.history_open = false;
        vec![self.fetch_history()]
    }

    fn switch_model(&mut self, model: String) -> Vec<Command> {
        let model = model.trim();
        if model.is_empty() || model == self.route.model {
            return Vec::new();
        }

        self.begin_view();
        self.route = Route::new(model, self.route.chat_id.take());
        self.history.clear();

        let mut commands = vec![self.fetch_history()];
        match self.route.chat_id.clone() {
            Some(chat_id) => {
                self.active = true;
                commands.push(self.fetch_chat(chat_id));
            }
            None => self.active = false,
        }
        commands
    }

    /// Starts a new view; anything still in flight for the old one is dropped
    /// when it lands.
    fn begin_view(&mut self) {
        self.epoch += 1;
        self.session.clear();
        self.confirmed = None;
        self.send_failed = false;
        self.files.clear();
    }

    fn adopt(&mut self, chat: ChatSession) -> Vec<Command> {
        let missing: Vec<String> = chat
            .file_paths()
            .filter(|path| !self.files.contains_key(*path))
            .map(str::to_string)
            .collect();

        let mut commands = Vec::with_capacity(missing.len());
        for file_path in missing {
            self.files.insert(file_path.clone(), FileState::Loading);
            commands.push(Command::FetchFile {
                model: self.route.model.clone(),
                file_path,
            });
        }

        self.send_failed = false;
        self.confirmed = Some(chat.clone());
        self.session.replace(chat);
        commands
    }

    fn is_stale(&self, epoch: u64, what: &str) -> bool {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "dropping stale {what} result");
            return true;
        }
        false
    }

    fn fetch_history(&self) -> Command {
        Command::FetchHistory {
            model: self.route.model.clone(),
            limit: self.history_limit,
        }
    }

    fn fetch_chat(&self, chat_id: String) -> Command {
        Command::FetchChat {
            epoch: self.epoch,
            model: self.route.model.clone(),
            chat_id,
        }
    }
}
