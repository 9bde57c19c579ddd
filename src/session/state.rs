use crate::session::{ChatSession, Message};

/// Conversation held by the active chat view.
///
/// `revision` increases whenever the held session is replaced or cleared so
/// the view can tell a fresh server copy from the one it last rendered.
#[derive(Debug, Default)]
pub struct SessionState {
    chat: Option<ChatSession>,
    composing: bool,
    revision: u64,
}

impl SessionState {
    pub fn chat(&self) -> Option<&ChatSession> {
        self.chat.as_ref()
    }

    pub fn composing(&self) -> bool {
        self.composing
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Appends a provisional message, creating an untitled session if none is
    /// held, and marks the view as waiting for the assistant.
    pub fn push_provisional(&mut self, message: Message) {
        self.chat
            .get_or_insert_with(ChatSession::default)
            .messages
            .push(message);
        self.composing = true;
    }

    pub fn replace(&mut self, chat: ChatSession) {
        self.chat = Some(chat);
        self.composing = false;
        self.revision += 1;
    }

    pub fn restore(&mut self, chat: Option<ChatSession>) {
        self.chat = chat;
        self.composing = false;
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        self.restore(None);
    }
}
