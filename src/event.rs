use crate::session::{ChatSession, ChatSummary};
use crate::table::Table;
use crate::transport::TransportError;

/// Result of a dispatched command, delivered back to the UI thread.
///
/// `epoch` echoes the view that issued the command.
#[derive(Debug)]
pub enum AppEvent {
    ChatStarted {
        epoch: u64,
        result: Result<ChatSession, TransportError>,
    },
    ChatContinued {
        epoch: u64,
        result: Result<ChatSession, TransportError>,
    },
    ChatLoaded {
        epoch: u64,
        chat_id: String,
        result: Result<ChatSession, TransportError>,
    },
    HistoryLoaded {
        model: String,
        result: Result<Vec<ChatSummary>, TransportError>,
    },
    FileLoaded {
        model: String,
        file_path: String,
        result: Result<Table, TransportError>,
    },
}
