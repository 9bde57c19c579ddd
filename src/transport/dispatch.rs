use crate::event::AppEvent;
use crate::session::OutgoingMessage;
use crate::transport::ChatApi;
use std::sync::{mpsc, Arc};
use tokio::runtime::Handle;

/// Network work requested by the chat controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartChat {
        epoch: u64,
        model: String,
        message: OutgoingMessage,
    },
    ContinueChat {
        epoch: u64,
        model: String,
        chat_id: String,
        message: OutgoingMessage,
    },
    FetchChat {
        epoch: u64,
        model: String,
        chat_id: String,
    },
    FetchHistory {
        model: String,
        limit: usize,
    },
    FetchFile {
        model: String,
        file_path: String,
    },
}

pub async fn run(api: &dyn ChatApi, command: Command) -> AppEvent {
    match command {
        Command::StartChat {
            epoch,
            model,
            message,
        } => AppEvent::ChatStarted {
            epoch,
            result: api.start_chat(&model, &message).await,
        },
        Command::ContinueChat {
            epoch,
            model,
            chat_id,
            message,
        } => AppEvent::ChatContinued {
            epoch,
            result: api.continue_chat(&model, &chat_id, &message).await,
        },
        Command::FetchChat {
            epoch,
            model,
            chat_id,
        } => {
            let result = api.get_chat(&model, &chat_id).await;
            AppEvent::ChatLoaded {
                epoch,
                chat_id,
                result,
            }
        }
        Command::FetchHistory { model, limit } => {
            let result = api.list_chats(&model, limit).await;
            AppEvent::HistoryLoaded { model, result }
        }
        Command::FetchFile { model, file_path } => {
            let result = api.get_chat_file(&model, &file_path).await;
            AppEvent::FileLoaded {
                model,
                file_path,
                result,
            }
        }
    }
}

/// Runs commands on the tokio runtime and posts each result to the UI
/// channel. Commands run to completion; nothing is cancelled.
#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn ChatApi>,
    tx: mpsc::Sender<AppEvent>,
    runtime_handle: Handle,
    notify: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn ChatApi>, tx: mpsc::Sender<AppEvent>, runtime_handle: Handle) -> Self {
        Self {
            api,
            tx,
            runtime_handle,
            notify: None,
        }
    }

    /// Callback fired after every delivered event, used to wake the UI.
    pub fn with_notify(mut self, notify: impl Fn() + Send + Sync + 'static) -> Self {
        self.notify = Some(Arc::new(notify));
        self
    }

    pub fn execute(&self, command: Command) {
        tracing::debug!(?command, "dispatching");
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let notify = self.notify.clone();

        self.runtime_handle.spawn(async move {
            let event = run(api.as_ref(), command).await;
            if tx.send(event).is_err() {
                tracing::debug!("event channel closed, dropping result");
                return;
            }
            if let Some(notify) = notify {
                notify();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{run, Command, Dispatcher};
    use crate::event::AppEvent;
    use crate::session::OutgoingMessage;
    use crate::transport::fake::FakeApi;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    #[tokio::test]
    async fn start_command_maps_to_chat_started() {
        let api = FakeApi::default();
        let event = run(
            &api,
            Command::StartChat {
                epoch: 3,
                model: "llm-rag".to_string(),
                message: OutgoingMessage::compose("hello", None),
            },
        )
        .await;

        match event {
            AppEvent::ChatStarted { epoch, result } => {
                assert_eq!(epoch, 3);
                assert_eq!(
                    result.expect("fake start succeeds").chat_id.as_deref(),
                    Some("abc123")
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(api.calls(), ["start llm-rag hello"]);
    }

    #[tokio::test]
    async fn continue_command_maps_to_chat_continued() {
        let api = FakeApi::default();
        let event = run(
            &api,
            Command::ContinueChat {
                epoch: 4,
                model: "llm-rag".to_string(),
                chat_id: "abc123".to_string(),
                message: OutgoingMessage::compose("and vitamin D?", None),
            },
        )
        .await;

        match event {
            AppEvent::ChatContinued { epoch, result } => {
                assert_eq!(epoch, 4);
                let chat = result.expect("fake continue succeeds");
                assert_eq!(chat.chat_id.as_deref(), Some("abc123"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(api.calls(), ["continue llm-rag abc123 and vitamin D?"]);
    }

    #[tokio::test]
    async fn fetch_chat_keeps_requested_id_on_failure() {
        let api = FakeApi::failing();
        let event = run(
            &api,
            Command::FetchChat {
                epoch: 2,
                model: "llm-rag".to_string(),
                chat_id: "abc123".to_string(),
            },
        )
        .await;

        match event {
            AppEvent::ChatLoaded {
                epoch,
                chat_id,
                result,
            } => {
                assert_eq!(epoch, 2);
                assert_eq!(chat_id, "abc123");
                assert!(result.is_err());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(api.calls(), ["get llm-rag abc123"]);
    }

    #[tokio::test]
    async fn fetch_file_echoes_path() {
        let api = FakeApi::default();
        let event = run(
            &api,
            Command::FetchFile {
                model: "llm-rag".to_string(),
                file_path: "files/abc123/1.csv".to_string(),
            },
        )
        .await;

        match event {
            AppEvent::FileLoaded {
                model, file_path, ..
            } => {
                assert_eq!(model, "llm-rag");
                assert_eq!(file_path, "files/abc123/1.csv");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn execute_delivers_event_and_notifies() {
        let api = Arc::new(FakeApi::default());
        let (tx, rx) = mpsc::channel();
        let woken = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&woken);

        let dispatcher = Dispatcher::new(api, tx, tokio::runtime::Handle::current())
            .with_notify(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        dispatcher.execute(Command::FetchHistory {
            model: "llm-rag".to_string(),
            limit: 5,
        });

        let event = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .expect("receiver task should join")
            .expect("event should arrive");
        assert!(matches!(event, AppEvent::HistoryLoaded { .. }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(woken.load(Ordering::SeqCst), 1);
    }
}
