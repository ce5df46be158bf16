//! The session actor and its handle.
//!
//! The actor owns a `SessionState` exclusively. It waits on three things at
//! once: commands from handles, the save debounce deadline, and completions
//! of the load and save tasks it spawned. Every completion carries the epoch
//! it was started under, so results for a document that has since been
//! switched away from are recognized and dropped.

use std::sync::Arc;

use outline_editor_core::Operation;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::CrdtError;
use crate::buffer::LoroTextBuffer;
use crate::config::{BackupSchedule, SessionConfig};
use crate::debounce::Debounce;
use crate::error::PersistenceError;
use crate::persist::{BackupSink, ChangeEvent, DocumentAddress, DocumentStore, run_backups};
use crate::session::state::{RemoteOutcome, SaveOutcome, SaveRequest, SessionState, SessionStatus};

type Reply<T> = oneshot::Sender<Result<T, CrdtError>>;

enum Command {
    Open {
        address: DocumentAddress,
        reply: Reply<()>,
    },
    Edit {
        ops: Vec<Operation<LoroTextBuffer>>,
        reply: Reply<bool>,
    },
    Remote {
        value: String,
        reply: Reply<RemoteOutcome>,
    },
    Changed(ChangeEvent),
    Value {
        reply: oneshot::Sender<Option<(DocumentAddress, String)>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Close {
        reply: Reply<()>,
    },
}

enum Completion {
    Loaded {
        epoch: u64,
        result: Result<String, PersistenceError>,
    },
    Fetched {
        epoch: u64,
        result: Result<String, PersistenceError>,
    },
    Saved {
        request: SaveRequest,
        result: Result<(), CrdtError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct PendingOpen {
    epoch: u64,
    address: DocumentAddress,
    reply: Reply<()>,
}

struct SessionActor<S> {
    store: Arc<S>,
    state: SessionState,
    debounce: Debounce,
    commands: mpsc::Receiver<Command>,
    accepting: bool,
    completions: mpsc::UnboundedReceiver<Completion>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    pending_open: Option<PendingOpen>,
    /// Set once a close is requested; the inner reply is None when the
    /// session is closing because every handle was dropped.
    closing: Option<Option<Reply<()>>>,
    last_save_error: Option<String>,
}

/// Start a session actor on the current tokio runtime.
pub fn spawn_session<S: DocumentStore>(store: S, config: SessionConfig) -> SessionHandle {
    let (commands_tx, commands) = mpsc::channel(64);
    let (completion_tx, completions) = mpsc::unbounded_channel();
    let actor = SessionActor {
        store: Arc::new(store),
        state: SessionState::new(config.history_capacity),
        debounce: Debounce::new(config.save_debounce),
        commands,
        accepting: true,
        completions,
        completion_tx,
        pending_open: None,
        closing: None,
        last_save_error: None,
    };
    tokio::spawn(actor.run());
    SessionHandle {
        commands: commands_tx,
    }
}

impl<S: DocumentStore> SessionActor<S> {
    async fn run(mut self) {
        loop {
            let flow = tokio::select! {
                command = self.commands.recv(), if self.accepting => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("all session handles dropped");
                        self.begin_close(None)
                    }
                },
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                () = self.debounce.elapsed() => {
                    self.debounce.cancel();
                    self.start_save();
                    Flow::Continue
                }
            };
            if flow == Flow::Stop {
                break;
            }
        }
        debug!("session actor stopped");
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Open { address, reply } => {
                self.debounce.cancel();
                if let Some(previous) = self.pending_open.take() {
                    let _ = previous.reply.send(Err(CrdtError::Superseded {
                        address: previous.address.to_string(),
                    }));
                }
                let epoch = self.state.switch_document(address.clone());
                self.spawn_load(epoch, address.clone(), false);
                self.pending_open = Some(PendingOpen {
                    epoch,
                    address,
                    reply,
                });
            }

            Command::Edit { ops, reply } => {
                let result = self.state.apply_local(&ops);
                if let Err(e) = &result {
                    warn!("edit rejected: {e}");
                }
                if matches!(result, Ok(true)) {
                    self.debounce.trigger();
                }
                let _ = reply.send(result);
            }

            Command::Remote { value, reply } => {
                let result = self.state.receive_remote(&value);
                if matches!(result, Ok(RemoteOutcome::LocalWins)) {
                    self.debounce.trigger();
                }
                let _ = reply.send(result);
            }

            Command::Changed(event) => {
                if self.state.address() != Some(&event.address) {
                    trace!(address = %event.address, "change event for another document");
                } else if !self.state.note_revision(&event.revision) {
                    trace!(revision = %event.revision, "revision already seen");
                } else {
                    self.spawn_load(self.state.epoch(), event.address, true);
                }
            }

            Command::Value { reply } => {
                let value = self
                    .state
                    .address()
                    .cloned()
                    .zip(self.state.serialized().map(str::to_string));
                let _ = reply.send(value);
            }

            Command::Status { reply } => {
                let _ = reply.send(self.state.status());
            }

            Command::Close { reply } => return self.begin_close(Some(reply)),
        }
        Flow::Continue
    }

    fn handle_completion(&mut self, completion: Completion) -> Flow {
        match completion {
            Completion::Loaded { epoch, result } => {
                let loaded = match result {
                    Ok(stored) => self.state.finish_load(epoch, &stored),
                    Err(PersistenceError::NotFound { .. }) => self.state.finish_load(epoch, ""),
                    Err(e) => Err(e.into()),
                };
                match self.pending_open.take() {
                    Some(pending) if pending.epoch == epoch => {
                        if let Ok(true) = loaded {
                            info!(address = %pending.address, "document opened");
                        }
                        let _ = pending.reply.send(loaded.map(|_| ()));
                    }
                    other => self.pending_open = other,
                }
            }

            Completion::Fetched { epoch, result } => {
                if epoch != self.state.epoch() {
                    return Flow::Continue;
                }
                match result.map_err(CrdtError::from).and_then(|stored| {
                    self.state.receive_remote(&stored)
                }) {
                    Ok(RemoteOutcome::LocalWins) => self.debounce.trigger(),
                    Ok(outcome) => debug!(?outcome, "remote change reconciled"),
                    Err(e) => warn!("failed to fetch changed document: {e}"),
                }
            }

            Completion::Saved { request, result } => {
                let error = result.as_ref().err().map(ToString::to_string);
                let outcome = self.state.finish_save(&request, result);
                if outcome == SaveOutcome::Stale {
                    return Flow::Continue;
                }
                self.last_save_error = error;
                debug!(address = %request.address, ?outcome, "save finished");
                if self.closing.is_some() {
                    if outcome != SaveOutcome::Failed && outcome.needs_rearm() {
                        self.start_save();
                    }
                    return self.try_finish_close();
                }
                if outcome.needs_rearm() {
                    self.debounce.trigger();
                }
            }
        }
        Flow::Continue
    }

    fn spawn_load(&self, epoch: u64, address: DocumentAddress, remote: bool) {
        let store = self.store.clone();
        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = store.load(&address).await;
            let completion = if remote {
                Completion::Fetched { epoch, result }
            } else {
                Completion::Loaded { epoch, result }
            };
            let _ = completions.send(completion);
        });
    }

    fn start_save(&mut self) {
        let Some(request) = self.state.begin_save() else {
            return;
        };
        debug!(
            address = %request.address,
            added = request.diff.added.len(),
            deleted = request.diff.deleted.len(),
            "saving document"
        );
        let store = self.store.clone();
        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = store
                .save(&request.address, &request.value, &request.diff)
                .await
                .map_err(CrdtError::from);
            let _ = completions.send(Completion::Saved { request, result });
        });
    }

    fn begin_close(&mut self, reply: Option<Reply<()>>) -> Flow {
        self.accepting = false;
        self.debounce.cancel();
        if let Some(pending) = self.pending_open.take() {
            let _ = pending.reply.send(Err(CrdtError::SessionClosed));
        }
        self.closing = Some(reply);
        self.start_save();
        self.try_finish_close()
    }

    /// Finish closing once no save is in flight.
    fn try_finish_close(&mut self) -> Flow {
        if self.state.is_saving() {
            return Flow::Continue;
        }
        let result = match (self.state.is_dirty(), self.last_save_error.take()) {
            (true, Some(message)) => Err(CrdtError::Persistence(PersistenceError::Backend {
                message,
            })),
            _ => Ok(()),
        };
        if let Err(e) = &result {
            warn!("closing with unsaved changes: {e}");
        }
        self.state.close();
        if let Some(Some(reply)) = self.closing.take() {
            let _ = reply.send(result);
        }
        Flow::Stop
    }
}

/// Cheap, cloneable access to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, CrdtError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| CrdtError::SessionClosed)?;
        response.await.map_err(|_| CrdtError::SessionClosed)
    }

    /// Switch to `address` and wait for its value to load.
    ///
    /// Unsaved edits to the previously open document are discarded.
    pub async fn open(&self, address: impl Into<DocumentAddress>) -> Result<(), CrdtError> {
        let address = address.into();
        self.request(|reply| Command::Open { address, reply }).await?
    }

    /// Apply local edits. Returns true when the document changed.
    pub async fn edit(&self, ops: Vec<Operation<LoroTextBuffer>>) -> Result<bool, CrdtError> {
        self.request(|reply| Command::Edit { ops, reply }).await?
    }

    /// Offer a value pushed by the store.
    pub async fn receive_remote(&self, value: impl Into<String>) -> Result<RemoteOutcome, CrdtError> {
        let value = value.into();
        self.request(|reply| Command::Remote { value, reply }).await?
    }

    /// Report that the store holds a new revision of some document. The
    /// session refetches it when it is the open document and the revision
    /// is new.
    pub async fn notify_changed(&self, event: ChangeEvent) -> Result<(), CrdtError> {
        self.commands
            .send(Command::Changed(event))
            .await
            .map_err(|_| CrdtError::SessionClosed)
    }

    /// The open document and its stored form.
    pub async fn value(&self) -> Result<Option<(DocumentAddress, String)>, CrdtError> {
        self.request(|reply| Command::Value { reply }).await
    }

    pub async fn status(&self) -> Result<SessionStatus, CrdtError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Flush pending edits and stop the session.
    pub async fn close(&self) -> Result<(), CrdtError> {
        self.request(|reply| Command::Close { reply }).await?
    }

    /// Back up the open document to `sink` on `schedule` until the session
    /// stops.
    pub fn spawn_backups<K: BackupSink>(&self, sink: K, schedule: BackupSchedule) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(run_backups(sink, schedule, move || {
            let handle = handle.clone();
            async move { handle.value().await.map_err(|_| ()) }
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::future::Future;
    use std::time::Duration;

    use outline_editor_core::{Node, Path};
    use tokio::sync::Notify;
    use tokio::time::sleep;

    use super::*;
    use crate::persist::{LinkedStore, MemoryStore, ReferenceDiff};

    const DOC_A: &str = r#"[{"type":"paragraph","children":[{"text":"alpha"}]}]"#;
    const DOC_B: &str = r#"[{"type":"paragraph","children":[{"text":"beta"}]}]"#;

    fn typed(text: &str) -> Vec<Operation<LoroTextBuffer>> {
        vec![Operation::InsertText {
            path: Path::from([0, 0]),
            offset: 0,
            text: text.into(),
        }]
    }

    fn memory() -> MemoryStore {
        let memory = MemoryStore::new();
        memory.insert("a", DOC_A);
        memory.insert("b", DOC_B);
        memory
    }

    /// Saves wait for a permit before reaching the inner store.
    #[derive(Clone)]
    struct GatedStore {
        inner: MemoryStore,
        gate: Arc<Notify>,
    }

    impl DocumentStore for GatedStore {
        fn load<'a>(
            &'a self,
            address: &'a DocumentAddress,
        ) -> impl Future<Output = Result<String, PersistenceError>> + Send + 'a {
            self.inner.load(address)
        }

        fn save<'a>(
            &'a self,
            address: &'a DocumentAddress,
            value: &'a str,
            references: &'a ReferenceDiff,
        ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
            async move {
                self.gate.notified().await;
                self.inner.save(address, value, references).await
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_edits_saves_once() {
        let store = memory();
        let session = spawn_session(store.clone(), SessionConfig::default());
        session.open("a").await.unwrap();

        for text in ["1", "2", "3", "4", "5"] {
            assert!(session.edit(typed(text)).await.unwrap());
            sleep(Duration::from_millis(200)).await;
        }
        assert!(store.saves().is_empty());

        sleep(Duration::from_secs(2)).await;
        let saves = store.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].0, DocumentAddress::new("a"));
        assert!(saves[0].1.contains("54321alpha"));
        assert!(!session.status().await.unwrap().dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_during_save_keeps_documents_apart() {
        let inner = memory();
        let gate = Arc::new(Notify::new());
        let store = GatedStore {
            inner: inner.clone(),
            gate: gate.clone(),
        };
        let session = spawn_session(store, SessionConfig::default());

        session.open("a").await.unwrap();
        session.edit(typed("edited ")).await.unwrap();
        sleep(Duration::from_secs(2)).await;
        assert!(session.status().await.unwrap().saving);

        session.open("b").await.unwrap();
        gate.notify_one();
        sleep(Duration::from_millis(10)).await;

        // The old save landed on a, and b is untouched and clean.
        assert_eq!(
            inner.get(&"a".into()).as_deref(),
            Some(r#"[{"type":"paragraph","children":[{"text":"edited alpha"}]}]"#)
        );
        let status = session.status().await.unwrap();
        assert_eq!(status.address, Some(DocumentAddress::new("b")));
        assert!(!status.dirty);
        assert!(!status.saving);
        let (address, value) = session.value().await.unwrap().unwrap();
        assert_eq!(address, DocumentAddress::new("b"));
        assert_eq!(value, DOC_B);
        assert_eq!(inner.get(&"b".into()).as_deref(), Some(DOC_B));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_pending_edits() {
        let store = memory();
        let session = spawn_session(store.clone(), SessionConfig::default());
        session.open("a").await.unwrap();
        session.edit(typed("x")).await.unwrap();
        session.close().await.unwrap();

        assert_eq!(store.saves().len(), 1);
        assert!(matches!(session.status().await, Err(CrdtError::SessionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_document_opens_blank() {
        let session = spawn_session(MemoryStore::new(), SessionConfig::default());
        session.open("new").await.unwrap();
        let (_, value) = session.value().await.unwrap().unwrap();
        assert_eq!(value, r#"[{"type":"paragraph","children":[{"text":""}]}]"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_events_refetch_once_per_revision() {
        let store = memory();
        let session = spawn_session(store.clone(), SessionConfig::default());
        session.open("a").await.unwrap();

        store.insert("a", DOC_B);
        let event = ChangeEvent {
            address: "a".into(),
            revision: "r1".into(),
        };
        session.notify_changed(event.clone()).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(session.value().await.unwrap().unwrap().1, DOC_B);

        store.insert("a", DOC_A);
        session.notify_changed(event).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(session.value().await.unwrap().unwrap().1, DOC_B);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_saves_retry() {
        let store = memory();
        store.fail_saves(true);
        let session = spawn_session(store.clone(), SessionConfig::default());
        session.open("a").await.unwrap();
        session.edit(typed("x")).await.unwrap();

        sleep(Duration::from_secs(2)).await;
        let status = session.status().await.unwrap();
        assert!(status.saving);
        assert_eq!(status.failed_saves, 1);

        store.fail_saves(false);
        sleep(Duration::from_secs(2)).await;
        let status = session.status().await.unwrap();
        assert!(!status.saving);
        assert_eq!(store.saves().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_backlinks_show_in_status() {
        let documents = memory();
        let backlinks = MemoryStore::new();
        backlinks.fail_backlinks_for("Broken");
        let store = LinkedStore::new(documents.clone(), backlinks.clone());
        let session = spawn_session(store, SessionConfig::default());
        session.open("a").await.unwrap();

        let ops = vec![
            Operation::InsertNode {
                path: Path::from([0, 1]),
                node: Node::concept("Broken"),
            },
            Operation::InsertNode {
                path: Path::from([0, 2]),
                node: Node::concept("Fine"),
            },
        ];
        session.edit(ops).await.unwrap();
        sleep(Duration::from_secs(2)).await;

        let status = session.status().await.unwrap();
        assert!(status.references_failed);
        assert!(!status.dirty);
        assert_eq!(documents.saves().len(), 1);
        assert_eq!(
            backlinks.backlinks_to("Fine"),
            BTreeSet::from([DocumentAddress::new("a")])
        );
        assert!(backlinks.backlinks_to("Broken").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backups_copy_the_open_document() {
        let backups = MemoryStore::new();
        let session = spawn_session(memory(), SessionConfig::default());
        session.open("a").await.unwrap();
        let task = session.spawn_backups(backups.clone(), BackupSchedule::EveryMinute);

        sleep(Duration::from_secs(61)).await;
        assert_eq!(
            backups.saves(),
            vec![(DocumentAddress::new("a.backup"), DOC_A.to_string())]
        );

        // The backup loop ends with the session.
        session.close().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_edit_reports_error() {
        let session = spawn_session(memory(), SessionConfig::default());
        session.open("a").await.unwrap();
        let err = session
            .edit(vec![Operation::MergeNode {
                path: Path::from([0]),
                position: 0,
                properties: Default::default(),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, CrdtError::Tree(_)));
        assert_eq!(session.value().await.unwrap().unwrap().1, DOC_A);
    }
}
