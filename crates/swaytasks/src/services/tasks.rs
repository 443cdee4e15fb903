//! Workspace task tracking engine.
//!
//! Subscribes to compositor change events and maintains the published
//! workspace/window model. Events never carry the new state, so every
//! notification triggers a full re-fetch of the layout tree; while one
//! request is outstanding further events are coalesced, which is correct
//! here because the compositor always answers with the current tree.
//!
//! The model is rebuilt under a single mutex and replaced wholesale; the
//! consumer is notified after the lock is released and reads a complete
//! snapshot, never a partial one.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, error, trace, warn};

use super::appinfo::IdentityResolver;
use super::callbacks::{CallbackId, Callbacks};
use super::ipc::{IpcMessage, SwayIpc, Transport};
use super::tree::{build_workspaces, Node, WorkspaceModel};

/// Published model: the ordered workspace sequence. Replaced wholesale on
/// every publish.
#[derive(Debug, Clone, Default)]
pub struct TaskSnapshot {
    pub workspaces: Vec<WorkspaceModel>,
}

/// Whether a tree request is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    Idle,
    Refreshing,
}

struct EngineState {
    fetch: FetchState,
    workspaces: Vec<WorkspaceModel>,
}

/// Per-command outcome in a RUN_COMMAND reply.
#[derive(Debug, Deserialize)]
struct CommandOutcome {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// The tree synchronization engine.
///
/// Owns the transport's write side and the published model. Incoming
/// [`IpcMessage`]s are consumed by [`TaskService::handle_message`], either
/// from the internal consumer thread (see [`TaskService::start`]) or
/// directly in tests.
pub struct TaskService {
    transport: Arc<dyn Transport>,
    resolver: IdentityResolver,
    state: Mutex<EngineState>,
    callbacks: Callbacks<TaskSnapshot>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl TaskService {
    /// Create the engine and issue the initial tree request.
    pub fn new(transport: Arc<dyn Transport>, resolver: IdentityResolver) -> Arc<Self> {
        let service = Arc::new(Self {
            transport,
            resolver,
            state: Mutex::new(EngineState {
                fetch: FetchState::Idle,
                workspaces: Vec::new(),
            }),
            callbacks: Callbacks::new(),
            consumer: Mutex::new(None),
        });

        service.refresh();
        service
    }

    /// Wire an IPC connection to a new engine: spawns the transport worker
    /// and a consumer thread draining its channel.
    pub fn start(ipc: SwayIpc, resolver: IdentityResolver) -> Arc<Self> {
        let (tx, rx) = mpsc::channel();
        ipc.start(tx);

        let service = Self::new(Arc::new(ipc), resolver);

        let engine = Arc::clone(&service);
        let handle = thread::Builder::new()
            .name("swaytasks-engine".into())
            .spawn(move || {
                for msg in rx {
                    engine.handle_message(msg);
                }
                debug!("engine consumer exiting");
            })
            .ok();
        *service.consumer.lock() = handle;

        service
    }

    /// Consume one transport message.
    pub(crate) fn handle_message(&self, msg: IpcMessage) {
        match msg {
            IpcMessage::Change | IpcMessage::Connected => self.refresh(),
            IpcMessage::Tree(payload) => self.on_tree(&payload),
            IpcMessage::CommandResult(payload) => log_command_result(&payload),
        }
    }

    /// Request a fresh tree unless one is already on the way.
    fn refresh(&self) {
        let mut state = self.state.lock();
        if state.fetch == FetchState::Refreshing {
            // The outstanding reply will reflect the latest state anyway
            trace!("refresh coalesced, request already outstanding");
            return;
        }

        match self.transport.request_tree() {
            Ok(()) => state.fetch = FetchState::Refreshing,
            Err(e) => error!("failed to request tree: {}", e),
        }
    }

    /// Rebuild and publish the model from a tree reply.
    fn on_tree(&self, payload: &[u8]) {
        let root: Node = match serde_json::from_slice(payload) {
            Ok(root) => root,
            Err(e) => {
                // Abandon the rebuild; the published model stays as it was
                error!("failed to parse tree payload: {}", e);
                self.state.lock().fetch = FetchState::Idle;
                return;
            }
        };

        let snapshot = {
            let mut state = self.state.lock();
            state.workspaces = build_workspaces(&root, &self.resolver);
            state.fetch = FetchState::Idle;
            TaskSnapshot {
                workspaces: state.workspaces.clone(),
            }
        };

        debug!("published {} workspaces", snapshot.workspaces.len());
        self.callbacks.notify(&snapshot);
    }

    /// Current published model.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            workspaces: self.state.lock().workspaces.clone(),
        }
    }

    /// Register a consumer callback; it is invoked immediately with the
    /// current model, then after every publish.
    pub fn connect<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&TaskSnapshot) + Send + Sync + 'static,
    {
        let id = self.callbacks.register(callback);
        self.callbacks.notify_single(id, &self.snapshot());
        id
    }

    /// Remove a previously registered consumer callback.
    pub fn disconnect(&self, id: CallbackId) -> bool {
        self.callbacks.unregister(id)
    }

    /// Focus the workspace with the given numeric index. Fire-and-forget:
    /// failures are logged, never escalated.
    pub fn activate_workspace(&self, num: i64) {
        debug!("activate workspace {}", num);
        if let Err(e) = self
            .transport
            .run_command(&format!("workspace number {}", num))
        {
            error!("failed to focus workspace {}: {}", num, e);
        }
    }

    /// Focus the window with the given id. Fire-and-forget.
    pub fn activate_window(&self, id: i64) {
        debug!("activate window {}", id);
        if let Err(e) = self.transport.run_command(&format!("[con_id={}] focus", id)) {
            error!("failed to focus window {}: {}", id, e);
        }
    }

    /// Focus the workspace `delta` positions away from the focused one in
    /// the published order, wrapping at both ends. A no-op when no
    /// workspace is focused.
    pub fn cycle_workspace(&self, delta: i64) {
        let target = {
            let state = self.state.lock();
            let Some(pos) = state.workspaces.iter().position(|ws| ws.props.focused) else {
                return;
            };
            let len = state.workspaces.len() as i64;
            let next = (pos as i64 + delta).rem_euclid(len) as usize;
            state.workspaces[next].props.num
        };
        self.activate_workspace(target);
    }

    /// Shut down the transport worker and the consumer thread.
    pub fn stop(&self) {
        self.transport.stop();
        if let Some(handle) = self.consumer.lock().take() {
            let _ = handle.join();
        }
    }
}

fn log_command_result(payload: &[u8]) {
    match serde_json::from_slice::<Vec<CommandOutcome>>(payload) {
        Ok(outcomes) => {
            for outcome in outcomes {
                if !outcome.success {
                    warn!(
                        "compositor rejected command: {}",
                        outcome.error.unwrap_or_else(|| "unknown error".to_string())
                    );
                }
            }
        }
        Err(e) => debug!("unparseable command reply: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::appinfo::{AppInfoCache, DesktopDatabase};
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockTransport {
        tree_requests: AtomicUsize,
        commands: Mutex<Vec<String>>,
        fail_tree_requests: AtomicBool,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                tree_requests: AtomicUsize::new(0),
                commands: Mutex::new(Vec::new()),
                fail_tree_requests: AtomicBool::new(false),
            })
        }

        fn tree_requests(&self) -> usize {
            self.tree_requests.load(Ordering::SeqCst)
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().clone()
        }
    }

    impl Transport for MockTransport {
        fn request_tree(&self) -> io::Result<()> {
            if self.fail_tree_requests.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock failure"));
            }
            self.tree_requests.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn run_command(&self, command: &str) -> io::Result<()> {
            self.commands.lock().push(command.to_string());
            Ok(())
        }
    }

    fn service_over(transport: Arc<MockTransport>) -> Arc<TaskService> {
        let db = Arc::new(DesktopDatabase::with_dirs(Vec::new()));
        let cache = Arc::new(AppInfoCache::new(db.clone()));
        TaskService::new(transport, IdentityResolver::new(db, cache))
    }

    /// Tree payload with one output holding flat workspaces; `focused`
    /// marks one of them focused.
    fn tree_payload(nums: &[i64], focused: Option<i64>) -> IpcMessage {
        let workspaces: Vec<String> = nums
            .iter()
            .map(|n| {
                format!(
                    r#"{{"type":"workspace","id":{},"name":"{}","num":{},"focused":{}}}"#,
                    100 + n,
                    n,
                    n,
                    focused == Some(*n)
                )
            })
            .collect();
        let json = format!(
            r#"{{"type":"root","id":1,"nodes":[{{"type":"output","id":2,"nodes":[{}]}}]}}"#,
            workspaces.join(",")
        );
        IpcMessage::Tree(json.into_bytes())
    }

    #[test]
    fn test_construction_issues_initial_tree_request() {
        let transport = MockTransport::new();
        let _service = service_over(transport.clone());
        assert_eq!(transport.tree_requests(), 1);
    }

    #[test]
    fn test_events_coalesce_while_refreshing() {
        let transport = MockTransport::new();
        let service = service_over(transport.clone());
        assert_eq!(transport.tree_requests(), 1);

        // Two events while the initial request is outstanding: no-ops
        service.handle_message(IpcMessage::Change);
        service.handle_message(IpcMessage::Change);
        assert_eq!(transport.tree_requests(), 1);

        // The reply settles the engine; of two back-to-back events the
        // first requests a tree, the second coalesces
        service.handle_message(tree_payload(&[1], Some(1)));
        service.handle_message(IpcMessage::Change);
        service.handle_message(IpcMessage::Change);
        assert_eq!(transport.tree_requests(), 2);
    }

    #[test]
    fn test_tree_reply_publishes_model() {
        let transport = MockTransport::new();
        let service = service_over(transport.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        service.connect(move |snapshot| {
            seen_clone.lock().push(snapshot.workspaces.len());
        });

        service.handle_message(tree_payload(&[1, 2], Some(1)));

        // Immediate notify with the empty model, then the publish
        assert_eq!(seen.lock().clone(), vec![0, 2]);
        assert_eq!(service.snapshot().workspaces.len(), 2);
    }

    #[test]
    fn test_focused_firefox_scenario() {
        let transport = MockTransport::new();
        let service = service_over(transport.clone());

        let json = br#"{
            "type": "root", "id": 1, "nodes": [{
                "type": "output", "id": 2, "nodes": [{
                    "type": "workspace", "id": 3, "name": "1", "num": 1, "nodes": [{
                        "type": "con", "id": 4, "name": "Mozilla Firefox",
                        "app_id": "firefox", "pid": 100,
                        "focused": true, "visible": true
                    }]
                }]
            }]
        }"#;
        service.handle_message(IpcMessage::Tree(json.to_vec()));

        let snapshot = service.snapshot();
        assert_eq!(snapshot.workspaces.len(), 1);
        let ws = &snapshot.workspaces[0];
        assert_eq!(ws.props.num, 1);
        assert!(ws.props.focused);
        assert_eq!(ws.windows.len(), 1);
        assert_eq!(ws.windows[0].identity.desktop_id(), "firefox.desktop");
        assert!(ws.windows[0].props.focused);
    }

    #[test]
    fn test_parse_error_retains_previous_model() {
        let transport = MockTransport::new();
        let service = service_over(transport.clone());

        service.handle_message(tree_payload(&[1, 2], Some(1)));
        assert_eq!(service.snapshot().workspaces.len(), 2);

        service.handle_message(IpcMessage::Change);
        service.handle_message(IpcMessage::Tree(b"{ not json".to_vec()));

        // Model unchanged, engine back to idle (next event requests again)
        assert_eq!(service.snapshot().workspaces.len(), 2);
        let before = transport.tree_requests();
        service.handle_message(IpcMessage::Change);
        assert_eq!(transport.tree_requests(), before + 1);
    }

    #[test]
    fn test_failed_tree_request_leaves_engine_idle() {
        let transport = MockTransport::new();
        transport.fail_tree_requests.store(true, Ordering::SeqCst);
        let service = service_over(transport.clone());
        assert_eq!(transport.tree_requests(), 0);

        // Engine stayed idle, so the next event retriggers the request
        transport.fail_tree_requests.store(false, Ordering::SeqCst);
        service.handle_message(IpcMessage::Change);
        assert_eq!(transport.tree_requests(), 1);
    }

    #[test]
    fn test_activate_commands() {
        let transport = MockTransport::new();
        let service = service_over(transport.clone());

        service.activate_workspace(3);
        service.activate_window(42);

        assert_eq!(
            transport.commands(),
            vec!["workspace number 3", "[con_id=42] focus"]
        );
    }

    #[test]
    fn test_cycle_workspace_wraps_both_directions() {
        let transport = MockTransport::new();
        let service = service_over(transport.clone());

        // Focused on the last workspace: +1 wraps to the first
        service.handle_message(tree_payload(&[1, 2, 3], Some(3)));
        service.cycle_workspace(1);
        assert_eq!(transport.commands().last().map(String::as_str), Some("workspace number 1"));

        // Focused on the first workspace: -1 wraps to the last
        service.handle_message(IpcMessage::Change);
        service.handle_message(tree_payload(&[1, 2, 3], Some(1)));
        service.cycle_workspace(-1);
        assert_eq!(transport.commands().last().map(String::as_str), Some("workspace number 3"));
    }

    #[test]
    fn test_cycle_workspace_steps_without_wrapping() {
        let transport = MockTransport::new();
        let service = service_over(transport.clone());

        service.handle_message(tree_payload(&[1, 2, 3], Some(2)));
        service.cycle_workspace(1);
        assert_eq!(transport.commands().last().map(String::as_str), Some("workspace number 3"));
    }

    #[test]
    fn test_cycle_workspace_noop_without_focus() {
        let transport = MockTransport::new();
        let service = service_over(transport.clone());

        service.handle_message(tree_payload(&[1, 2], None));
        service.cycle_workspace(1);
        assert!(transport.commands().is_empty());

        // And with an empty model
        service.handle_message(IpcMessage::Change);
        service.handle_message(tree_payload(&[], None));
        service.cycle_workspace(-1);
        assert!(transport.commands().is_empty());
    }

    #[test]
    fn test_disconnect_stops_notifications() {
        let transport = MockTransport::new();
        let service = service_over(transport.clone());

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let id = service.connect(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1); // immediate notify

        assert!(service.disconnect(id));
        service.handle_message(tree_payload(&[1], Some(1)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
