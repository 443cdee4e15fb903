//! swaytasks - workspace/window tracking for sway-compatible compositors.
//!
//! Maintains a live model of the compositor's workspace/window tree over
//! the i3 IPC protocol and resolves each window to its installed
//! application (desktop entry), so a taskbar-style consumer can render
//! per-application entries without knowing anything about the IPC wire
//! format or the resolution heuristics.

pub mod services;

pub use services::appinfo::{
    spawn_registry_watcher, AppIdentity, AppInfoCache, DesktopDatabase, DesktopEntry,
    IdentityResolver,
};
pub use services::callbacks::CallbackId;
pub use services::ipc::{socket_path, IpcMessage, SwayIpc, Transport};
pub use services::tasks::{TaskService, TaskSnapshot};
pub use services::tree::{WindowModel, WindowProps, WorkspaceModel, WorkspaceProps};
