//! Layout tree model and workspace construction.
//!
//! The compositor answers GET_TREE with a JSON document describing the
//! full layout hierarchy: root -> outputs -> workspaces -> containers.
//! This module decodes the document into typed nodes and flattens it into
//! the ordered workspace/window model the consumer renders from.
//!
//! Reference: https://man.archlinux.org/man/sway-ipc.7.en

use std::collections::HashSet;

use serde::Deserialize;
use tracing::warn;

use super::appinfo::{AppIdentity, IdentityResolver};

/// Workspaces whose name starts with this prefix are compositor-internal
/// (e.g. `__i3_scratch`) and are excluded from the model entirely.
pub const RESERVED_WORKSPACE_PREFIX: &str = "__i3";

/// Node kind, decoded once at parse time. Kinds this module does not
/// recognize land in `Unknown` and have their subtree skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Output,
    Workspace,
    Con,
    FloatingCon,
    #[serde(other)]
    Unknown,
}

/// Legacy window metadata reported for X11-compatibility windows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct X11Properties {
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
}

/// One node of the layout tree, as delivered by the compositor.
#[derive(Debug, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub num: Option<i64>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub window_properties: Option<X11Properties>,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub floating_nodes: Vec<Node>,
}

impl Node {
    /// Whether this container actually holds a window. Native windows
    /// carry `app_id`; X11-compatibility windows carry `window_properties`
    /// instead. Split containers carry neither.
    fn is_window(&self) -> bool {
        self.app_id.is_some() || self.window_properties.is_some()
    }
}

/// Immutable per-window metadata, parsed once per snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowProps {
    pub title: String,
    /// Application class hint: `app_id` for native windows, the legacy
    /// window class for X11-compatibility windows.
    pub app_id: String,
    /// Legacy instance hint; distinguishes web-app windows that share a
    /// class. Empty for native windows.
    pub instance: String,
    pub pid: u32,
    pub focused: bool,
    pub urgent: bool,
    pub visible: bool,
}

impl WindowProps {
    pub fn from_node(node: &Node) -> Self {
        let (app_id, instance) = match (&node.app_id, &node.window_properties) {
            // Native window
            (Some(app_id), _) => (app_id.clone(), String::new()),
            // X11-compatibility window
            (None, Some(props)) => (
                props.class.clone().unwrap_or_default(),
                props.instance.clone().unwrap_or_default(),
            ),
            (None, None) => (String::new(), String::new()),
        };

        Self {
            title: node.name.clone().unwrap_or_default(),
            app_id,
            instance,
            pid: node.pid.unwrap_or(0),
            focused: node.focused,
            urgent: node.urgent,
            visible: node.visible,
        }
    }
}

/// Per-workspace metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceProps {
    pub title: String,
    /// Numeric index used as the sort key. Named workspaces report a
    /// negative sentinel.
    pub num: i64,
    pub focused: bool,
    pub urgent: bool,
    pub visible: bool,
}

impl WorkspaceProps {
    pub fn from_node(node: &Node) -> Self {
        Self {
            title: node.name.clone().unwrap_or_default(),
            num: node.num.unwrap_or(-1),
            focused: node.focused,
            urgent: node.urgent,
            visible: node.visible,
        }
    }
}

/// A window attached to a workspace, with its resolved identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowModel {
    /// Compositor-assigned id, stable only within the current snapshot.
    pub id: i64,
    pub props: WindowProps,
    pub identity: AppIdentity,
    /// False when an earlier sibling in the same workspace resolved to the
    /// same identity. The model keeps every window; suppressing repeats is
    /// the renderer's call.
    pub first_of_identity: bool,
}

/// A workspace and its windows, in tree encounter order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceModel {
    pub id: i64,
    pub props: WorkspaceProps,
    pub windows: Vec<WindowModel>,
}

impl WorkspaceModel {
    /// Derive aggregate state once all windows are attached.
    ///
    /// An empty workspace is reported focused/visible by the compositor
    /// itself; otherwise one of its windows carries the flag, so both are
    /// OR-ed in. Urgency is reported on both levels already.
    fn finish(&mut self) {
        for window in &self.windows {
            self.props.focused |= window.props.focused;
            self.props.visible |= window.props.visible;
        }

        let mut seen = HashSet::new();
        for window in &mut self.windows {
            window.first_of_identity = seen.insert(window.identity.desktop_id().to_string());
        }
    }
}

/// Flatten a tree snapshot into the ordered workspace model.
///
/// Depth-first walk over `nodes` then `floating_nodes` of every node.
/// Workspaces come back stably sorted ascending by numeric index; every
/// window belongs to exactly one workspace.
pub fn build_workspaces(root: &Node, resolver: &IdentityResolver) -> Vec<WorkspaceModel> {
    let mut workspaces = Vec::new();
    walk(root, &mut workspaces, resolver);

    workspaces.sort_by_key(|ws| ws.props.num);
    for workspace in &mut workspaces {
        workspace.finish();
    }

    workspaces
}

fn walk(node: &Node, workspaces: &mut Vec<WorkspaceModel>, resolver: &IdentityResolver) {
    match node.kind {
        NodeKind::Root | NodeKind::Output => {}
        NodeKind::Workspace => {
            let props = WorkspaceProps::from_node(node);
            if props.title.starts_with(RESERVED_WORKSPACE_PREFIX) {
                return;
            }
            workspaces.push(WorkspaceModel {
                id: node.id,
                props,
                windows: Vec::new(),
            });
        }
        NodeKind::Con | NodeKind::FloatingCon => {
            if node.is_window() {
                let props = WindowProps::from_node(node);
                match workspaces.last_mut() {
                    Some(workspace) => {
                        let identity = resolver.resolve(&props);
                        workspace.windows.push(WindowModel {
                            id: node.id,
                            props,
                            identity,
                            first_of_identity: true,
                        });
                    }
                    None => {
                        warn!(
                            "window {:?} (id {}) encountered before any workspace, dropping",
                            props.title, node.id
                        );
                    }
                }
                return;
            }
            // Split container: nothing to record, recurse for the windows
        }
        NodeKind::Unknown => {
            warn!("unrecognized node type (id {}), skipping subtree", node.id);
            return;
        }
    }

    for child in &node.nodes {
        walk(child, workspaces, resolver);
    }
    for child in &node.floating_nodes {
        walk(child, workspaces, resolver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::appinfo::{AppInfoCache, DesktopDatabase};
    use std::sync::Arc;

    /// Resolver over an empty database: every window resolves to its
    /// fallback identity, which is all these tests need.
    fn empty_resolver() -> IdentityResolver {
        let db = Arc::new(DesktopDatabase::with_dirs(Vec::new()));
        let cache = Arc::new(AppInfoCache::new(db.clone()));
        IdentityResolver::new(db, cache)
    }

    fn parse(json: &str) -> Node {
        serde_json::from_str(json).expect("tree JSON should parse")
    }

    #[test]
    fn test_single_workspace_with_focused_window() {
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [{
                    "type": "output", "id": 2, "name": "eDP-1", "nodes": [{
                        "type": "workspace", "id": 3, "name": "1", "num": 1, "nodes": [{
                            "type": "con", "id": 4, "name": "Mozilla Firefox",
                            "app_id": "firefox", "pid": 100,
                            "focused": true, "visible": true
                        }]
                    }]
                }]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        assert_eq!(workspaces.len(), 1);

        let ws = &workspaces[0];
        assert_eq!(ws.props.num, 1);
        assert_eq!(ws.props.title, "1");
        // Focus is OR-ed in from the window
        assert!(ws.props.focused);
        assert!(ws.props.visible);

        assert_eq!(ws.windows.len(), 1);
        let win = &ws.windows[0];
        assert_eq!(win.id, 4);
        assert_eq!(win.identity.desktop_id(), "firefox.desktop");
        assert!(win.props.focused);
        assert_eq!(win.props.pid, 100);
    }

    #[test]
    fn test_workspaces_sorted_ascending_by_num() {
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [
                    {"type": "output", "id": 2, "nodes": [
                        {"type": "workspace", "id": 10, "name": "9", "num": 9},
                        {"type": "workspace", "id": 11, "name": "2", "num": 2}
                    ]},
                    {"type": "output", "id": 3, "nodes": [
                        {"type": "workspace", "id": 12, "name": "5", "num": 5}
                    ]}
                ]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        let nums: Vec<i64> = workspaces.iter().map(|w| w.props.num).collect();
        assert_eq!(nums, vec![2, 5, 9]);
    }

    #[test]
    fn test_reserved_workspaces_excluded_at_any_depth() {
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [{
                    "type": "output", "id": 2, "nodes": [
                        {"type": "workspace", "id": 3, "name": "__i3_scratch", "num": -1,
                         "floating_nodes": [
                            {"type": "floating_con", "id": 4, "name": "hidden",
                             "app_id": "scratchterm", "pid": 50}
                         ]},
                        {"type": "workspace", "id": 5, "name": "1", "num": 1}
                    ]
                }]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        assert_eq!(workspaces.len(), 1);
        assert_eq!(workspaces[0].props.num, 1);
        // The scratch window must not leak into the surviving workspace
        assert!(workspaces[0].windows.is_empty());
    }

    #[test]
    fn test_window_before_any_workspace_is_dropped() {
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [{
                    "type": "output", "id": 2, "nodes": [
                        {"type": "con", "id": 3, "name": "stray", "app_id": "stray", "pid": 7},
                        {"type": "workspace", "id": 4, "name": "1", "num": 1, "nodes": [
                            {"type": "con", "id": 5, "name": "kept", "app_id": "kept", "pid": 8}
                        ]}
                    ]
                }]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        assert_eq!(workspaces.len(), 1);
        assert_eq!(workspaces[0].windows.len(), 1);
        assert_eq!(workspaces[0].windows[0].props.app_id, "kept");
    }

    #[test]
    fn test_legacy_window_uses_class_and_instance() {
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [{
                    "type": "output", "id": 2, "nodes": [{
                        "type": "workspace", "id": 3, "name": "1", "num": 1, "nodes": [{
                            "type": "con", "id": 4, "name": "Slack",
                            "window_properties": {"class": "Slack", "instance": "slack"},
                            "pid": 42
                        }]
                    }]
                }]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        let win = &workspaces[0].windows[0];
        assert_eq!(win.props.app_id, "Slack");
        assert_eq!(win.props.instance, "slack");
        assert_eq!(win.identity.desktop_id(), "Slack.desktop");
    }

    #[test]
    fn test_native_window_with_null_legacy_properties() {
        // A native window alongside a legacy one whose class is null
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [{
                    "type": "output", "id": 2, "nodes": [{
                        "type": "workspace", "id": 3, "name": "1", "num": 1, "nodes": [
                            {"type": "con", "id": 4, "app_id": "foot", "pid": 9},
                            {"type": "con", "id": 5, "window_properties": {}, "pid": 10}
                        ]
                    }]
                }]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        assert_eq!(workspaces[0].windows.len(), 2);
        assert_eq!(workspaces[0].windows[0].props.app_id, "foot");
        assert_eq!(workspaces[0].windows[1].props.app_id, "");
    }

    #[test]
    fn test_unknown_node_kind_skips_subtree() {
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [{
                    "type": "output", "id": 2, "nodes": [
                        {"type": "workspace", "id": 3, "name": "1", "num": 1, "nodes": [
                            {"type": "dockarea", "id": 4, "nodes": [
                                {"type": "con", "id": 5, "app_id": "dock-child", "pid": 1}
                            ]},
                            {"type": "con", "id": 6, "app_id": "kept", "pid": 2}
                        ]}
                    ]
                }]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        assert_eq!(workspaces[0].windows.len(), 1);
        assert_eq!(workspaces[0].windows[0].props.app_id, "kept");
    }

    #[test]
    fn test_split_containers_are_transparent() {
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [{
                    "type": "output", "id": 2, "nodes": [{
                        "type": "workspace", "id": 3, "name": "1", "num": 1, "nodes": [{
                            "type": "con", "id": 4, "nodes": [
                                {"type": "con", "id": 5, "app_id": "left", "pid": 1},
                                {"type": "con", "id": 6, "app_id": "right", "pid": 2}
                            ]
                        }]
                    }]
                }]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        let ids: Vec<&str> = workspaces[0]
            .windows
            .iter()
            .map(|w| w.props.app_id.as_str())
            .collect();
        assert_eq!(ids, vec!["left", "right"]);
    }

    #[test]
    fn test_tiled_windows_precede_floating_windows() {
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [{
                    "type": "output", "id": 2, "nodes": [{
                        "type": "workspace", "id": 3, "name": "1", "num": 1,
                        "nodes": [
                            {"type": "con", "id": 4, "app_id": "tiled", "pid": 1}
                        ],
                        "floating_nodes": [
                            {"type": "floating_con", "id": 5, "app_id": "floating", "pid": 2}
                        ]
                    }]
                }]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        let ids: Vec<&str> = workspaces[0]
            .windows
            .iter()
            .map(|w| w.props.app_id.as_str())
            .collect();
        assert_eq!(ids, vec!["tiled", "floating"]);
    }

    #[test]
    fn test_repeated_identity_marked_not_first() {
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [{
                    "type": "output", "id": 2, "nodes": [{
                        "type": "workspace", "id": 3, "name": "1", "num": 1, "nodes": [
                            {"type": "con", "id": 4, "app_id": "term", "pid": 1},
                            {"type": "con", "id": 5, "app_id": "term", "pid": 2},
                            {"type": "con", "id": 6, "app_id": "editor", "pid": 3}
                        ]
                    }]
                }]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        let markers: Vec<bool> = workspaces[0]
            .windows
            .iter()
            .map(|w| w.first_of_identity)
            .collect();
        assert_eq!(markers, vec![true, false, true]);
        // All three windows stay in the authoritative list
        assert_eq!(workspaces[0].windows.len(), 3);
    }

    #[test]
    fn test_empty_focused_workspace_stays_focused() {
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [{
                    "type": "output", "id": 2, "nodes": [
                        {"type": "workspace", "id": 3, "name": "1", "num": 1, "focused": true}
                    ]
                }]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        assert!(workspaces[0].props.focused);
    }

    #[test]
    fn test_named_workspaces_sort_before_numbered() {
        let root = parse(
            r#"{
                "type": "root", "id": 1, "nodes": [{
                    "type": "output", "id": 2, "nodes": [
                        {"type": "workspace", "id": 3, "name": "3", "num": 3},
                        {"type": "workspace", "id": 4, "name": "mail", "num": -1}
                    ]
                }]
            }"#,
        );

        let workspaces = build_workspaces(&root, &empty_resolver());
        let nums: Vec<i64> = workspaces.iter().map(|w| w.props.num).collect();
        assert_eq!(nums, vec![-1, 3]);
    }
}
