use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

use crate::{AppError, AppResult};

/// Fixed id of the sentinel root node. Every other node is reachable from it.
pub const ROOT_NODE_ID: i64 = -1;

/// Closed set of payload variants a node can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Directory,
    Application,
    Checkbox,
    File,
    Location,
    Note,
    Reference,
    Reminder,
    Setting,
    WebLink,
}

impl NodeKind {
    pub const ALL: [NodeKind; 10] = [
        NodeKind::Directory,
        NodeKind::Application,
        NodeKind::Checkbox,
        NodeKind::File,
        NodeKind::Location,
        NodeKind::Note,
        NodeKind::Reference,
        NodeKind::Reminder,
        NodeKind::Setting,
        NodeKind::WebLink,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Directory => "directory",
            NodeKind::Application => "application",
            NodeKind::Checkbox => "checkbox",
            NodeKind::File => "file",
            NodeKind::Location => "location",
            NodeKind::Note => "note",
            NodeKind::Reference => "reference",
            NodeKind::Reminder => "reminder",
            NodeKind::Setting => "setting",
            NodeKind::WebLink => "web_link",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            NodeKind::Directory => "Directory",
            NodeKind::Application => "Application",
            NodeKind::Checkbox => "Checkbox",
            NodeKind::File => "File",
            NodeKind::Location => "Location",
            NodeKind::Note => "Note",
            NodeKind::Reference => "Reference",
            NodeKind::Reminder => "Reminder",
            NodeKind::Setting => "Setting",
            NodeKind::WebLink => "Web Link",
        }
    }

    /// Label given to a freshly created node of this kind.
    pub fn default_label(self) -> String {
        format!("New {}", self.display_name())
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                AppError::new(AppError::INVALID_KIND, "Unknown node kind")
                    .with_context("kind", s.to_string())
            })
    }
}

/// A tree entry: id, parent link, kind tag, dense sibling position and label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub kind: NodeKind,
    pub position: i64,
    pub label: String,
}

impl TryFrom<&SqliteRow> for Node {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let kind: String = row.try_get("kind").map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            parent_id: row
                .try_get::<Option<i64>, _>("parent_id")
                .map_err(AppError::from)?,
            kind: kind.parse()?,
            position: row.try_get("position").map_err(AppError::from)?,
            label: row.try_get("label").map_err(AppError::from)?,
        })
    }
}

/// Fixed roles a directory can hold; at most one directory per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialMode {
    Root,
    Home,
    Trash,
    Applications,
    NewApplications,
}

impl SpecialMode {
    pub const ALL: [SpecialMode; 5] = [
        SpecialMode::Root,
        SpecialMode::Home,
        SpecialMode::Trash,
        SpecialMode::Applications,
        SpecialMode::NewApplications,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SpecialMode::Root => "root",
            SpecialMode::Home => "home",
            SpecialMode::Trash => "trash",
            SpecialMode::Applications => "applications",
            SpecialMode::NewApplications => "new_applications",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SpecialMode::Root => "Root",
            SpecialMode::Home => "Home",
            SpecialMode::Trash => "Trash",
            SpecialMode::Applications => "Applications",
            SpecialMode::NewApplications => "New Applications",
        }
    }
}

impl FromStr for SpecialMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpecialMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                AppError::invariant("Unknown special directory mode")
                    .with_context("special_mode", s.to_string())
            })
    }
}

/// Operations a directory payload can allow or deny for items beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    Create,
    Edit,
    Delete,
    Move,
}

impl PermissionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionKind::Create => "create",
            PermissionKind::Edit => "edit",
            PermissionKind::Delete => "delete",
            PermissionKind::Move => "move",
        }
    }
}

/// Whether a directory's permission entry governs only its direct children
/// or every descendant transitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    SelfOnly,
    Recursive,
}

impl PermissionScope {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionScope::SelfOnly => "self",
            PermissionScope::Recursive => "recursive",
        }
    }
}

/// Allow/deny overrides keyed by `"{kind}.{scope}"`. Unset entries allow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMap(BTreeMap<String, bool>);

impl PermissionMap {
    fn key(kind: PermissionKind, scope: PermissionScope) -> String {
        format!("{}.{}", kind.as_str(), scope.as_str())
    }

    pub fn allows(&self, kind: PermissionKind, scope: PermissionScope) -> bool {
        *self.0.get(&Self::key(kind, scope)).unwrap_or(&true)
    }

    pub fn set(&mut self, kind: PermissionKind, scope: PermissionScope, allow: bool) {
        self.0.insert(Self::key(kind, scope), allow);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(AppError::from)
    }

    pub fn from_json(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw).map_err(AppError::from)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryPayload {
    pub node_id: i64,
    pub special_mode: Option<SpecialMode>,
    pub collapsed: bool,
    pub initially_visible: bool,
    pub permissions: PermissionMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationPayload {
    pub node_id: i64,
    pub package: String,
    pub activity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckboxPayload {
    pub node_id: i64,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePayload {
    pub node_id: i64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub node_id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotePayload {
    pub node_id: i64,
    pub body: String,
}

/// `target_id` is a non-owning back-reference; it may dangle once the target
/// node is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePayload {
    pub node_id: i64,
    pub target_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub node_id: i64,
    pub due_at: Option<i64>,
    pub fired: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingPayload {
    pub node_id: i64,
    pub setting_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebLinkPayload {
    pub node_id: i64,
    pub url: String,
}

/// Kind-specific data attached 1:1 to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Directory(DirectoryPayload),
    Application(ApplicationPayload),
    Checkbox(CheckboxPayload),
    File(FilePayload),
    Location(LocationPayload),
    Note(NotePayload),
    Reference(ReferencePayload),
    Reminder(ReminderPayload),
    Setting(SettingPayload),
    WebLink(WebLinkPayload),
}

impl Payload {
    pub fn kind(&self) -> NodeKind {
        match self {
            Payload::Directory(_) => NodeKind::Directory,
            Payload::Application(_) => NodeKind::Application,
            Payload::Checkbox(_) => NodeKind::Checkbox,
            Payload::File(_) => NodeKind::File,
            Payload::Location(_) => NodeKind::Location,
            Payload::Note(_) => NodeKind::Note,
            Payload::Reference(_) => NodeKind::Reference,
            Payload::Reminder(_) => NodeKind::Reminder,
            Payload::Setting(_) => NodeKind::Setting,
            Payload::WebLink(_) => NodeKind::WebLink,
        }
    }

    pub fn node_id(&self) -> i64 {
        match self {
            Payload::Directory(p) => p.node_id,
            Payload::Application(p) => p.node_id,
            Payload::Checkbox(p) => p.node_id,
            Payload::File(p) => p.node_id,
            Payload::Location(p) => p.node_id,
            Payload::Note(p) => p.node_id,
            Payload::Reference(p) => p.node_id,
            Payload::Reminder(p) => p.node_id,
            Payload::Setting(p) => p.node_id,
            Payload::WebLink(p) => p.node_id,
        }
    }

    /// Zero-valued payload for a freshly created node of `kind`.
    pub fn default_for(kind: NodeKind, node_id: i64) -> Payload {
        match kind {
            NodeKind::Directory => Payload::Directory(DirectoryPayload {
                node_id,
                special_mode: None,
                collapsed: false,
                initially_visible: true,
                permissions: PermissionMap::default(),
            }),
            NodeKind::Application => Payload::Application(ApplicationPayload {
                node_id,
                package: String::new(),
                activity: String::new(),
            }),
            NodeKind::Checkbox => Payload::Checkbox(CheckboxPayload {
                node_id,
                checked: false,
            }),
            NodeKind::File => Payload::File(FilePayload {
                node_id,
                path: String::new(),
            }),
            NodeKind::Location => Payload::Location(LocationPayload {
                node_id,
                latitude: 0.0,
                longitude: 0.0,
            }),
            NodeKind::Note => Payload::Note(NotePayload {
                node_id,
                body: String::new(),
            }),
            NodeKind::Reference => Payload::Reference(ReferencePayload {
                node_id,
                target_id: None,
            }),
            NodeKind::Reminder => Payload::Reminder(ReminderPayload {
                node_id,
                due_at: None,
                fired: false,
            }),
            NodeKind::Setting => Payload::Setting(SettingPayload {
                node_id,
                setting_key: String::new(),
            }),
            NodeKind::WebLink => Payload::WebLink(WebLinkPayload {
                node_id,
                url: String::new(),
            }),
        }
    }
}
