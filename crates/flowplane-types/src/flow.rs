use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Unique identifier for a flow, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub Uuid);

impl FlowId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FlowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for a flow version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowVersionId(pub Uuid);

impl FlowVersionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for FlowVersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FlowVersionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

/// A saved automation plus its run-time status.
///
/// `status` is the last settled state. `operation_status` is non-`None` while
/// a lifecycle job (enable, disable, delete) is in flight and doubles as the
/// application-level lock for those operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: FlowId,
    pub project_id: String,
    pub folder_id: Option<String>,
    pub status: FlowStatus,
    pub operation_status: FlowOperationStatus,
    /// Must reference a `Locked` version when set.
    pub published_version_id: Option<FlowVersionId>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    /// A freshly created flow: disabled, idle, unpublished.
    pub fn new(project_id: impl Into<String>, folder_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: FlowId::new(),
            project_id: project_id.into(),
            folder_id,
            status: FlowStatus::Disabled,
            operation_status: FlowOperationStatus::None,
            published_version_id: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a lifecycle job currently owns this flow.
    pub fn is_busy(&self) -> bool {
        self.operation_status != FlowOperationStatus::None
    }
}

/// Settled run-time status of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    Enabled,
    Disabled,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Enabled => "ENABLED",
            FlowStatus::Disabled => "DISABLED",
        }
    }

    /// The in-flight marker used while transitioning towards this status.
    pub fn transition_marker(&self) -> FlowOperationStatus {
        match self {
            FlowStatus::Enabled => FlowOperationStatus::Enabling,
            FlowStatus::Disabled => FlowOperationStatus::Disabling,
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ENABLED" => Ok(FlowStatus::Enabled),
            "DISABLED" => Ok(FlowStatus::Disabled),
            other => Err(format!("invalid flow status: '{other}'")),
        }
    }
}

/// In-flight lifecycle operation on a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowOperationStatus {
    #[default]
    None,
    Enabling,
    Disabling,
    Deleting,
}

impl FlowOperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowOperationStatus::None => "NONE",
            FlowOperationStatus::Enabling => "ENABLING",
            FlowOperationStatus::Disabling => "DISABLING",
            FlowOperationStatus::Deleting => "DELETING",
        }
    }
}

impl fmt::Display for FlowOperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowOperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NONE" => Ok(FlowOperationStatus::None),
            "ENABLING" => Ok(FlowOperationStatus::Enabling),
            "DISABLING" => Ok(FlowOperationStatus::Disabling),
            "DELETING" => Ok(FlowOperationStatus::Deleting),
            other => Err(format!("invalid flow operation status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowVersion
// ---------------------------------------------------------------------------

/// A snapshot of a flow's step structure.
///
/// Drafts are editable; locked versions are immutable and are the only ones
/// that may be published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowVersion {
    pub id: FlowVersionId,
    pub flow_id: FlowId,
    pub display_name: String,
    pub state: FlowVersionState,
    pub trigger: FlowTrigger,
    /// Action steps; opaque to the control plane.
    pub steps: Value,
    pub valid: bool,
    /// User who last edited this version, used by the concurrent-edit guard.
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowVersion {
    /// An empty draft for a new flow.
    pub fn empty_draft(flow_id: FlowId, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: FlowVersionId::new(),
            flow_id,
            display_name: display_name.into(),
            state: FlowVersionState::Draft,
            trigger: FlowTrigger::Empty,
            steps: Value::Array(Vec::new()),
            valid: false,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new draft carrying this version's structure.
    pub fn clone_as_draft(&self, updated_by: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: FlowVersionId::new(),
            flow_id: self.flow_id,
            display_name: self.display_name.clone(),
            state: FlowVersionState::Draft,
            trigger: self.trigger.clone(),
            steps: self.steps.clone(),
            valid: self.valid,
            updated_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state == FlowVersionState::Locked
    }

    /// A version is publishable once its trigger points at a piece.
    pub fn recompute_validity(&mut self) {
        self.valid = matches!(self.trigger, FlowTrigger::Piece(ref t) if !t.trigger_name.is_empty());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowVersionState {
    Draft,
    Locked,
}

impl FlowVersionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowVersionState::Draft => "DRAFT",
            FlowVersionState::Locked => "LOCKED",
        }
    }
}

impl fmt::Display for FlowVersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowVersionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(FlowVersionState::Draft),
            "LOCKED" => Ok(FlowVersionState::Locked),
            other => Err(format!("invalid flow version state: '{other}'")),
        }
    }
}

/// The trigger step of a flow version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowTrigger {
    /// Not configured yet.
    Empty,
    Piece(PieceTrigger),
}

/// A trigger provided by a piece (a third-party integration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceTrigger {
    pub piece_name: String,
    pub piece_version: String,
    pub trigger_name: String,
    #[serde(default)]
    pub input: Value,
}

/// A flow joined with its current (latest) version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedFlow {
    #[serde(flatten)]
    pub flow: Flow,
    pub version: FlowVersion,
}

// ---------------------------------------------------------------------------
// Requests and operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlowRequest {
    pub project_id: String,
    pub display_name: String,
    #[serde(default)]
    pub folder_id: Option<String>,
}

/// An update applied to a flow.
///
/// `LockAndPublish` and `ChangeStatus` are lifecycle operations completed by a
/// background job; everything else is applied synchronously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "OperationWire", into = "OperationWire")]
pub enum FlowOperation {
    LockAndPublish { status: Option<FlowStatus> },
    ChangeStatus { status: FlowStatus },
    ChangeFolder { folder_id: Option<String> },
    UpdateMetadata { metadata: Option<Value> },
    Edit(FlowEdit),
}

impl FlowOperation {
    pub fn name(&self) -> &'static str {
        match self {
            FlowOperation::LockAndPublish { .. } => "LOCK_AND_PUBLISH",
            FlowOperation::ChangeStatus { .. } => "CHANGE_STATUS",
            FlowOperation::ChangeFolder { .. } => "CHANGE_FOLDER",
            FlowOperation::UpdateMetadata { .. } => "UPDATE_METADATA",
            FlowOperation::Edit(edit) => edit.name(),
        }
    }
}

/// Structural edits; they always land on a draft version.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEdit {
    ChangeName {
        display_name: String,
    },
    UpdateTrigger {
        trigger: FlowTrigger,
    },
    UpdateSteps {
        steps: Value,
    },
    ImportFlow {
        display_name: String,
        trigger: FlowTrigger,
        steps: Value,
    },
    /// Copy a (locked) version's structure into the draft.
    UseAsDraft {
        version_id: FlowVersionId,
    },
}

impl FlowEdit {
    pub fn name(&self) -> &'static str {
        match self {
            FlowEdit::ChangeName { .. } => "CHANGE_NAME",
            FlowEdit::UpdateTrigger { .. } => "UPDATE_TRIGGER",
            FlowEdit::UpdateSteps { .. } => "UPDATE_STEPS",
            FlowEdit::ImportFlow { .. } => "IMPORT_FLOW",
            FlowEdit::UseAsDraft { .. } => "USE_AS_DRAFT",
        }
    }
}

/// Flat `{"type": ..., "request": {...}}` wire shape of [`FlowOperation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "request", rename_all = "SCREAMING_SNAKE_CASE")]
enum OperationWire {
    LockAndPublish {
        #[serde(default)]
        status: Option<FlowStatus>,
    },
    ChangeStatus {
        status: FlowStatus,
    },
    ChangeFolder {
        #[serde(default, rename = "folderId")]
        folder_id: Option<String>,
    },
    UpdateMetadata {
        #[serde(default)]
        metadata: Option<Value>,
    },
    ChangeName {
        #[serde(rename = "displayName")]
        display_name: String,
    },
    UpdateTrigger {
        trigger: FlowTrigger,
    },
    UpdateSteps {
        steps: Value,
    },
    ImportFlow {
        #[serde(rename = "displayName")]
        display_name: String,
        trigger: FlowTrigger,
        #[serde(default)]
        steps: Value,
    },
    UseAsDraft {
        #[serde(rename = "versionId")]
        version_id: FlowVersionId,
    },
}

impl From<OperationWire> for FlowOperation {
    fn from(wire: OperationWire) -> Self {
        match wire {
            OperationWire::LockAndPublish { status } => FlowOperation::LockAndPublish { status },
            OperationWire::ChangeStatus { status } => FlowOperation::ChangeStatus { status },
            OperationWire::ChangeFolder { folder_id } => FlowOperation::ChangeFolder { folder_id },
            OperationWire::UpdateMetadata { metadata } => FlowOperation::UpdateMetadata { metadata },
            OperationWire::ChangeName { display_name } => {
                FlowOperation::Edit(FlowEdit::ChangeName { display_name })
            }
            OperationWire::UpdateTrigger { trigger } => {
                FlowOperation::Edit(FlowEdit::UpdateTrigger { trigger })
            }
            OperationWire::UpdateSteps { steps } => FlowOperation::Edit(FlowEdit::UpdateSteps { steps }),
            OperationWire::ImportFlow {
                display_name,
                trigger,
                steps,
            } => FlowOperation::Edit(FlowEdit::ImportFlow {
                display_name,
                trigger,
                steps,
            }),
            OperationWire::UseAsDraft { version_id } => {
                FlowOperation::Edit(FlowEdit::UseAsDraft { version_id })
            }
        }
    }
}

impl From<FlowOperation> for OperationWire {
    fn from(op: FlowOperation) -> Self {
        match op {
            FlowOperation::LockAndPublish { status } => OperationWire::LockAndPublish { status },
            FlowOperation::ChangeStatus { status } => OperationWire::ChangeStatus { status },
            FlowOperation::ChangeFolder { folder_id } => OperationWire::ChangeFolder { folder_id },
            FlowOperation::UpdateMetadata { metadata } => OperationWire::UpdateMetadata { metadata },
            FlowOperation::Edit(FlowEdit::ChangeName { display_name }) => {
                OperationWire::ChangeName { display_name }
            }
            FlowOperation::Edit(FlowEdit::UpdateTrigger { trigger }) => {
                OperationWire::UpdateTrigger { trigger }
            }
            FlowOperation::Edit(FlowEdit::UpdateSteps { steps }) => OperationWire::UpdateSteps { steps },
            FlowOperation::Edit(FlowEdit::ImportFlow {
                display_name,
                trigger,
                steps,
            }) => OperationWire::ImportFlow {
                display_name,
                trigger,
                steps,
            },
            FlowOperation::Edit(FlowEdit::UseAsDraft { version_id }) => {
                OperationWire::UseAsDraft { version_id }
            }
        }
    }
}
