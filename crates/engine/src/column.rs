use serde::{Deserialize, Serialize};

/// Declared value type of a column.
///
/// Drives input coercion: a value that cannot be represented in the column's
/// type becomes `Null` with a recorded coercion failure, never a hard error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    #[default]
    Text,
    Number,
    Integer,
    Boolean,
    /// Days since the Unix epoch.
    Date,
}

/// Special role a column plays in the grid chrome.
///
/// Roles are presentation hints; the engine stores them but only
/// `ValidationSummary` has engine-side meaning (it never carries data).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnRole {
    #[default]
    None,
    Checkbox,
    DeleteAction,
    ValidationSummary,
}

/// A column definition. Immutable after grid initialization; the column set
/// can only be replaced wholesale by re-initializing the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Unique, stable identifier. Also the display name used in messages.
    pub id: String,
    pub column_type: ColumnType,
    /// Required columns get an implicit not-null rule at registration.
    pub required: bool,
    /// Read-only columns reject interactive edits (imports may still write).
    pub read_only: bool,
    pub role: ColumnRole,
}

impl Column {
    /// Create a column with the given id and type. Not required, writable,
    /// no special role.
    pub fn new(id: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: id.into(),
            column_type,
            required: false,
            read_only: false,
            role: ColumnRole::None,
        }
    }

    /// Shorthand for a text column.
    pub fn text(id: impl Into<String>) -> Self {
        Self::new(id, ColumnType::Text)
    }

    /// Shorthand for a number column.
    pub fn number(id: impl Into<String>) -> Self {
        Self::new(id, ColumnType::Number)
    }

    /// Shorthand for an integer column.
    pub fn integer(id: impl Into<String>) -> Self {
        Self::new(id, ColumnType::Integer)
    }

    /// Shorthand for a boolean column.
    pub fn boolean(id: impl Into<String>) -> Self {
        Self::new(id, ColumnType::Boolean)
    }

    /// Mark the column as required.
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Mark the column as read-only.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Assign a special role.
    pub fn with_role(mut self, role: ColumnRole) -> Self {
        self.role = role;
        self
    }
}
