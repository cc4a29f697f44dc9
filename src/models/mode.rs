use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModeId(String);

impl ModeId {
    pub fn generate() -> Self {
        Self(format!("mode_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ModeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque app-selection payload produced by the native picker. Stored and
/// forwarded as-is, never inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionToken(serde_json::Value);

impl SelectionToken {
    pub fn new(raw: serde_json::Value) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.0
    }

    /// A `null` payload means "nothing picked" and is stored as no selection.
    pub fn normalize(selection: Option<Self>) -> Option<Self> {
        selection.filter(|token| !token.0.is_null())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mode {
    pub id: ModeId,
    pub name: String,
    pub blocked_app_selection: Option<SelectionToken>,
}

/// Initial fields of a mode about to be created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewMode {
    pub name: String,
    pub blocked_app_selection: Option<SelectionToken>,
}

/// Partial update. `None` leaves a field untouched; for the selection,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModePatch {
    pub name: Option<String>,
    pub blocked_app_selection: Option<Option<SelectionToken>>,
}

impl ModePatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn selection(selection: Option<SelectionToken>) -> Self {
        Self {
            blocked_app_selection: Some(selection),
            ..Self::default()
        }
    }

    /// Merge into `mode`; returns whether anything changed.
    pub fn apply(self, mode: &mut Mode) -> bool {
        let mut changed = false;
        if let Some(name) = self.name {
            if mode.name != name {
                mode.name = name;
                changed = true;
            }
        }
        if let Some(selection) = self.blocked_app_selection {
            let selection = SelectionToken::normalize(selection);
            if mode.blocked_app_selection != selection {
                mode.blocked_app_selection = selection;
                changed = true;
            }
        }
        changed
    }
}
