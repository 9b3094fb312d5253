//! Execution request and handle types.
//!
//! [`ExecutionRequest`] is the validated input for one remote migration
//! run; [`ExecutionRequest::form_fields`] maps it onto the field names the
//! remote tool's start endpoint expects. [`ExecutionHandle`] is what the
//! launcher hands back once the run exists remotely.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::profile::MigrationProfile;
use crate::types::ExecutionId;

// ---------------------------------------------------------------------------
// Form field names
// ---------------------------------------------------------------------------

pub const FIELD_SCRIPT_NAME: &str = "__script_name";
pub const FIELD_PROFILE: &str = "Choose a profile";
pub const FIELD_MODULE: &str = "Module Name";
pub const FIELD_UUIDS: &str = "List of UUIDs";
pub const FIELD_USE_CRUD: &str = "Use CRUD API?";
pub const FIELD_ASYNC: &str = "Is Async Migration";
pub const FIELD_MIGRATE_DEPENDENTS: &str = "Migrate Dependent methods?";
pub const FIELD_MIGRATION_ID: &str = "Migration ID (uuid)";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Module whose entities are migrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleName {
    #[serde(rename = "PD")]
    Pd,
    #[serde(rename = "AD")]
    Ad,
}

impl ModuleName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pd => "PD",
            Self::Ad => "AD",
        }
    }

    /// Parse `PD` / `AD`, case-insensitively.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PD" => Ok(Self::Pd),
            "AD" => Ok(Self::Ad),
            other => Err(CoreError::Validation(format!(
                "Invalid module '{other}'. Must be one of: PD, AD"
            ))),
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Yes/No execution flag, rendered as `Y` / `N` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum YesNo {
    #[serde(rename = "Y")]
    Yes,
    #[default]
    #[serde(rename = "N")]
    No,
}

impl YesNo {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "Y",
            Self::No => "N",
        }
    }

    /// Accepts `y`/`yes`/`true`/`1` and `n`/`no`/`false`/`0`.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "true" | "1" => Ok(Self::Yes),
            "n" | "no" | "false" | "0" => Ok(Self::No),
            other => Err(CoreError::Validation(format!(
                "Invalid flag '{other}'. Expected Y or N"
            ))),
        }
    }
}

impl From<bool> for YesNo {
    fn from(value: bool) -> Self {
        if value {
            Self::Yes
        } else {
            Self::No
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionRequest
// ---------------------------------------------------------------------------

/// The three Y/N switches of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFlags {
    pub use_crud: YesNo,
    pub is_async: YesNo,
    pub migrate_dependents: YesNo,
}

/// Validated, immutable input for one migration run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    module: ModuleName,
    entity_ids: Vec<String>,
    profile: MigrationProfile,
    flags: ExecutionFlags,
    migration_id: Option<String>,
    script_name: String,
}

impl ExecutionRequest {
    /// Build a request, trimming ids and rejecting an empty id list, an
    /// empty script name, or a malformed explicit migration id.
    pub fn new(
        module: ModuleName,
        entity_ids: impl IntoIterator<Item = String>,
        profile: MigrationProfile,
        flags: ExecutionFlags,
        migration_id: Option<String>,
        script_name: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let entity_ids: Vec<String> = entity_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if entity_ids.is_empty() {
            return Err(CoreError::Validation(
                "At least one entity id is required".into(),
            ));
        }

        let script_name = script_name.into();
        if script_name.trim().is_empty() {
            return Err(CoreError::Validation("Script name must not be empty".into()));
        }

        let migration_id = match migration_id.map(|m| m.trim().to_string()) {
            Some(m) if m.is_empty() => None,
            Some(m) => {
                uuid::Uuid::parse_str(&m).map_err(|e| {
                    CoreError::Validation(format!("Invalid migration id '{m}': {e}"))
                })?;
                Some(m)
            }
            None => None,
        };

        Ok(Self {
            module,
            entity_ids,
            profile,
            flags,
            migration_id,
            script_name,
        })
    }

    pub fn module(&self) -> ModuleName {
        self.module
    }

    pub fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    pub fn profile(&self) -> &MigrationProfile {
        &self.profile
    }

    pub fn flags(&self) -> ExecutionFlags {
        self.flags
    }

    pub fn migration_id(&self) -> Option<&str> {
        self.migration_id.as_deref()
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// Form fields for the start endpoint, in submission order.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (FIELD_SCRIPT_NAME, self.script_name.clone()),
            (FIELD_PROFILE, self.profile.to_string()),
            (FIELD_MODULE, self.module.as_str().to_string()),
            (FIELD_UUIDS, self.entity_ids.join("\n")),
            (FIELD_USE_CRUD, self.flags.use_crud.as_str().to_string()),
            (FIELD_ASYNC, self.flags.is_async.as_str().to_string()),
            (
                FIELD_MIGRATE_DEPENDENTS,
                self.flags.migrate_dependents.as_str().to_string(),
            ),
            (
                FIELD_MIGRATION_ID,
                self.migration_id.clone().unwrap_or_default(),
            ),
        ]
    }
}

// ---------------------------------------------------------------------------
// ExecutionHandle
// ---------------------------------------------------------------------------

/// A started remote execution.
///
/// Created exactly once per run. `execution_id` is the join key for the
/// streaming channel and the cleanup call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionHandle {
    pub execution_id: ExecutionId,
    pub http_status: u16,
    pub raw_body: String,
    /// Normalised `Cookie` header value to replay on later calls.
    pub correlation_cookie: Option<String>,
}

/// Result of the best-effort cleanup call. Never an error by itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const ID_A: &str = "0b3e4f7a-1111-4c2d-9e8f-000000000001";
    const ID_B: &str = "0b3e4f7a-1111-4c2d-9e8f-000000000002";

    fn request(migration_id: Option<&str>) -> Result<ExecutionRequest, CoreError> {
        ExecutionRequest::new(
            ModuleName::Pd,
            vec![format!(" {ID_A} "), String::new(), ID_B.to_string()],
            MigrationProfile::from("devncdns_qancdns"),
            ExecutionFlags {
                use_crud: YesNo::Yes,
                is_async: YesNo::No,
                migrate_dependents: YesNo::Yes,
            },
            migration_id.map(str::to_string),
            "Entity Migration",
        )
    }

    #[test]
    fn form_fields_use_remote_names() {
        let req = request(None).unwrap();
        let fields = req.form_fields();
        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };

        assert_eq!(get(FIELD_SCRIPT_NAME), "Entity Migration");
        assert_eq!(get(FIELD_PROFILE), "devncdns_qancdns");
        assert_eq!(get(FIELD_MODULE), "PD");
        assert_eq!(get(FIELD_UUIDS), format!("{ID_A}\n{ID_B}"));
        assert_eq!(get(FIELD_USE_CRUD), "Y");
        assert_eq!(get(FIELD_ASYNC), "N");
        assert_eq!(get(FIELD_MIGRATE_DEPENDENTS), "Y");
        assert_eq!(get(FIELD_MIGRATION_ID), "");
    }

    #[test]
    fn empty_entity_list_is_rejected() {
        let result = ExecutionRequest::new(
            ModuleName::Ad,
            vec!["  ".to_string()],
            MigrationProfile::from("devncdns_qancdns"),
            ExecutionFlags::default(),
            None,
            "Entity Migration",
        );
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn blank_migration_id_becomes_none() {
        let req = request(Some("   ")).unwrap();
        assert_eq!(req.migration_id(), None);
    }

    #[test]
    fn malformed_migration_id_is_rejected() {
        assert_matches!(request(Some("not-a-uuid")), Err(CoreError::Validation(_)));
    }

    #[test]
    fn explicit_migration_id_is_submitted() {
        let req = request(Some(ID_A)).unwrap();
        let fields = req.form_fields();
        assert!(fields.contains(&(FIELD_MIGRATION_ID, ID_A.to_string())));
    }

    #[test]
    fn module_and_flag_parsing() {
        assert_eq!(ModuleName::parse("ad").unwrap(), ModuleName::Ad);
        assert_matches!(ModuleName::parse("XX"), Err(CoreError::Validation(_)));
        assert_eq!(YesNo::parse("yes").unwrap(), YesNo::Yes);
        assert_eq!(YesNo::parse("0").unwrap(), YesNo::No);
        assert_matches!(YesNo::parse("maybe"), Err(CoreError::Validation(_)));
    }
}
