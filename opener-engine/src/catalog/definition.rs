//! Opener definition file parser
//!
//! Parses JSON opener definition files and converts them into our internal
//! [`Opener`] format, validating the sequence on the way.

use crate::parser::normalize_ability_id;
use crate::types::{ActionDefinition, ActionKind, EngineError, Opener, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// On-disk shape of an opener definition (one file per job/variant)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenerFile {
    pub id: String,
    pub job: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub zone_id: Option<u32>,
    #[serde(default)]
    pub encounter_name: Option<String>,
    #[serde(default)]
    pub audio_enabled: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub actions: Vec<ActionFile>,
}

/// On-disk shape of one opener step
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub position: u32,
    #[serde(default)]
    pub weave_slot: Option<u8>,
    pub action_id: String,
    pub icon_id: String,
    #[serde(default)]
    pub audio_file: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<i64>,
}

/// Parse an opener definition from JSON text
///
/// `source_name` is only used in error messages (file name or builtin key).
pub fn parse_definition(source_name: &str, json: &str) -> Result<Opener> {
    let file: OpenerFile =
        serde_json::from_str(json).map_err(|e| EngineError::DefinitionParseError {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;

    let opener = convert_opener(file);
    validate_opener(&opener)?;

    log::debug!(
        "Parsed opener '{}' ({} actions) from {}",
        opener.id,
        opener.len(),
        source_name
    );
    Ok(opener)
}

/// Read and parse an opener definition file
pub fn parse_definition_file(path: &Path) -> Result<Opener> {
    let content = std::fs::read_to_string(path)?;
    let source_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.json");
    parse_definition(source_name, &content)
}

/// Convert the file shape to our Opener
fn convert_opener(file: OpenerFile) -> Opener {
    let sequence = file
        .actions
        .into_iter()
        .map(|action| ActionDefinition {
            id: action.id,
            name: action.name,
            kind: action.kind,
            position: action.position,
            weave_slot: action.weave_slot,
            ability_id: normalize_ability_id(&action.action_id),
            icon_ref: action.icon_id,
            audio_ref: action.audio_file,
            delay_ms: action.delay_ms,
        })
        .collect();

    Opener {
        id: file.id,
        job: file.job.trim().to_uppercase(),
        name: file.name,
        version: file.version,
        zone_id: file.zone_id,
        encounter_name: file.encounter_name,
        audio_enabled: file.audio_enabled,
        notes: file.notes,
        source: file.source,
        sequence,
    }
}

/// Check the structural invariants of an opener
pub fn validate_opener(opener: &Opener) -> Result<()> {
    let invalid = |reason: String| EngineError::InvalidOpener {
        opener_id: opener.id.clone(),
        reason,
    };

    if opener.id.trim().is_empty() {
        return Err(invalid("opener id is empty".to_string()));
    }
    if opener.job.is_empty() {
        return Err(invalid("job code is empty".to_string()));
    }
    if opener.sequence.is_empty() {
        return Err(invalid("action sequence is empty".to_string()));
    }

    let mut seen = HashSet::new();
    let mut last_position = 0;

    for action in &opener.sequence {
        if !seen.insert(action.id.as_str()) {
            return Err(invalid(format!("duplicate action id '{}'", action.id)));
        }
        if action.position == 0 {
            return Err(invalid(format!("action '{}' has position 0", action.id)));
        }
        if action.position < last_position {
            return Err(invalid(format!(
                "action '{}' position {} goes back from {}",
                action.id, action.position, last_position
            )));
        }
        last_position = action.position;

        if action.weave_slot.is_some() && action.kind != ActionKind::Ogcd {
            return Err(invalid(format!(
                "action '{}' has a weave slot but is {}",
                action.id, action.kind
            )));
        }
        if !action.ability_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid(format!(
                "action '{}' has non-hex ability id '{}'",
                action.id, action.ability_id
            )));
        }
    }

    Ok(())
}
