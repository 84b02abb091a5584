//! Parsing of the event selection and extra-field settings.

use std::collections::BTreeMap;

use firehose_types::{EventKind, UnknownEventKind};

/// Routing could not be configured from the given settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterSetupError {
    #[error(transparent)]
    UnknownEventKind(#[from] UnknownEventKind),
    #[error("malformed extra field '{0}', expected key:value")]
    MalformedExtraField(String),
}

/// Parse a comma-separated event selection. Names are case-sensitive and
/// duplicates collapse; an empty selection means `LogMessage` only.
///
/// # Errors
///
/// Returns [`RouterSetupError::UnknownEventKind`] for the first name that
/// is not a known kind.
pub fn parse_event_kinds(csv: &str) -> Result<Vec<EventKind>, RouterSetupError> {
    let mut kinds = Vec::new();
    for name in csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind: EventKind = name.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        kinds.push(EventKind::LogMessage);
    }
    Ok(kinds)
}

/// Parse `key:value` pairs separated by commas. Values may contain `:`.
///
/// # Errors
///
/// Returns [`RouterSetupError::MalformedExtraField`] for a pair without a
/// separator or with an empty key.
pub fn parse_extra_fields(csv: &str) -> Result<BTreeMap<String, String>, RouterSetupError> {
    let mut fields = BTreeMap::new();
    for pair in csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = pair
            .split_once(':')
            .ok_or_else(|| RouterSetupError::MalformedExtraField(pair.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(RouterSetupError::MalformedExtraField(pair.to_string()));
        }
        fields.insert(key.to_string(), value.trim().to_string());
    }
    Ok(fields)
}
