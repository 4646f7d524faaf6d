use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::defaults::default_snapshot;
use crate::errors::LimitsError;
use crate::model::LimitsSnapshot;

/// Loads the built-in defaults with an optional YAML overlay on top.
/// The overlay is partial: only the fields it names shadow defaults.
/// A file that exists but does not parse is a startup error.
pub fn load_snapshot(path: Option<&Path>) -> Result<LimitsSnapshot, LimitsError> {
    let snapshot = default_snapshot();
    let Some(path) = path else {
        return Ok(snapshot);
    };
    if !path.exists() {
        return Ok(snapshot);
    }

    let content = fs::read_to_string(path).map_err(|err| LimitsError::Io(err.to_string()))?;
    let overlay_yaml: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| LimitsError::Invalid(err.to_string()))?;
    let overlay =
        serde_json::to_value(overlay_yaml).map_err(|err| LimitsError::Invalid(err.to_string()))?;

    let mut base = serde_json::to_value(&snapshot)
        .map_err(|err| LimitsError::Invalid(err.to_string()))?;
    merge(&mut base, overlay);

    let mut merged: LimitsSnapshot =
        serde_json::from_value(base).map_err(|err| LimitsError::Invalid(err.to_string()))?;
    merged.rev = snapshot.rev.saturating_add(1);
    validate(&merged)?;
    Ok(merged)
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

fn validate(snapshot: &LimitsSnapshot) -> Result<(), LimitsError> {
    if snapshot.windows.minute == 0 || snapshot.windows.hour == 0 || snapshot.windows.day == 0 {
        return Err(LimitsError::Invalid(
            "window ceilings must be positive".into(),
        ));
    }
    if snapshot.windows.minute > snapshot.windows.hour
        || snapshot.windows.hour > snapshot.windows.day
    {
        return Err(LimitsError::Invalid(
            "window ceilings must be non-decreasing from minute to day".into(),
        ));
    }
    if snapshot.breaker.failure_threshold == 0 || snapshot.breaker.success_threshold == 0 {
        return Err(LimitsError::Invalid(
            "breaker thresholds must be positive".into(),
        ));
    }
    for class in pacekeeper_core_types::ActionClass::ALL {
        let rule = snapshot.pacing.for_class(class);
        if rule.min_delay_ms > rule.max_delay_ms {
            return Err(LimitsError::Invalid(format!(
                "pacing for {class}: min_delay_ms exceeds max_delay_ms"
            )));
        }
    }
    Ok(())
}
