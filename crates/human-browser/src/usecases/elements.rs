//! Turns `click`/`fill` args into a concrete agent target.

use serde_json::json;

use crate::adapters::rpc::params::ElementArgs;
use crate::adapters::rpc::params::ElementPayload;
use crate::domain::SnapshotRegistry;
use crate::domain::StructuredError;
use crate::domain::TabTarget;

/// Accepts `@eN`, `ref=eN`, or `eN`.
pub fn normalize_ref(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let candidate = trimmed
        .strip_prefix('@')
        .or_else(|| trimmed.strip_prefix("ref="))
        .unwrap_or(trimmed);
    let digits = candidate.strip_prefix('e')?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(candidate)
    } else {
        None
    }
}

pub fn validate_nth(nth: Option<i64>) -> Result<(), StructuredError> {
    match nth {
        Some(value) if value < -1 => Err(StructuredError::bad_request(
            "nth must be an integer >= -1",
        )
        .with_details(json!({ "nth": value }))),
        _ => Ok(()),
    }
}

/// Resolves the element a `click` or `fill` should act on.
///
/// A ref is only meaningful with the snapshot that produced it, so a ref
/// without `snapshot_id` is rejected before the registry is consulted. An
/// explicit `nth` wins over the ordinal recorded at capture time.
pub fn resolve_element(
    command: &str,
    args: ElementArgs,
    registry: &SnapshotRegistry,
) -> Result<ElementPayload, StructuredError> {
    validate_nth(args.nth)?;

    if let Some(raw_ref) = args.reference.as_deref() {
        let Some(snapshot_id) = args.snapshot_id.as_deref() else {
            return Err(StructuredError::bad_request(format!(
                "{command} with ref requires args.snapshot_id"
            ))
            .with_details(json!({ "ref": raw_ref }))
            .with_recovery(json!({ "next_command": "human-browser snapshot" })));
        };
        let reference = normalize_ref(raw_ref).ok_or_else(|| {
            StructuredError::bad_request(format!("Invalid ref: {raw_ref}"))
                .with_details(json!({ "ref": raw_ref }))
        })?;

        let resolved = registry.resolve(snapshot_id, reference)?;
        return Ok(ElementPayload {
            tab_id: args.tab_id.or(Some(TabTarget::Id(resolved.tab_id))),
            selector: resolved.selector,
            nth: Some(args.nth.unwrap_or(resolved.nth as i64)),
            value: args.value,
        });
    }

    let selector = args
        .selector
        .filter(|selector| !selector.trim().is_empty())
        .ok_or_else(|| {
            StructuredError::bad_request(format!("{command} requires args.selector or args.ref"))
        })?;

    Ok(ElementPayload {
        tab_id: args.tab_id,
        selector,
        nth: args.nth,
        value: args.value,
    })
}
