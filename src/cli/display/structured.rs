//! JSON and YAML output

use crate::domain::config::OutputFormat;
use crate::domain::dispatch::DispatchResult;
use crate::domain::resource::ResourceObject;
use crate::shared::error::Result;
use serde_json::{json, Value};

/// Converts a result into the document printed for `-o json|yaml`.
///
/// A named `get` prints the object itself; any other listing is wrapped in a
/// `v1/List` so the output can be fed back to `apply -f`.
pub fn to_value(result: &DispatchResult, single: bool) -> Result<Value> {
    let value = match result {
        DispatchResult::Resources { items, .. } if single && items.len() == 1 => {
            serde_json::to_value(&items[0])?
        }
        DispatchResult::Resources { items, .. } => list(items)?,
        DispatchResult::Described(object) => serde_json::to_value(object)?,
        DispatchResult::Targets(report) => serde_json::to_value(report)?,
        DispatchResult::Applied(results) => json!({ "results": results }),
        DispatchResult::Session(report) => serde_json::to_value(report)?,
        DispatchResult::ClusterInfo(summary) => serde_json::to_value(summary)?,
    };
    Ok(value)
}

fn list(items: &[ResourceObject]) -> Result<Value> {
    let items = items
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": items,
    }))
}

/// Serializes `value` in the requested format. Table output is not handled
/// here.
pub fn render(value: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        OutputFormat::Json | OutputFormat::Table => Ok(serde_json::to_string_pretty(value)?),
    }
}
