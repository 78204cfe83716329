use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use opsdash_sync::Boundary;

/// Query body listing rows edited since `since`, oldest edit first.
pub fn changed_since(since: DateTime<Utc>, boundary: Boundary) -> Value {
    let operator = match boundary {
        Boundary::Inclusive => "on_or_after",
        Boundary::Exclusive => "after",
    };

    json!({
        "filter": {
            "timestamp": "last_edited_time",
            "last_edited_time": {
                operator: since.to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        },
        "sorts": [
            { "timestamp": "last_edited_time", "direction": "ascending" },
        ],
    })
}
