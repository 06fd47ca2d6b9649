use serde::Serialize;

use darkpool_core::pipeline::{CollectionReport, NetworkReport};

fn to_json<T: Serialize>(value: &T, compact: bool) -> String {
    if compact {
        serde_json::to_string(value).expect("report should be serializable")
    } else {
        serde_json::to_string_pretty(value).expect("report should be serializable")
    }
}

/// Format the collection stage output as JSON. This is the file the network stage reads.
pub fn format_collection(report: &CollectionReport, compact: bool) -> String {
    to_json(report, compact)
}

/// Format the network stage output as JSON.
pub fn format_network(report: &NetworkReport, compact: bool) -> String {
    to_json(report, compact)
}
