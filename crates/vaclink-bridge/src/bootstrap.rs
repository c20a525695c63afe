//! Bootstrap sequencer.
//!
//! The proxy only pushes deltas, so a freshly reachable robot must be asked
//! for its full state. This fixed request sequence pulls aggregate
//! info/version data, map/area state, and scheduling/position data, in that
//! order. Each send is best-effort: a failed request is logged and skipped,
//! since the next data push or reconnect cycle refreshes state anyway.

use serde_json::{json, Value};
use tracing::warn;

use crate::command::CommandSender;

/// The fixed, ordered request sequence.
pub(crate) fn requests() -> Vec<(u32, Value)> {
    vec![
        (
            30000,
            json!({
                "mainCmds": ["21014"],
                "cmds": [
                    {"data": {}, "infoType": "21014"},
                    {"data": {}, "infoType": "20001"},
                    {"data": {}, "infoType": "21008"}
                ]
            }),
        ),
        (21034, json!({})),
        (
            21011,
            json!({"startPos": 3, "userId": "35fac39293313047a911b3e210bed1ef", "mask": 0}),
        ),
        (21019, json!({})),
    ]
}

/// Issue the sequence through `commands`, never failing the caller.
pub(crate) async fn run(commands: &CommandSender) {
    for (info_type, data) in requests() {
        if let Err(e) = commands.send(info_type, data).await {
            warn!(info_type, error = %e, "bootstrap request failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_order_is_fixed() {
        let codes: Vec<u32> = requests().iter().map(|(code, _)| *code).collect();
        assert_eq!(codes, vec![30000, 21034, 21011, 21019]);
    }

    #[test]
    fn aggregate_request_names_sub_queries() {
        let (code, payload) = requests().remove(0);
        assert_eq!(code, 30000);
        let cmds = payload.get("cmds").unwrap().as_array().unwrap();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0].get("infoType"), Some(&json!("21014")));
    }
}
