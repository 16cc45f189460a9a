mod test_support;

use serde_json::json;
use test_support::spawn_sidecar;

#[test]
fn defaults_are_reported_per_section() {
    let mut sc = spawn_sidecar();
    let ws = sc.open_workspace("advisord-setup-defaults");

    let all = sc.request_ok("setup.get", json!({}));
    assert_eq!(all["planning"]["semestersPerYear"], json!(2));
    assert_eq!(
        all["planning"]["gapTokens"],
        json!(["GAP", "GAP_SEMESTER", "LOA"])
    );
    assert_eq!(
        all["planning"]["outboundTokens"],
        json!(["OUTBOUND", "EXCHANGE", "SEP"])
    );
    assert_eq!(all["attachments"]["maxBytes"], json!(10 * 1024 * 1024));

    let planning = sc.request_ok("setup.get", json!({ "section": "planning" }));
    assert_eq!(planning, all["planning"]);
    assert_eq!(
        sc.request_err("setup.get", json!({ "section": "grading" })),
        "bad_params"
    );

    let _ = std::fs::remove_dir_all(ws);
}

#[test]
fn updates_are_validated_and_persisted() {
    let mut sc = spawn_sidecar();
    let ws = sc.open_workspace("advisord-setup-update");

    let updated = sc.request_ok(
        "setup.update",
        json!({
            "section": "planning",
            "patch": { "semestersPerYear": 3, "gapTokens": ["break", " Leave "] }
        }),
    );
    assert_eq!(updated["semestersPerYear"], json!(3));
    assert_eq!(updated["gapTokens"], json!(["BREAK", "LEAVE"]));
    assert_eq!(
        updated["outboundTokens"],
        json!(["OUTBOUND", "EXCHANGE", "SEP"])
    );

    for bad in [
        json!({ "section": "planning", "patch": { "semestersPerYear": 0 } }),
        json!({ "section": "planning", "patch": { "semestersPerYear": 7 } }),
        json!({ "section": "planning", "patch": { "gapTokens": [] } }),
        json!({ "section": "planning", "patch": { "colour": "blue" } }),
        json!({ "section": "attachments", "patch": { "maxBytes": 0 } }),
        json!({ "section": "grading", "patch": {} }),
    ] {
        assert_eq!(sc.request_err("setup.update", bad), "bad_params");
    }

    // Reopening the workspace reads the stored values back.
    sc.request_ok("workspace.select", json!({ "path": ws.to_string_lossy() }));
    let planning = sc.request_ok("setup.get", json!({ "section": "planning" }));
    assert_eq!(planning["semestersPerYear"], json!(3));

    let _ = std::fs::remove_dir_all(ws);
}
