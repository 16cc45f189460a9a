mod test_support;

use serde_json::json;
use test_support::spawn_sidecar;

#[test]
fn sessions_order_the_mapping_regardless_of_insert_order() {
    let mut sc = spawn_sidecar();
    let ws = sc.open_workspace("advisord-mapping-sessions");
    let pid = sc.create_programme("CS", 120.0);

    sc.add_semester(&pid, Some(("2024/2025", 1)), &["cs201", "CS202"]);
    sc.add_semester(&pid, Some(("2023/2024", 2)), &["CS102"]);
    sc.add_semester(&pid, Some(("2023-24", 1)), &["CS101", " ma101 ", ""]);
    // Same slot as the first 2023 entry: merged after it, duplicates dropped.
    sc.add_semester(&pid, Some(("2023/2024", 1)), &["MA101", "EN101"]);

    let res = sc.request_ok("programmes.mapping", json!({ "programmeId": pid }));
    assert_eq!(
        res["mapping"],
        json!({
            "Year 1": {
                "Semester 1": ["CS101", "MA101", "EN101"],
                "Semester 2": ["CS102"]
            },
            "Year 2": {
                "Semester 1": ["CS201", "CS202"]
            }
        })
    );
    let slots = res["slots"].as_array().expect("slots");
    let order: Vec<(u64, u64)> = slots
        .iter()
        .map(|s| (s["year"].as_u64().unwrap(), s["semester"].as_u64().unwrap()))
        .collect();
    assert_eq!(order, vec![(1, 1), (1, 2), (2, 1)]);

    let _ = std::fs::remove_dir_all(ws);
}

#[test]
fn plans_without_sessions_fall_back_to_position() {
    let mut sc = spawn_sidecar();
    let ws = sc.open_workspace("advisord-mapping-fallback");
    let pid = sc.create_programme("DS", 120.0);

    sc.add_semester(&pid, None, &["DS101"]);
    sc.add_semester(&pid, Some(("2023/2024", 2)), &["DS102"]);
    sc.add_semester(&pid, None, &["DS201"]);

    let res = sc.request_ok("programmes.mapping", json!({ "programmeId": pid }));
    assert_eq!(
        res["mapping"],
        json!({
            "Year 1": { "Semester 1": ["DS101"], "Semester 2": ["DS102"] },
            "Year 2": { "Semester 1": ["DS201"] }
        })
    );

    // Three semesters a year repacks the same ordering.
    sc.request_ok(
        "setup.update",
        json!({ "section": "planning", "patch": { "semestersPerYear": 3 } }),
    );
    let res = sc.request_ok("programmes.mapping", json!({ "programmeId": pid }));
    assert_eq!(
        res["mapping"],
        json!({
            "Year 1": { "Semester 1": ["DS101"], "Semester 2": ["DS102"], "Semester 3": ["DS201"] }
        })
    );

    let _ = std::fs::remove_dir_all(ws);
}

#[test]
fn semester_plans_are_validated_and_editable() {
    let mut sc = spawn_sidecar();
    let ws = sc.open_workspace("advisord-mapping-crud");
    let pid = sc.create_programme("EE", 130.0);

    assert_eq!(
        sc.request_err(
            "programmes.semesters.create",
            json!({ "programmeId": pid, "academicYear": "2023/2024", "semester": 3, "courses": [] })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.request_err(
            "programmes.semesters.create",
            json!({ "programmeId": pid, "academicYear": "2023/2025", "semester": 1, "courses": [] })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.request_err(
            "programmes.semesters.create",
            json!({ "programmeId": pid, "academicYear": "2023/2024", "courses": [] })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.request_err(
            "programmes.semesters.create",
            json!({ "programmeId": "missing", "courses": ["EE101"] })
        ),
        "not_found"
    );

    let sid = sc.add_semester(&pid, Some(("2023/2024", 1)), &["EE101"]);
    sc.request_ok(
        "programmes.semesters.update",
        json!({ "semesterId": sid, "patch": { "courses": ["ee101", "EE102", "EE101"] } }),
    );
    let listed = sc.request_ok("programmes.semesters.list", json!({ "programmeId": pid }));
    assert_eq!(listed["semesters"][0]["courses"], json!(["EE101", "EE102"]));
    assert_eq!(listed["semesters"][0]["academicYear"], json!("2023/2024"));

    sc.request_ok("programmes.semesters.delete", json!({ "semesterId": sid }));
    assert_eq!(
        sc.request_err("programmes.semesters.delete", json!({ "semesterId": sid })),
        "not_found"
    );
    let res = sc.request_ok("programmes.mapping", json!({ "programmeId": pid }));
    assert_eq!(res["mapping"], json!({}));
    assert_eq!(res["slots"], json!([]));

    let _ = std::fs::remove_dir_all(ws);
}

#[test]
fn programme_delete_is_refused_while_students_are_enrolled() {
    let mut sc = spawn_sidecar();
    let ws = sc.open_workspace("advisord-programme-delete");
    let pid = sc.create_programme("ME", 128.0);
    sc.add_semester(&pid, None, &["ME101"]);
    let student = sc.create_user("student", "Ada Byron", json!({ "programmeId": pid }));

    assert_eq!(
        sc.request_err("programmes.create", json!({ "code": "me", "name": "dup", "totalCredits": 1 })),
        "conflict"
    );
    assert_eq!(
        sc.request_err("programmes.delete", json!({ "programmeId": pid })),
        "conflict"
    );

    sc.request_ok(
        "users.update",
        json!({ "userId": student, "patch": { "programmeId": null } }),
    );
    sc.request_ok("programmes.delete", json!({ "programmeId": pid }));
    assert_eq!(
        sc.request_err("programmes.get", json!({ "programmeId": pid })),
        "not_found"
    );
    let listed = sc.request_ok("programmes.list", json!({}));
    assert_eq!(listed["programmes"], json!([]));

    let _ = std::fs::remove_dir_all(ws);
}
