mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn roles_emails_and_advisors_are_validated() {
    let mut sc = spawn_sidecar();
    let ws = sc.open_workspace("advisord-users");
    let pid = sc.create_programme("CS", 120.0);
    let advisor = sc.create_user("advisor", "Barbara Liskov", json!({}));
    let student = sc.create_user(
        "student",
        "Ada Byron",
        json!({ "programmeId": pid, "advisorId": advisor, "intake": "2023" }),
    );

    let got = sc.request_ok("users.get", json!({ "userId": student }));
    assert_eq!(got["role"], json!("student"));
    assert_eq!(got["advisorId"], json!(advisor));
    assert_eq!(got["programmeId"], json!(pid));

    let bad = [
        json!({ "role": "dean", "name": "X", "email": "x@uni.example" }),
        json!({ "role": "student", "name": "X", "email": "not-an-email" }),
        json!({ "role": "advisor", "name": "X", "email": "x@uni.example", "programmeId": pid }),
        json!({ "role": "student", "name": "X", "email": "x@uni.example", "advisorId": student }),
    ];
    for params in bad {
        assert_eq!(sc.request_err("users.create", params), "bad_params");
    }
    assert_eq!(
        sc.request_err(
            "users.create",
            json!({ "role": "student", "name": "Dup", "email": "ADA.BYRON@uni.example" })
        ),
        "conflict"
    );

    let advisors = sc.request_ok("users.list", json!({ "role": "advisor" }));
    assert_eq!(advisors["users"].as_array().unwrap().len(), 1);

    sc.request_ok(
        "users.update",
        json!({ "userId": student, "patch": { "name": "Ada Lovelace", "intake": null } }),
    );
    let got = sc.request_ok("users.get", json!({ "userId": student }));
    assert_eq!(got["name"], json!("Ada Lovelace"));
    assert!(got["intake"].is_null());
    assert_eq!(
        sc.request_err("users.update", json!({ "userId": student, "patch": { "role": "advisor" } })),
        "bad_params"
    );

    let pos = sc.request_ok(
        "users.setPosition",
        json!({ "userId": student, "year": 2, "semester": 2 }),
    );
    assert_eq!(pos["position"], json!({ "year": 2, "semester": 2 }));
    assert_eq!(
        sc.request_err(
            "users.setPosition",
            json!({ "userId": student, "year": 2, "semester": 3 })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.request_err(
            "users.setPosition",
            json!({ "userId": advisor, "year": 1, "semester": 1 })
        ),
        "bad_params"
    );
    let cleared = sc.request_ok("users.setPosition", json!({ "userId": student }));
    assert!(cleared["position"].is_null());

    sc.request_ok(
        "users.assignAdvisor",
        json!({ "studentId": student, "advisorId": null }),
    );
    let advisees = sc.request_ok("advisors.advisees", json!({ "advisorId": advisor }));
    assert_eq!(advisees["advisees"], json!([]));

    let _ = std::fs::remove_dir_all(ws);
}

#[test]
fn deleting_a_user_cascades_to_their_records() {
    let mut sc = spawn_sidecar();
    let ws = sc.open_workspace("advisord-users-delete");
    let files = temp_dir("advisord-users-delete-files");
    let pid = sc.create_programme("CS", 120.0);
    sc.create_course("CS101", 4.0, Some("core"));
    sc.add_semester(&pid, None, &["CS101"]);
    let advisor = sc.create_user("advisor", "Barbara Liskov", json!({}));
    let student = sc.create_user(
        "student",
        "Ada Byron",
        json!({ "programmeId": pid, "advisorId": advisor }),
    );
    sc.request_ok(
        "profile.entries.upsert",
        json!({ "studentId": student, "courseCode": "CS101", "status": "passed" }),
    );
    let plan = sc.request_ok("plans.create", json!({ "studentId": student }));
    let msg = sc.request_ok(
        "messages.send",
        json!({ "senderId": advisor, "recipientId": student, "body": "Looks good",
                "kind": "feedback", "planId": plan["planId"] }),
    );
    let source = files.join("plan.txt");
    std::fs::write(&source, b"plan notes").expect("write");
    let att = sc.request_ok(
        "attachments.add",
        json!({ "messageId": msg["messageId"], "sourcePath": source.to_string_lossy() }),
    );
    let blob = ws
        .join("attachments")
        .join(att["sha256"].as_str().expect("sha256"));
    assert!(blob.is_file());

    // Removing the advisor detaches the student and drops their messages.
    sc.request_ok("users.delete", json!({ "userId": advisor }));
    let got = sc.request_ok("users.get", json!({ "userId": student }));
    assert!(got["advisorId"].is_null());
    assert!(!blob.exists());
    let inbox = sc.request_ok("messages.list", json!({ "userId": student }));
    assert_eq!(inbox["messages"], json!([]));

    sc.request_ok("users.delete", json!({ "userId": student }));
    assert_eq!(
        sc.request_err("plans.get", json!({ "planId": plan["planId"] })),
        "not_found"
    );
    let users = sc.request_ok("users.list", json!({}));
    assert_eq!(users["users"], json!([]));
    // With nobody enrolled the programme can go.
    sc.request_ok("programmes.delete", json!({ "programmeId": pid }));

    let _ = std::fs::remove_dir_all(ws);
    let _ = std::fs::remove_dir_all(files);
}
