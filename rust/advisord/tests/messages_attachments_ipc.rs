mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn messages_flow_between_students_and_advisors() {
    let mut sc = spawn_sidecar();
    let ws = sc.open_workspace("advisord-messages");
    let advisor = sc.create_user("advisor", "Barbara Liskov", json!({}));
    let student = sc.create_user("student", "Ada Byron", json!({ "advisorId": advisor }));

    sc.request_ok(
        "messages.send",
        json!({ "senderId": student, "recipientId": advisor, "subject": "Plan", "body": "Can we meet?" }),
    );
    let reply = sc.request_ok(
        "messages.send",
        json!({ "senderId": advisor, "recipientId": student, "body": "Take CS201 first.", "kind": "feedback" }),
    );
    let reply_id = reply["messageId"].as_str().expect("messageId").to_string();

    assert_eq!(
        sc.request_err(
            "messages.send",
            json!({ "senderId": student, "recipientId": advisor, "body": "x", "kind": "feedback" })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.request_err(
            "messages.send",
            json!({ "senderId": student, "recipientId": advisor, "body": "x", "kind": "memo" })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.request_err(
            "messages.send",
            json!({ "senderId": student, "recipientId": "ghost", "body": "x" })
        ),
        "not_found"
    );

    let inbox = sc.request_ok("messages.list", json!({ "userId": student, "box": "inbox" }));
    let msgs = inbox["messages"].as_array().expect("messages");
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0]["kind"], json!("feedback"));
    assert!(msgs[0]["readAt"].is_null());

    let sent = sc.request_ok("messages.list", json!({ "userId": student, "box": "sent" }));
    assert_eq!(sent["messages"][0]["subject"], json!("Plan"));

    let thread = sc.request_ok("messages.thread", json!({ "userA": advisor, "userB": student }));
    let bodies: Vec<&str> = thread["messages"]
        .as_array()
        .expect("thread")
        .iter()
        .map(|m| m["body"].as_str().unwrap())
        .collect();
    assert_eq!(bodies, vec!["Can we meet?", "Take CS201 first."]);

    let read = sc.request_ok("messages.markRead", json!({ "messageId": reply_id }));
    let read_at = read["readAt"].clone();
    assert!(read_at.as_str().is_some());
    let again = sc.request_ok("messages.markRead", json!({ "messageId": reply_id }));
    assert_eq!(again["readAt"], read_at);
    let unread = sc.request_ok(
        "messages.list",
        json!({ "userId": student, "box": "inbox", "unreadOnly": true }),
    );
    assert_eq!(unread["messages"], json!([]));

    let advisees = sc.request_ok("advisors.advisees", json!({ "advisorId": advisor }));
    assert_eq!(advisees["advisees"][0]["id"], json!(student));

    let _ = std::fs::remove_dir_all(ws);
}

#[test]
fn attachments_are_content_addressed_and_verified() {
    let mut sc = spawn_sidecar();
    let ws = sc.open_workspace("advisord-attachments");
    let files = temp_dir("advisord-attachment-files");
    let advisor = sc.create_user("advisor", "Barbara Liskov", json!({}));
    let student = sc.create_user("student", "Ada Byron", json!({}));
    let m1 = sc.request_ok(
        "messages.send",
        json!({ "senderId": student, "recipientId": advisor, "body": "transcript attached" }),
    )["messageId"]
        .as_str()
        .unwrap()
        .to_string();
    let m2 = sc.request_ok(
        "messages.send",
        json!({ "senderId": student, "recipientId": advisor, "body": "again" }),
    )["messageId"]
        .as_str()
        .unwrap()
        .to_string();

    let source = files.join("transcript.pdf");
    std::fs::write(&source, b"%PDF-1.4 transcript").expect("write source");

    let a1 = sc.request_ok(
        "attachments.add",
        json!({ "messageId": m1, "sourcePath": source.to_string_lossy() }),
    );
    assert_eq!(a1["fileName"], json!("transcript.pdf"));
    assert_eq!(a1["sizeBytes"], json!(19));
    let sha = a1["sha256"].as_str().expect("sha256").to_string();
    assert_eq!(sha.len(), 64);
    let blob = ws.join("attachments").join(&sha);
    assert!(blob.is_file());

    let a2 = sc.request_ok(
        "attachments.add",
        json!({ "messageId": m2, "sourcePath": source.to_string_lossy(), "fileName": "copy.pdf" }),
    );
    assert_eq!(a2["sha256"], json!(sha));

    let listed = sc.request_ok("attachments.list", json!({ "messageId": m1 }));
    assert_eq!(listed["attachments"].as_array().unwrap().len(), 1);

    let out = files.join("exported").join("t.pdf");
    let a1_id = a1["attachmentId"].as_str().unwrap().to_string();
    sc.request_ok(
        "attachments.export",
        json!({ "attachmentId": a1_id, "outPath": out.to_string_lossy() }),
    );
    assert_eq!(std::fs::read(&out).expect("read export"), b"%PDF-1.4 transcript");

    // Deleting one reference keeps the shared blob.
    sc.request_ok("messages.delete", json!({ "messageId": m1 }));
    assert!(blob.is_file());
    assert_eq!(
        sc.request_err("attachments.list", json!({ "messageId": m1 })),
        "not_found"
    );

    std::fs::write(&blob, b"tampered").expect("tamper");
    let a2_id = a2["attachmentId"].as_str().unwrap().to_string();
    assert_eq!(
        sc.request_err(
            "attachments.export",
            json!({ "attachmentId": a2_id, "outPath": out.to_string_lossy() })
        ),
        "integrity_failed"
    );

    sc.request_ok("attachments.delete", json!({ "attachmentId": a2_id }));
    assert!(!blob.exists());

    let _ = std::fs::remove_dir_all(ws);
    let _ = std::fs::remove_dir_all(files);
}

#[test]
fn oversized_attachments_are_refused() {
    let mut sc = spawn_sidecar();
    let ws = sc.open_workspace("advisord-attachments-limit");
    let files = temp_dir("advisord-attachment-limit-files");
    let advisor = sc.create_user("advisor", "Barbara Liskov", json!({}));
    let student = sc.create_user("student", "Ada Byron", json!({}));
    let msg = sc.request_ok(
        "messages.send",
        json!({ "senderId": advisor, "recipientId": student, "body": "see attached" }),
    )["messageId"]
        .as_str()
        .unwrap()
        .to_string();

    sc.request_ok(
        "setup.update",
        json!({ "section": "attachments", "patch": { "maxBytes": 8 } }),
    );
    let big = files.join("big.bin");
    std::fs::write(&big, vec![7u8; 9]).expect("write big");
    assert_eq!(
        sc.request_err(
            "attachments.add",
            json!({ "messageId": msg, "sourcePath": big.to_string_lossy() })
        ),
        "too_large"
    );
    assert_eq!(
        sc.request_err(
            "attachments.add",
            json!({ "messageId": msg, "sourcePath": files.join("missing.bin").to_string_lossy() })
        ),
        "io_failed"
    );

    let small = files.join("small.bin");
    std::fs::write(&small, vec![7u8; 8]).expect("write small");
    sc.request_ok(
        "attachments.add",
        json!({ "messageId": msg, "sourcePath": small.to_string_lossy() }),
    );

    let _ = std::fs::remove_dir_all(ws);
    let _ = std::fs::remove_dir_all(files);
}
