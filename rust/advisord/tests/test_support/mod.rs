#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TEMP_SEQ: AtomicUsize = AtomicUsize::new(0);

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos(),
        TEMP_SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: usize,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_sidecar() -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_advisord");
    let mut child = Command::new(exe)
        .env_remove("ADVISORD_WORKSPACE")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn advisord");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

impl Sidecar {
    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_default()
    }

    /// Returns the error code of a request expected to fail.
    pub fn request_err(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"]["code"]
            .as_str()
            .expect("error code")
            .to_string()
    }

    pub fn open_workspace(&mut self, prefix: &str) -> PathBuf {
        let ws = temp_dir(prefix);
        self.request_ok("workspace.select", json!({ "path": ws.to_string_lossy() }));
        ws
    }

    pub fn create_programme(&mut self, code: &str, total_credits: f64) -> String {
        let res = self.request_ok(
            "programmes.create",
            json!({ "code": code, "name": format!("{} programme", code), "totalCredits": total_credits }),
        );
        res["programmeId"].as_str().expect("programmeId").to_string()
    }

    pub fn create_course(&mut self, code: &str, credits: f64, default_type: Option<&str>) -> String {
        let res = self.request_ok(
            "courses.create",
            json!({
                "code": code,
                "title": format!("{} title", code),
                "credits": credits,
                "defaultType": default_type,
            }),
        );
        res["courseId"].as_str().expect("courseId").to_string()
    }

    pub fn create_user(&mut self, role: &str, name: &str, extra: serde_json::Value) -> String {
        let mut params = json!({
            "role": role,
            "name": name,
            "email": format!("{}@uni.example", name.to_ascii_lowercase().replace(' ', ".")),
        });
        if let (Some(p), Some(e)) = (params.as_object_mut(), extra.as_object()) {
            for (k, v) in e {
                p.insert(k.clone(), v.clone());
            }
        }
        let res = self.request_ok("users.create", params);
        res["userId"].as_str().expect("userId").to_string()
    }

    pub fn add_semester(
        &mut self,
        programme_id: &str,
        session: Option<(&str, u32)>,
        courses: &[&str],
    ) -> String {
        let mut params = json!({ "programmeId": programme_id, "courses": courses });
        if let Some((year, semester)) = session {
            params["academicYear"] = json!(year);
            params["semester"] = json!(semester);
        }
        let res = self.request_ok("programmes.semesters.create", params);
        res["semesterId"].as_str().expect("semesterId").to_string()
    }
}
