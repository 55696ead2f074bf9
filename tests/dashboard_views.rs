use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn result_str(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|s| s.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

#[test]
fn dashboards_shape_seeded_data_per_role() {
    let workspace = temp_dir("campusd-dashboards");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        json!({
            "username": "root",
            "displayName": "Site Admin",
            "role": "admin",
            "password": "rootpw"
        }),
    );
    let admin = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.login",
        json!({ "username": "root", "password": "rootpw" }),
    );
    let admin_token = result_str(&admin, "token");

    let faculty = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "users.create",
        json!({
            "token": admin_token,
            "username": "mlo",
            "displayName": "M. Lovelace",
            "role": "faculty",
            "password": "facpw"
        }),
    );
    let faculty_id = result_str(&faculty, "userId");

    let mut student_ids = Vec::new();
    for (i, name) in ["S. Day", "T. Night"].iter().enumerate() {
        let stu = request_ok(
            &mut stdin,
            &mut reader,
            &format!("5-{}", i),
            "users.create",
            json!({
                "token": admin_token,
                "username": format!("stu{}", i),
                "displayName": name,
                "role": "student",
                "password": "stupw"
            }),
        );
        student_ids.push(result_str(&stu, "userId"));
    }

    let course = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "courses.create",
        json!({
            "token": admin_token,
            "code": "CS101",
            "title": "Intro to Computing",
            "facultyId": faculty_id
        }),
    );
    let course_id = result_str(&course, "courseId");

    for (i, sid) in student_ids.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("7-{}", i),
            "enrollments.add",
            json!({ "token": admin_token, "courseId": course_id, "studentId": sid }),
        );
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "notices.create",
        json!({ "token": admin_token, "title": "Welcome", "audience": "all" }),
    );

    let admin_dash = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "dashboard.admin",
        json!({ "token": admin_token }),
    );
    let counts = admin_dash.get("userCounts").expect("userCounts");
    assert_eq!(counts.get("admin").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(counts.get("faculty").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(counts.get("student").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(admin_dash.get("courseCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(admin_dash.get("noticeCount").and_then(|v| v.as_i64()), Some(1));
    let recent = admin_dash
        .get("recentNotices")
        .and_then(|v| v.as_array())
        .expect("recentNotices");
    assert_eq!(recent.len(), 1);
    assert!(recent[0].get("colorToken").and_then(|v| v.as_str()).is_some());

    // Faculty records marks; the second write for a component is an upsert.
    let fac = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "auth.login",
        json!({ "username": "mlo", "password": "facpw" }),
    );
    let fac_token = result_str(&fac, "token");

    let marks = [
        (&student_ids[0], "midterm", 70.0),
        (&student_ids[0], "final", 90.0),
        (&student_ids[1], "midterm", 60.0),
        (&student_ids[1], "final", 100.0),
    ];
    for (i, (sid, component, score)) in marks.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("11-{}", i),
            "grades.record",
            json!({
                "token": fac_token,
                "courseId": course_id,
                "studentId": sid,
                "component": component,
                "score": score
            }),
        );
    }
    // Overwrite one mark: midterm for the first student becomes 80.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "grades.record",
        json!({
            "token": fac_token,
            "courseId": course_id,
            "studentId": student_ids[0],
            "component": "midterm",
            "score": 80.0
        }),
    );

    let fac_dash = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "dashboard.faculty",
        json!({ "token": fac_token }),
    );
    let courses = fac_dash
        .get("courses")
        .and_then(|v| v.as_array())
        .expect("courses");
    assert_eq!(courses.len(), 1);
    assert_eq!(
        courses[0].get("enrolledCount").and_then(|v| v.as_i64()),
        Some(2)
    );
    // (80 + 90 + 60 + 100) / 4
    let class_avg = courses[0]
        .get("classAverage")
        .and_then(|v| v.as_f64())
        .expect("classAverage");
    assert!((class_avg - 82.5).abs() < 1e-9);

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "faculty.roster",
        json!({ "token": fac_token, "courseId": course_id }),
    );
    let students = roster
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students");
    assert_eq!(students.len(), 2);
    let day = students
        .iter()
        .find(|s| s.get("displayName").and_then(|v| v.as_str()) == Some("S. Day"))
        .expect("S. Day row");
    let day_avg = day.get("average").and_then(|v| v.as_f64()).expect("average");
    assert!((day_avg - 85.0).abs() < 1e-9);
    assert_eq!(day.get("gradedComponents").and_then(|v| v.as_i64()), Some(2));

    let stu = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "auth.login",
        json!({ "username": "stu1", "password": "stupw" }),
    );
    let stu_token = result_str(&stu, "token");
    let stu_dash = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "dashboard.student",
        json!({ "token": stu_token }),
    );
    let enrollments = stu_dash
        .get("enrollments")
        .and_then(|v| v.as_array())
        .expect("enrollments");
    assert_eq!(enrollments.len(), 1);
    assert_eq!(
        enrollments[0].get("instructor").and_then(|v| v.as_str()),
        Some("M. Lovelace")
    );
    // (60 + 100) / 2
    let my_avg = enrollments[0]
        .get("average")
        .and_then(|v| v.as_f64())
        .expect("average");
    assert!((my_avg - 80.0).abs() < 1e-9);

    let grades = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "grades.list",
        json!({ "token": stu_token }),
    );
    let rows = grades
        .get("grades")
        .and_then(|v| v.as_array())
        .expect("grades");
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .all(|g| g.get("studentId").and_then(|v| v.as_str()) == Some(student_ids[1].as_str())));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
