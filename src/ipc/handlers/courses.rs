use crate::auth::Role;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{param_str, require_role, require_user};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn user_role(conn: &rusqlite::Connection, user_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT role FROM users WHERE id = ?", [user_id], |r| {
        r.get(0)
    })
    .optional()
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(resp) = require_role(conn, req, Role::Admin) {
        return resp;
    }

    let code = match param_str(req, "code") {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing code", None),
    };
    if code.is_empty() {
        return err(&req.id, "bad_params", "code must not be empty", None);
    }
    let title = match param_str(req, "title") {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing title", None),
    };
    let Some(faculty_id) = param_str(req, "facultyId") else {
        return err(&req.id, "bad_params", "missing facultyId", None);
    };

    match user_role(conn, faculty_id) {
        Ok(Some(role)) if role == "faculty" => {}
        Ok(Some(role)) => {
            return err(
                &req.id,
                "bad_params",
                format!("facultyId refers to a {} user", role),
                None,
            )
        }
        Ok(None) => return err(&req.id, "not_found", "faculty user not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let course_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, code, title, faculty_id) VALUES(?, ?, ?, ?)",
        (&course_id, &code, &title, faculty_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    ok(
        &req.id,
        json!({ "courseId": course_id, "code": code, "title": title }),
    )
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(resp) = require_user(conn, req) {
        return resp;
    }

    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.code,
           c.title,
           u.display_name,
           (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS enrolled
         FROM courses c
         JOIN users u ON u.id = c.faculty_id
         ORDER BY c.code",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            let title: String = row.get(2)?;
            let faculty_name: String = row.get(3)?;
            let enrolled: i64 = row.get(4)?;
            Ok(json!({
                "courseId": id,
                "code": code,
                "title": title,
                "facultyName": faculty_name,
                "enrolledCount": enrolled
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_enrollments_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(resp) = require_role(conn, req, Role::Admin) {
        return resp;
    }

    let Some(course_id) = param_str(req, "courseId") else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };
    let Some(student_id) = param_str(req, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };

    let course_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if course_exists.is_none() {
        return err(&req.id, "not_found", "course not found", None);
    }

    match user_role(conn, student_id) {
        Ok(Some(role)) if role == "student" => {}
        Ok(Some(role)) => {
            return err(
                &req.id,
                "bad_params",
                format!("studentId refers to a {} user", role),
                None,
            )
        }
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let already: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE course_id = ? AND student_id = ?",
            [course_id, student_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if already.is_some() {
        return err(&req.id, "conflict", "student already enrolled", None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO enrollments(course_id, student_id) VALUES(?, ?)",
        [course_id, student_id],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "enrollments" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_enrollments_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(resp) = require_role(conn, req, Role::Admin) {
        return resp;
    }

    let Some(course_id) = param_str(req, "courseId") else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };
    let Some(student_id) = param_str(req, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Grades reference the enrollment pair; remove them with it.
    if let Err(e) = tx.execute(
        "DELETE FROM grades WHERE course_id = ? AND student_id = ?",
        [course_id, student_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        );
    }
    let removed = match tx.execute(
        "DELETE FROM enrollments WHERE course_id = ? AND student_id = ?",
        [course_id, student_id],
    ) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "enrollments" })),
            );
        }
    };
    if removed == 0 {
        let _ = tx.rollback();
        return err(&req.id, "not_found", "enrollment not found", None);
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.list" => Some(handle_courses_list(state, req)),
        "enrollments.add" => Some(handle_enrollments_add(state, req)),
        "enrollments.remove" => Some(handle_enrollments_remove(state, req)),
        _ => None,
    }
}
