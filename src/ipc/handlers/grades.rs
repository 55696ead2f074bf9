use crate::auth::Role;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_ts, param_str, require_role, require_user};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn course_faculty(conn: &rusqlite::Connection, course_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT faculty_id FROM courses WHERE id = ?",
        [course_id],
        |r| r.get(0),
    )
    .optional()
}

fn handle_grades_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match require_role(conn, req, Role::Faculty) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let Some(course_id) = param_str(req, "courseId") else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };
    let Some(student_id) = param_str(req, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let component = match param_str(req, "component") {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing component", None),
    };
    if component.is_empty() {
        return err(&req.id, "bad_params", "component must not be empty", None);
    }
    let Some(score) = req.params.get("score").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing or non-numeric score", None);
    };
    if !(0.0..=100.0).contains(&score) {
        return err(&req.id, "bad_params", "score must be within 0..=100", None);
    }

    match course_faculty(conn, course_id) {
        Ok(Some(fid)) if fid == caller.id => {}
        Ok(Some(_)) => {
            return err(
                &req.id,
                "forbidden",
                "caller does not teach this course",
                None,
            )
        }
        Ok(None) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let enrolled: Option<i64> = match conn
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
    if enrolled.is_none() {
        return err(
            &req.id,
            "not_found",
            "student is not enrolled in this course",
            None,
        );
    }

    if let Err(e) = conn.execute(
        "INSERT INTO grades(course_id, student_id, component, score, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(course_id, student_id, component)
         DO UPDATE SET score = excluded.score, updated_at = excluded.updated_at",
        (course_id, student_id, &component, score, now_ts()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        );
    }

    ok(
        &req.id,
        json!({
            "courseId": course_id,
            "studentId": student_id,
            "component": component,
            "score": score
        }),
    )
}

fn grade_rows(
    conn: &rusqlite::Connection,
    sql: &str,
    args: &[&str],
) -> Result<Vec<serde_json::Value>, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
        let course_id: String = row.get(0)?;
        let student_id: String = row.get(1)?;
        let component: String = row.get(2)?;
        let score: f64 = row.get(3)?;
        let updated_at: String = row.get(4)?;
        Ok(json!({
            "courseId": course_id,
            "studentId": student_id,
            "component": component,
            "score": score,
            "updatedAt": updated_at
        }))
    })?;
    rows.collect()
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match require_user(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match caller.role {
        Role::Faculty => {
            // Faculty must name a course they teach and get the full list.
            let Some(course_id) = param_str(req, "courseId") else {
                return err(&req.id, "bad_params", "missing courseId", None);
            };
            match course_faculty(conn, course_id) {
                Ok(Some(fid)) if fid == caller.id => {}
                Ok(Some(_)) => {
                    return err(
                        &req.id,
                        "forbidden",
                        "caller does not teach this course",
                        None,
                    )
                }
                Ok(None) => return err(&req.id, "not_found", "course not found", None),
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            }
            match grade_rows(
                conn,
                "SELECT course_id, student_id, component, score, updated_at
                 FROM grades WHERE course_id = ?
                 ORDER BY student_id, component",
                &[course_id],
            ) {
                Ok(grades) => ok(&req.id, json!({ "grades": grades })),
                Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
            }
        }
        Role::Student => {
            // Students only ever see their own grades.
            let result = match param_str(req, "courseId") {
                Some(course_id) => grade_rows(
                    conn,
                    "SELECT course_id, student_id, component, score, updated_at
                     FROM grades WHERE student_id = ? AND course_id = ?
                     ORDER BY component",
                    &[caller.id.as_str(), course_id],
                ),
                None => grade_rows(
                    conn,
                    "SELECT course_id, student_id, component, score, updated_at
                     FROM grades WHERE student_id = ?
                     ORDER BY course_id, component",
                    &[caller.id.as_str()],
                ),
            };
            match result {
                Ok(grades) => ok(&req.id, json!({ "grades": grades })),
                Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
            }
        }
        Role::Admin => err(
            &req.id,
            "forbidden",
            "grade lists belong to faculty and students",
            None,
        ),
    }
}

fn handle_faculty_roster(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match require_role(conn, req, Role::Faculty) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let Some(course_id) = param_str(req, "courseId") else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };
    match course_faculty(conn, course_id) {
        Ok(Some(fid)) if fid == caller.id => {}
        Ok(Some(_)) => {
            return err(
                &req.id,
                "forbidden",
                "caller does not teach this course",
                None,
            )
        }
        Ok(None) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let mut stmt = match conn.prepare(
        "SELECT
           u.id,
           u.display_name,
           (SELECT AVG(g.score) FROM grades g
            WHERE g.course_id = e.course_id AND g.student_id = u.id) AS avg_score,
           (SELECT COUNT(*) FROM grades g
            WHERE g.course_id = e.course_id AND g.student_id = u.id) AS graded
         FROM enrollments e
         JOIN users u ON u.id = e.student_id
         WHERE e.course_id = ?
         ORDER BY u.display_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([course_id], |row| {
            let student_id: String = row.get(0)?;
            let display_name: String = row.get(1)?;
            let avg_score: Option<f64> = row.get(2)?;
            let graded: i64 = row.get(3)?;
            Ok(json!({
                "studentId": student_id,
                "displayName": display_name,
                "average": avg_score,
                "gradedComponents": graded
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "courseId": course_id, "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.record" => Some(handle_grades_record(state, req)),
        "grades.list" => Some(handle_grades_list(state, req)),
        "faculty.roster" => Some(handle_faculty_roster(state, req)),
        _ => None,
    }
}
