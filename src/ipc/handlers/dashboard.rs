use crate::auth::Role;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::require_role;
use crate::ipc::types::{AppState, Request};
use crate::palette;
use serde_json::json;

fn handle_dashboard_admin(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(resp) = require_role(conn, req, Role::Admin) {
        return resp;
    }

    let mut counts = json!({ "admin": 0, "faculty": 0, "student": 0 });
    {
        let mut stmt = match conn.prepare("SELECT role, COUNT(*) FROM users GROUP BY role") {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let grouped = stmt
            .query_map([], |row| {
                let role: String = row.get(0)?;
                let n: i64 = row.get(1)?;
                Ok((role, n))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        match grouped {
            Ok(pairs) => {
                for (role, n) in pairs {
                    counts[role] = json!(n);
                }
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let course_count: i64 = match conn.query_row("SELECT COUNT(*) FROM courses", [], |r| r.get(0)) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let notice_count: i64 = match conn.query_row("SELECT COUNT(*) FROM notices", [], |r| r.get(0)) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, title, audience, created_at
         FROM notices
         ORDER BY created_at DESC
         LIMIT 5",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let recent = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let audience: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            let color = palette::token_for(&id);
            Ok(json!({
                "noticeId": id,
                "title": title,
                "audience": audience,
                "createdAt": created_at,
                "colorToken": color
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let recent = match recent {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "userCounts": counts,
            "courseCount": course_count,
            "noticeCount": notice_count,
            "recentNotices": recent
        }),
    )
}

fn handle_dashboard_faculty(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match require_role(conn, req, Role::Faculty) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.code,
           c.title,
           (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS enrolled,
           (SELECT AVG(g.score) FROM grades g WHERE g.course_id = c.id) AS class_avg
         FROM courses c
         WHERE c.faculty_id = ?
         ORDER BY c.code",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&caller.id], |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            let title: String = row.get(2)?;
            let enrolled: i64 = row.get(3)?;
            let class_avg: Option<f64> = row.get(4)?;
            Ok(json!({
                "courseId": id,
                "code": code,
                "title": title,
                "enrolledCount": enrolled,
                "classAverage": class_avg
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(
            &req.id,
            json!({
                "displayName": caller.display_name,
                "courses": courses
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_dashboard_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match require_role(conn, req, Role::Student) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.code,
           c.title,
           u.display_name,
           (SELECT AVG(g.score) FROM grades g
            WHERE g.course_id = c.id AND g.student_id = e.student_id) AS my_avg
         FROM enrollments e
         JOIN courses c ON c.id = e.course_id
         JOIN users u ON u.id = c.faculty_id
         WHERE e.student_id = ?
         ORDER BY c.code",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&caller.id], |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            let title: String = row.get(2)?;
            let instructor: String = row.get(3)?;
            let my_avg: Option<f64> = row.get(4)?;
            Ok(json!({
                "courseId": id,
                "code": code,
                "title": title,
                "instructor": instructor,
                "average": my_avg
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(enrollments) => ok(
            &req.id,
            json!({
                "displayName": caller.display_name,
                "enrollments": enrollments
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.admin" => Some(handle_dashboard_admin(state, req)),
        "dashboard.faculty" => Some(handle_dashboard_faculty(state, req)),
        "dashboard.student" => Some(handle_dashboard_student(state, req)),
        _ => None,
    }
}
