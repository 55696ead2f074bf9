use crate::auth::Role;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_ts, param_str, require_role, require_user};
use crate::ipc::types::{AppState, Request};
use crate::palette;
use serde_json::json;
use uuid::Uuid;

const AUDIENCES: [&str; 3] = ["all", "faculty", "student"];

fn handle_notices_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match require_role(conn, req, Role::Admin) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let title = match param_str(req, "title") {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing title", None),
    };
    if title.is_empty() {
        return err(&req.id, "bad_params", "title must not be empty", None);
    }
    let body = param_str(req, "body").unwrap_or("").to_string();
    let audience = param_str(req, "audience").unwrap_or("all");
    if !AUDIENCES.contains(&audience) {
        return err(
            &req.id,
            "bad_params",
            format!("unknown audience: {}", audience),
            None,
        );
    }

    let notice_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO notices(id, title, body, audience, created_by, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&notice_id, &title, &body, audience, &caller.id, now_ts()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "notices" })),
        );
    }

    ok(
        &req.id,
        json!({
            "noticeId": notice_id,
            "colorToken": palette::token_for(&notice_id)
        }),
    )
}

fn handle_notices_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(resp) = require_role(conn, req, Role::Admin) {
        return resp;
    }

    let Some(notice_id) = param_str(req, "noticeId") else {
        return err(&req.id, "bad_params", "missing noticeId", None);
    };

    match conn.execute("DELETE FROM notices WHERE id = ?", [notice_id]) {
        Ok(0) => err(&req.id, "not_found", "notice not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_notices_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match require_user(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    // Admins see everything; other roles see "all" plus their own audience.
    let sql = match caller.role {
        Role::Admin => {
            "SELECT n.id, n.title, n.body, n.audience, u.display_name, n.created_at
             FROM notices n
             JOIN users u ON u.id = n.created_by
             ORDER BY n.created_at DESC"
        }
        Role::Faculty => {
            "SELECT n.id, n.title, n.body, n.audience, u.display_name, n.created_at
             FROM notices n
             JOIN users u ON u.id = n.created_by
             WHERE n.audience IN ('all', 'faculty')
             ORDER BY n.created_at DESC"
        }
        Role::Student => {
            "SELECT n.id, n.title, n.body, n.audience, u.display_name, n.created_at
             FROM notices n
             JOIN users u ON u.id = n.created_by
             WHERE n.audience IN ('all', 'student')
             ORDER BY n.created_at DESC"
        }
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let body: String = row.get(2)?;
            let audience: String = row.get(3)?;
            let author: String = row.get(4)?;
            let created_at: String = row.get(5)?;
            // Card color derives from the record id, so it never changes
            // for a given notice no matter which process renders it.
            let color = palette::token_for(&id);
            Ok(json!({
                "noticeId": id,
                "title": title,
                "body": body,
                "audience": audience,
                "author": author,
                "createdAt": created_at,
                "colorToken": color
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(notices) => ok(&req.id, json!({ "notices": notices })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notices.create" => Some(handle_notices_create(state, req)),
        "notices.delete" => Some(handle_notices_delete(state, req)),
        "notices.list" => Some(handle_notices_list(state, req)),
        _ => None,
    }
}
