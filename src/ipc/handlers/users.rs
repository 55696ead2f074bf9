use crate::auth::{self, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_ts, param_str, require_role};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(resp) = require_role(conn, req, Role::Admin) {
        return resp;
    }

    let mut stmt = match conn.prepare(
        "SELECT id, username, display_name, role, created_at
         FROM users
         ORDER BY role, username",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let username: String = row.get(1)?;
            let display_name: String = row.get(2)?;
            let role: String = row.get(3)?;
            let created_at: String = row.get(4)?;
            Ok(json!({
                "userId": id,
                "username": username,
                "displayName": display_name,
                "role": role,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(users) => ok(&req.id, json!({ "users": users })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let user_count: i64 = match conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0)) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let Some(role_str) = param_str(req, "role") else {
        return err(&req.id, "bad_params", "missing role", None);
    };
    let Some(role) = Role::parse(role_str) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown role: {}", role_str),
            None,
        );
    };

    // Bootstrap: an empty workspace accepts its first user without a
    // session, and that user must be the admin who sets everything else up.
    if user_count == 0 {
        if role != Role::Admin {
            return err(&req.id, "bad_params", "first user must be an admin", None);
        }
    } else if let Err(resp) = require_role(conn, req, Role::Admin) {
        return resp;
    }

    let username = match param_str(req, "username") {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing username", None),
    };
    if username.is_empty() {
        return err(&req.id, "bad_params", "username must not be empty", None);
    }
    let display_name = match param_str(req, "displayName") {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing displayName", None),
    };
    let Some(password) = param_str(req, "password") else {
        return err(&req.id, "bad_params", "missing password", None);
    };
    if password.is_empty() {
        return err(&req.id, "bad_params", "password must not be empty", None);
    }

    let taken: Option<i64> = match conn
        .query_row("SELECT 1 FROM users WHERE username = ?", [&username], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if taken.is_some() {
        return err(
            &req.id,
            "conflict",
            format!("username already exists: {}", username),
            None,
        );
    }

    let user_id = Uuid::new_v4().to_string();
    let salt = Uuid::new_v4().to_string();
    let password_hash = auth::hash_password(&salt, password);
    if let Err(e) = conn.execute(
        "INSERT INTO users(id, username, display_name, role, password_hash, password_salt, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &user_id,
            &username,
            &display_name,
            role.as_str(),
            &password_hash,
            &salt,
            now_ts(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }

    ok(
        &req.id,
        json!({
            "userId": user_id,
            "username": username,
            "role": role.as_str()
        }),
    )
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match require_role(conn, req, Role::Admin) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let Some(user_id) = param_str(req, "userId") else {
        return err(&req.id, "bad_params", "missing userId", None);
    };
    if user_id == caller.id {
        return err(&req.id, "conflict", "cannot delete the calling admin", None);
    }

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "user not found", None);
    }

    let teaches: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM courses WHERE faculty_id = ?",
        [user_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if teaches > 0 {
        return err(
            &req.id,
            "conflict",
            "user still teaches courses; reassign or delete them first",
            Some(json!({ "courseCount": teaches })),
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Delete in dependency order (no ON DELETE CASCADE).
    if let Err(e) = tx.execute("DELETE FROM grades WHERE student_id = ?", [user_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM enrollments WHERE student_id = ?", [user_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "enrollments" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM notices WHERE created_by = ?", [user_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "notices" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM sessions WHERE user_id = ?", [user_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "sessions" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM users WHERE id = ?", [user_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(handle_users_list(state, req)),
        "users.create" => Some(handle_users_create(state, req)),
        "users.delete" => Some(handle_users_delete(state, req)),
        _ => None,
    }
}
