use crate::auth;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{param_str, require_user};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(username) = param_str(req, "username") else {
        return err(&req.id, "bad_params", "missing username", None);
    };
    let Some(password) = param_str(req, "password") else {
        return err(&req.id, "bad_params", "missing password", None);
    };

    let user = match auth::verify_login(conn, username, password) {
        Ok(Some(u)) => u,
        // One code for unknown user and wrong password; don't leak which.
        Ok(None) => return err(&req.id, "unauthorized", "invalid credentials", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let (token, expires_at) = match auth::create_session(conn, &user.id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "token": token,
            "expiresAt": expires_at,
            "userId": user.id,
            "displayName": user.display_name,
            "role": user.role.as_str(),
            "landing": user.role.landing()
        }),
    )
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(token) = param_str(req, "token") else {
        return err(&req.id, "bad_params", "missing token", None);
    };
    match auth::delete_session(conn, token) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_whoami(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let user = match require_user(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    ok(
        &req.id,
        json!({
            "userId": user.id,
            "username": user.username,
            "displayName": user.display_name,
            "role": user.role.as_str()
        }),
    )
}

fn handle_landing(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let user = match require_user(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    ok(
        &req.id,
        json!({
            "role": user.role.as_str(),
            "landing": user.role.landing()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.whoami" => Some(handle_whoami(state, req)),
        "auth.landing" => Some(handle_landing(state, req)),
        _ => None,
    }
}
