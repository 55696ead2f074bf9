use crate::auth::{self, CurrentUser, Role};
use crate::ipc::error::err;
use crate::ipc::types::Request;
use rusqlite::Connection;

/// Resolve `params.token` to the calling user. The `Err` side carries the
/// complete error response so handlers can return it directly.
pub fn require_user(conn: &Connection, req: &Request) -> Result<CurrentUser, serde_json::Value> {
    let Some(token) = param_str(req, "token") else {
        return Err(err(&req.id, "bad_params", "missing token", None));
    };
    match auth::session_user(conn, token) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(err(
            &req.id,
            "unauthorized",
            "invalid or expired session",
            None,
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

/// Role check happens before any data is read or written.
pub fn require_role(
    conn: &Connection,
    req: &Request,
    role: Role,
) -> Result<CurrentUser, serde_json::Value> {
    let user = require_user(conn, req)?;
    if user.role != role {
        return Err(err(
            &req.id,
            "forbidden",
            format!("{} role required", role.as_str()),
            None,
        ));
    }
    Ok(user)
}

pub fn param_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339()
}
