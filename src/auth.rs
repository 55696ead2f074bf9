use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const SESSION_TTL_HOURS: i64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Faculty,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "faculty" => Some(Role::Faculty),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Faculty => "faculty",
            Role::Student => "student",
        }
    }

    /// Landing route the client redirects to after login.
    pub fn landing(self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::Faculty => "/faculty",
            Role::Student => "/student",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_login(
    conn: &Connection,
    username: &str,
    password: &str,
) -> anyhow::Result<Option<CurrentUser>> {
    let row: Option<(String, String, String, String, String)> = conn
        .query_row(
            "SELECT id, display_name, role, password_hash, password_salt
             FROM users WHERE username = ?",
            [username],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, display_name, role, password_hash, password_salt)) = row else {
        return Ok(None);
    };
    if hash_password(&password_salt, password) != password_hash {
        return Ok(None);
    }
    let Some(role) = Role::parse(&role) else {
        anyhow::bail!("user {} has unknown role {}", id, role);
    };
    Ok(Some(CurrentUser {
        id,
        username: username.to_string(),
        display_name,
        role,
    }))
}

/// Issue a fresh session token. Returns (token, expiresAt as RFC 3339).
pub fn create_session(conn: &Connection, user_id: &str) -> anyhow::Result<(String, String)> {
    let token = Uuid::new_v4().to_string();
    let now = Utc::now();
    let expires = now + Duration::hours(SESSION_TTL_HOURS);
    conn.execute(
        "INSERT INTO sessions(token, user_id, created_at, expires_at) VALUES(?, ?, ?, ?)",
        (&token, user_id, now.to_rfc3339(), expires.to_rfc3339()),
    )?;
    Ok((token, expires.to_rfc3339()))
}

/// Idempotent: deleting an unknown token is not an error.
pub fn delete_session(conn: &Connection, token: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?", [token])?;
    Ok(())
}

/// Resolve a session token to its user, dropping the row if it has expired.
pub fn session_user(conn: &Connection, token: &str) -> anyhow::Result<Option<CurrentUser>> {
    let row: Option<(String, String, String, String, String)> = conn
        .query_row(
            "SELECT u.id, u.username, u.display_name, u.role, s.expires_at
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token = ?",
            [token],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, username, display_name, role, expires_at)) = row else {
        return Ok(None);
    };

    let expired = match DateTime::parse_from_rfc3339(&expires_at) {
        Ok(t) => t.with_timezone(&Utc) <= Utc::now(),
        // Unparseable expiry means a corrupt row; treat as expired.
        Err(_) => true,
    };
    if expired {
        conn.execute("DELETE FROM sessions WHERE token = ?", [token])?;
        return Ok(None);
    }

    let Some(role) = Role::parse(&role) else {
        anyhow::bail!("user {} has unknown role {}", id, role);
    };
    Ok(Some(CurrentUser {
        id,
        username,
        display_name,
        role,
    }))
}
