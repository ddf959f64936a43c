/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub created_at_ms: i64,
}

pub enum CreateOutcome {
    Created,
    EmailTaken,
}

/// Users keyed by email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;
    async fn create(&self, user: UserRecord) -> Result<CreateOutcome>;
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn create(&self, user: UserRecord) -> Result<CreateOutcome> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Ok(CreateOutcome::EmailTaken);
        }
        users.insert(user.email.clone(), user);
        Ok(CreateOutcome::Created)
    }
}

/// SQLite-backed store; one connection shared behind a mutex and only
/// touched from the blocking pool.
#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).with_context(|| format!("open user db {path:?}"))?;
        apply_pragmas(&conn);
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
              id TEXT PRIMARY KEY,
              name TEXT,
              email TEXT NOT NULL UNIQUE,
              password_hash TEXT NOT NULL,
              created_at_ms INTEGER NOT NULL
            );
            "#,
        )
        .context("init users schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("user db mutex poisoned"))?;
            f(&guard)
        })
        .await
        .context("user db task")?
    }
}

fn apply_pragmas(conn: &Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.busy_timeout(Duration::from_millis(5_000));
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, email, password_hash, created_at_ms FROM users WHERE email = ?1",
                    params![email],
                    |r| {
                        Ok(UserRecord {
                            id: r.get(0)?,
                            name: r.get(1)?,
                            email: r.get(2)?,
                            password_hash: r.get(3)?,
                            created_at_ms: r.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn create(&self, user: UserRecord) -> Result<CreateOutcome> {
        self.with_conn(move |conn| {
            let res = conn.execute(
                "INSERT INTO users(id, name, email, password_hash, created_at_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user.id, user.name, user.email, user.password_hash, user.created_at_ms],
            );
            match res {
                Ok(_) => Ok(CreateOutcome::Created),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Ok(CreateOutcome::EmailTaken)
                }
                Err(e) => Err(e).context("insert user"),
            }
        })
        .await
    }
}
