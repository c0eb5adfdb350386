use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::errors::{AppError, AppResult, PostResult};
use crate::image_processor::ImageBlob;
use crate::security::SessionCredential;
use crate::uploader::{CommitCount, LogSink, OutcomeStore, PostJob};

/// How the GitHub side of an account is linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "github", rename_all = "lowercase")]
pub enum GithubLink {
    None,
    Name { github_name: String },
    #[serde(rename = "oauth")]
    OAuth { github_name: String },
}

impl GithubLink {
    fn kind(&self) -> &'static str {
        match self {
            GithubLink::None => "none",
            GithubLink::Name { .. } => "name",
            GithubLink::OAuth { .. } => "oauth",
        }
    }

    pub fn github_name(&self) -> Option<&str> {
        match self {
            GithubLink::None => None,
            GithubLink::Name { github_name } | GithubLink::OAuth { github_name } => {
                Some(github_name)
            }
        }
    }

    fn from_columns(kind: &str, github_name: Option<String>) -> AppResult<Self> {
        match (kind, github_name) {
            ("none", _) => Ok(GithubLink::None),
            ("name", Some(github_name)) => Ok(GithubLink::Name { github_name }),
            ("oauth", Some(github_name)) => Ok(GithubLink::OAuth { github_name }),
            (other, _) => Err(AppError::Internal(format!(
                "Inconsistent github link state: {}",
                other
            ))),
        }
    }
}

/// Linking state reported for an account. An account without a Bluesky
/// link never reports a GitHub link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub bsky: bool,
    #[serde(flatten)]
    pub github: GithubLink,
}

impl LinkStatus {
    pub fn unlinked() -> Self {
        Self {
            bsky: false,
            github: GithubLink::None,
        }
    }

    pub fn is_postable(&self) -> bool {
        self.bsky && self.github != GithubLink::None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub credential: SessionCredential,
    pub service_endpoint: Option<String>,
    pub bsky_linked: bool,
    pub github: GithubLink,
    pub fail_count: u32,
    pub last_status: Option<String>,
}

impl Account {
    pub fn link_status(&self) -> LinkStatus {
        if self.bsky_linked {
            LinkStatus {
                bsky: true,
                github: self.github.clone(),
            }
        } else {
            LinkStatus::unlinked()
        }
    }

    /// Build today's job for this account, if it is fully linked.
    pub fn post_job(
        &self,
        commit_count: CommitCount,
        image: PostResult<Option<ImageBlob>>,
    ) -> Option<PostJob> {
        if !self.link_status().is_postable() {
            return None;
        }
        let github_name = self.github.github_name()?.to_string();
        Some(PostJob {
            job_id: self.id,
            credential: self.credential.clone(),
            service_endpoint: self.service_endpoint.clone(),
            commit_count,
            github_name,
            failure_count: self.fail_count,
            image,
        })
    }

    fn from_row(row: &SqliteRow) -> AppResult<Self> {
        let github_kind: String = row.try_get("github_link")?;
        let github_name: Option<String> = row.try_get("github_name")?;
        let fail_count: i64 = row.try_get("fail_count")?;

        Ok(Account {
            id: row.try_get("id")?,
            credential: SessionCredential::new(
                row.try_get::<String, _>("did")?,
                row.try_get::<String, _>("app_password")?,
            ),
            service_endpoint: row.try_get("pds")?,
            bsky_linked: row.try_get("bsky_linked")?,
            github: GithubLink::from_columns(&github_kind, github_name)?,
            fail_count: u32::try_from(fail_count.max(0)).unwrap_or(u32::MAX),
            last_status: row.try_get("last_status")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub account_id: i64,
    pub status: String,
    pub fail_count: u32,
}

const ACCOUNT_COLUMNS: &str =
    "id, did, app_password, pds, bsky_linked, github_link, github_name, fail_count, last_status";

/// SQLite-backed account, outcome and diagnostic log store.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        log::info!("Connecting to database: {}", database_url);

        // Every connection to an in-memory database is a separate database,
        // so keep exactly one and never recycle it.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;

        let db = Self { pool };
        db.init_schema().await?;
        log::info!("Database initialized successfully");
        Ok(db)
    }

    async fn init_schema(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                did TEXT NOT NULL UNIQUE,
                app_password TEXT NOT NULL,
                pds TEXT,
                bsky_linked BOOLEAN NOT NULL DEFAULT TRUE,
                github_link TEXT NOT NULL DEFAULT 'none',
                github_name TEXT,
                fail_count INTEGER NOT NULL DEFAULT 0,
                last_status TEXT,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS post_outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                fail_count INTEGER NOT NULL DEFAULT 0,
                recorded_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS diagnostic_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_post_outcomes_account ON post_outcomes(account_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert or update an account keyed by its DID. Returns the account id.
    pub async fn upsert_account(
        &self,
        credential: &SessionCredential,
        service_endpoint: Option<&str>,
        github: &GithubLink,
    ) -> AppResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (did, app_password, pds, bsky_linked, github_link, github_name)
            VALUES (?, ?, ?, TRUE, ?, ?)
            ON CONFLICT(did) DO UPDATE SET
                app_password = excluded.app_password,
                pds = excluded.pds,
                bsky_linked = TRUE,
                github_link = excluded.github_link,
                github_name = excluded.github_name,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
        )
        .bind(&credential.identifier)
        .bind(&credential.secret)
        .bind(service_endpoint)
        .bind(github.kind())
        .bind(github.github_name())
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        log::info!("Stored account {} (ID: {})", credential.identifier, id);
        Ok(id)
    }

    /// Drop the Bluesky link. The GitHub link goes with it.
    pub async fn unlink_account(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE accounts SET bsky_linked = FALSE, github_link = 'none', github_name = NULL, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::account_not_found(id));
        }
        log::info!("Unlinked account {}", id);
        Ok(())
    }

    pub async fn get_account(&self, id: i64) -> AppResult<Account> {
        let row = sqlx::query(&format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::account_not_found(id))?;

        Account::from_row(&row)
    }

    pub async fn link_status(&self, id: i64) -> AppResult<LinkStatus> {
        match self.get_account(id).await {
            Ok(account) => Ok(account.link_status()),
            Err(AppError::AccountNotFound { .. }) => Ok(LinkStatus::unlinked()),
            Err(e) => Err(e),
        }
    }

    /// Accounts with both a Bluesky and a GitHub link.
    pub async fn linked_accounts(&self) -> AppResult<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE bsky_linked = TRUE AND github_link != 'none' ORDER BY id ASC",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Account::from_row).collect()
    }

    pub async fn outcome_history(&self, account_id: i64) -> AppResult<Vec<OutcomeRecord>> {
        let rows = sqlx::query(
            "SELECT account_id, status, fail_count FROM post_outcomes WHERE account_id = ? ORDER BY id ASC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        let mut history = Vec::new();
        for row in rows {
            let fail_count: i64 = row.try_get("fail_count")?;
            history.push(OutcomeRecord {
                account_id: row.try_get("account_id")?,
                status: row.try_get("status")?,
                fail_count: u32::try_from(fail_count.max(0)).unwrap_or(u32::MAX),
            });
        }
        Ok(history)
    }

    pub async fn recent_logs(&self, limit: i64) -> AppResult<Vec<String>> {
        let rows = sqlx::query("SELECT message FROM diagnostic_logs ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("message").map_err(AppError::from))
            .collect()
    }

    /// Update the account's status and append the matching history row in one
    /// transaction, so an unknown account leaves no history behind.
    async fn store_outcome(&self, account_id: i64, status: &str, fail_count: u32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE accounts SET last_status = ?, fail_count = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status)
        .bind(i64::from(fail_count))
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::account_not_found(account_id));
        }

        sqlx::query("INSERT INTO post_outcomes (account_id, status, fail_count) VALUES (?, ?, ?)")
            .bind(account_id)
            .bind(status)
            .bind(i64::from(fail_count))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OutcomeStore for Database {
    async fn record_success(&self, job_id: i64) -> AppResult<()> {
        self.store_outcome(job_id, "success", 0).await
    }

    async fn record_failure(&self, job_id: i64, failure_count: u32) -> AppResult<()> {
        self.store_outcome(job_id, "failed", failure_count).await
    }
}

#[async_trait]
impl LogSink for Database {
    async fn write(&self, message: &str) -> AppResult<()> {
        sqlx::query("INSERT INTO diagnostic_logs (message) VALUES (?)")
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
