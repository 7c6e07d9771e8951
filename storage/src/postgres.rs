use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ojs_core::error::{StoreError, StoreResult};
use ojs_core::traits::{
    CommentStore, DocumentStore, IssueStore, JournalRegistry, MappingStore, ReviewStore,
    SubmissionStore, SyncLogStore, UserDirectory,
};
use ojs_core::types::{
    AuthorContribution, Comment, Document, DocumentVersion, Issue, JournalTenant, MappingStatus,
    NewComment, NewDocumentVersion, NewIssue, NewJournalTenant, NewMapping, NewReview,
    NewSubmission, NewUser, OjsMapping, Review, Submission, SyncRun, UserAccount, UserProfile,
    normalize_email,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;

/// PostgreSQL-backed implementation of every store trait.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(connection_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(connection_url).await.map_err(map_sqlx)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn initialize_schema(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS journals (
                id BIGSERIAL PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                base_url TEXT NOT NULL,
                api_key TEXT NOT NULL,
                remote_journal_id BIGINT NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                sync_direction TEXT NOT NULL DEFAULT 'from_remote',
                sync_interval_hours INT NOT NULL DEFAULT 24,
                last_synced_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL,
                -- NULL means the account was created by an import and
                -- carries no usable login credential
                password_hash TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS profiles (
                user_id BIGINT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                given_name TEXT NOT NULL DEFAULT '',
                family_name TEXT NOT NULL DEFAULT '',
                affiliation TEXT,
                orcid TEXT,
                country TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS submissions (
                id BIGSERIAL PRIMARY KEY,
                journal_id BIGINT NOT NULL REFERENCES journals(id),
                title TEXT NOT NULL,
                abstract_text TEXT,
                section TEXT,
                keywords JSONB NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'queued',
                submitted_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS submission_authors (
                submission_id BIGINT NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
                user_id BIGINT NOT NULL REFERENCES users(id),
                seq INT NOT NULL DEFAULT 0,
                role TEXT NOT NULL DEFAULT 'author',
                primary_contact BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (submission_id, user_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id BIGSERIAL PRIMARY KEY,
                submission_id BIGINT NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
                label TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (submission_id, label)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS document_versions (
                id BIGSERIAL PRIMARY KEY,
                document_id BIGINT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                file_name TEXT NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'application/octet-stream',
                size_bytes BIGINT NOT NULL DEFAULT 0,
                sha256 TEXT NOT NULL,
                content BYTEA NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (document_id, file_name, sha256)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ojs_mappings (
                id BIGSERIAL PRIMARY KEY,
                journal_id BIGINT NOT NULL REFERENCES journals(id),
                submission_id BIGINT NOT NULL UNIQUE REFERENCES submissions(id) ON DELETE CASCADE,
                remote_submission_id BIGINT NOT NULL,
                direction TEXT NOT NULL DEFAULT 'from_remote',
                status TEXT NOT NULL DEFAULT 'pending',
                local_version TEXT,
                remote_version TEXT,
                last_error TEXT,
                metadata JSONB NOT NULL DEFAULT '{}',
                last_synced_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (journal_id, remote_submission_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_logs (
                id UUID PRIMARY KEY,
                journal_id BIGINT NOT NULL REFERENCES journals(id),
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                processed INT NOT NULL DEFAULT 0,
                created INT NOT NULL DEFAULT 0,
                updated INT NOT NULL DEFAULT 0,
                failed INT NOT NULL DEFAULT 0,
                conflicts INT NOT NULL DEFAULT 0,
                pushed INT NOT NULL DEFAULT 0,
                error_details JSONB NOT NULL DEFAULT '[]',
                triggered_by TEXT NOT NULL DEFAULT 'cli'
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sync_logs_journal_kind_started
             ON sync_logs(journal_id, kind, started_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS issues (
                id BIGSERIAL PRIMARY KEY,
                journal_id BIGINT NOT NULL REFERENCES journals(id),
                remote_issue_id BIGINT NOT NULL,
                volume INT,
                number TEXT,
                year INT,
                title TEXT,
                published BOOLEAN NOT NULL DEFAULT FALSE,
                published_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (journal_id, remote_issue_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS reviews (
                id BIGSERIAL PRIMARY KEY,
                submission_id BIGINT NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
                reviewer_id BIGINT NOT NULL REFERENCES users(id),
                remote_review_id BIGINT NOT NULL,
                round INT NOT NULL DEFAULT 1,
                recommendation TEXT,
                assigned_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (submission_id, remote_review_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS comments (
                id BIGSERIAL PRIMARY KEY,
                submission_id BIGINT NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
                author_id BIGINT REFERENCES users(id),
                remote_comment_id BIGINT NOT NULL,
                title TEXT,
                body TEXT NOT NULL,
                posted_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (submission_id, remote_comment_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        info!("Database schema initialized");
        Ok(())
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            // Unique, foreign key and check violations
            if code == "23505" || code == "23503" || code == "23514" {
                return StoreError::Constraint(db.message().to_string());
            }
        }
    }
    StoreError::backend(err)
}

fn journal_from_row(row: &PgRow) -> StoreResult<JournalTenant> {
    let direction: String = row.get("sync_direction");
    Ok(JournalTenant {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        base_url: row.get("base_url"),
        api_key: row.get("api_key"),
        remote_journal_id: row.get("remote_journal_id"),
        enabled: row.get("enabled"),
        active: row.get("is_active"),
        sync_direction: direction
            .parse()
            .map_err(|_| StoreError::Backend(format!("invalid sync direction: {}", direction)))?,
        sync_interval_hours: row.get("sync_interval_hours"),
        last_synced_at: row.get("last_synced_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn mapping_from_row(row: &PgRow) -> StoreResult<OjsMapping> {
    let direction: String = row.get("direction");
    let status: String = row.get("status");
    Ok(OjsMapping {
        id: row.get("id"),
        journal_id: row.get("journal_id"),
        submission_id: row.get("submission_id"),
        remote_submission_id: row.get("remote_submission_id"),
        direction: direction
            .parse()
            .map_err(|_| StoreError::Backend(format!("invalid sync direction: {}", direction)))?,
        status: status
            .parse()
            .map_err(|_| StoreError::Backend(format!("invalid mapping status: {}", status)))?,
        local_version: row.get("local_version"),
        remote_version: row.get("remote_version"),
        last_error: row.get("last_error"),
        metadata: row.get("metadata"),
        last_synced_at: row.get("last_synced_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn user_from_row(row: &PgRow) -> StoreResult<UserAccount> {
    Ok(UserAccount {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn submission_from_row(row: &PgRow) -> StoreResult<Submission> {
    let status: String = row.get("status");
    Ok(Submission {
        id: row.get("id"),
        journal_id: row.get("journal_id"),
        title: row.get("title"),
        abstract_text: row.get("abstract_text"),
        section: row.get("section"),
        keywords: serde_json::from_value(row.get("keywords"))?,
        status: status
            .parse()
            .map_err(|_| StoreError::Backend(format!("invalid submission status: {}", status)))?,
        submitted_at: row.get("submitted_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn version_from_row(row: &PgRow) -> DocumentVersion {
    DocumentVersion {
        id: row.get("id"),
        document_id: row.get("document_id"),
        file_name: row.get("file_name"),
        content_type: row.get("content_type"),
        size_bytes: row.get("size_bytes"),
        sha256: row.get("sha256"),
        created_at: row.get("created_at"),
    }
}

fn run_from_row(row: &PgRow) -> StoreResult<SyncRun> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    Ok(SyncRun {
        id: row.get("id"),
        journal_id: row.get("journal_id"),
        kind: kind
            .parse()
            .map_err(|_| StoreError::Backend(format!("invalid sync kind: {}", kind)))?,
        status: status
            .parse()
            .map_err(|_| StoreError::Backend(format!("invalid run status: {}", status)))?,
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        processed: row.get::<i32, _>("processed") as u32,
        created: row.get::<i32, _>("created") as u32,
        updated: row.get::<i32, _>("updated") as u32,
        failed: row.get::<i32, _>("failed") as u32,
        conflicts: row.get::<i32, _>("conflicts") as u32,
        pushed: row.get::<i32, _>("pushed") as u32,
        error_details: serde_json::from_value(row.get("error_details"))?,
        triggered_by: row.get("triggered_by"),
    })
}

fn issue_from_row(row: &PgRow) -> Issue {
    Issue {
        id: row.get("id"),
        journal_id: row.get("journal_id"),
        remote_issue_id: row.get("remote_issue_id"),
        volume: row.get("volume"),
        number: row.get("number"),
        year: row.get("year"),
        title: row.get("title"),
        published: row.get("published"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn review_from_row(row: &PgRow) -> StoreResult<Review> {
    let recommendation: Option<String> = row.get("recommendation");
    Ok(Review {
        id: row.get("id"),
        submission_id: row.get("submission_id"),
        reviewer_id: row.get("reviewer_id"),
        remote_review_id: row.get("remote_review_id"),
        round: row.get("round"),
        recommendation: recommendation
            .map(|r| {
                r.parse()
                    .map_err(|_| StoreError::Backend(format!("invalid recommendation: {}", r)))
            })
            .transpose()?,
        assigned_at: row.get("assigned_at"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        submission_id: row.get("submission_id"),
        author_id: row.get("author_id"),
        remote_comment_id: row.get("remote_comment_id"),
        title: row.get("title"),
        body: row.get("body"),
        posted_at: row.get("posted_at"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl JournalRegistry for PgStore {
    async fn register_journal(&self, new: NewJournalTenant) -> StoreResult<JournalTenant> {
        let row = sqlx::query(
            "INSERT INTO journals (code, name, base_url, api_key, remote_journal_id,
                                   sync_direction, sync_interval_hours)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, code, name, base_url, api_key, remote_journal_id, enabled, is_active,
                       sync_direction, sync_interval_hours, last_synced_at, created_at, updated_at",
        )
        .bind(&new.code)
        .bind(&new.name)
        .bind(&new.base_url)
        .bind(&new.api_key)
        .bind(new.remote_journal_id)
        .bind(new.sync_direction.to_string())
        .bind(new.sync_interval_hours)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        journal_from_row(&row)
    }

    async fn journal_by_id(&self, id: i64) -> StoreResult<Option<JournalTenant>> {
        let row = sqlx::query(
            "SELECT id, code, name, base_url, api_key, remote_journal_id, enabled, is_active,
                    sync_direction, sync_interval_hours, last_synced_at, created_at, updated_at
             FROM journals WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| journal_from_row(&r)).transpose()
    }

    async fn journal_by_code(&self, code: &str) -> StoreResult<Option<JournalTenant>> {
        let row = sqlx::query(
            "SELECT id, code, name, base_url, api_key, remote_journal_id, enabled, is_active,
                    sync_direction, sync_interval_hours, last_synced_at, created_at, updated_at
             FROM journals WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| journal_from_row(&r)).transpose()
    }

    async fn all_journals(&self) -> StoreResult<Vec<JournalTenant>> {
        let rows = sqlx::query(
            "SELECT id, code, name, base_url, api_key, remote_journal_id, enabled, is_active,
                    sync_direction, sync_interval_hours, last_synced_at, created_at, updated_at
             FROM journals ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(journal_from_row).collect()
    }

    async fn enabled_journals(&self) -> StoreResult<Vec<JournalTenant>> {
        let rows = sqlx::query(
            "SELECT id, code, name, base_url, api_key, remote_journal_id, enabled, is_active,
                    sync_direction, sync_interval_hours, last_synced_at, created_at, updated_at
             FROM journals WHERE enabled AND is_active ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(journal_from_row).collect()
    }

    async fn set_journal_enabled(&self, id: i64, enabled: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE journals SET enabled = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("journal", id));
        }
        Ok(())
    }

    async fn set_journal_active(&self, id: i64, active: bool) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE journals SET is_active = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(active)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("journal", id));
        }
        Ok(())
    }

    async fn mark_journal_synced(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        // GREATEST keeps the cursor monotonic under out-of-order writes
        let result = sqlx::query(
            "UPDATE journals
             SET last_synced_at = GREATEST(COALESCE(last_synced_at, to_timestamp(0)), $2),
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("journal", id));
        }
        Ok(())
    }
}

#[async_trait]
impl MappingStore for PgStore {
    async fn insert_mapping(&self, new: NewMapping) -> StoreResult<OjsMapping> {
        let row = sqlx::query(
            "INSERT INTO ojs_mappings (journal_id, submission_id, remote_submission_id, direction,
                                       status, local_version, remote_version, last_error, metadata,
                                       last_synced_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING id, journal_id, submission_id, remote_submission_id, direction, status,
                       local_version, remote_version, last_error, metadata, last_synced_at,
                       created_at, updated_at",
        )
        .bind(new.journal_id)
        .bind(new.submission_id)
        .bind(new.remote_submission_id)
        .bind(new.direction.to_string())
        .bind(new.status.to_string())
        .bind(&new.local_version)
        .bind(&new.remote_version)
        .bind(&new.last_error)
        .bind(&new.metadata)
        .bind(new.last_synced_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        mapping_from_row(&row)
    }

    async fn save_mapping(&self, mapping: &OjsMapping) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE ojs_mappings
             SET status = $2, local_version = $3, remote_version = $4, last_error = $5,
                 metadata = $6, last_synced_at = $7, updated_at = $8
             WHERE id = $1",
        )
        .bind(mapping.id)
        .bind(mapping.status.to_string())
        .bind(&mapping.local_version)
        .bind(&mapping.remote_version)
        .bind(&mapping.last_error)
        .bind(&mapping.metadata)
        .bind(mapping.last_synced_at)
        .bind(mapping.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("mapping", mapping.id));
        }
        Ok(())
    }

    async fn mapping_for_remote(
        &self,
        journal_id: i64,
        remote_submission_id: i64,
    ) -> StoreResult<Option<OjsMapping>> {
        let row = sqlx::query(
            "SELECT id, journal_id, submission_id, remote_submission_id, direction, status,
                    local_version, remote_version, last_error, metadata, last_synced_at,
                    created_at, updated_at
             FROM ojs_mappings WHERE journal_id = $1 AND remote_submission_id = $2",
        )
        .bind(journal_id)
        .bind(remote_submission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| mapping_from_row(&r)).transpose()
    }

    async fn mapping_for_submission(&self, submission_id: i64) -> StoreResult<Option<OjsMapping>> {
        let row = sqlx::query(
            "SELECT id, journal_id, submission_id, remote_submission_id, direction, status,
                    local_version, remote_version, last_error, metadata, last_synced_at,
                    created_at, updated_at
             FROM ojs_mappings WHERE submission_id = $1",
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| mapping_from_row(&r)).transpose()
    }

    async fn mappings_for_journal(&self, journal_id: i64) -> StoreResult<Vec<OjsMapping>> {
        let rows = sqlx::query(
            "SELECT id, journal_id, submission_id, remote_submission_id, direction, status,
                    local_version, remote_version, last_error, metadata, last_synced_at,
                    created_at, updated_at
             FROM ojs_mappings WHERE journal_id = $1 ORDER BY id",
        )
        .bind(journal_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(mapping_from_row).collect()
    }

    async fn mappings_with_status(
        &self,
        journal_id: i64,
        status: MappingStatus,
    ) -> StoreResult<Vec<OjsMapping>> {
        let rows = sqlx::query(
            "SELECT id, journal_id, submission_id, remote_submission_id, direction, status,
                    local_version, remote_version, last_error, metadata, last_synced_at,
                    created_at, updated_at
             FROM ojs_mappings WHERE journal_id = $1 AND status = $2 ORDER BY id",
        )
        .bind(journal_id)
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(mapping_from_row).collect()
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_or_create_user(&self, new: &NewUser) -> StoreResult<(UserAccount, bool)> {
        let email = normalize_email(&new.email);

        // ON CONFLICT DO NOTHING + RETURNING yields a row only when this
        // call actually inserted
        let inserted = sqlx::query(
            "INSERT INTO users (email, username)
             VALUES ($1, $2)
             ON CONFLICT (email) DO NOTHING
             RETURNING id, email, username, created_at, updated_at",
        )
        .bind(&email)
        .bind(&new.username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if let Some(row) = inserted {
            return Ok((user_from_row(&row)?, true));
        }

        let row = sqlx::query(
            "SELECT id, email, username, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| StoreError::not_found("user", &email))?;

        Ok((user_from_row(&row)?, false))
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<UserAccount>> {
        let row = sqlx::query(
            "SELECT id, email, username, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| user_from_row(&r)).transpose()
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<UserAccount>> {
        let row = sqlx::query(
            "SELECT id, email, username, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| user_from_row(&r)).transpose()
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO profiles (user_id, given_name, family_name, affiliation, orcid, country, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (user_id) DO UPDATE
             SET given_name = EXCLUDED.given_name,
                 family_name = EXCLUDED.family_name,
                 affiliation = EXCLUDED.affiliation,
                 orcid = EXCLUDED.orcid,
                 country = EXCLUDED.country,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(profile.user_id)
        .bind(&profile.given_name)
        .bind(&profile.family_name)
        .bind(&profile.affiliation)
        .bind(&profile.orcid)
        .bind(&profile.country)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn profile_for_user(&self, user_id: i64) -> StoreResult<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT user_id, given_name, family_name, affiliation, orcid, country, updated_at
             FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(row.map(|r| UserProfile {
            user_id: r.get("user_id"),
            given_name: r.get("given_name"),
            family_name: r.get("family_name"),
            affiliation: r.get("affiliation"),
            orcid: r.get("orcid"),
            country: r.get("country"),
            updated_at: r.get("updated_at"),
        }))
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn insert_submission(&self, new: NewSubmission) -> StoreResult<Submission> {
        let row = sqlx::query(
            "INSERT INTO submissions (journal_id, title, abstract_text, section, keywords, status, submitted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, journal_id, title, abstract_text, section, keywords, status,
                       submitted_at, created_at, updated_at",
        )
        .bind(new.journal_id)
        .bind(&new.title)
        .bind(&new.abstract_text)
        .bind(&new.section)
        .bind(serde_json::to_value(&new.keywords)?)
        .bind(new.status.to_string())
        .bind(new.submitted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        submission_from_row(&row)
    }

    async fn update_submission(&self, submission: &Submission) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE submissions
             SET title = $2, abstract_text = $3, section = $4, keywords = $5, status = $6,
                 submitted_at = $7, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(submission.id)
        .bind(&submission.title)
        .bind(&submission.abstract_text)
        .bind(&submission.section)
        .bind(serde_json::to_value(&submission.keywords)?)
        .bind(submission.status.to_string())
        .bind(submission.submitted_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("submission", submission.id));
        }
        Ok(())
    }

    async fn submission_by_id(&self, id: i64) -> StoreResult<Option<Submission>> {
        let row = sqlx::query(
            "SELECT id, journal_id, title, abstract_text, section, keywords, status,
                    submitted_at, created_at, updated_at
             FROM submissions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| submission_from_row(&r)).transpose()
    }

    async fn submissions_for_journal(&self, journal_id: i64) -> StoreResult<Vec<Submission>> {
        let rows = sqlx::query(
            "SELECT id, journal_id, title, abstract_text, section, keywords, status,
                    submitted_at, created_at, updated_at
             FROM submissions WHERE journal_id = $1 ORDER BY id",
        )
        .bind(journal_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(submission_from_row).collect()
    }

    async fn replace_contributions(
        &self,
        submission_id: i64,
        contributions: &[AuthorContribution],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query("DELETE FROM submission_authors WHERE submission_id = $1")
            .bind(submission_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        for contribution in contributions {
            sqlx::query(
                "INSERT INTO submission_authors (submission_id, user_id, seq, role, primary_contact)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(submission_id)
            .bind(contribution.user_id)
            .bind(contribution.seq)
            .bind(&contribution.role)
            .bind(contribution.primary_contact)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn contributions_for_submission(
        &self,
        submission_id: i64,
    ) -> StoreResult<Vec<AuthorContribution>> {
        let rows = sqlx::query(
            "SELECT submission_id, user_id, seq, role, primary_contact
             FROM submission_authors WHERE submission_id = $1 ORDER BY seq",
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .iter()
            .map(|r| AuthorContribution {
                submission_id: r.get("submission_id"),
                user_id: r.get("user_id"),
                seq: r.get("seq"),
                role: r.get("role"),
                primary_contact: r.get("primary_contact"),
            })
            .collect())
    }

    async fn delete_submission(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM submissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("submission", id));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find_or_create_document(
        &self,
        submission_id: i64,
        label: &str,
    ) -> StoreResult<Document> {
        let inserted = sqlx::query(
            "INSERT INTO documents (submission_id, label)
             VALUES ($1, $2)
             ON CONFLICT (submission_id, label) DO NOTHING
             RETURNING id, submission_id, label, created_at",
        )
        .bind(submission_id)
        .bind(label)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let row = match inserted {
            Some(row) => row,
            None => sqlx::query(
                "SELECT id, submission_id, label, created_at
                 FROM documents WHERE submission_id = $1 AND label = $2",
            )
            .bind(submission_id)
            .bind(label)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?,
        };

        Ok(Document {
            id: row.get("id"),
            submission_id: row.get("submission_id"),
            label: row.get("label"),
            created_at: row.get("created_at"),
        })
    }

    async fn attach_version(
        &self,
        new: NewDocumentVersion,
    ) -> StoreResult<(DocumentVersion, bool)> {
        let inserted = sqlx::query(
            "INSERT INTO document_versions (document_id, file_name, content_type, size_bytes, sha256, content)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (document_id, file_name, sha256) DO NOTHING
             RETURNING id, document_id, file_name, content_type, size_bytes, sha256, created_at",
        )
        .bind(new.document_id)
        .bind(&new.file_name)
        .bind(&new.content_type)
        .bind(new.content.len() as i64)
        .bind(&new.sha256)
        .bind(&new.content)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if let Some(row) = inserted {
            return Ok((version_from_row(&row), true));
        }

        let row = sqlx::query(
            "SELECT id, document_id, file_name, content_type, size_bytes, sha256, created_at
             FROM document_versions
             WHERE document_id = $1 AND file_name = $2 AND sha256 = $3",
        )
        .bind(new.document_id)
        .bind(&new.file_name)
        .bind(&new.sha256)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok((version_from_row(&row), false))
    }

    async fn documents_for_submission(&self, submission_id: i64) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, submission_id, label, created_at
             FROM documents WHERE submission_id = $1 ORDER BY id",
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .iter()
            .map(|r| Document {
                id: r.get("id"),
                submission_id: r.get("submission_id"),
                label: r.get("label"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    async fn versions_for_document(&self, document_id: i64) -> StoreResult<Vec<DocumentVersion>> {
        let rows = sqlx::query(
            "SELECT id, document_id, file_name, content_type, size_bytes, sha256, created_at
             FROM document_versions WHERE document_id = $1 ORDER BY id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.iter().map(version_from_row).collect())
    }

    async fn version_content(&self, version_id: i64) -> StoreResult<Vec<u8>> {
        let row = sqlx::query("SELECT content FROM document_versions WHERE id = $1")
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| StoreError::not_found("document version", version_id))?;

        Ok(row.get("content"))
    }
}

#[async_trait]
impl SyncLogStore for PgStore {
    async fn open_run(&self, run: &SyncRun) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO sync_logs (id, journal_id, kind, status, started_at, completed_at,
                                    processed, created, updated, failed, conflicts, pushed,
                                    error_details, triggered_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(run.id)
        .bind(run.journal_id)
        .bind(run.kind.to_string())
        .bind(run.status.to_string())
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.processed as i32)
        .bind(run.created as i32)
        .bind(run.updated as i32)
        .bind(run.failed as i32)
        .bind(run.conflicts as i32)
        .bind(run.pushed as i32)
        .bind(serde_json::to_value(&run.error_details)?)
        .bind(&run.triggered_by)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn update_run(&self, run: &SyncRun) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE sync_logs
             SET status = $2, completed_at = $3, processed = $4, created = $5, updated = $6,
                 failed = $7, conflicts = $8, pushed = $9, error_details = $10
             WHERE id = $1",
        )
        .bind(run.id)
        .bind(run.status.to_string())
        .bind(run.completed_at)
        .bind(run.processed as i32)
        .bind(run.created as i32)
        .bind(run.updated as i32)
        .bind(run.failed as i32)
        .bind(run.conflicts as i32)
        .bind(run.pushed as i32)
        .bind(serde_json::to_value(&run.error_details)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("sync run", run.id));
        }
        Ok(())
    }

    async fn recent_runs(&self, journal_id: Option<i64>, limit: i64) -> StoreResult<Vec<SyncRun>> {
        let rows = match journal_id {
            Some(journal_id) => {
                sqlx::query(
                    "SELECT id, journal_id, kind, status, started_at, completed_at, processed,
                            created, updated, failed, conflicts, pushed, error_details, triggered_by
                     FROM sync_logs WHERE journal_id = $1
                     ORDER BY started_at DESC LIMIT $2",
                )
                .bind(journal_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, journal_id, kind, status, started_at, completed_at, processed,
                            created, updated, failed, conflicts, pushed, error_details, triggered_by
                     FROM sync_logs
                     ORDER BY started_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx)?;

        rows.iter().map(run_from_row).collect()
    }

    async fn purge_runs_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sync_logs WHERE started_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl IssueStore for PgStore {
    async fn upsert_issue(&self, new: NewIssue) -> StoreResult<(Issue, bool)> {
        let existing =
            sqlx::query("SELECT id FROM issues WHERE journal_id = $1 AND remote_issue_id = $2")
                .bind(new.journal_id)
                .bind(new.remote_issue_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        if let Some(row) = existing {
            let id: i64 = row.get("id");
            let row = sqlx::query(
                "UPDATE issues
                 SET volume = $2, number = $3, year = $4, title = $5, published = $6,
                     published_at = $7, updated_at = NOW()
                 WHERE id = $1
                 RETURNING id, journal_id, remote_issue_id, volume, number, year, title,
                           published, published_at, created_at, updated_at",
            )
            .bind(id)
            .bind(new.volume)
            .bind(&new.number)
            .bind(new.year)
            .bind(&new.title)
            .bind(new.published)
            .bind(new.published_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;

            return Ok((issue_from_row(&row), false));
        }

        let row = sqlx::query(
            "INSERT INTO issues (journal_id, remote_issue_id, volume, number, year, title,
                                 published, published_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id, journal_id, remote_issue_id, volume, number, year, title,
                       published, published_at, created_at, updated_at",
        )
        .bind(new.journal_id)
        .bind(new.remote_issue_id)
        .bind(new.volume)
        .bind(&new.number)
        .bind(new.year)
        .bind(&new.title)
        .bind(new.published)
        .bind(new.published_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok((issue_from_row(&row), true))
    }

    async fn issues_for_journal(&self, journal_id: i64) -> StoreResult<Vec<Issue>> {
        let rows = sqlx::query(
            "SELECT id, journal_id, remote_issue_id, volume, number, year, title,
                    published, published_at, created_at, updated_at
             FROM issues WHERE journal_id = $1 ORDER BY id",
        )
        .bind(journal_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.iter().map(issue_from_row).collect())
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn upsert_review(&self, new: NewReview) -> StoreResult<(Review, bool)> {
        let existing = sqlx::query(
            "SELECT id FROM reviews WHERE submission_id = $1 AND remote_review_id = $2",
        )
        .bind(new.submission_id)
        .bind(new.remote_review_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if let Some(row) = existing {
            let id: i64 = row.get("id");
            let row = sqlx::query(
                "UPDATE reviews
                 SET reviewer_id = $2, round = $3, recommendation = $4, assigned_at = $5,
                     completed_at = $6, updated_at = NOW()
                 WHERE id = $1
                 RETURNING id, submission_id, reviewer_id, remote_review_id, round,
                           recommendation, assigned_at, completed_at, created_at, updated_at",
            )
            .bind(id)
            .bind(new.reviewer_id)
            .bind(new.round)
            .bind(new.recommendation.map(|r| r.to_string()))
            .bind(new.assigned_at)
            .bind(new.completed_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;

            return Ok((review_from_row(&row)?, false));
        }

        let row = sqlx::query(
            "INSERT INTO reviews (submission_id, reviewer_id, remote_review_id, round,
                                  recommendation, assigned_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, submission_id, reviewer_id, remote_review_id, round,
                       recommendation, assigned_at, completed_at, created_at, updated_at",
        )
        .bind(new.submission_id)
        .bind(new.reviewer_id)
        .bind(new.remote_review_id)
        .bind(new.round)
        .bind(new.recommendation.map(|r| r.to_string()))
        .bind(new.assigned_at)
        .bind(new.completed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok((review_from_row(&row)?, true))
    }

    async fn reviews_for_submission(&self, submission_id: i64) -> StoreResult<Vec<Review>> {
        let rows = sqlx::query(
            "SELECT id, submission_id, reviewer_id, remote_review_id, round,
                    recommendation, assigned_at, completed_at, created_at, updated_at
             FROM reviews WHERE submission_id = $1 ORDER BY round, id",
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(review_from_row).collect()
    }
}

#[async_trait]
impl CommentStore for PgStore {
    async fn upsert_comment(&self, new: NewComment) -> StoreResult<(Comment, bool)> {
        let existing = sqlx::query(
            "SELECT id FROM comments WHERE submission_id = $1 AND remote_comment_id = $2",
        )
        .bind(new.submission_id)
        .bind(new.remote_comment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if let Some(row) = existing {
            let id: i64 = row.get("id");
            let row = sqlx::query(
                "UPDATE comments
                 SET author_id = $2, title = $3, body = $4, posted_at = $5
                 WHERE id = $1
                 RETURNING id, submission_id, author_id, remote_comment_id, title, body,
                           posted_at, created_at",
            )
            .bind(id)
            .bind(new.author_id)
            .bind(&new.title)
            .bind(&new.body)
            .bind(new.posted_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;

            return Ok((comment_from_row(&row), false));
        }

        let row = sqlx::query(
            "INSERT INTO comments (submission_id, author_id, remote_comment_id, title, body, posted_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, submission_id, author_id, remote_comment_id, title, body,
                       posted_at, created_at",
        )
        .bind(new.submission_id)
        .bind(new.author_id)
        .bind(new.remote_comment_id)
        .bind(&new.title)
        .bind(&new.body)
        .bind(new.posted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok((comment_from_row(&row), true))
    }

    async fn comments_for_submission(&self, submission_id: i64) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT id, submission_id, author_id, remote_comment_id, title, body,
                    posted_at, created_at
             FROM comments WHERE submission_id = $1 ORDER BY posted_at, id",
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.iter().map(comment_from_row).collect())
    }
}
