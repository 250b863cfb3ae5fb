//! Link persistence
//!
//! A link records the correspondence between an external key and a
//! remote record id for one period, plus the content hash last synced.
//! At most one link exists per (period, external key).

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row as _, SqlitePool};
use uuid::Uuid;

/// Persisted `(period, external_key) -> (remote_id, content_hash)` record.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: i64,
    pub period: String,
    pub external_key: String,
    pub remote_id: Uuid,
    pub content_hash: String,
}

/// All links for one period, ordered by external key.
pub async fn find_links(pool: &SqlitePool, period: &str) -> Result<Vec<Link>> {
    let rows = sqlx::query(
        r#"
        SELECT id, period, external_key, remote_id, content_hash
        FROM sync_links
        WHERE period = ?
        ORDER BY external_key
        "#,
    )
    .bind(period)
    .fetch_all(pool)
    .await
    .context("failed to load links")?;

    let mut links = Vec::with_capacity(rows.len());
    for row in rows {
        let remote_id: String = row.try_get("remote_id")?;
        links.push(Link {
            id: row.try_get("id")?,
            period: row.try_get("period")?,
            external_key: row.try_get("external_key")?,
            remote_id: Uuid::parse_str(&remote_id)
                .with_context(|| format!("malformed remote id '{remote_id}' in link"))?,
            content_hash: row.try_get("content_hash")?,
        });
    }
    Ok(links)
}

/// Insert or refresh the link for an external key within a period.
pub async fn upsert_link(
    pool: &SqlitePool,
    period: &str,
    external_key: &str,
    remote_id: Uuid,
    content_hash: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_links (period, external_key, remote_id, content_hash, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (period, external_key) DO UPDATE
        SET remote_id = excluded.remote_id,
            content_hash = excluded.content_hash,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(period)
    .bind(external_key)
    .bind(remote_id.to_string())
    .bind(content_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .with_context(|| format!("failed to upsert link for {external_key}"))?;
    Ok(())
}

pub async fn delete_link(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM sync_links WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete link")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn test_upsert_and_find() {
        let store = Store::in_memory().await.unwrap();
        let remote = Uuid::new_v4();

        upsert_link(store.pool(), "202508", "INV:202508:0000007:A100", remote, "h1")
            .await
            .unwrap();

        let links = find_links(store.pool(), "202508").await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].remote_id, remote);
        assert_eq!(links[0].content_hash, "h1");

        // Upsert refreshes the hash, never duplicates the key.
        upsert_link(store.pool(), "202508", "INV:202508:0000007:A100", remote, "h2")
            .await
            .unwrap();
        let links = find_links(store.pool(), "202508").await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].content_hash, "h2");
    }

    #[tokio::test]
    async fn test_periods_isolated() {
        let store = Store::in_memory().await.unwrap();
        let remote = Uuid::new_v4();

        upsert_link(store.pool(), "202507", "INV:202507:0000001:A1", remote, "h")
            .await
            .unwrap();

        assert!(find_links(store.pool(), "202508").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = Store::in_memory().await.unwrap();
        upsert_link(store.pool(), "202508", "K", Uuid::new_v4(), "h")
            .await
            .unwrap();
        let links = find_links(store.pool(), "202508").await.unwrap();
        delete_link(store.pool(), links[0].id).await.unwrap();
        assert!(find_links(store.pool(), "202508").await.unwrap().is_empty());
    }
}
