//! Bulk business-code lookups against the local mirror
//!
//! One round trip per entity kind; the resolver works entirely from the
//! returned maps. The mirror tables are maintained by the master-data
//! sync jobs outside this engine.

use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::{Row as _, SqlitePool};
use uuid::Uuid;

use crate::error::RefKind;

fn table_for(kind: RefKind) -> &'static str {
    match kind {
        RefKind::Customer => "customers",
        RefKind::Product => "products",
        RefKind::Salesperson => "salespersons",
    }
}

/// Resolve a batch of business codes to remote ids in a single query.
/// Codes without a mirror row are simply absent from the result map.
pub async fn lookup_codes(
    pool: &SqlitePool,
    kind: RefKind,
    codes: &[String],
) -> Result<HashMap<String, Uuid>> {
    if codes.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; codes.len()].join(", ");
    let sql = format!(
        "SELECT code, remote_id FROM {} WHERE code IN ({})",
        table_for(kind),
        placeholders
    );

    let mut query = sqlx::query(&sql);
    for code in codes {
        query = query.bind(code);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to look up {} codes", kind))?;

    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        let code: String = row.try_get("code")?;
        let remote_id: String = row.try_get("remote_id")?;
        let remote_id = Uuid::parse_str(&remote_id)
            .with_context(|| format!("malformed remote id for {} '{code}'", kind))?;
        map.insert(code, remote_id);
    }
    Ok(map)
}

#[cfg(test)]
pub(crate) async fn seed(
    pool: &SqlitePool,
    kind: RefKind,
    code: &str,
    remote_id: Uuid,
) -> Result<()> {
    let sql = format!(
        "INSERT OR REPLACE INTO {} (code, remote_id) VALUES (?, ?)",
        table_for(kind)
    );
    sqlx::query(&sql)
        .bind(code)
        .bind(remote_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}
