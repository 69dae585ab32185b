//! Legacy-record backfill.
//!
//! Early records predate the settled format: no `details` blob (just a bare
//! `is_licensed_driver` flag), no `status`, no `is_partial`, sometimes no
//! `created_at`. Readers treat those rows as partial, which hides them from
//! staff. This one-shot backfill fills the gaps so legacy records surface
//! again. Run via the `migrate` binary; safe to re-run.

use chrono::Utc;
use libsql::params;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::model::{ApplicationDetails, ApplicationStatus, LicensedDetails, UnlicensedProgress};
use crate::store::LibSqlBackend;

/// Outcome of one backfill pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Rows that had at least one gap filled.
    pub updated: usize,
    /// Rows already in the current format.
    pub skipped: usize,
    /// Rows that could not be fixed: (id, reason).
    pub failed: Vec<(String, String)>,
}

impl BackfillReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fill format gaps on every application row.
pub async fn backfill(store: &LibSqlBackend) -> Result<BackfillReport, StoreError> {
    let conn = store.conn();
    let mut rows = conn
        .query(
            "SELECT id, details, is_licensed_driver, status, is_partial, created_at
             FROM applications",
            (),
        )
        .await
        .map_err(|e| StoreError::Query(format!("backfill scan: {e}")))?;

    let mut report = BackfillReport::default();
    loop {
        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("backfill scan: {e}")))?;
        let Some(row) = row else { break };

        let id: String = row
            .get(0)
            .map_err(|e| StoreError::Query(format!("backfill id: {e}")))?;

        match backfill_row(store, &row, &id).await {
            Ok(true) => report.updated += 1,
            Ok(false) => report.skipped += 1,
            Err(reason) => {
                warn!(application_id = %id, %reason, "Backfill failed for record");
                report.failed.push((id, reason));
            }
        }
    }

    info!(
        updated = report.updated,
        skipped = report.skipped,
        failed = report.failed.len(),
        "Backfill pass complete"
    );
    Ok(report)
}

/// Fix one row. Returns whether anything was written; `Err` carries a
/// human-readable reason for the report.
async fn backfill_row(
    store: &LibSqlBackend,
    row: &libsql::Row,
    id: &str,
) -> Result<bool, String> {
    let opt_text = |idx: i32, name: &str| -> Result<Option<String>, String> {
        match row.get_value(idx).map_err(|e| format!("column {name}: {e}"))? {
            libsql::Value::Null => Ok(None),
            libsql::Value::Text(s) => Ok(Some(s)),
            other => Err(format!("column {name}: unexpected value {other:?}")),
        }
    };
    let opt_int = |idx: i32, name: &str| -> Result<Option<i64>, String> {
        match row.get_value(idx).map_err(|e| format!("column {name}: {e}"))? {
            libsql::Value::Null => Ok(None),
            libsql::Value::Integer(n) => Ok(Some(n)),
            other => Err(format!("column {name}: unexpected value {other:?}")),
        }
    };

    let details = opt_text(1, "details")?;
    let licensed_flag = opt_int(2, "is_licensed_driver")?;
    let status = opt_text(3, "status")?;
    let is_partial = opt_int(4, "is_partial")?;
    let created_at = opt_text(5, "created_at")?;

    // A present details blob must parse, otherwise the record needs a human
    if let Some(json) = &details {
        serde_json::from_str::<ApplicationDetails>(json)
            .map_err(|e| format!("unparsable details: {e}"))?;
    }

    let complete =
        details.is_some() && status.is_some() && is_partial.is_some() && created_at.is_some();
    if complete {
        return Ok(false);
    }

    let new_details = if details.is_none() {
        let synthesized = match licensed_flag {
            Some(n) if n != 0 => ApplicationDetails::Licensed(LicensedDetails::default()),
            _ => ApplicationDetails::Unlicensed(UnlicensedProgress::default()),
        };
        Some(serde_json::to_string(&synthesized).map_err(|e| e.to_string())?)
    } else {
        None
    };

    let now = Utc::now().to_rfc3339();
    store
        .conn()
        .execute(
            "UPDATE applications SET
                details = COALESCE(details, ?2),
                status = COALESCE(status, ?3),
                is_partial = COALESCE(is_partial, 0),
                created_at = COALESCE(created_at, ?4),
                updated_at = ?4
             WHERE id = ?1",
            params![
                id,
                new_details.unwrap_or_default(),
                ApplicationStatus::Submitted.as_str(),
                now,
            ],
        )
        .await
        .map_err(|e| format!("update: {e}"))?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentKind;
    use crate::store::{ApplicationPatch, ApplicationStore};

    async fn insert_legacy(store: &LibSqlBackend, id: &str, licensed: Option<i64>) {
        store
            .conn()
            .execute(
                "INSERT INTO applications (id, first_name, last_name, email, is_licensed_driver)
                 VALUES (?1, 'Legacy', 'Driver', 'legacy@example.com', ?2)",
                params![
                    id,
                    match licensed {
                        Some(n) => libsql::Value::Integer(n),
                        None => libsql::Value::Null,
                    }
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn legacy_rows_are_filled_and_surface_to_staff() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        insert_legacy(&store, "legacy-licensed", Some(1)).await;
        insert_legacy(&store, "legacy-unlicensed", None).await;

        // Hidden before the backfill
        assert!(store.list_complete().await.unwrap().is_empty());

        let report = backfill(&store).await.unwrap();
        assert_eq!(report.updated, 2);
        assert_eq!(report.skipped, 0);
        assert!(report.is_clean());

        let listed = store.list_complete().await.unwrap();
        assert_eq!(listed.len(), 2);

        let licensed = store.get("legacy-licensed").await.unwrap().unwrap();
        assert!(licensed.is_licensed_driver());
        assert_eq!(licensed.status, ApplicationStatus::Submitted);
        assert!(!licensed.is_partial);

        let unlicensed = store.get("legacy-unlicensed").await.unwrap().unwrap();
        assert!(!unlicensed.is_licensed_driver());
    }

    #[tokio::test]
    async fn current_rows_are_skipped_and_untouched() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let mut docs = crate::model::DocumentSet::default();
        docs.set(DocumentKind::Badge, "https://files/badge.pdf");
        store
            .merge(
                "current",
                ApplicationPatch {
                    first_name: Some("Amara".to_string()),
                    details: Some(ApplicationDetails::Licensed(LicensedDetails::default())),
                    documents: Some(docs),
                    status: Some(ApplicationStatus::Approved),
                    is_partial: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let report = backfill(&store).await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 1);

        let app = store.get("current").await.unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Approved);
        assert_eq!(
            app.documents.get(DocumentKind::Badge),
            Some("https://files/badge.pdf")
        );
    }

    #[tokio::test]
    async fn unparsable_details_are_reported_not_fixed() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO applications (id, details) VALUES ('broken', 'not-json')",
                (),
            )
            .await
            .unwrap();
        insert_legacy(&store, "fine", Some(1)).await;

        let report = backfill(&store).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken");
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn backfill_is_idempotent() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        insert_legacy(&store, "legacy", Some(0)).await;

        let first = backfill(&store).await.unwrap();
        assert_eq!(first.updated, 1);
        let second = backfill(&store).await.unwrap();
        assert_eq!(second.updated, 0);
        assert_eq!(second.skipped, 1);
    }
}
