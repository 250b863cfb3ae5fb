//! Reference resolution
//!
//! Collects the distinct business codes across all planned groups, loads
//! each entity kind from the mirror in a single round trip, and builds
//! the remote payload per group. An unresolved code fails only the
//! group that references it.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::api::models::{InvoiceLinePayload, InvoicePayload};
use crate::error::{RefKind, SyncError};
use crate::ingest::InvoiceGroup;
use crate::store::refs;

use super::types::SyncPlan;

/// Code-to-remote-id maps for every entity kind the payload needs.
#[derive(Debug, Default)]
pub struct ReferenceMaps {
    customers: HashMap<String, Uuid>,
    products: HashMap<String, Uuid>,
    salespersons: HashMap<String, Uuid>,
}

impl ReferenceMaps {
    /// Bulk-load the codes referenced by the plan's create and update
    /// groups. One query per entity kind, never per row.
    pub async fn load(pool: &SqlitePool, plan: &SyncPlan) -> Result<Self> {
        let groups: Vec<&InvoiceGroup> = plan
            .to_create
            .iter()
            .chain(plan.to_update.iter().map(|(g, _)| g))
            .collect();

        let mut customers = HashSet::new();
        let mut products = HashSet::new();
        let mut salespersons = HashSet::new();
        for group in &groups {
            customers.insert(group.customer_code.clone());
            for row in &group.rows {
                products.insert(row.product_code.clone());
                if let Some(code) = &row.salesperson_code {
                    salespersons.insert(code.clone());
                }
            }
        }

        let to_vec = |set: HashSet<String>| set.into_iter().collect::<Vec<_>>();
        Ok(Self {
            customers: refs::lookup_codes(pool, RefKind::Customer, &to_vec(customers)).await?,
            products: refs::lookup_codes(pool, RefKind::Product, &to_vec(products)).await?,
            salespersons: refs::lookup_codes(pool, RefKind::Salesperson, &to_vec(salespersons))
                .await?,
        })
    }

    #[cfg(test)]
    pub fn with_maps(
        customers: HashMap<String, Uuid>,
        products: HashMap<String, Uuid>,
        salespersons: HashMap<String, Uuid>,
    ) -> Self {
        Self {
            customers,
            products,
            salespersons,
        }
    }

    fn resolve(
        &self,
        kind: RefKind,
        code: &str,
        external_key: &str,
    ) -> Result<Uuid, SyncError> {
        let map = match kind {
            RefKind::Customer => &self.customers,
            RefKind::Product => &self.products,
            RefKind::Salesperson => &self.salespersons,
        };
        map.get(code)
            .copied()
            .ok_or_else(|| SyncError::ReferenceNotFound {
                kind,
                code: code.to_string(),
                external_key: external_key.to_string(),
            })
    }
}

/// Build the remote payload for one group, failing fast on the first
/// unresolved code. The failure names the code and the group's external
/// key and never affects sibling groups.
pub fn build_invoice_payload(
    group: &InvoiceGroup,
    refs: &ReferenceMaps,
) -> Result<InvoicePayload, SyncError> {
    let customer_id = refs.resolve(
        RefKind::Customer,
        &group.customer_code,
        &group.external_key,
    )?;

    // The assignee comes from the first row carrying one.
    let salesperson_id = group
        .rows
        .iter()
        .find_map(|r| r.salesperson_code.as_deref())
        .map(|code| refs.resolve(RefKind::Salesperson, code, &group.external_key))
        .transpose()?;

    let mut lines = Vec::with_capacity(group.rows.len());
    for row in &group.rows {
        lines.push(InvoiceLinePayload {
            product_id: refs.resolve(RefKind::Product, &row.product_code, &group.external_key)?,
            quantity: row.quantity,
            unit_price: row.unit_price,
            discount: row.discount,
        });
    }

    Ok(InvoicePayload {
        external_key: group.external_key.clone(),
        document_no: group.document_no.clone(),
        document_date: group.document_date,
        customer_id,
        salesperson_id,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::ingest::{Period, Row};

    fn row(product: &str, salesperson: Option<&str>) -> Row {
        Row {
            document_no: "7".into(),
            document_date: NaiveDate::from_ymd_opt(2025, 8, 10).unwrap(),
            customer_code: "A100".into(),
            product_code: product.into(),
            quantity: 2.0,
            unit_price: 10.5,
            discount: 0.0,
            salesperson_code: salesperson.map(String::from),
            source_row: 2,
            cells: Vec::new(),
        }
    }

    fn group(rows: Vec<Row>) -> InvoiceGroup {
        InvoiceGroup {
            external_key: "INV:202508:0000007:A100".into(),
            period: Period::new(2025, 8).unwrap(),
            document_no: "7".into(),
            document_date: NaiveDate::from_ymd_opt(2025, 8, 10).unwrap(),
            customer_code: "A100".into(),
            rows,
            content_hash: "h".into(),
        }
    }

    fn maps() -> (ReferenceMaps, Uuid, Uuid, Uuid) {
        let customer = Uuid::new_v4();
        let product = Uuid::new_v4();
        let salesperson = Uuid::new_v4();
        let maps = ReferenceMaps::with_maps(
            HashMap::from([("A100".to_string(), customer)]),
            HashMap::from([("P-1".to_string(), product)]),
            HashMap::from([("E1".to_string(), salesperson)]),
        );
        (maps, customer, product, salesperson)
    }

    #[test]
    fn test_payload_resolves_all_codes() {
        let (maps, customer, product, salesperson) = maps();
        let payload =
            build_invoice_payload(&group(vec![row("P-1", Some("E1"))]), &maps).unwrap();

        assert_eq!(payload.customer_id, customer);
        assert_eq!(payload.salesperson_id, Some(salesperson));
        assert_eq!(payload.lines.len(), 1);
        assert_eq!(payload.lines[0].product_id, product);
        assert_eq!(payload.external_key, "INV:202508:0000007:A100");
    }

    #[test]
    fn test_missing_salesperson_fails_group() {
        let (maps, ..) = maps();
        let err =
            build_invoice_payload(&group(vec![row("P-1", Some("E042"))]), &maps).unwrap_err();

        match err {
            SyncError::ReferenceNotFound {
                kind,
                code,
                external_key,
            } => {
                assert_eq!(kind, RefKind::Salesperson);
                assert_eq!(code, "E042");
                assert_eq!(external_key, "INV:202508:0000007:A100");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_product_fails_group() {
        let (maps, ..) = maps();
        let err = build_invoice_payload(
            &group(vec![row("P-1", None), row("P-404", None)]),
            &maps,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            SyncError::ReferenceNotFound {
                kind: RefKind::Product,
                ..
            }
        ));
    }

    #[test]
    fn test_no_salesperson_is_fine() {
        let (maps, ..) = maps();
        let payload = build_invoice_payload(&group(vec![row("P-1", None)]), &maps).unwrap();
        assert_eq!(payload.salesperson_id, None);
    }
}
