//! SQLite store implementation using Diesel.
//!
//! Each operation runs in its own transaction; `commit_reconciliation`
//! bundles a reconciliation group's rows into one. Pool and query failures
//! surface as transient, corrupt rows as fatal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::{
    EventStatusUpdate, LocalListingRow, PendingKeys, ReconcileCommit, Store,
};
use crate::core::db::model::{
    NewPlatformLinkRow, NewPlatformListingRow, NewSyncEventRow, PlatformLinkRow, ProductRow,
    SyncEventRow, SyncRunRow,
};
use crate::core::db::schema::{platform_links, platform_listings, products, sync_events, sync_runs};
use crate::core::db::DbPool;
use crate::core::domain::{
    ChangeType, EventStatus, ExternalId, NewSyncEvent, PlatformLink, PlatformListing, PlatformTag,
    Product, ProductId, ProductStatus, RunState, RunSummary, SyncEvent, SyncRun, SyncRunId,
};
use crate::error::{Error, Result};

/// SQLite-backed canonical store.
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Create a new SQLite store over an existing pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<SqliteConnection>>> {
        self.pool.get().map_err(|e| Error::Fatal(e.to_string()))
    }
}

fn db_err(e: diesel::result::Error) -> Error {
    Error::database(e.to_string())
}

fn open_statuses() -> [&'static str; 2] {
    [EventStatus::Pending.as_str(), EventStatus::Partial.as_str()]
}

fn snapshot_row(link: PlatformLinkRow, product: ProductRow) -> Result<LocalListingRow> {
    let product = product.into_domain()?;
    let link = link.into_domain()?;
    Ok(LocalListingRow {
        product_id: product.id,
        link_id: link.id,
        sku: product.sku.clone(),
        title: product.title.clone(),
        brand: product.brand.clone(),
        model: product.model.clone(),
        year: product.year,
        external_id: link.external_id,
        link_status: link.status,
        sync_status: link.sync_status,
        listing_url: link.listing_url,
        canonical_price: product.canonical_price(),
        quantity: product.quantity,
        is_stocked_item: product.is_stocked_item,
        product_status: product.status,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_sync_run(&self, run: &SyncRun) -> Result<()> {
        let row = SyncRunRow::from_domain(run)?;
        let mut conn = self.conn()?;
        diesel::insert_into(sync_runs::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn finish_sync_run(
        &self,
        run_id: SyncRunId,
        state: RunState,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let summary_json = serde_json::to_string(summary)?;
        let mut conn = self.conn()?;
        diesel::update(sync_runs::table.find(run_id.to_string()))
            .set((
                sync_runs::state.eq(state.as_str()),
                sync_runs::summary.eq(summary_json),
                sync_runs::finished_at.eq(Some(finished_at.to_rfc3339())),
            ))
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn fetch_sync_run(&self, run_id: SyncRunId) -> Result<Option<SyncRun>> {
        let mut conn = self.conn()?;
        let row: Option<SyncRunRow> = sync_runs::table
            .find(run_id.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(SyncRunRow::into_domain).transpose()
    }

    async fn fetch_local_snapshot(&self, platform: PlatformTag) -> Result<Vec<LocalListingRow>> {
        let mut conn = self.conn()?;
        let rows: Vec<(PlatformLinkRow, ProductRow)> = platform_links::table
            .inner_join(products::table)
            .filter(platform_links::platform_name.eq(platform.as_str()))
            .select((PlatformLinkRow::as_select(), ProductRow::as_select()))
            .load(&mut conn)
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(link, product)| snapshot_row(link, product))
            .collect()
    }

    async fn fetch_pending_event_keys(&self, platform: PlatformTag) -> Result<PendingKeys> {
        let mut conn = self.conn()?;
        let rows: Vec<(String, String)> = sync_events::table
            .filter(sync_events::platform_name.eq(platform.as_str()))
            .filter(sync_events::status.eq(EventStatus::Pending.as_str()))
            .select((sync_events::external_id, sync_events::change_type))
            .load(&mut conn)
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(external_id, change_type)| {
                let change_type: ChangeType = change_type
                    .parse()
                    .map_err(|e: String| Error::Fatal(format!("corrupt change type: {e}")))?;
                Ok((ExternalId::new(external_id), change_type))
            })
            .collect()
    }

    async fn insert_sync_events(&self, events: &[NewSyncEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let rows: Vec<NewSyncEventRow> = events
            .iter()
            .map(NewSyncEventRow::from_domain)
            .collect::<Result<_>>()?;
        let mut conn = self.conn()?;
        // OR IGNORE rides the pending partial unique index: a concurrent
        // run's duplicate simply does not insert.
        let inserted = diesel::insert_or_ignore_into(sync_events::table)
            .values(&rows)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(inserted)
    }

    async fn fetch_open_events(&self) -> Result<Vec<SyncEvent>> {
        let mut conn = self.conn()?;
        let rows: Vec<SyncEventRow> = sync_events::table
            .filter(sync_events::status.eq_any(open_statuses()))
            .order(sync_events::detected_at.asc())
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(SyncEventRow::into_domain).collect()
    }

    async fn fetch_pending_events_for_run(&self, run_id: SyncRunId) -> Result<Vec<SyncEvent>> {
        let mut conn = self.conn()?;
        let rows: Vec<SyncEventRow> = sync_events::table
            .filter(sync_events::sync_run_id.eq(run_id.to_string()))
            .filter(sync_events::status.eq_any(open_statuses()))
            .order(sync_events::detected_at.asc())
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(SyncEventRow::into_domain).collect()
    }

    async fn update_event_status(&self, update: &EventStatusUpdate) -> Result<()> {
        let notes_json = serde_json::to_string(&update.notes)?;
        let mut conn = self.conn()?;
        diesel::update(sync_events::table.find(update.event_id.value()))
            .set((
                sync_events::status.eq(update.status.as_str()),
                sync_events::notes.eq(notes_json),
                sync_events::processed_at.eq(update.processed_at.map(|t| t.to_rfc3339())),
            ))
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn commit_reconciliation(&self, commit: &ReconcileCommit) -> Result<()> {
        if commit.is_empty() {
            return Ok(());
        }

        // Serialize everything up front so the transaction closure only
        // touches the database.
        let product_row = commit
            .product
            .as_ref()
            .map(ProductRow::from_domain)
            .transpose()?;
        let link_rows: Vec<PlatformLinkRow> = commit
            .link_updates
            .iter()
            .map(PlatformLinkRow::from_domain)
            .collect::<Result<_>>()?;
        let upsert_rows: Vec<NewPlatformLinkRow> = commit
            .link_upserts
            .iter()
            .map(NewPlatformLinkRow::from_domain)
            .collect::<Result<_>>()?;
        let event_rows: Vec<(i32, String, String, Option<String>)> = commit
            .event_updates
            .iter()
            .map(|u| {
                Ok((
                    u.event_id.value(),
                    u.status.as_str().to_string(),
                    serde_json::to_string(&u.notes)?,
                    u.processed_at.map(|t| t.to_rfc3339()),
                ))
            })
            .collect::<Result<_>>()?;

        let mut conn = self.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            if let Some(row) = &product_row {
                diesel::update(products::table.find(row.id))
                    .set(row)
                    .execute(conn)?;
            }
            for row in &link_rows {
                diesel::update(platform_links::table.find(row.id))
                    .set(row)
                    .execute(conn)?;
            }
            for row in &upsert_rows {
                diesel::insert_into(platform_links::table)
                    .values(row)
                    .on_conflict((platform_links::product_id, platform_links::platform_name))
                    .do_update()
                    .set((
                        platform_links::external_id.eq(&row.external_id),
                        platform_links::status.eq(&row.status),
                        platform_links::listing_url.eq(&row.listing_url),
                        platform_links::sync_status.eq(&row.sync_status),
                        platform_links::platform_specific_data.eq(&row.platform_specific_data),
                    ))
                    .execute(conn)?;
            }
            for (id, status, notes, processed_at) in &event_rows {
                diesel::update(sync_events::table.find(id))
                    .set((
                        sync_events::status.eq(status),
                        sync_events::notes.eq(notes),
                        sync_events::processed_at.eq(processed_at),
                    ))
                    .execute(conn)?;
            }
            Ok(())
        })
        .map_err(db_err)
    }

    async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>> {
        let mut conn = self.conn()?;
        let row: Option<ProductRow> = products::table
            .find(id.value())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(ProductRow::into_domain).transpose()
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let row = ProductRow::from_domain(product)?;
        let mut conn = self.conn()?;
        diesel::update(products::table.find(row.id))
            .set(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn fetch_links_for_product(&self, product_id: ProductId) -> Result<Vec<PlatformLink>> {
        let mut conn = self.conn()?;
        let rows: Vec<PlatformLinkRow> = platform_links::table
            .filter(platform_links::product_id.eq(product_id.value()))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(PlatformLinkRow::into_domain).collect()
    }

    async fn find_link(
        &self,
        platform: PlatformTag,
        external_id: &ExternalId,
    ) -> Result<Option<PlatformLink>> {
        let mut conn = self.conn()?;
        let row: Option<PlatformLinkRow> = platform_links::table
            .filter(platform_links::platform_name.eq(platform.as_str()))
            .filter(platform_links::external_id.eq(external_id.as_str()))
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(PlatformLinkRow::into_domain).transpose()
    }

    async fn update_platform_link(&self, link: &PlatformLink) -> Result<()> {
        let row = PlatformLinkRow::from_domain(link)?;
        let mut conn = self.conn()?;
        diesel::update(platform_links::table.find(row.id))
            .set(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_platform_listing(&self, listing: &PlatformListing) -> Result<()> {
        let row = NewPlatformListingRow::from_domain(listing)?;
        let mut conn = self.conn()?;
        diesel::insert_into(platform_listings::table)
            .values(&row)
            .on_conflict(platform_listings::link_id)
            .do_update()
            .set((
                platform_listings::category_id.eq(&row.category_id),
                platform_listings::category_name.eq(&row.category_name),
                platform_listings::secondary_category_id.eq(&row.secondary_category_id),
                platform_listings::shipping_policy_id.eq(&row.shipping_policy_id),
                platform_listings::payment_policy_id.eq(&row.payment_policy_id),
                platform_listings::return_policy_id.eq(&row.return_policy_id),
                platform_listings::picture_urls.eq(&row.picture_urls),
                platform_listings::raw_snapshot.eq(&row.raw_snapshot),
                platform_listings::updated_at.eq(&row.updated_at),
            ))
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn fetch_match_pool(&self, platform: PlatformTag) -> Result<Vec<Product>> {
        let mut conn = self.conn()?;
        let linked = platform_links::table
            .filter(platform_links::platform_name.eq(platform.as_str()))
            .select(platform_links::product_id);
        let rows: Vec<ProductRow> = products::table
            .filter(products::id.ne_all(linked))
            .filter(products::status.ne(ProductStatus::Sold.as_str()))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(ProductRow::into_domain).collect()
    }

    async fn fetch_linked_platforms(&self, product_id: ProductId) -> Result<Vec<PlatformTag>> {
        let mut conn = self.conn()?;
        let names: Vec<String> = platform_links::table
            .filter(platform_links::product_id.eq(product_id.value()))
            .filter(platform_links::status.eq_any(["active", "draft"]))
            .select(platform_links::platform_name)
            .load(&mut conn)
            .map_err(db_err)?;
        names
            .into_iter()
            .map(|name| {
                name.parse()
                    .map_err(|e: String| Error::Fatal(format!("corrupt platform name: {e}")))
            })
            .collect()
    }

    async fn list_events_by_status(&self, statuses: &[EventStatus]) -> Result<Vec<SyncEvent>> {
        let names: Vec<&str> = statuses.iter().map(EventStatus::as_str).collect();
        let mut conn = self.conn()?;
        let rows: Vec<SyncEventRow> = sync_events::table
            .filter(sync_events::status.eq_any(names))
            .order(sync_events::detected_at.desc())
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(SyncEventRow::into_domain).collect()
    }
}
