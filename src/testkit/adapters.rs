//! Scripted marketplace adapter for tests.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::core::domain::{
    ExternalId, PlatformLink, PlatformTag, Product, RemoteListing, UniversalStatus,
};
use crate::core::platform::{
    CloseOutcome, CreateContext, CreateResult, EditResult, MarketplaceAdapter, ProductField,
    QuantityHints,
};
use crate::error::{Error, Result};

/// One outbound call observed by the scripted adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    FetchAll,
    MarkSold {
        external_id: ExternalId,
    },
    UpdatePrice {
        external_id: ExternalId,
        price: Decimal,
    },
    UpdateQuantity {
        external_id: ExternalId,
        quantity: i32,
    },
    CreateListing {
        sku: String,
    },
}

/// A [`MarketplaceAdapter`] whose snapshot and failures are scripted and
/// whose outbound calls are recorded. Share it with the registry via `Arc`
/// and keep a clone for assertions.
pub struct ScriptedAdapter {
    platform: PlatformTag,
    listings: Mutex<Vec<RemoteListing>>,
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<HashMap<&'static str, VecDeque<Error>>>,
    already_closed: Mutex<HashSet<ExternalId>>,
    next_created_id: Mutex<u32>,
}

impl ScriptedAdapter {
    #[must_use]
    pub fn new(platform: PlatformTag) -> Self {
        Self {
            platform,
            listings: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            already_closed: Mutex::new(HashSet::new()),
            next_created_id: Mutex::new(9000),
        }
    }

    /// Replace the snapshot `fetch_all` returns.
    pub fn set_listings(&self, listings: Vec<RemoteListing>) {
        *self.listings.lock() = listings;
    }

    /// Queue a failure for the next call of the given kind
    /// (`fetch_all`, `mark_sold`, `update_price`, `update_quantity`,
    /// `create_listing`).
    pub fn fail_next(&self, kind: &'static str, error: Error) {
        self.failures.lock().entry(kind).or_default().push_back(error);
    }

    /// Make `mark_as_sold` report the listing as already closed.
    pub fn set_already_closed(&self, external_id: &str) {
        self.already_closed
            .lock()
            .insert(ExternalId::new(external_id));
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn take_failure(&self, kind: &'static str) -> Option<Error> {
        self.failures.lock().get_mut(kind)?.pop_front()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl MarketplaceAdapter for ScriptedAdapter {
    fn platform(&self) -> PlatformTag {
        self.platform
    }

    async fn fetch_all(&self) -> Result<Vec<RemoteListing>> {
        self.record(RecordedCall::FetchAll);
        if let Some(err) = self.take_failure("fetch_all") {
            return Err(err);
        }
        Ok(self.listings.lock().clone())
    }

    async fn mark_as_sold(&self, external_id: &ExternalId) -> Result<CloseOutcome> {
        self.record(RecordedCall::MarkSold {
            external_id: external_id.clone(),
        });
        if let Some(err) = self.take_failure("mark_sold") {
            return Err(err);
        }
        if self.already_closed.lock().contains(external_id) {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        Ok(CloseOutcome::Closed)
    }

    async fn update_price(&self, external_id: &ExternalId, new_price: Decimal) -> Result<()> {
        self.record(RecordedCall::UpdatePrice {
            external_id: external_id.clone(),
            price: new_price,
        });
        if let Some(err) = self.take_failure("update_price") {
            return Err(err);
        }
        Ok(())
    }

    async fn update_quantity(
        &self,
        external_id: &ExternalId,
        quantity: i32,
        _hints: &QuantityHints,
    ) -> Result<()> {
        self.record(RecordedCall::UpdateQuantity {
            external_id: external_id.clone(),
            quantity,
        });
        if let Some(err) = self.take_failure("update_quantity") {
            return Err(err);
        }
        Ok(())
    }

    async fn create_listing(
        &self,
        product: &Product,
        _context: &CreateContext,
    ) -> Result<CreateResult> {
        self.record(RecordedCall::CreateListing {
            sku: product.sku.clone(),
        });
        if let Some(err) = self.take_failure("create_listing") {
            return Err(err);
        }
        let mut next = self.next_created_id.lock();
        *next += 1;
        Ok(CreateResult {
            external_id: Some(ExternalId::new(format!("{}-{}", self.platform, *next))),
            listing_url: None,
            status: UniversalStatus::Active,
        })
    }

    async fn apply_product_edit(
        &self,
        _product: &Product,
        _link: &PlatformLink,
        changed: &[ProductField],
    ) -> Result<EditResult> {
        Ok(EditResult {
            applied: changed.to_vec(),
            skipped: Vec::new(),
        })
    }
}
