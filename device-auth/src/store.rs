//! Flow store trait for persisting device authorization flows.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::flow::{Approval, FlowRecord, NewFlow};
use crate::Id;

/// Trait for storing and transitioning device authorization flows.
///
/// CRITICAL: Every transition is a conditional update. Concurrent callers racing on the
/// same flow must observe exactly one winner, which is how a token is released at most once.
///
/// Transition methods return `Ok(true)` when the guard held and the row was written, and
/// `Ok(false)` when another caller got there first or the flow is no longer eligible.
/// `Err` is reserved for store failures.
///
/// Implementations should:
/// - Enforce uniqueness of `device_code_hash` and `user_code` across every stored flow
/// - Never log raw tokens
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Persist a new pending flow.
    async fn insert(&self, flow: NewFlow) -> Result<FlowRecord, Error>;

    async fn find_by_id(&self, id: Id) -> Result<Option<FlowRecord>, Error>;

    async fn find_by_device_code_hash(
        &self,
        device_code_hash: &str,
    ) -> Result<Option<FlowRecord>, Error>;

    /// Look up a flow by its normalized `XXXX-XXXX` user code.
    async fn find_by_user_code(&self, user_code: &str) -> Result<Option<FlowRecord>, Error>;

    /// Move a flow from pending to approved.
    ///
    /// Guard: status is pending and `approval.approved_at` is before the flow's deadline.
    async fn approve(&self, id: Id, approval: Approval) -> Result<bool, Error>;

    /// Record an accepted poll at `now`.
    ///
    /// Guard: the flow is not expired and `last_polled_at` still equals `observed`.
    /// A lost guard means a concurrent poll was accepted first.
    async fn touch_poll(
        &self,
        id: Id,
        observed: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error>;

    /// Move a flow from approved to consumed, erasing the access token.
    ///
    /// Guard: status is approved and a token is present.
    async fn consume(&self, id: Id, now: DateTime<Utc>) -> Result<bool, Error>;

    /// Move a pending or approved flow to expired, erasing any access token.
    async fn expire(&self, id: Id) -> Result<bool, Error>;

    /// Expire every pending or approved flow whose deadline is at or before `now`.
    ///
    /// Returns the number of flows expired.
    async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<u64, Error>;
}

#[async_trait]
impl<T: FlowStore + ?Sized> FlowStore for Arc<T> {
    async fn insert(&self, flow: NewFlow) -> Result<FlowRecord, Error> {
        (**self).insert(flow).await
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<FlowRecord>, Error> {
        (**self).find_by_id(id).await
    }

    async fn find_by_device_code_hash(
        &self,
        device_code_hash: &str,
    ) -> Result<Option<FlowRecord>, Error> {
        (**self).find_by_device_code_hash(device_code_hash).await
    }

    async fn find_by_user_code(&self, user_code: &str) -> Result<Option<FlowRecord>, Error> {
        (**self).find_by_user_code(user_code).await
    }

    async fn approve(&self, id: Id, approval: Approval) -> Result<bool, Error> {
        (**self).approve(id, approval).await
    }

    async fn touch_poll(
        &self,
        id: Id,
        observed: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        (**self).touch_poll(id, observed, now).await
    }

    async fn consume(&self, id: Id, now: DateTime<Utc>) -> Result<bool, Error> {
        (**self).consume(id, now).await
    }

    async fn expire(&self, id: Id) -> Result<bool, Error> {
        (**self).expire(id).await
    }

    async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        (**self).expire_lapsed(now).await
    }
}
