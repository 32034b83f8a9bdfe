//! In-memory flow store for single-process deployments and tests.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;

use crate::error::{store_error, Error, StoreErrorKind};
use crate::flow::{Approval, FlowRecord, FlowStatus, NewFlow};
use crate::store::FlowStore;
use crate::Id;

/// Default number of flows kept before the oldest is evicted.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// A map that holds at most `capacity` entries, evicting the oldest insertion first.
///
/// Replacing the value of an existing key keeps its original position.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            order: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Insert a value, returning the entry evicted to make room, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = value;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.order
                .pop_front()
                .and_then(|oldest| self.entries.remove(&oldest).map(|v| (oldest, v)))
        } else {
            None
        };

        self.order.push_back(key.clone());
        self.entries.insert(key, value);
        evicted
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug)]
struct Flows {
    records: BoundedCache<Id, FlowRecord>,
    by_device_code_hash: HashMap<String, Id>,
    by_user_code: HashMap<String, Id>,
}

impl Flows {
    fn lookup(&self, id: Option<&Id>) -> Option<FlowRecord> {
        id.and_then(|id| self.records.get(id)).cloned()
    }
}

/// `FlowStore` backed by a bounded map guarded by a mutex.
///
/// Flows evicted for capacity disappear entirely, so a device polling an evicted flow
/// receives `invalid_grant`.
#[derive(Debug)]
pub struct MemoryFlowStore {
    flows: Mutex<Flows>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            flows: Mutex::new(Flows {
                records: BoundedCache::new(capacity),
                by_device_code_hash: HashMap::new(),
                by_user_code: HashMap::new(),
            }),
        }
    }

    pub fn len(&self) -> Result<usize, Error> {
        Ok(self.lock()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.lock()?.records.len() == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Flows>, Error> {
        self.flows.lock().map_err(|_| {
            warn!("Memory flow store lock is poisoned");
            store_error(StoreErrorKind::Unavailable, "memory flow store lock poisoned")
        })
    }
}

impl Default for MemoryFlowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn insert(&self, flow: NewFlow) -> Result<FlowRecord, Error> {
        let mut flows = self.lock()?;

        if flows.by_device_code_hash.contains_key(&flow.device_code_hash)
            || flows.by_user_code.contains_key(&flow.user_code)
            || flows.records.get(&flow.id).is_some()
        {
            return Err(store_error(
                StoreErrorKind::Conflict,
                "device code hash or user code already exists",
            ));
        }

        let record = flow.into_record();
        flows
            .by_device_code_hash
            .insert(record.device_code_hash.clone(), record.id);
        flows.by_user_code.insert(record.user_code.clone(), record.id);

        if let Some((evicted_id, evicted)) = flows.records.insert(record.id, record.clone()) {
            debug!("Evicting flow {} to stay within capacity", evicted_id);
            flows.by_device_code_hash.remove(&evicted.device_code_hash);
            flows.by_user_code.remove(&evicted.user_code);
        }

        Ok(record)
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<FlowRecord>, Error> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    async fn find_by_device_code_hash(
        &self,
        device_code_hash: &str,
    ) -> Result<Option<FlowRecord>, Error> {
        let flows = self.lock()?;
        Ok(flows.lookup(flows.by_device_code_hash.get(device_code_hash)))
    }

    async fn find_by_user_code(&self, user_code: &str) -> Result<Option<FlowRecord>, Error> {
        let flows = self.lock()?;
        Ok(flows.lookup(flows.by_user_code.get(user_code)))
    }

    async fn approve(&self, id: Id, approval: Approval) -> Result<bool, Error> {
        let mut flows = self.lock()?;
        let Some(flow) = flows.records.get_mut(&id) else {
            return Ok(false);
        };

        if flow.status != FlowStatus::Pending || approval.approved_at >= flow.expires_at {
            return Ok(false);
        }

        flow.status = FlowStatus::Approved;
        flow.approved_at = Some(approval.approved_at);
        flow.approved_by_external_id = Some(approval.approved_by_external_id);
        flow.access_token = Some(approval.access_token);
        flow.access_token_expires_at = approval.access_token_expires_at;
        Ok(true)
    }

    async fn touch_poll(
        &self,
        id: Id,
        observed: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut flows = self.lock()?;
        let Some(flow) = flows.records.get_mut(&id) else {
            return Ok(false);
        };

        if flow.status == FlowStatus::Expired || flow.last_polled_at != observed {
            return Ok(false);
        }

        flow.last_polled_at = Some(now);
        Ok(true)
    }

    async fn consume(&self, id: Id, now: DateTime<Utc>) -> Result<bool, Error> {
        let mut flows = self.lock()?;
        let Some(flow) = flows.records.get_mut(&id) else {
            return Ok(false);
        };

        if flow.status != FlowStatus::Approved || flow.access_token.is_none() {
            return Ok(false);
        }

        flow.status = FlowStatus::Consumed;
        flow.consumed_at = Some(now);
        flow.access_token = None;
        flow.access_token_expires_at = None;
        Ok(true)
    }

    async fn expire(&self, id: Id) -> Result<bool, Error> {
        let mut flows = self.lock()?;
        let Some(flow) = flows.records.get_mut(&id) else {
            return Ok(false);
        };

        if flow.status.is_terminal() {
            return Ok(false);
        }

        flow.status = FlowStatus::Expired;
        flow.access_token = None;
        Ok(true)
    }

    async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut flows = self.lock()?;
        let mut expired = 0;

        for flow in flows.records.values_mut() {
            if !flow.status.is_terminal() && flow.is_lapsed(now) {
                flow.status = FlowStatus::Expired;
                flow.access_token = None;
                expired += 1;
            }
        }

        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Duration;
    use std::sync::Arc;
    use tokio::sync::Barrier;

    fn new_flow(hash: &str, user_code: &str, now: DateTime<Utc>) -> NewFlow {
        NewFlow {
            id: Id::new_v4(),
            device_code_hash: hash.to_string(),
            user_code: user_code.to_string(),
            created_at: now,
            expires_at: now + Duration::minutes(10),
            interval_seconds: 5,
        }
    }

    fn approval(at: DateTime<Utc>) -> Approval {
        Approval {
            approved_at: at,
            approved_by_external_id: "user-1".to_string(),
            access_token: "token".to_string(),
            access_token_expires_at: Some(42),
        }
    }

    #[test]
    fn bounded_cache_evicts_oldest_insertion() {
        let mut cache = BoundedCache::new(2);
        assert!(cache.insert("a", 1).is_none());
        assert!(cache.insert("b", 2).is_none());
        assert!(cache.insert("a", 10).is_none());

        assert_eq!(cache.insert("c", 3), Some(("a", 10)));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&"a").is_none());
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn bounded_cache_zero_capacity_holds_one_entry() {
        let mut cache = BoundedCache::new(0);
        assert!(cache.insert(1, "one").is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.insert(2, "two"), Some((1, "one")));
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_codes() {
        let store = MemoryFlowStore::new();
        let now = Utc::now();
        store.insert(new_flow("h1", "AAAA-AAAA", now)).await.unwrap();

        let same_hash = store.insert(new_flow("h1", "BBBB-BBBB", now)).await;
        assert_eq!(
            same_hash.unwrap_err().error_kind,
            ErrorKind::Store(StoreErrorKind::Conflict)
        );

        let same_user_code = store.insert(new_flow("h2", "AAAA-AAAA", now)).await;
        assert_eq!(
            same_user_code.unwrap_err().error_kind,
            ErrorKind::Store(StoreErrorKind::Conflict)
        );
    }

    #[tokio::test]
    async fn eviction_clears_secondary_indexes() {
        let store = MemoryFlowStore::with_capacity(1);
        let now = Utc::now();
        store.insert(new_flow("h1", "AAAA-AAAA", now)).await.unwrap();
        store.insert(new_flow("h2", "BBBB-BBBB", now)).await.unwrap();

        assert!(store.find_by_device_code_hash("h1").await.unwrap().is_none());
        assert!(store.find_by_user_code("AAAA-AAAA").await.unwrap().is_none());
        assert!(store.find_by_user_code("BBBB-BBBB").await.unwrap().is_some());
        assert_eq!(store.len().unwrap(), 1);

        // The evicted codes are free again.
        store.insert(new_flow("h1", "AAAA-AAAA", now)).await.unwrap();
    }

    #[tokio::test]
    async fn approve_only_from_pending_before_deadline() {
        let store = MemoryFlowStore::new();
        let now = Utc::now();
        let flow = store.insert(new_flow("h", "AAAA-AAAA", now)).await.unwrap();

        assert!(!store
            .approve(flow.id, approval(flow.expires_at))
            .await
            .unwrap());
        assert!(store.approve(flow.id, approval(now)).await.unwrap());
        assert!(!store.approve(flow.id, approval(now)).await.unwrap());

        let approved = store.find_by_id(flow.id).await.unwrap().unwrap();
        assert_eq!(approved.status, FlowStatus::Approved);
        assert_eq!(approved.access_token.as_deref(), Some("token"));
        assert_eq!(approved.access_token_expires_at, Some(42));
        assert_eq!(approved.approved_by_external_id.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn consume_erases_token_once() {
        let store = MemoryFlowStore::new();
        let now = Utc::now();
        let flow = store.insert(new_flow("h", "AAAA-AAAA", now)).await.unwrap();
        assert!(!store.consume(flow.id, now).await.unwrap());

        store.approve(flow.id, approval(now)).await.unwrap();
        assert!(store.consume(flow.id, now).await.unwrap());
        assert!(!store.consume(flow.id, now).await.unwrap());

        let consumed = store.find_by_id(flow.id).await.unwrap().unwrap();
        assert_eq!(consumed.status, FlowStatus::Consumed);
        assert_eq!(consumed.consumed_at, Some(now));
        assert!(consumed.access_token.is_none());
        assert!(consumed.access_token_expires_at.is_none());
    }

    #[tokio::test]
    async fn touch_poll_compares_last_poll() {
        let store = MemoryFlowStore::new();
        let now = Utc::now();
        let flow = store.insert(new_flow("h", "AAAA-AAAA", now)).await.unwrap();

        assert!(store.touch_poll(flow.id, None, now).await.unwrap());
        assert!(!store.touch_poll(flow.id, None, now).await.unwrap());

        let later = now + Duration::seconds(5);
        assert!(store.touch_poll(flow.id, Some(now), later).await.unwrap());

        store.expire(flow.id).await.unwrap();
        assert!(!store
            .touch_poll(flow.id, Some(later), later + Duration::seconds(5))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn expire_skips_terminal_flows_and_erases_token() {
        let store = MemoryFlowStore::new();
        let now = Utc::now();
        let flow = store.insert(new_flow("h", "AAAA-AAAA", now)).await.unwrap();
        store.approve(flow.id, approval(now)).await.unwrap();

        assert!(store.expire(flow.id).await.unwrap());
        assert!(!store.expire(flow.id).await.unwrap());

        let expired = store.find_by_id(flow.id).await.unwrap().unwrap();
        assert_eq!(expired.status, FlowStatus::Expired);
        assert!(expired.access_token.is_none());
    }

    #[tokio::test]
    async fn expire_lapsed_only_touches_live_flows_past_deadline() {
        let store = MemoryFlowStore::new();
        let now = Utc::now();
        let old = store.insert(new_flow("h1", "AAAA-AAAA", now)).await.unwrap();
        let consumed = store.insert(new_flow("h2", "BBBB-BBBB", now)).await.unwrap();
        store.approve(consumed.id, approval(now)).await.unwrap();
        store.consume(consumed.id, now).await.unwrap();
        let fresh = store
            .insert(new_flow("h3", "CCCC-CCCC", now + Duration::minutes(5)))
            .await
            .unwrap();

        let expired = store
            .expire_lapsed(now + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(expired, 1);

        for (id, status) in [
            (old.id, FlowStatus::Expired),
            (consumed.id, FlowStatus::Consumed),
            (fresh.id, FlowStatus::Pending),
        ] {
            assert_eq!(store.find_by_id(id).await.unwrap().unwrap().status, status);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn racing_consumers_consume_once() {
        let store = Arc::new(MemoryFlowStore::new());
        let now = Utc::now();
        let flow = store.insert(new_flow("h", "AAAA-AAAA", now)).await.unwrap();
        store.approve(flow.id, approval(now)).await.unwrap();

        let barrier = Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    store.consume(flow.id, now).await.unwrap()
                })
            })
            .collect();

        let mut consumed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                consumed += 1;
            }
        }
        assert_eq!(consumed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn racing_approvals_approve_once() {
        let store = Arc::new(MemoryFlowStore::new());
        let now = Utc::now();
        let flow = store.insert(new_flow("h", "AAAA-AAAA", now)).await.unwrap();

        let barrier = Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    let approval = Approval {
                        access_token: format!("token-{i}"),
                        ..approval(now)
                    };
                    barrier.wait().await;
                    store
                        .approve(flow.id, approval.clone())
                        .await
                        .unwrap()
                        .then_some(approval.access_token)
                })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            if let Some(token) = handle.await.unwrap() {
                winners.push(token);
            }
        }
        assert_eq!(winners.len(), 1);

        let approved = store.find_by_id(flow.id).await.unwrap().unwrap();
        assert_eq!(approved.access_token.as_ref(), winners.first());
    }
}
