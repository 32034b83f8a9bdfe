//! The device flow state machine and its three protocol operations.

use chrono::{DateTime, Utc};
use log::*;

use crate::codes::{normalize_user_code, CodeGenerator, RandomCodes};
use crate::error::{Error, ErrorKind, StoreErrorKind};
use crate::flow::{
    Approval, ApproveResponse, ApproveStatus, CallerIdentity, FlowRecord, FlowSettings,
    FlowStatus, NewFlow, PollResponse, StartResponse,
};
use crate::hasher::DeviceCodeHasher;
use crate::store::FlowStore;
use crate::Id;

/// Candidates drawn per collision domain before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Drives flows through `pending -> approved -> consumed`, with `expired` reachable from
/// any non-terminal status once the deadline passes.
///
/// Expiry is checked lazily on every operation. Every write goes through a conditional
/// store transition, so concurrent callers cannot both win the same transition.
pub struct Manager<S: FlowStore> {
    store: S,
    hasher: DeviceCodeHasher,
    settings: FlowSettings,
    codes: Box<dyn CodeGenerator>,
}

impl<S: FlowStore> Manager<S> {
    pub fn new(store: S, pepper: String, settings: FlowSettings) -> Self {
        Self {
            store,
            hasher: DeviceCodeHasher::new(pepper),
            settings,
            codes: Box::new(RandomCodes),
        }
    }

    /// Replace the source of candidate codes.
    pub fn with_code_generator(mut self, codes: impl CodeGenerator + 'static) -> Self {
        self.codes = Box::new(codes);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// Begin a new flow. No caller identity is required.
    pub async fn start(&self) -> Result<StartResponse, Error> {
        self.start_at(Utc::now()).await
    }

    pub async fn start_at(&self, now: DateTime<Utc>) -> Result<StartResponse, Error> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let (device_code, device_code_hash) = self.unique_device_code().await?;
            let user_code = self.unique_user_code().await?;

            let new_flow = NewFlow {
                id: Id::new_v4(),
                device_code_hash,
                user_code,
                created_at: now,
                expires_at: now + self.settings.lifetime,
                interval_seconds: self.settings.interval_seconds,
            };

            match self.store.insert(new_flow).await {
                Ok(flow) => {
                    info!("Started device flow {}", flow.id);
                    return Ok(StartResponse {
                        device_code,
                        user_code: flow.user_code,
                        interval: flow.interval_seconds,
                        expires_in: (flow.expires_at - flow.created_at).num_seconds(),
                        verification_path: self.settings.verification_path.clone(),
                    });
                }
                // Lost a race for one of the codes between the lookup and the insert.
                Err(err) if err.error_kind == ErrorKind::Store(StoreErrorKind::Conflict) => {
                    warn!("Device flow codes were taken concurrently, drawing new codes");
                }
                Err(err) => return Err(err),
            }
        }

        error!(
            "Could not insert a device flow after {} attempts, check the randomness source and store",
            MAX_CODE_ATTEMPTS
        );
        Err(ErrorKind::CodeGeneration.into())
    }

    /// Approve the flow identified by `user_code`, attaching the token to hand to the device.
    pub async fn approve(
        &self,
        caller: Option<&CallerIdentity>,
        user_code: &str,
        access_token: &str,
        access_token_expires_at: Option<i64>,
    ) -> Result<ApproveResponse, Error> {
        self.approve_at(
            caller,
            user_code,
            access_token,
            access_token_expires_at,
            Utc::now(),
        )
        .await
    }

    pub async fn approve_at(
        &self,
        caller: Option<&CallerIdentity>,
        user_code: &str,
        access_token: &str,
        access_token_expires_at: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ApproveResponse, Error> {
        let caller = caller.ok_or_else(|| {
            warn!("Rejecting device flow approval without an authenticated caller");
            Error::from(ErrorKind::Unauthorized)
        })?;

        let user_code = normalize_user_code(user_code);
        if user_code.is_empty() {
            return Err(ErrorKind::InvalidUserCode.into());
        }

        let flow = self
            .store
            .find_by_user_code(&user_code)
            .await?
            .ok_or_else(|| {
                debug!("Approval attempted with an unknown user code");
                Error::from(ErrorKind::InvalidUserCode)
            })?;

        if let Some(status) = self.settled_approval(&flow, now).await? {
            return Ok(status.into());
        }

        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(ErrorKind::MissingAccessToken.into());
        }

        let approval = Approval {
            approved_at: now,
            approved_by_external_id: caller.external_id.clone(),
            access_token: access_token.to_string(),
            access_token_expires_at,
        };

        if self.store.approve(flow.id, approval).await? {
            info!(
                "Device flow {} approved by {}",
                flow.id, caller.external_id
            );
            return Ok(ApproveStatus::Approved.into());
        }

        // Another approval or an expiry won the race; report what it left behind.
        let current = self
            .store
            .find_by_id(flow.id)
            .await?
            .ok_or_else(|| Error::from(ErrorKind::InvalidUserCode))?;

        let status = match self.settled_approval(&current, now).await? {
            Some(status) => status,
            None => ApproveStatus::Expired,
        };
        debug!(
            "Approval of device flow {} lost a concurrent update: {:?}",
            flow.id, status
        );
        Ok(status.into())
    }

    /// Exchange a device code for the escorted token once the flow is approved.
    ///
    /// Unknown and malformed device codes are reported as `InvalidGrant`, never as errors.
    pub async fn poll(&self, device_code: &str) -> Result<PollResponse, Error> {
        self.poll_at(device_code, Utc::now()).await
    }

    pub async fn poll_at(
        &self,
        device_code: &str,
        now: DateTime<Utc>,
    ) -> Result<PollResponse, Error> {
        let device_code = device_code.trim();
        if device_code.is_empty() {
            return Ok(PollResponse::InvalidGrant);
        }

        let device_code_hash = self.hasher.hash(device_code);
        let Some(flow) = self
            .store
            .find_by_device_code_hash(&device_code_hash)
            .await?
        else {
            debug!("Poll with an unknown device code");
            return Ok(PollResponse::InvalidGrant);
        };

        if flow.status == FlowStatus::Expired || flow.is_lapsed(now) {
            self.expire_if_live(&flow).await?;
            return Ok(PollResponse::ExpiredToken);
        }

        if flow.polled_too_soon(now) {
            debug!("Device flow {} polled faster than its interval", flow.id);
            return Ok(PollResponse::SlowDown {
                interval: flow.interval_seconds,
            });
        }

        if !self
            .store
            .touch_poll(flow.id, flow.last_polled_at, now)
            .await?
        {
            // A concurrent poll was accepted first, so this one arrived inside the interval.
            return Ok(PollResponse::SlowDown {
                interval: flow.interval_seconds,
            });
        }

        match (&flow.status, &flow.access_token) {
            (FlowStatus::Pending, _) => Ok(PollResponse::AuthorizationPending {
                interval: flow.interval_seconds,
            }),
            (FlowStatus::Approved, Some(access_token)) => {
                if !self.store.consume(flow.id, now).await? {
                    debug!("Device flow {} was consumed concurrently", flow.id);
                    return Ok(PollResponse::InvalidGrant);
                }

                info!("Device flow {} consumed", flow.id);
                Ok(PollResponse::Success {
                    access_token: access_token.clone(),
                    access_token_expires_at: flow.access_token_expires_at,
                })
            }
            _ => Ok(PollResponse::InvalidGrant),
        }
    }

    /// Expire every lapsed flow that is still pending or approved.
    pub async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let expired = self.store.expire_lapsed(now).await?;
        if expired > 0 {
            info!("Expired {} lapsed device flows", expired);
        }
        Ok(expired)
    }

    /// The approval outcome for a flow that can no longer be approved, or `None` while it
    /// is still pending and within its lifetime.
    async fn settled_approval(
        &self,
        flow: &FlowRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<ApproveStatus>, Error> {
        if flow.is_lapsed(now) {
            self.expire_if_live(flow).await?;
            return Ok(Some(ApproveStatus::Expired));
        }

        Ok(match flow.status {
            FlowStatus::Pending => None,
            FlowStatus::Approved => Some(ApproveStatus::AlreadyApproved),
            FlowStatus::Consumed => Some(ApproveStatus::AlreadyUsed),
            FlowStatus::Expired => Some(ApproveStatus::Expired),
        })
    }

    async fn expire_if_live(&self, flow: &FlowRecord) -> Result<(), Error> {
        if flow.status.is_terminal() {
            return Ok(());
        }

        if self.store.expire(flow.id).await? {
            info!("Device flow {} expired", flow.id);
        }
        Ok(())
    }

    async fn unique_device_code(&self) -> Result<(String, String), Error> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let device_code = self.codes.device_code();
            let device_code_hash = self.hasher.hash(&device_code);
            if self
                .store
                .find_by_device_code_hash(&device_code_hash)
                .await?
                .is_none()
            {
                return Ok((device_code, device_code_hash));
            }
            warn!("Generated device code collided with an existing flow");
        }

        error!(
            "Device code generation collided {} times in a row",
            MAX_CODE_ATTEMPTS
        );
        Err(ErrorKind::CodeGeneration.into())
    }

    async fn unique_user_code(&self) -> Result<String, Error> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let user_code = self.codes.user_code();
            if self.store.find_by_user_code(&user_code).await?.is_none() {
                return Ok(user_code);
            }
            warn!("Generated user code collided with an existing flow");
        }

        error!(
            "User code generation collided {} times in a row",
            MAX_CODE_ATTEMPTS
        );
        Err(ErrorKind::CodeGeneration.into())
    }
}
