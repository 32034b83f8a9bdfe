//! Flow record and protocol types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Id;

/// Lifetime of a flow from creation to expiry.
pub const DEFAULT_FLOW_LIFETIME_SECS: i64 = 600;

/// Minimum seconds between two accepted polls.
pub const DEFAULT_POLL_INTERVAL_SECS: i32 = 5;

/// Path of the page where a person enters the user code.
pub const DEFAULT_VERIFICATION_PATH: &str = "/device";

/// Lifecycle status of a flow.
///
/// `Consumed` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Pending,
    Approved,
    Consumed,
    Expired,
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStatus::Consumed | FlowStatus::Expired)
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowStatus::Pending => write!(f, "pending"),
            FlowStatus::Approved => write!(f, "approved"),
            FlowStatus::Consumed => write!(f, "consumed"),
            FlowStatus::Expired => write!(f, "expired"),
        }
    }
}

/// One device authorization attempt as persisted by a `FlowStore`.
#[derive(Clone, PartialEq, Eq)]
pub struct FlowRecord {
    pub id: Id,
    pub device_code_hash: String,
    pub user_code: String,
    pub status: FlowStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub interval_seconds: i32,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by_external_id: Option<String>,
    pub consumed_at: Option<DateTime<Utc>>,
    /// Present only while the flow is approved.
    pub access_token: Option<String>,
    /// Opaque expiry of the escorted token, epoch milliseconds as given by the approver.
    pub access_token_expires_at: Option<i64>,
}

impl FlowRecord {
    /// True once `now` has reached the flow's deadline, whatever its status.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True when a poll at `now` comes too soon after the last accepted poll.
    pub fn polled_too_soon(&self, now: DateTime<Utc>) -> bool {
        self.last_polled_at
            .map(|last| now - last < Duration::seconds(i64::from(self.interval_seconds)))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for FlowRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRecord")
            .field("id", &self.id)
            .field("user_code", &self.user_code)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("interval_seconds", &self.interval_seconds)
            .field("last_polled_at", &self.last_polled_at)
            .field("approved_at", &self.approved_at)
            .field("approved_by_external_id", &self.approved_by_external_id)
            .field("consumed_at", &self.consumed_at)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("access_token_expires_at", &self.access_token_expires_at)
            .finish()
    }
}

/// Fields of a freshly started flow. Everything else starts empty.
#[derive(Debug, Clone)]
pub struct NewFlow {
    pub id: Id,
    pub device_code_hash: String,
    pub user_code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub interval_seconds: i32,
}

impl NewFlow {
    pub fn into_record(self) -> FlowRecord {
        FlowRecord {
            id: self.id,
            device_code_hash: self.device_code_hash,
            user_code: self.user_code,
            status: FlowStatus::Pending,
            created_at: self.created_at,
            expires_at: self.expires_at,
            interval_seconds: self.interval_seconds,
            last_polled_at: None,
            approved_at: None,
            approved_by_external_id: None,
            consumed_at: None,
            access_token: None,
            access_token_expires_at: None,
        }
    }
}

/// Values written by the pending to approved transition.
#[derive(Clone)]
pub struct Approval {
    pub approved_at: DateTime<Utc>,
    pub approved_by_external_id: String,
    pub access_token: String,
    pub access_token_expires_at: Option<i64>,
}

impl std::fmt::Debug for Approval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Approval")
            .field("approved_at", &self.approved_at)
            .field("approved_by_external_id", &self.approved_by_external_id)
            .field("access_token", &"[REDACTED]")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .finish()
    }
}

/// The authenticated identity approving a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub external_id: String,
}

impl CallerIdentity {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
        }
    }
}

/// Tunables fixed at flow creation.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub lifetime: Duration,
    pub interval_seconds: i32,
    pub verification_path: String,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            lifetime: Duration::seconds(DEFAULT_FLOW_LIFETIME_SECS),
            interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            verification_path: DEFAULT_VERIFICATION_PATH.to_string(),
        }
    }
}

/// Result of `start`. The raw device code is only ever returned here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub device_code: String,
    pub user_code: String,
    pub interval: i32,
    pub expires_in: i64,
    pub verification_path: String,
}

/// Outcome of `approve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproveStatus {
    Approved,
    AlreadyApproved,
    AlreadyUsed,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub status: ApproveStatus,
}

impl From<ApproveStatus> for ApproveResponse {
    fn from(status: ApproveStatus) -> Self {
        Self { status }
    }
}

/// Outcome of `poll`.
///
/// Unknown and already consumed device codes both yield `InvalidGrant`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollResponse {
    AuthorizationPending {
        interval: i32,
    },
    SlowDown {
        interval: i32,
    },
    Success {
        #[serde(rename = "accessToken")]
        access_token: String,
        #[serde(
            rename = "accessTokenExpiresAt",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        access_token_expires_at: Option<i64>,
    },
    ExpiredToken,
    InvalidGrant,
}

impl PollResponse {
    /// The wire name of the status.
    pub fn status(&self) -> &'static str {
        match self {
            PollResponse::AuthorizationPending { .. } => "authorization_pending",
            PollResponse::SlowDown { .. } => "slow_down",
            PollResponse::Success { .. } => "success",
            PollResponse::ExpiredToken => "expired_token",
            PollResponse::InvalidGrant => "invalid_grant",
        }
    }
}

impl std::fmt::Debug for PollResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollResponse::AuthorizationPending { interval } => f
                .debug_struct("AuthorizationPending")
                .field("interval", interval)
                .finish(),
            PollResponse::SlowDown { interval } => f
                .debug_struct("SlowDown")
                .field("interval", interval)
                .finish(),
            PollResponse::Success {
                access_token_expires_at,
                ..
            } => f
                .debug_struct("Success")
                .field("access_token", &"[REDACTED]")
                .field("access_token_expires_at", access_token_expires_at)
                .finish(),
            PollResponse::ExpiredToken => write!(f, "ExpiredToken"),
            PollResponse::InvalidGrant => write!(f, "InvalidGrant"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(now: DateTime<Utc>) -> FlowRecord {
        NewFlow {
            id: Id::new_v4(),
            device_code_hash: "hash".to_string(),
            user_code: "ABCD-EFGH".to_string(),
            created_at: now,
            expires_at: now + Duration::seconds(DEFAULT_FLOW_LIFETIME_SECS),
            interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
        }
        .into_record()
    }

    #[test]
    fn lapse_is_inclusive_of_the_deadline() {
        let now = Utc::now();
        let flow = record(now);
        assert!(!flow.is_lapsed(flow.expires_at - Duration::milliseconds(1)));
        assert!(flow.is_lapsed(flow.expires_at));
    }

    #[test]
    fn polled_too_soon_only_within_the_interval() {
        let now = Utc::now();
        let mut flow = record(now);
        assert!(!flow.polled_too_soon(now));

        flow.last_polled_at = Some(now);
        assert!(flow.polled_too_soon(now + Duration::milliseconds(4_999)));
        assert!(!flow.polled_too_soon(now + Duration::seconds(5)));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!FlowStatus::Pending.is_terminal());
        assert!(!FlowStatus::Approved.is_terminal());
        assert!(FlowStatus::Consumed.is_terminal());
        assert!(FlowStatus::Expired.is_terminal());
    }

    #[test]
    fn poll_responses_serialize_with_status_tag() {
        let pending = serde_json::to_value(PollResponse::AuthorizationPending { interval: 5 })
            .unwrap();
        assert_eq!(pending, json!({"status": "authorization_pending", "interval": 5}));

        let success = serde_json::to_value(PollResponse::Success {
            access_token: "tok".to_string(),
            access_token_expires_at: None,
        })
        .unwrap();
        assert_eq!(success, json!({"status": "success", "accessToken": "tok"}));

        let denied = serde_json::to_value(PollResponse::InvalidGrant).unwrap();
        assert_eq!(denied, json!({"status": "invalid_grant"}));
    }

    #[test]
    fn start_response_uses_camel_case_fields() {
        let started = StartResponse {
            device_code: "dc".to_string(),
            user_code: "ABCD-EFGH".to_string(),
            interval: 5,
            expires_in: 600,
            verification_path: "/device".to_string(),
        };
        assert_eq!(
            serde_json::to_value(started).unwrap(),
            json!({
                "deviceCode": "dc",
                "userCode": "ABCD-EFGH",
                "interval": 5,
                "expiresIn": 600,
                "verificationPath": "/device"
            })
        );
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let mut flow = record(Utc::now());
        flow.access_token = Some("secret-token".to_string());
        assert!(!format!("{flow:?}").contains("secret-token"));

        let polled = PollResponse::Success {
            access_token: "secret-token".to_string(),
            access_token_expires_at: Some(1),
        };
        assert!(!format!("{polled:?}").contains("secret-token"));
    }
}
