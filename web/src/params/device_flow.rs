use serde::Deserialize;
use utoipa::ToSchema;

/// Body of `POST /device/approve`, sent by the signed-in browser session.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApproveParams {
    pub(crate) user_code: String,
    pub(crate) access_token: String,
    /// Opaque expiry of the escorted token, passed through to the device unchanged.
    #[serde(default)]
    pub(crate) access_token_expires_at: Option<i64>,
}

/// Body of `POST /device/token`.
///
/// A missing `deviceCode` deserializes to an empty string so the poll answers
/// `invalid_grant` rather than rejecting the request.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenParams {
    #[serde(default)]
    pub(crate) device_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn approve_params_read_camel_case() {
        let params: ApproveParams = serde_json::from_value(json!({
            "userCode": "ABCD-EFGH",
            "accessToken": "token",
            "accessTokenExpiresAt": 1767272400000_i64
        }))
        .unwrap();

        assert_eq!(params.user_code, "ABCD-EFGH");
        assert_eq!(params.access_token, "token");
        assert_eq!(params.access_token_expires_at, Some(1_767_272_400_000));
    }

    #[test]
    fn token_params_tolerate_a_missing_device_code() {
        let params: TokenParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.device_code, "");
    }
}
