pub(crate) mod authenticated_caller;

use axum::http::StatusCode;

type RejectionType = (StatusCode, String);
