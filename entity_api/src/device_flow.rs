//! Queries and conditional transitions for the device_flows table.
//!
//! Each transition is a single `UPDATE ... WHERE <guard>` so Postgres decides the winner
//! when several requests race on the same row. The returned `bool` reports whether the
//! guard held.

use super::error::{EntityApiErrorKind, Error};
use chrono::{DateTime, Utc};
use entity::device_flow_status::DeviceFlowStatus;
use entity::device_flows::{ActiveModel, Column, Entity, Model};
use entity::Id;
use log::*;
use sea_orm::{
    entity::prelude::*, sea_query::Expr, ActiveValue::Set, DatabaseConnection, TryIntoModel,
};

/// Fields of a new pending flow.
#[derive(Debug, Clone)]
pub struct NewDeviceFlow {
    pub id: Id,
    pub device_code_hash: String,
    pub user_code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub interval_seconds: i32,
}

/// Inserts a new pending flow
pub async fn create(db: &DatabaseConnection, flow: NewDeviceFlow) -> Result<Model, Error> {
    debug!("Creating new device flow: {}", flow.id);

    let active_model = ActiveModel {
        id: Set(flow.id),
        device_code_hash: Set(flow.device_code_hash),
        user_code: Set(flow.user_code),
        status: Set(DeviceFlowStatus::Pending),
        created_at: Set(flow.created_at.into()),
        expires_at: Set(flow.expires_at.into()),
        interval_seconds: Set(flow.interval_seconds),
        last_polled_at: Set(None),
        approved_at: Set(None),
        approved_by_external_id: Set(None),
        consumed_at: Set(None),
        access_token: Set(None),
        access_token_expires_at: Set(None),
    };

    Ok(active_model.insert(db).await?.try_into_model()?)
}

/// Finds a flow by ID
pub async fn find_by_id(db: &DatabaseConnection, id: Id) -> Result<Model, Error> {
    Entity::find_by_id(id).one(db).await?.ok_or_else(|| Error {
        source: None,
        error_kind: EntityApiErrorKind::RecordNotFound,
    })
}

/// Finds a flow by the hash of its device code
pub async fn find_by_device_code_hash(
    db: &DatabaseConnection,
    device_code_hash: &str,
) -> Result<Option<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::DeviceCodeHash.eq(device_code_hash))
        .one(db)
        .await?)
}

/// Finds a flow by its normalized user code
pub async fn find_by_user_code(
    db: &DatabaseConnection,
    user_code: &str,
) -> Result<Option<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::UserCode.eq(user_code))
        .one(db)
        .await?)
}

/// Moves a pending, unexpired flow to approved and stores the escorted token
pub async fn approve(
    db: &DatabaseConnection,
    id: Id,
    approved_at: DateTime<Utc>,
    approved_by_external_id: &str,
    access_token: String,
    access_token_expires_at: Option<i64>,
) -> Result<bool, Error> {
    let approved_at: DateTimeWithTimeZone = approved_at.into();

    let result = Entity::update_many()
        .col_expr(
            Column::Status,
            Column::Status.save_as(Expr::val(DeviceFlowStatus::Approved)),
        )
        .col_expr(Column::ApprovedAt, Expr::value(Some(approved_at)))
        .col_expr(
            Column::ApprovedByExternalId,
            Expr::value(Some(approved_by_external_id.to_string())),
        )
        .col_expr(Column::AccessToken, Expr::value(Some(access_token)))
        .col_expr(
            Column::AccessTokenExpiresAt,
            Expr::value(access_token_expires_at),
        )
        .filter(Column::Id.eq(id))
        .filter(Column::Status.eq(DeviceFlowStatus::Pending))
        .filter(Column::ExpiresAt.gt(approved_at))
        .exec(db)
        .await?;

    debug!(
        "Approve device flow {id}: {} row(s) affected",
        result.rows_affected
    );
    Ok(result.rows_affected == 1)
}

/// Stamps `last_polled_at` if no other poll was accepted since `observed` was read
pub async fn touch_last_polled(
    db: &DatabaseConnection,
    id: Id,
    observed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<bool, Error> {
    let now: DateTimeWithTimeZone = now.into();
    let last_polled_guard = match observed {
        Some(observed) => {
            let observed: DateTimeWithTimeZone = observed.into();
            Column::LastPolledAt.eq(observed)
        }
        None => Column::LastPolledAt.is_null(),
    };

    let result = Entity::update_many()
        .col_expr(Column::LastPolledAt, Expr::value(Some(now)))
        .filter(Column::Id.eq(id))
        .filter(Column::Status.ne(DeviceFlowStatus::Expired))
        .filter(last_polled_guard)
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Moves an approved flow to consumed and erases the token
pub async fn consume(db: &DatabaseConnection, id: Id, now: DateTime<Utc>) -> Result<bool, Error> {
    let now: DateTimeWithTimeZone = now.into();

    let result = Entity::update_many()
        .col_expr(
            Column::Status,
            Column::Status.save_as(Expr::val(DeviceFlowStatus::Consumed)),
        )
        .col_expr(Column::ConsumedAt, Expr::value(Some(now)))
        .col_expr(Column::AccessToken, Expr::value(Option::<String>::None))
        .col_expr(Column::AccessTokenExpiresAt, Expr::value(Option::<i64>::None))
        .filter(Column::Id.eq(id))
        .filter(Column::Status.eq(DeviceFlowStatus::Approved))
        .filter(Column::AccessToken.is_not_null())
        .exec(db)
        .await?;

    debug!(
        "Consume device flow {id}: {} row(s) affected",
        result.rows_affected
    );
    Ok(result.rows_affected == 1)
}

/// Moves a pending or approved flow to expired and erases any token
pub async fn expire(db: &DatabaseConnection, id: Id) -> Result<bool, Error> {
    let result = expire_live()
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Expires every pending or approved flow whose deadline is at or before `now`
pub async fn expire_lapsed(db: &DatabaseConnection, now: DateTime<Utc>) -> Result<u64, Error> {
    let now: DateTimeWithTimeZone = now.into();

    let result = expire_live()
        .filter(Column::ExpiresAt.lte(now))
        .exec(db)
        .await?;

    info!("Expired {} lapsed device flow(s)", result.rows_affected);
    Ok(result.rows_affected)
}

fn expire_live() -> sea_orm::UpdateMany<Entity> {
    Entity::update_many()
        .col_expr(
            Column::Status,
            Column::Status.save_as(Expr::val(DeviceFlowStatus::Expired)),
        )
        .col_expr(Column::AccessToken, Expr::value(Option::<String>::None))
        .filter(Column::Status.is_in([DeviceFlowStatus::Pending, DeviceFlowStatus::Approved]))
}

#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn flow_model(now: DateTime<Utc>) -> Model {
        Model {
            id: Id::new_v4(),
            device_code_hash: "a1b2c3".to_owned(),
            user_code: "ABCD-EFGH".to_owned(),
            status: DeviceFlowStatus::Pending,
            created_at: now.into(),
            expires_at: (now + chrono::Duration::minutes(10)).into(),
            interval_seconds: 5,
            last_polled_at: None,
            approved_at: None,
            approved_by_external_id: None,
            consumed_at: None,
            access_token: None,
            access_token_expires_at: None,
        }
    }

    fn rows_affected(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn create_returns_a_new_pending_flow() -> Result<(), Error> {
        let now = Utc::now();
        let flow_model = flow_model(now);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![flow_model.clone()]])
            .into_connection();

        let flow = create(
            &db,
            NewDeviceFlow {
                id: flow_model.id,
                device_code_hash: flow_model.device_code_hash.clone(),
                user_code: flow_model.user_code.clone(),
                created_at: now,
                expires_at: now + chrono::Duration::minutes(10),
                interval_seconds: 5,
            },
        )
        .await?;

        assert_eq!(flow.id, flow_model.id);
        assert_eq!(flow.status, DeviceFlowStatus::Pending);

        Ok(())
    }

    #[tokio::test]
    async fn find_by_id_returns_error_when_flow_not_found() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<Model>::new()])
            .into_connection();

        let result = find_by_id(&db, Id::new_v4()).await;

        assert_eq!(
            result.unwrap_err().error_kind,
            EntityApiErrorKind::RecordNotFound
        );

        Ok(())
    }

    #[tokio::test]
    async fn find_by_user_code_filters_on_the_user_code() -> Result<(), Error> {
        let flow_model = flow_model(Utc::now());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![flow_model.clone()]])
            .into_connection();

        let flow = find_by_user_code(&db, "ABCD-EFGH").await?;
        assert_eq!(flow, Some(flow_model));

        assert_eq!(db.into_transaction_log().len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn find_by_device_code_hash_returns_none_when_missing() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<Model>::new()])
            .into_connection();

        assert_eq!(find_by_device_code_hash(&db, "missing").await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn approve_reports_whether_the_guard_held() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![rows_affected(1), rows_affected(0)])
            .into_connection();

        let id = Id::new_v4();
        let now = Utc::now();
        assert!(approve(&db, id, now, "user-1", "token".to_owned(), Some(42)).await?);
        assert!(!approve(&db, id, now, "user-1", "token".to_owned(), None).await?);

        Ok(())
    }

    #[tokio::test]
    async fn consume_guards_on_approved_status() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![rows_affected(1)])
            .into_connection();

        let id = Id::new_v4();
        assert!(consume(&db, id, Utc::now()).await?);

        Ok(())
    }

    #[tokio::test]
    async fn touch_last_polled_guards_on_the_observed_value() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![rows_affected(1), rows_affected(0)])
            .into_connection();

        let id = Id::new_v4();
        let now = Utc::now();
        assert!(touch_last_polled(&db, id, None, now).await?);
        assert!(!touch_last_polled(&db, id, Some(now), now).await?);

        assert_eq!(db.into_transaction_log().len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn expire_lapsed_returns_rows_affected() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![rows_affected(3)])
            .into_connection();

        assert_eq!(expire_lapsed(&db, Utc::now()).await?, 3);

        Ok(())
    }

    #[tokio::test]
    async fn expire_reports_false_when_flow_already_terminal() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![rows_affected(0)])
            .into_connection();

        let id = Id::new_v4();
        assert!(!expire(&db, id).await?);

        Ok(())
    }
}
