use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use barangay_core::model::{
    ActorId, AuditRecord, Household, HouseholdId, Resident, ResidentId, ResourceType, UnitCode,
};

use crate::traits::{Page, PageRequest, StorageError};

fn to_storage_error(e: sqlx::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

fn classify(e: sqlx::Error, resource_type: ResourceType, id: String) -> StorageError {
    if let sqlx::Error::Database(ref db_err) = e
        && matches!(db_err.code().as_deref(), Some("40001" | "40P01" | "55P03"))
    {
        return StorageError::Conflict { resource_type, id };
    }
    to_storage_error(e)
}

fn page_bounds(page: PageRequest) -> (i64, i64) {
    let limit = i64::try_from(page.limit + 1).unwrap_or(i64::MAX);
    let offset = i64::try_from(page.offset).unwrap_or(i64::MAX);
    (limit, offset)
}

fn into_page<T>(mut items: Vec<T>, page: PageRequest) -> Page<T> {
    let has_more = items.len() > page.limit;
    items.truncate(page.limit);
    Page {
        next_offset: has_more.then_some(page.offset + page.limit),
        items,
    }
}

async fn fetch_resident(
    conn: &mut PgConnection,
    sql: &'static str,
    id: ResidentId,
) -> Result<Option<Resident>, StorageError> {
    let row: Option<(Json<Resident>,)> = sqlx::query_as(sql)
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| classify(e, ResourceType::Resident, id.to_string()))?;
    Ok(row.map(|(Json(resident),)| resident))
}

async fn fetch_household(
    conn: &mut PgConnection,
    sql: &'static str,
    id: HouseholdId,
) -> Result<Option<Household>, StorageError> {
    let row: Option<(Json<Household>,)> = sqlx::query_as(sql)
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| classify(e, ResourceType::Household, id.to_string()))?;
    Ok(row.map(|(Json(household),)| household))
}

pub async fn select_resident(
    conn: &mut PgConnection,
    id: ResidentId,
) -> Result<Option<Resident>, StorageError> {
    fetch_resident(conn, "SELECT data FROM residents WHERE id = $1", id).await
}

pub async fn select_resident_for_update(
    conn: &mut PgConnection,
    id: ResidentId,
) -> Result<Option<Resident>, StorageError> {
    fetch_resident(conn, "SELECT data FROM residents WHERE id = $1 FOR UPDATE", id).await
}

pub async fn select_household(
    conn: &mut PgConnection,
    id: HouseholdId,
) -> Result<Option<Household>, StorageError> {
    fetch_household(conn, "SELECT data FROM households WHERE id = $1", id).await
}

pub async fn select_household_for_update(
    conn: &mut PgConnection,
    id: HouseholdId,
) -> Result<Option<Household>, StorageError> {
    fetch_household(conn, "SELECT data FROM households WHERE id = $1 FOR UPDATE", id).await
}

pub async fn select_household_members(
    conn: &mut PgConnection,
    id: HouseholdId,
) -> Result<Vec<Resident>, StorageError> {
    let rows: Vec<(Json<Resident>,)> =
        sqlx::query_as("SELECT data FROM residents WHERE household_id = $1 ORDER BY id")
            .bind(id.as_uuid())
            .fetch_all(conn)
            .await
            .map_err(to_storage_error)?;
    Ok(rows.into_iter().map(|(Json(r),)| r).collect())
}

pub async fn select_residents_by_unit(
    conn: &mut PgConnection,
    unit_code: &UnitCode,
    page: PageRequest,
) -> Result<Page<Resident>, StorageError> {
    let (limit, offset) = page_bounds(page);
    let rows: Vec<(Json<Resident>,)> = sqlx::query_as(
        "SELECT data FROM residents WHERE unit_code = $1 ORDER BY id LIMIT $2 OFFSET $3",
    )
    .bind(unit_code.as_str())
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await
    .map_err(to_storage_error)?;
    Ok(into_page(
        rows.into_iter().map(|(Json(r),)| r).collect(),
        page,
    ))
}

pub async fn select_households_by_unit(
    conn: &mut PgConnection,
    unit_code: &UnitCode,
    page: PageRequest,
) -> Result<Page<Household>, StorageError> {
    let (limit, offset) = page_bounds(page);
    let rows: Vec<(Json<Household>,)> = sqlx::query_as(
        "SELECT data FROM households WHERE unit_code = $1 ORDER BY id LIMIT $2 OFFSET $3",
    )
    .bind(unit_code.as_str())
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await
    .map_err(to_storage_error)?;
    Ok(into_page(
        rows.into_iter().map(|(Json(h),)| h).collect(),
        page,
    ))
}

pub async fn upsert_resident(
    conn: &mut PgConnection,
    resident: &Resident,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO residents (id, unit_code, household_id, is_active, data)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE SET
            unit_code = EXCLUDED.unit_code,
            household_id = EXCLUDED.household_id,
            is_active = EXCLUDED.is_active,
            data = EXCLUDED.data,
            version = residents.version + 1,
            updated_at = now()
        "#,
    )
    .bind(resident.id.as_uuid())
    .bind(resident.unit_code().as_str())
    .bind(resident.household_id.map(|h| *h.as_uuid()))
    .bind(resident.is_active)
    .bind(Json(resident))
    .execute(conn)
    .await
    .map_err(|e| classify(e, ResourceType::Resident, resident.id.to_string()))?;
    Ok(())
}

pub async fn upsert_household(
    conn: &mut PgConnection,
    household: &Household,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO households (id, unit_code, data)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET
            unit_code = EXCLUDED.unit_code,
            data = EXCLUDED.data,
            version = households.version + 1,
            updated_at = now()
        "#,
    )
    .bind(household.id.as_uuid())
    .bind(household.unit_code().as_str())
    .bind(Json(household))
    .execute(conn)
    .await
    .map_err(|e| classify(e, ResourceType::Household, household.id.to_string()))?;
    Ok(())
}

pub async fn insert_audit_record(
    conn: &mut PgConnection,
    record: &AuditRecord,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO audit_records
            (id, actor_id, action, resource_type, resource_id, before_state, after_state, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(record.id)
    .bind(record.actor_id.as_str())
    .bind(record.action.as_str())
    .bind(record.resource_type.as_str())
    .bind(&record.resource_id)
    .bind(record.before.as_ref().map(Json))
    .bind(Json(&record.after))
    .bind(record.timestamp)
    .execute(conn)
    .await
    .map_err(|e| StorageError::AuditWriteFailed(e.to_string()))?;
    Ok(())
}

type AuditRow = (
    Uuid,
    String,
    String,
    String,
    String,
    Option<Json<serde_json::Value>>,
    Json<serde_json::Value>,
    DateTime<Utc>,
);

pub async fn select_audit_records(
    pool: &PgPool,
    resource_id: &str,
) -> Result<Vec<AuditRecord>, StorageError> {
    let rows: Vec<AuditRow> = sqlx::query_as(
        r#"
        SELECT id, actor_id, action, resource_type, resource_id, before_state, after_state, recorded_at
        FROM audit_records
        WHERE resource_id = $1
        ORDER BY seq
        "#,
    )
    .bind(resource_id)
    .fetch_all(pool)
    .await
    .map_err(to_storage_error)?;

    rows.into_iter()
        .map(
            |(id, actor_id, action, resource_type, resource_id, before, Json(after), timestamp)| {
                Ok(AuditRecord {
                    id,
                    actor_id: ActorId::new(actor_id),
                    action: action.parse().map_err(StorageError::Internal)?,
                    resource_type: resource_type.parse().map_err(StorageError::Internal)?,
                    resource_id,
                    before: before.map(|Json(v)| v),
                    after,
                    timestamp,
                })
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_fetch_one_extra_row() {
        assert_eq!(page_bounds(PageRequest::new(40, 20)), (21, 40));
    }

    #[test]
    fn full_extra_row_signals_next_page() {
        let page = into_page(vec![1, 2, 3], PageRequest::new(10, 2));

        assert_eq!(page.items, vec![1, 2]);
        assert_eq!(page.next_offset, Some(12));
    }

    #[test]
    fn short_result_is_last_page() {
        let page = into_page(vec![1], PageRequest::new(10, 2));

        assert_eq!(page.items, vec![1]);
        assert_eq!(page.next_offset, None);
    }

    #[test]
    fn non_database_errors_are_internal() {
        let err = classify(
            sqlx::Error::RowNotFound,
            ResourceType::Resident,
            "r".to_string(),
        );

        assert!(matches!(err, StorageError::Internal(_)));
    }
}
