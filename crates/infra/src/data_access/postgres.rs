//! Postgres-backed data access over the property-management schema.
//!
//! Tables are the ORM-managed ones (`"RentAgreement"`, `"MaintenanceContract"`,
//! `"Invoice"`, `"Unit"`, `"Property"`, `"Renter"`) with quoted camelCase
//! columns and `timestamp(3)` values stored in UTC. They are only read. The
//! optional `reminder_log` table (see `migrations/`) is the only write target.
//!
//! ## Error Mapping
//!
//! | SQLx Error | DataAccessError |
//! |------------|-----------------|
//! | PoolTimedOut, PoolClosed, Io, Tls, Configuration | `Connection` |
//! | ColumnDecode, Decode, ColumnNotFound, TypeNotFound | `Decode` |
//! | Database and anything else | `Query` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use leasekeep_core::EntityId;
use leasekeep_reminders::{
    AgreementStatus, CandidateKey, ContractStatus, DataAccess, DataAccessError, DueWindow,
    EntityType, InvoiceDue, InvoiceStatus, MaintenanceContractDue, RentAgreementDue,
};

const REMINDER_LOG_DDL: &str = include_str!("../../migrations/0001_reminder_log.sql");

#[derive(Debug, Clone)]
pub struct PgDataAccess {
    pool: PgPool,
    marker_enabled: bool,
}

impl PgDataAccess {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool, marker_enabled: bool) -> Self {
        Self {
            pool,
            marker_enabled,
        }
    }

    /// Open a pool and, when the marker is enabled, make sure its table exists.
    pub async fn connect(database_url: &str, marker_enabled: bool) -> Result<Self, DataAccessError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let this = Self::new(pool, marker_enabled);
        if marker_enabled {
            sqlx::raw_sql(REMINDER_LOG_DDL)
                .execute(&this.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_reminder_log", e))?;
        }
        Ok(this)
    }

    fn status_list(statuses: impl IntoIterator<Item = &'static str>) -> Vec<String> {
        statuses.into_iter().map(str::to_string).collect()
    }
}

#[async_trait]
impl DataAccess for PgDataAccess {
    #[instrument(skip(self, statuses), fields(from = %window.from, until = %window.until, rows = tracing::field::Empty), err)]
    async fn rent_agreements_due(
        &self,
        window: DueWindow,
        statuses: &[AgreementStatus],
    ) -> Result<Vec<RentAgreementDue>, DataAccessError> {
        const OP: &str = "rent_agreements_due";
        let rows = sqlx::query(&rent_agreements_sql(self.marker_enabled))
            .bind(window.from)
            .bind(window.until)
            .bind(Self::status_list(statuses.iter().map(|s| s.as_db_str())))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

        Span::current().record("rows", rows.len());
        rows.iter().map(|row| decode_agreement(row).map_err(|e| decode_error(OP, e))).collect()
    }

    #[instrument(skip(self, statuses), fields(from = %window.from, until = %window.until, rows = tracing::field::Empty), err)]
    async fn maintenance_contracts_due(
        &self,
        window: DueWindow,
        statuses: &[ContractStatus],
    ) -> Result<Vec<MaintenanceContractDue>, DataAccessError> {
        const OP: &str = "maintenance_contracts_due";
        let rows = sqlx::query(&maintenance_contracts_sql(self.marker_enabled))
            .bind(window.from)
            .bind(window.until)
            .bind(Self::status_list(statuses.iter().map(|s| s.as_db_str())))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

        Span::current().record("rows", rows.len());
        rows.iter().map(|row| decode_contract(row).map_err(|e| decode_error(OP, e))).collect()
    }

    #[instrument(skip(self, statuses), fields(from = %window.from, until = %window.until, rows = tracing::field::Empty), err)]
    async fn invoices_due(
        &self,
        window: DueWindow,
        statuses: &[InvoiceStatus],
    ) -> Result<Vec<InvoiceDue>, DataAccessError> {
        const OP: &str = "invoices_due";
        let rows = sqlx::query(&invoices_sql(self.marker_enabled))
            .bind(window.from)
            .bind(window.until)
            .bind(Self::status_list(statuses.iter().map(|s| s.as_db_str())))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

        Span::current().record("rows", rows.len());
        rows.iter().map(|row| decode_invoice(row).map_err(|e| decode_error(OP, e))).collect()
    }

    fn supports_reminder_marker(&self) -> bool {
        self.marker_enabled
    }

    #[instrument(skip(self, key), fields(entity_type = %key.entity_type, entity_id = %key.entity_id), err)]
    async fn mark_reminded(&self, key: &CandidateKey, at: DateTime<Utc>) -> Result<(), DataAccessError> {
        if !self.marker_enabled {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO reminder_log (entity_type, entity_id, last_reminded_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (entity_type, entity_id)
            DO UPDATE SET last_reminded_at = EXCLUDED.last_reminded_at
            "#,
        )
        .bind(key.entity_type.as_str())
        .bind(key.entity_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_reminded", e))?;

        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// `(select expression, join clause)` for the marker column.
fn marker_sql(enabled: bool, entity_type: EntityType, id_expr: &str) -> (String, String) {
    if enabled {
        (
            "rl.last_reminded_at".to_string(),
            format!(
                "LEFT JOIN reminder_log rl ON rl.entity_type = '{}' AND rl.entity_id = {id_expr}",
                entity_type.as_str()
            ),
        )
    } else {
        ("NULL::timestamptz".to_string(), String::new())
    }
}

// Columns are `timestamp` without zone; `$1`/`$2` are bound as timestamptz.
const WINDOW_FROM: &str = "($1::timestamptz AT TIME ZONE 'UTC')";
const WINDOW_UNTIL: &str = "($2::timestamptz AT TIME ZONE 'UTC')";

fn rent_agreements_sql(marker: bool) -> String {
    let (marker_col, marker_join) = marker_sql(marker, EntityType::RentAgreement, r#"ra."id"::text"#);
    format!(
        r#"
        SELECT
            ra."id"::text AS id,
            ra."status"::text AS status,
            ra."endDate" AT TIME ZONE 'UTC' AS end_date,
            r."name" AS renter_name,
            r."phone" AS renter_phone,
            p."name" AS property_name,
            u."unitNumber" AS unit_number,
            {marker_col} AS last_reminded_at
        FROM "RentAgreement" ra
        JOIN "Renter" r ON r."id" = ra."renterId"
        JOIN "Unit" u ON u."id" = ra."unitId"
        JOIN "Property" p ON p."id" = u."propertyId"
        {marker_join}
        WHERE ra."endDate" >= {WINDOW_FROM}
          AND ra."endDate" <= {WINDOW_UNTIL}
          AND ra."status"::text = ANY($3)
        ORDER BY ra."endDate" ASC
        "#
    )
}

fn maintenance_contracts_sql(marker: bool) -> String {
    let (marker_col, marker_join) =
        marker_sql(marker, EntityType::MaintenanceContract, r#"mc."id"::text"#);
    format!(
        r#"
        SELECT
            mc."id"::text AS id,
            mc."status"::text AS status,
            mc."nextDueDate" AT TIME ZONE 'UTC' AS due_date,
            mc."description" AS description,
            mc."contactName" AS contact_name,
            mc."contactPhone" AS contact_phone,
            p."name" AS property_name,
            {marker_col} AS last_reminded_at
        FROM "MaintenanceContract" mc
        JOIN "Property" p ON p."id" = mc."propertyId"
        {marker_join}
        WHERE mc."nextDueDate" >= {WINDOW_FROM}
          AND mc."nextDueDate" <= {WINDOW_UNTIL}
          AND mc."status"::text = ANY($3)
        ORDER BY mc."nextDueDate" ASC
        "#
    )
}

fn invoices_sql(marker: bool) -> String {
    let (marker_col, marker_join) = marker_sql(marker, EntityType::Invoice, r#"i."id"::text"#);
    format!(
        r#"
        SELECT
            i."id"::text AS id,
            i."status"::text AS status,
            i."invoiceNumber" AS invoice_number,
            i."dueDate" AT TIME ZONE 'UTC' AS due_date,
            ROUND(i."amount" * 100)::bigint AS amount_minor,
            i."currency" AS currency,
            r."name" AS renter_name,
            r."phone" AS renter_phone,
            p."name" AS property_name,
            {marker_col} AS last_reminded_at
        FROM "Invoice" i
        JOIN "RentAgreement" ra ON ra."id" = i."rentAgreementId"
        JOIN "Renter" r ON r."id" = ra."renterId"
        JOIN "Unit" u ON u."id" = ra."unitId"
        JOIN "Property" p ON p."id" = u."propertyId"
        {marker_join}
        WHERE i."dueDate" >= {WINDOW_FROM}
          AND i."dueDate" <= {WINDOW_UNTIL}
          AND i."status"::text = ANY($3)
        ORDER BY i."dueDate" ASC
        "#
    )
}

// Row decoding

fn decode_agreement(row: &PgRow) -> Result<RentAgreementDue, String> {
    Ok(RentAgreementDue {
        id: entity_id(row)?,
        status: AgreementStatus::from_db_str(&get::<String>(row, "status")?).map_err(|e| e.to_string())?,
        end_date: get(row, "end_date")?,
        renter_name: get(row, "renter_name")?,
        renter_phone: get(row, "renter_phone")?,
        property_name: get(row, "property_name")?,
        unit_number: get(row, "unit_number")?,
        last_reminded_at: get(row, "last_reminded_at")?,
    })
}

fn decode_contract(row: &PgRow) -> Result<MaintenanceContractDue, String> {
    Ok(MaintenanceContractDue {
        id: entity_id(row)?,
        status: ContractStatus::from_db_str(&get::<String>(row, "status")?).map_err(|e| e.to_string())?,
        due_date: get(row, "due_date")?,
        description: get(row, "description")?,
        contact_name: get(row, "contact_name")?,
        contact_phone: get(row, "contact_phone")?,
        property_name: get(row, "property_name")?,
        last_reminded_at: get(row, "last_reminded_at")?,
    })
}

fn decode_invoice(row: &PgRow) -> Result<InvoiceDue, String> {
    Ok(InvoiceDue {
        id: entity_id(row)?,
        status: InvoiceStatus::from_db_str(&get::<String>(row, "status")?).map_err(|e| e.to_string())?,
        invoice_number: get(row, "invoice_number")?,
        due_date: get(row, "due_date")?,
        amount_minor: get(row, "amount_minor")?,
        currency: get(row, "currency")?,
        renter_name: get(row, "renter_name")?,
        renter_phone: get(row, "renter_phone")?,
        property_name: get(row, "property_name")?,
        last_reminded_at: get(row, "last_reminded_at")?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, String>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| format!("column '{column}': {e}"))
}

fn entity_id(row: &PgRow) -> Result<EntityId, String> {
    EntityId::new(get::<String>(row, "id")?).map_err(|e| e.to_string())
}

fn decode_error(operation: &'static str, message: String) -> DataAccessError {
    DataAccessError::decode(operation, message)
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> DataAccessError {
    match err {
        sqlx::Error::PoolTimedOut => {
            DataAccessError::Connection(format!("pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            DataAccessError::Connection(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => DataAccessError::Connection(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => DataAccessError::Connection(format!("tls error in {operation}: {e}")),
        sqlx::Error::Configuration(e) => {
            DataAccessError::Connection(format!("invalid configuration in {operation}: {e}"))
        }
        e @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. }) => DataAccessError::decode(operation, e.to_string()),
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            DataAccessError::query(operation, format!("{} (sqlstate {code})", db_err.message()))
        }
        other => DataAccessError::query(operation, other.to_string()),
    }
}
