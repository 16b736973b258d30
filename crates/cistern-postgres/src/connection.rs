//! PostgreSQL connection implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use cistern_core::{
    CisternError, ConnectParams, Connection, QueryResult, Result, Row, TransactionStatus, Value,
};
use tokio::sync::Mutex;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, NoTls, Row as PgRow};

fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail() {
        if !detail.trim().is_empty() {
            message.push_str(&format!(" (detail: {})", detail));
        }
    }

    if let Some(hint) = db_error.hint() {
        if !hint.trim().is_empty() {
            message.push_str(&format!(" (hint: {})", hint));
        }
    }

    match code.code() {
        "23505" => format!("duplicate value violates unique constraint: {}", message),
        "23503" => format!("foreign key violation: {}", message),
        "23502" => format!("null value violates not-null constraint: {}", message),
        "22007" => format!("invalid datetime format: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        _ => format!("{} (code: {:?})", message, code),
    }
}

/// PostgreSQL connection wrapper
///
/// Tracks the server-side transaction state so callers can tell whether
/// the session is idle, inside a transaction, or inside a failed
/// transaction that needs a rollback.
pub struct PostgresConnection {
    client: Arc<Mutex<Client>>,
    status: parking_lot::Mutex<TransactionStatus>,
    closed: AtomicBool,
}

impl PostgresConnection {
    /// Connect to a PostgreSQL database
    pub async fn connect(params: &ConnectParams) -> Result<Self> {
        tracing::info!(
            host = %params.host,
            port = params.port,
            dbname = %params.dbname,
            "connecting to PostgreSQL database"
        );

        let mut config = tokio_postgres::Config::new();
        config
            .host(&params.host)
            .port(params.port)
            .dbname(&params.dbname)
            .user(&params.user);
        if let Some(password) = &params.password {
            config.password(password);
        }

        let (client, connection) = config.connect(NoTls).await.map_err(|e| {
            CisternError::Connection(format!("Failed to connect to PostgreSQL: {}", e))
        })?;

        // Drive the wire protocol until the connection closes
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        tracing::info!(
            host = %params.host,
            port = params.port,
            dbname = %params.dbname,
            "PostgreSQL connection established"
        );
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            status: parking_lot::Mutex::new(TransactionStatus::Idle),
            closed: AtomicBool::new(false),
        })
    }

    /// Record a failed statement and build the error to return
    ///
    /// A statement failure inside an open transaction aborts it on the
    /// server, so the tracked status moves to `Error`.
    fn statement_failed(&self, error: &tokio_postgres::Error, context: &str) -> CisternError {
        let message = format_postgres_error(error);
        let mut status = self.status.lock();
        if *status == TransactionStatus::InTransaction {
            *status = TransactionStatus::Error;
        }
        CisternError::Driver(format!("{}: {}", context, message))
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let start_time = Instant::now();
        let client = self.client.lock().await;

        let statement = client
            .prepare(sql)
            .await
            .map_err(|e| self.statement_failed(&e, "Failed to prepare statement"))?;

        // Statements without result columns report an affected-row count
        if statement.columns().is_empty() {
            let affected_rows = client
                .execute(&statement, &[])
                .await
                .map_err(|e| self.statement_failed(&e, "Failed to execute statement"))?;

            let execution_time_ms = start_time.elapsed().as_millis() as u64;
            tracing::debug!(affected_rows, execution_time_ms, "statement executed");

            return Ok(QueryResult {
                columns: Vec::new(),
                rows: Vec::new(),
                affected_rows,
                execution_time_ms,
            });
        }

        let pg_rows = client
            .query(&statement, &[])
            .await
            .map_err(|e| self.statement_failed(&e, "Failed to execute query"))?;

        // Column names come from the prepared statement so empty result
        // sets still include them
        let column_names: Vec<String> = statement
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();

        let mut rows = Vec::new();
        for pg_row in &pg_rows {
            let mut values = Vec::new();
            for idx in 0..column_names.len() {
                values.push(postgres_to_value(pg_row, idx));
            }
            rows.push(Row::new(column_names.clone(), values));
        }

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms,
            "query executed successfully"
        );

        Ok(QueryResult {
            columns: column_names,
            rows,
            affected_rows: 0,
            execution_time_ms,
        })
    }

    async fn begin(&self) -> Result<()> {
        {
            let status = self.status.lock();
            if *status != TransactionStatus::Idle {
                return Err(CisternError::InvalidState(format!(
                    "cannot begin transaction while {:?}",
                    *status
                )));
            }
        }

        tracing::debug!("beginning transaction");
        let client = self.client.lock().await;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| self.statement_failed(&e, "Failed to begin transaction"))?;

        *self.status.lock() = TransactionStatus::InTransaction;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        {
            let status = self.status.lock();
            if *status != TransactionStatus::InTransaction {
                return Err(CisternError::InvalidState(format!(
                    "cannot commit while {:?}",
                    *status
                )));
            }
        }

        tracing::debug!("committing transaction");
        let client = self.client.lock().await;
        client.batch_execute("COMMIT").await.map_err(|e| {
            *self.status.lock() = TransactionStatus::Error;
            CisternError::Driver(format!(
                "Failed to commit transaction: {}",
                format_postgres_error(&e)
            ))
        })?;

        *self.status.lock() = TransactionStatus::Idle;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        if !self.transaction_status().in_transaction() {
            return Err(CisternError::InvalidState(
                "no transaction in progress".into(),
            ));
        }

        tracing::debug!("rolling back transaction");
        let client = self.client.lock().await;
        client.batch_execute("ROLLBACK").await.map_err(|e| {
            CisternError::Driver(format!(
                "Failed to roll back transaction: {}",
                format_postgres_error(&e)
            ))
        })?;

        *self.status.lock() = TransactionStatus::Idle;
        Ok(())
    }

    fn transaction_status(&self) -> TransactionStatus {
        *self.status.lock()
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing PostgreSQL connection");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }
        // Client::is_closed needs the lock; report open when busy
        match self.client.try_lock() {
            Ok(client) => client.is_closed(),
            Err(_) => false,
        }
    }
}

fn extract<'a, T, F>(row: &'a PgRow, idx: usize, wrap: F) -> Value
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    row.try_get::<_, Option<T>>(idx)
        .ok()
        .flatten()
        .map(wrap)
        .unwrap_or(Value::Null)
}

/// Convert a PostgreSQL row value to our Value type
fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_().name();

    match type_name {
        "bool" => extract(row, idx, Value::Bool),
        "int2" | "smallint" => extract(row, idx, Value::Int16),
        "int4" | "int" | "integer" => extract(row, idx, Value::Int32),
        "int8" | "bigint" => extract(row, idx, Value::Int64),
        "float4" | "real" => extract(row, idx, Value::Float32),
        "float8" | "double precision" => extract(row, idx, Value::Float64),
        "text" | "varchar" | "char" | "bpchar" | "name" => extract(row, idx, Value::String),
        "bytea" => extract(row, idx, Value::Bytes),
        "uuid" => extract(row, idx, Value::Uuid),
        "json" | "jsonb" => extract(row, idx, Value::Json),
        "date" => extract(row, idx, Value::Date),
        "time" => extract(row, idx, Value::Time),
        "timestamp" => extract(row, idx, Value::DateTime),
        "timestamptz" => extract(row, idx, Value::DateTimeUtc),
        "numeric" | "decimal" => extract(row, idx, |value: NumericText| Value::Decimal(value.0)),
        // Custom types (e.g. enums) decode as raw UTF-8 text
        _ => extract(row, idx, |value: RawText| Value::String(value.0)),
    }
}

struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Self(decode_numeric(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

struct RawText(String);

impl<'a> FromSql<'a> for RawText {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let text = String::from_utf8(raw.to_vec())?;
        Ok(Self(text))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Decode the NUMERIC wire format to the server's text representation
///
/// The payload is a header (digit count, weight, sign, display scale)
/// followed by base-10000 digit groups. The declared scale is preserved,
/// including trailing zeros.
fn decode_numeric(raw: &[u8]) -> std::result::Result<String, Box<dyn std::error::Error + Sync + Send>> {
    if raw.len() < 8 {
        return Err("invalid NUMERIC payload: too short".into());
    }

    let ndigits = i16::from_be_bytes([raw[0], raw[1]]) as usize;
    let weight = i16::from_be_bytes([raw[2], raw[3]]);
    let sign = u16::from_be_bytes([raw[4], raw[5]]);
    let dscale = u16::from_be_bytes([raw[6], raw[7]]) as usize;

    if raw.len() < 8 + ndigits * 2 {
        return Err("invalid NUMERIC payload: truncated digits".into());
    }

    if sign == 0xC000 {
        return Ok("NaN".to_string());
    }

    let mut groups = Vec::with_capacity(ndigits);
    for index in 0..ndigits {
        let offset = 8 + index * 2;
        let group = u16::from_be_bytes([raw[offset], raw[offset + 1]]);
        if group > 9999 {
            return Err("invalid NUMERIC payload: digit group out of range".into());
        }
        groups.push(group);
    }

    if groups.is_empty() {
        return Ok(if dscale > 0 {
            format!("0.{}", "0".repeat(dscale))
        } else {
            "0".to_string()
        });
    }

    let integer_groups = if weight >= 0 { weight as usize + 1 } else { 0 };

    let mut integer_text = String::new();
    if integer_groups == 0 {
        integer_text.push('0');
    } else {
        for index in 0..integer_groups {
            let group = groups.get(index).copied().unwrap_or(0);
            if index == 0 {
                integer_text.push_str(&group.to_string());
            } else {
                integer_text.push_str(&format!("{group:04}"));
            }
        }
    }

    let mut fraction_text = String::new();
    if dscale > 0 {
        // Zero groups between the decimal point and the first stored
        // group are not transmitted
        if weight < -1 {
            fraction_text.push_str(&"0000".repeat((-(weight as i32) - 1) as usize));
        }
        for group in groups.iter().skip(integer_groups.min(groups.len())) {
            fraction_text.push_str(&format!("{group:04}"));
        }

        if fraction_text.len() < dscale {
            fraction_text.push_str(&"0".repeat(dscale - fraction_text.len()));
        } else {
            fraction_text.truncate(dscale);
        }
    }

    let mut output = String::new();
    if sign == 0x4000 {
        output.push('-');
    }
    output.push_str(&integer_text);
    if !fraction_text.is_empty() {
        output.push('.');
        output.push_str(&fraction_text);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::decode_numeric;

    fn payload(ndigits: i16, weight: i16, sign: u16, dscale: u16, groups: &[u16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&ndigits.to_be_bytes());
        buf.extend_from_slice(&weight.to_be_bytes());
        buf.extend_from_slice(&sign.to_be_bytes());
        buf.extend_from_slice(&dscale.to_be_bytes());
        for group in groups {
            buf.extend_from_slice(&group.to_be_bytes());
        }
        buf
    }

    #[test]
    fn test_decode_numeric_integer() {
        let raw = payload(1, 0, 0x0000, 0, &[42]);
        assert_eq!(decode_numeric(&raw).expect("decode"), "42");
    }

    #[test]
    fn test_decode_numeric_multi_group() {
        let raw = payload(3, 1, 0x0000, 3, &[1, 2345, 6780]);
        assert_eq!(decode_numeric(&raw).expect("decode"), "12345.678");
    }

    #[test]
    fn test_decode_numeric_pads_missing_groups() {
        // 70000 transmits a single group with weight 1
        let raw = payload(1, 1, 0x0000, 0, &[7]);
        assert_eq!(decode_numeric(&raw).expect("decode"), "70000");
    }

    #[test]
    fn test_decode_numeric_negative_fraction() {
        let raw = payload(1, -1, 0x4000, 1, &[5000]);
        assert_eq!(decode_numeric(&raw).expect("decode"), "-0.5");
    }

    #[test]
    fn test_decode_numeric_small_fraction() {
        // 0.00000012 stores one group two places right of the point
        let raw = payload(1, -2, 0x0000, 8, &[12]);
        assert_eq!(decode_numeric(&raw).expect("decode"), "0.00000012");
    }

    #[test]
    fn test_decode_numeric_keeps_declared_scale() {
        // 1.100 keeps its trailing zeros like the server's text output
        let raw = payload(2, 0, 0x0000, 3, &[1, 1000]);
        assert_eq!(decode_numeric(&raw).expect("decode"), "1.100");
    }

    #[test]
    fn test_decode_numeric_zero_with_scale() {
        let raw = payload(0, 0, 0x0000, 2, &[]);
        assert_eq!(decode_numeric(&raw).expect("decode"), "0.00");
    }

    #[test]
    fn test_decode_numeric_nan() {
        let raw = payload(0, 0, 0xC000, 0, &[]);
        assert_eq!(decode_numeric(&raw).expect("decode"), "NaN");
    }

    #[test]
    fn test_decode_numeric_rejects_short_payload() {
        assert!(decode_numeric(&[0, 1, 0, 0]).is_err());
    }

    #[test]
    fn test_decode_numeric_rejects_truncated_digits() {
        let raw = payload(2, 0, 0x0000, 0, &[1]);
        assert!(decode_numeric(&raw).is_err());
    }
}
