use tokio_postgres::types::ToSql;
use tracing::{info, instrument, warn};

use crate::config::is_column_identifier;
use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::model::{CustomerFieldUpdate, CustomerStatus, FieldValue, ValidationFailure};

db_error!(CustomerStorageError {
    #[error("invalid customer column name: {0}")]
    InvalidColumn(String),
});

fn quote_column(name: &str) -> Result<String, CustomerStorageError> {
    if !is_column_identifier(name) {
        return Err(CustomerStorageError::InvalidColumn(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

type BoxedParam = Box<dyn ToSql + Sync + Send>;

fn boxed_value(value: &FieldValue) -> BoxedParam {
    match value {
        FieldValue::Bool(flag) => Box::new(*flag),
        FieldValue::Text(text) => Box::new(text.clone()),
        FieldValue::Date(date) => Box::new(*date),
    }
}

/// Build `UPDATE intake.customers SET ...` for the given columns. Cleared
/// columns are written as a literal `NULL` so no parameter type is needed.
fn build_update(
    request_id: i64,
    updates: &CustomerFieldUpdate,
) -> Result<(String, Vec<BoxedParam>), CustomerStorageError> {
    let mut values: Vec<BoxedParam> = Vec::new();
    let mut assignments = Vec::with_capacity(updates.len() + 1);

    for (column, value) in updates {
        let column = quote_column(column)?;
        match value {
            Some(value) => {
                values.push(boxed_value(value));
                assignments.push(format!("{column} = ${}", values.len()));
            }
            None => assignments.push(format!("{column} = NULL")),
        }
    }
    assignments.push("updated_at = NOW()".to_string());

    values.push(Box::new(request_id));
    let query = format!(
        "UPDATE intake.customers SET {} WHERE request_id = ${}",
        assignments.join(", "),
        values.len()
    );
    Ok((query, values))
}

/// Partial update of the customer row for `request_id`.
#[instrument(skip(pool, updates), fields(columns = updates.len()))]
pub async fn update_customer_fields(
    pool: &PgPool,
    request_id: i64,
    updates: &CustomerFieldUpdate,
) -> Result<u64, CustomerStorageError> {
    if updates.is_empty() {
        return Ok(0);
    }

    let (query, values) = build_update(request_id, updates)?;
    let params: Vec<&(dyn ToSql + Sync)> = values
        .iter()
        .map(|v| v.as_ref() as &(dyn ToSql + Sync))
        .collect();

    let client = pool.get().await?;
    let rows = client
        .timed_execute(&query, &params, "update_customer_fields")
        .await?;
    if rows == 0 {
        warn!(request_id, "no customer row to update");
    }
    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn set_ocr_status(
    pool: &PgPool,
    request_id: i64,
    status: CustomerStatus,
) -> Result<u64, CustomerStorageError> {
    let client = pool.get().await?;
    let rows = client
        .timed_execute(
            "UPDATE intake.customers SET ocr_status = $1, updated_at = NOW() WHERE request_id = $2",
            &[&status.as_str(), &request_id],
            "set_ocr_status",
        )
        .await?;
    if rows == 0 {
        warn!(request_id, status = status.as_str(), "no customer row for status update");
    }
    Ok(rows)
}

/// Run the validation procedure, then read back what it recorded.
#[instrument(skip(pool))]
pub async fn run_customer_validations(
    pool: &PgPool,
    request_id: i64,
) -> Result<Vec<ValidationFailure>, CustomerStorageError> {
    let client = pool.get().await?;
    client
        .timed_execute(
            "SELECT intake.run_customer_validations($1)",
            &[&request_id],
            "run_customer_validations",
        )
        .await?;

    let rows = client
        .timed_query(
            "SELECT validation_rule, validation_error
             FROM intake.validation_failures
             WHERE request_id = $1
             ORDER BY id",
            &[&request_id],
            "list_validation_failures",
        )
        .await?;

    let failures = rows
        .iter()
        .map(|row| {
            Ok(ValidationFailure {
                rule: row.try_get("validation_rule")?,
                message: row.try_get("validation_error")?,
            })
        })
        .collect::<Result<Vec<_>, CustomerStorageError>>()?;

    info!(request_id, failures = failures.len(), "customer validations finished");
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn builds_partial_update_with_literal_nulls() {
        let mut updates = CustomerFieldUpdate::new();
        updates.insert("FirstName".into(), Some(FieldValue::Text("Amira".into())));
        updates.insert("DateOfBirth".into(), None);
        updates.insert(
            "EmiratesIDExpiryDate".into(),
            Some(FieldValue::Date(NaiveDate::from_ymd_opt(2030, 1, 31).unwrap())),
        );
        updates.insert("IsNonGcc".into(), Some(FieldValue::Bool(false)));

        let (query, values) = build_update(42, &updates).unwrap();

        assert_eq!(
            query,
            "UPDATE intake.customers SET \"DateOfBirth\" = NULL, \"EmiratesIDExpiryDate\" = $1, \
             \"FirstName\" = $2, \"IsNonGcc\" = $3, updated_at = NOW() WHERE request_id = $4"
        );
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn rejects_columns_that_are_not_identifiers() {
        let mut updates = CustomerFieldUpdate::new();
        updates.insert("Name\"; DROP TABLE x; --".into(), None);
        let err = build_update(1, &updates).unwrap_err();
        assert!(matches!(err, CustomerStorageError::InvalidColumn(_)));
    }

    #[test]
    fn identifier_rules() {
        assert!(quote_column("IsNonGcc").is_ok());
        assert_eq!(quote_column("_col2").unwrap(), "\"_col2\"");
        assert!(quote_column("2col").is_err());
        assert!(quote_column("").is_err());
        assert!(quote_column("first name").is_err());
    }
}
