// CRM record mutations for the update_field, create_task, create_deal and add_tag actions

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::workflows::{EntityMutator, ProviderError};

/// Object kinds a workflow may write to, with their table and writable columns
const WRITABLE: &[(&str, &str, &[&str])] = &[
    (
        "contact",
        "contacts",
        &["first_name", "last_name", "email", "phone", "title", "status", "lifecycle_stage", "lead_score", "owner_id"],
    ),
    (
        "company",
        "companies",
        &["name", "industry", "website", "phone", "status", "owner_id"],
    ),
    (
        "deal",
        "deals",
        &["title", "value", "stage", "probability", "expected_close_date", "contact_id", "owner_id"],
    ),
    (
        "task",
        "tasks",
        &["title", "description", "status", "priority", "assigned_to", "due_at"],
    ),
];

fn table_for(kind: &str) -> Result<(&'static str, &'static [&'static str]), ProviderError> {
    let kind = kind.trim().to_lowercase();
    WRITABLE
        .iter()
        .find(|(k, _, _)| *k == kind)
        .map(|(_, table, fields)| (*table, *fields))
        .ok_or_else(|| ProviderError::Unsupported(format!("object kind '{}'", kind)))
}

fn parse_id(kind: &str, id: &str) -> Result<Uuid, ProviderError> {
    id.trim()
        .parse()
        .map_err(|_| ProviderError::Rejected(format!("'{}' is not a valid {} id", id, kind)))
}

fn attr_str<'a>(attrs: &'a Value, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn attr_uuid(attrs: &Value, key: &str) -> Result<Option<Uuid>, ProviderError> {
    attr_str(attrs, key)
        .map(|s| {
            s.trim()
                .parse()
                .map_err(|_| ProviderError::Rejected(format!("'{}' is not a valid id for {}", s, key)))
        })
        .transpose()
}

fn required_str<'a>(attrs: &'a Value, key: &str) -> Result<&'a str, ProviderError> {
    attr_str(attrs, key).ok_or_else(|| ProviderError::Rejected(format!("missing '{}'", key)))
}

#[derive(Debug, Clone)]
pub struct PgEntityMutator {
    db_pool: PgPool,
}

impl PgEntityMutator {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn create_task(&self, attrs: &Value) -> Result<Uuid, ProviderError> {
        let id = Uuid::new_v4();
        let due_at = attrs
            .get("due_at")
            .filter(|v| !v.is_null())
            .map(|v| serde_json::from_value::<chrono::DateTime<chrono::Utc>>(v.clone()))
            .transpose()
            .map_err(|e| ProviderError::Rejected(format!("invalid due_at: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO tasks (id, company_id, title, description, assigned_to, due_at, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'open', NOW())
            "#,
        )
        .bind(id)
        .bind(attr_uuid(attrs, "company_id")?)
        .bind(required_str(attrs, "title")?)
        .bind(attr_str(attrs, "description"))
        .bind(attr_uuid(attrs, "assigned_to")?)
        .bind(due_at)
        .execute(&self.db_pool)
        .await?;

        Ok(id)
    }

    async fn create_deal(&self, attrs: &Value) -> Result<Uuid, ProviderError> {
        let id = Uuid::new_v4();
        let value = required_str(attrs, "value")
            .and_then(|v| Decimal::from_str(v).map_err(|e| ProviderError::Rejected(format!("invalid value: {}", e))))?;

        sqlx::query(
            r#"
            INSERT INTO deals (id, company_id, title, value, stage, contact_id, owner_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            "#,
        )
        .bind(id)
        .bind(attr_uuid(attrs, "company_id")?)
        .bind(required_str(attrs, "title")?)
        .bind(value)
        .bind(required_str(attrs, "stage")?)
        .bind(attr_uuid(attrs, "contact_id")?)
        .bind(attr_uuid(attrs, "owner_id")?)
        .execute(&self.db_pool)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl EntityMutator for PgEntityMutator {
    async fn update_field(&self, kind: &str, id: &str, field: &str, value: &Value) -> Result<(), ProviderError> {
        let (table, fields) = table_for(kind)?;
        if !fields.contains(&field) {
            return Err(ProviderError::UnknownField {
                kind: kind.to_string(),
                field: field.to_string(),
            });
        }
        let object_id = parse_id(kind, id)?;

        // table and field come from the whitelist above; the value is cast
        // to the column's own type by jsonb_populate_record
        let sql = format!(
            "UPDATE {table} SET {field} = (jsonb_populate_record(NULL::{table}, $1)).{field} WHERE id = $2"
        );
        let mut patch = serde_json::Map::new();
        patch.insert(field.to_string(), value.clone());

        let result = sqlx::query(&sql)
            .bind(Value::Object(patch))
            .bind(object_id)
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ProviderError::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            });
        }

        info!(kind, %object_id, field, "Field updated by workflow");
        Ok(())
    }

    async fn create(&self, kind: &str, attributes: &Value) -> Result<Uuid, ProviderError> {
        let id = match kind {
            "task" => self.create_task(attributes).await?,
            "deal" => self.create_deal(attributes).await?,
            other => return Err(ProviderError::Unsupported(format!("creating {} records", other))),
        };
        info!(kind, %id, "Record created by workflow");
        Ok(id)
    }

    async fn add_tag(&self, kind: &str, id: &str, tag: &str) -> Result<(), ProviderError> {
        table_for(kind)?;
        let object_id = parse_id(kind, id)?;

        sqlx::query(
            r#"
            INSERT INTO tags (id, entity_type, entity_id, name, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (entity_type, entity_id, name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(kind.trim().to_lowercase())
        .bind(object_id)
        .bind(tag.trim())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}
