// Schema definition types: a small DSL describing the marketplace tables
// and their unique constraints. Storage backends use it to create tables
// (SQL) or to enforce uniqueness (memory).

use serde::{Deserialize, Serialize};

/// Column types supported by the schema system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// RFC 3339 timestamp stored as text.
    Date,
}

/// A single column definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Foreign key target as `(table, column)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<(String, String)>,
}

impl SchemaField {
    fn new(name: &str, field_type: FieldType, required: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required,
            references: None,
        }
    }

    pub fn required_string(name: &str) -> Self {
        Self::new(name, FieldType::String, true)
    }

    pub fn optional_string(name: &str) -> Self {
        Self::new(name, FieldType::String, false)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, FieldType::Integer, true)
    }

    pub fn number(name: &str) -> Self {
        Self::new(name, FieldType::Number, true)
    }

    pub fn optional_number(name: &str) -> Self {
        Self::new(name, FieldType::Number, false)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldType::Boolean, true)
    }

    pub fn date(name: &str) -> Self {
        Self::new(name, FieldType::Date, true)
    }

    pub fn optional_date(name: &str) -> Self {
        Self::new(name, FieldType::Date, false)
    }

    pub fn with_reference(mut self, table: &str, column: &str) -> Self {
        self.references = Some((table.to_string(), column.to_string()));
        self
    }
}

/// A table definition. `id` is implicit and always the primary key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub fields: Vec<SchemaField>,
    /// Unique constraints; each entry is a list of columns unique together.
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            unique: Vec::new(),
        }
    }

    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare a single- or multi-column unique constraint.
    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.unique.push(columns.iter().map(|c| c.to_string()).collect());
        self
    }
}

/// The full storage schema: tables in creation (dependency) order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSchema {
    pub tables: Vec<TableSchema>,
}

impl MarketSchema {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// The marketplace schema: route, user, purchase, subscription,
    /// email_subscriber and email_download.
    pub fn marketplace() -> Self {
        use crate::db::models::tables;

        let route = TableSchema::new(tables::ROUTE)
            .field(SchemaField::required_string("title"))
            .field(SchemaField::required_string("description"))
            .field(SchemaField::number("distance"))
            .field(SchemaField::integer("elevationGain"))
            .field(SchemaField::required_string("difficulty"))
            .field(SchemaField::required_string("location"))
            .field(SchemaField::required_string("accessType"))
            .field(SchemaField::optional_number("price"))
            .field(SchemaField::required_string("gpxFileUrl"))
            .field(SchemaField::optional_string("thumbnailUrl"))
            .field(SchemaField::boolean("isPublished"))
            .field(SchemaField::date("createdAt"))
            .field(SchemaField::date("updatedAt"));

        let user = TableSchema::new(tables::USER)
            .field(SchemaField::required_string("email"))
            .field(SchemaField::required_string("name"))
            .field(SchemaField::required_string("passwordHash"))
            .field(SchemaField::required_string("role"))
            .field(SchemaField::required_string("subscriptionStatus"))
            .field(SchemaField::date("createdAt"))
            .field(SchemaField::date("updatedAt"))
            .unique(&["email"]);

        let purchase = TableSchema::new(tables::PURCHASE)
            .field(SchemaField::required_string("userId").with_reference(tables::USER, "id"))
            .field(SchemaField::required_string("routeId").with_reference(tables::ROUTE, "id"))
            .field(SchemaField::number("amount"))
            .field(SchemaField::required_string("currency"))
            .field(SchemaField::required_string("paymentProvider"))
            .field(SchemaField::required_string("transactionId"))
            .field(SchemaField::required_string("status"))
            .field(SchemaField::date("createdAt"))
            .unique(&["transactionId"])
            .unique(&["userId", "routeId"]);

        let subscription = TableSchema::new(tables::SUBSCRIPTION)
            .field(SchemaField::required_string("userId").with_reference(tables::USER, "id"))
            .field(SchemaField::required_string("stripeSubscriptionId"))
            .field(SchemaField::required_string("planId"))
            .field(SchemaField::required_string("status"))
            .field(SchemaField::date("startDate"))
            .field(SchemaField::date("endDate"))
            .field(SchemaField::date("createdAt"))
            .field(SchemaField::date("updatedAt"))
            .unique(&["stripeSubscriptionId"]);

        let subscriber = TableSchema::new(tables::EMAIL_SUBSCRIBER)
            .field(SchemaField::required_string("email"))
            .field(SchemaField::required_string("source"))
            .field(SchemaField::date("createdAt"))
            .unique(&["email"]);

        let download = TableSchema::new(tables::EMAIL_DOWNLOAD)
            .field(SchemaField::required_string("token"))
            .field(SchemaField::required_string("email"))
            .field(SchemaField::required_string("routeId").with_reference(tables::ROUTE, "id"))
            .field(SchemaField::date("expiresAt"))
            .field(SchemaField::optional_date("downloadedAt"))
            .field(SchemaField::date("createdAt"))
            .unique(&["token"]);

        Self::new()
            .table(route)
            .table(user)
            .table(purchase)
            .table(subscription)
            .table(subscriber)
            .table(download)
    }
}
