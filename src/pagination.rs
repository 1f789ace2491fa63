//! # Pagination Schemas
//!
//! Cursor-pagination parameter and response shapes shared by list
//! endpoints, so every paginated listing speaks the same dialect.

use serde_json::json;

use crate::schema::{Field, Schema};

/// Page size applied when the request does not set one
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Query schema for cursor-paginated list endpoints
///
/// `pageAfter` and `pageBefore` are opaque cursors. `pageSize` defaults to
/// [`DEFAULT_PAGE_SIZE`]. `sortBy` is required; endpoints that want a
/// default extend the schema:
///
/// ```
/// use serde_json::json;
/// use trellis::pagination::pagination_params;
/// use trellis::schema::Schema;
///
/// let query = pagination_params().extend([(
///     "sortBy",
///     Schema::one_of(["id", "createdAt"]).with_default(json!("id")),
/// )]);
/// ```
#[must_use]
pub fn pagination_params() -> Schema {
    Schema::object([
        Field::new("pageAfter", Schema::string().optional()),
        Field::new("pageBefore", Schema::string().optional()),
        Field::new(
            "pageSize",
            Schema::number().with_default(json!(DEFAULT_PAGE_SIZE)),
        ),
        Field::new("sortBy", Schema::string()),
        Field::new(
            "sortDirection",
            Schema::one_of(["asc", "desc"]).with_default(json!("asc")),
        ),
    ])
}

/// Response schema for one page of items
///
/// Cursors are `null` at the corresponding end of the collection; the
/// has-more flags are optional so handlers may omit what they cannot
/// compute cheaply.
#[must_use]
pub fn page_response(item: Schema) -> Schema {
    Schema::object([
        Field::new("startCursor", Schema::string().nullable()),
        Field::new("endCursor", Schema::string().nullable()),
        Field::new("hasNextPage", Schema::boolean().optional()),
        Field::new("hasPreviousPage", Schema::boolean().optional()),
        Field::new("items", Schema::array(item)),
    ])
}
