//! Query model: immutable queries and the fluent builder.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator for a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Field equals value.
    Eq,
    /// Field is strictly less than value.
    Lt,
    /// Field is less than or equal to value.
    Le,
    /// Field is strictly greater than value.
    Gt,
    /// Field is greater than or equal to value.
    Ge,
    /// Array field contains value.
    ArrayContains,
}

/// A single filter clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Field name the clause applies to.
    pub field: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Comparison value.
    pub value: Value,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Ordering clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Field to order by.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

/// An immutable query scoped to one collection.
///
/// Built with [`QueryBuilder`]; once built it carries no resources and cannot
/// be mutated. The wire form is JSON bytes, opaque to the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    collection: String,
    filters: Vec<Filter>,
    order_by: Option<OrderBy>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Query {
    /// Start building a query for a collection.
    pub fn builder(collection: &str) -> QueryBuilder {
        QueryBuilder::new(collection)
    }

    /// Name of the collection the query targets.
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Filter clauses, in the order they were added.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Ordering clause, if any.
    pub fn order_by(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    /// Result-count bound, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Number of leading results to skip, if any.
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// Serialize to the wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Deserialize from the wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// Fluent, synchronous query builder.
///
/// # Examples
///
/// ```rust
/// use docbus_store::Query;
///
/// let query = Query::builder("cars")
///     .where_eq("brand", "Toyota")
///     .limit(10)
///     .build();
/// assert_eq!(query.collection_name(), "cars");
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    collection: String,
    filters: Vec<Filter>,
    order_by: Option<OrderBy>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl QueryBuilder {
    /// Create a builder for a collection.
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    fn filter(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    /// Require a field to equal a value.
    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    /// Require a field to be strictly less than a value.
    pub fn where_lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Lt, value)
    }

    /// Require a field to be at most a value.
    pub fn where_le(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Le, value)
    }

    /// Require a field to be strictly greater than a value.
    pub fn where_gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Gt, value)
    }

    /// Require a field to be at least a value.
    pub fn where_ge(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Ge, value)
    }

    /// Require an array field to contain a value.
    pub fn where_array_contains(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::ArrayContains, value)
    }

    /// Order results by a field.
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    /// Bound the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip leading results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Finish building the immutable query.
    pub fn build(self) -> Query {
        Query {
            collection: self.collection,
            filters: self.filters,
            order_by: self.order_by,
            limit: self.limit,
            offset: self.offset,
        }
    }
}
