//! The operation catalog over the nexus models.
//!
//! Every operation builds one canonical statement (the identifier cascade
//! builds up to three, run one after another) and hands it to the
//! [`Warehouse`]. A [`Catalog`] is an explicit handle; nothing here is global.
mod edges;
mod entities;
mod events;
mod manifest;
mod models;
mod operation;

pub use edges::*;
pub use entities::*;
pub use events::*;
pub use manifest::*;
pub use models::*;
pub use operation::*;

use serde::Deserialize;

use crate::db::{QueryResult, Warehouse};
use crate::error::Result;
use crate::sql::{validate_filters, Filter, FilterSpec, OrderSpec};

pub struct Catalog {
    warehouse: Warehouse,
    tables: Tables,
}

impl Catalog {
    pub fn new(warehouse: Warehouse, tables: Tables) -> Self {
        Self { warehouse, tables }
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    async fn execute(&self, sql: String) -> Result<QueryResult> {
        self.warehouse.execute(&sql).await
    }
}

/// Caller-supplied filters and ordering shared by most operations.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Refinement {
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default, alias = "orderBy", alias = "order_by")]
    pub order: Vec<OrderSpec>,
}

impl Refinement {
    pub(crate) fn validated(&self) -> Result<Vec<Filter>> {
        validate_filters(&self.filters)
    }
}
