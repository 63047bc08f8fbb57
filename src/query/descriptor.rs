//! Read-query snapshots.

use mongodb::bson::Document;

/// The two shapes a read operation can take.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryShape {
    /// Point lookup or filtered find.
    Filter {
        conditions: Document,
        projection: Document,
        options: Document,
        /// Return a single document instead of a list.
        single: bool,
    },
    /// Multi-stage aggregation.
    Aggregate {
        pipeline: Vec<Document>,
        options: Document,
    },
}

/// Immutable snapshot of a read operation against one entity (collection).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    entity: String,
    shape: QueryShape,
}

impl QueryDescriptor {
    /// Create a filtered find returning every matching document.
    pub fn find(entity: impl Into<String>, conditions: Document) -> Self {
        Self {
            entity: entity.into(),
            shape: QueryShape::Filter {
                conditions,
                projection: Document::new(),
                options: Document::new(),
                single: false,
            },
        }
    }

    /// Create a point lookup returning the first matching document.
    pub fn find_one(entity: impl Into<String>, conditions: Document) -> Self {
        let mut descriptor = Self::find(entity, conditions);
        if let QueryShape::Filter { single, .. } = &mut descriptor.shape {
            *single = true;
        }
        descriptor
    }

    /// Create an aggregation over the given pipeline stages.
    pub fn aggregate(entity: impl Into<String>, pipeline: Vec<Document>) -> Self {
        Self {
            entity: entity.into(),
            shape: QueryShape::Aggregate {
                pipeline,
                options: Document::new(),
            },
        }
    }

    /// Set the projection. Ignored for aggregations.
    #[must_use]
    pub fn with_projection(mut self, fields: Document) -> Self {
        if let QueryShape::Filter { projection, .. } = &mut self.shape {
            *projection = fields;
        }
        self
    }

    /// Replace the options document (sort, limit, skip, allowDiskUse, ...).
    #[must_use]
    pub fn with_options(mut self, new_options: Document) -> Self {
        match &mut self.shape {
            QueryShape::Filter { options, .. } | QueryShape::Aggregate { options, .. } => {
                *options = new_options;
            }
        }
        self
    }

    /// Entity (collection / model) name the query runs against.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    pub fn options(&self) -> &Document {
        match &self.shape {
            QueryShape::Filter { options, .. } | QueryShape::Aggregate { options, .. } => options,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.shape, QueryShape::Aggregate { .. })
    }
}
