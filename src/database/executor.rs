//! MongoDB-backed underlying executor.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document};
use mongodb::options::{AggregateOptions, FindOneOptions, FindOptions};
use serde_json::Value;
use tracing::debug;

use super::Database;
use crate::error::{QueryError, QueryResult};
use crate::executor::QueryExecutor;
use crate::query::{QueryDescriptor, QueryShape};

/// Runs descriptors directly against MongoDB.
///
/// Results are returned as relaxed extended JSON: a list of documents for
/// finds and aggregations, a single document (or `null`) for point lookups.
#[derive(Debug, Clone)]
pub struct MongoExecutor {
    db: Database,
}

impl MongoExecutor {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl QueryExecutor for MongoExecutor {
    async fn execute(&self, descriptor: &QueryDescriptor) -> QueryResult<Value> {
        let collection = self.db.collection(descriptor.entity());

        match descriptor.shape() {
            QueryShape::Filter {
                conditions,
                projection,
                options,
                single: true,
            } => {
                let find_options = find_one_options(projection, options)?;
                let found = collection
                    .find_one(conditions.clone())
                    .with_options(find_options)
                    .await?;
                debug!("find_one on {}: {}", descriptor.entity(), found.is_some());
                Ok(found.map(document_to_json).unwrap_or(Value::Null))
            }
            QueryShape::Filter {
                conditions,
                projection,
                options,
                single: false,
            } => {
                let find_options = find_options(projection, options)?;
                let cursor = collection
                    .find(conditions.clone())
                    .with_options(find_options)
                    .await?;
                let documents: Vec<Document> = cursor.try_collect().await?;
                debug!("find on {}: {} documents", descriptor.entity(), documents.len());
                Ok(documents_to_json(documents))
            }
            QueryShape::Aggregate { pipeline, options } => {
                let aggregate_options = aggregate_options(options)?;
                let cursor = collection
                    .aggregate(pipeline.clone())
                    .with_options(aggregate_options)
                    .await?;
                let documents: Vec<Document> = cursor.try_collect().await?;
                debug!(
                    "aggregate on {}: {} documents",
                    descriptor.entity(),
                    documents.len()
                );
                Ok(documents_to_json(documents))
            }
        }
    }
}

fn document_to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

fn documents_to_json(documents: Vec<Document>) -> Value {
    Value::Array(documents.into_iter().map(document_to_json).collect())
}

fn find_options(projection: &Document, options: &Document) -> QueryResult<FindOptions> {
    let mut find = FindOptions::default();
    find.projection = non_empty(projection);
    find.sort = sort(options)?;
    find.limit = integer(options, "limit")?;
    find.skip = unsigned(options, "skip")?;
    find.batch_size = integer(options, "batchSize")?
        .map(|size| u32::try_from(size).unwrap_or(u32::MAX));
    Ok(find)
}

fn find_one_options(projection: &Document, options: &Document) -> QueryResult<FindOneOptions> {
    let mut find = FindOneOptions::default();
    find.projection = non_empty(projection);
    find.sort = sort(options)?;
    find.skip = unsigned(options, "skip")?;
    Ok(find)
}

fn aggregate_options(options: &Document) -> QueryResult<AggregateOptions> {
    let mut aggregate = AggregateOptions::default();
    aggregate.allow_disk_use = match options.get("allowDiskUse") {
        None => None,
        Some(Bson::Boolean(value)) => Some(*value),
        Some(other) => {
            return Err(QueryError::InvalidDescriptor(format!(
                "allowDiskUse must be a boolean, got {other}"
            )));
        }
    };
    aggregate.batch_size = unsigned(options, "batchSize")?
        .map(|size| u32::try_from(size).unwrap_or(u32::MAX));
    Ok(aggregate)
}

fn non_empty(document: &Document) -> Option<Document> {
    (!document.is_empty()).then(|| document.clone())
}

fn sort(options: &Document) -> QueryResult<Option<Document>> {
    match options.get("sort") {
        None => Ok(None),
        Some(Bson::Document(sort)) => Ok(Some(sort.clone())),
        Some(other) => Err(QueryError::InvalidDescriptor(format!(
            "sort must be a document, got {other}"
        ))),
    }
}

fn integer(options: &Document, field: &str) -> QueryResult<Option<i64>> {
    match options.get(field) {
        None => Ok(None),
        Some(Bson::Int32(n)) => Ok(Some(i64::from(*n))),
        Some(Bson::Int64(n)) => Ok(Some(*n)),
        Some(Bson::Double(f)) if f.fract() == 0.0 => Ok(Some(*f as i64)),
        Some(other) => Err(QueryError::InvalidDescriptor(format!(
            "{field} must be an integer, got {other}"
        ))),
    }
}

fn unsigned(options: &Document, field: &str) -> QueryResult<Option<u64>> {
    match integer(options, field)? {
        None => Ok(None),
        Some(n) => u64::try_from(n).map(Some).map_err(|_| {
            QueryError::InvalidDescriptor(format!("{field} must not be negative, got {n}"))
        }),
    }
}
