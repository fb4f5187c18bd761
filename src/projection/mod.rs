//! Denormalization engine.
//!
//! Applies validated change events to the search index. Every resource kind
//! has a top-level document; kinds registered as [`Placement::Embedded`] are
//! additionally copied into a list field of their parent submission.
//!
//! Parent list rewrites are read-modify-write cycles. The write is conditional
//! on the version returned by the read, and a lost race is retried from the
//! read with exponential backoff.

pub mod embed;
pub mod normalize;

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::{ConflictRetryConfig, CreatePolicy, IndexConfig, IndexLayout};
use crate::error::{ProcessorError, Result};
use crate::event::{Event, Placement, ResourceKind};
use crate::index::{IndexClient, IndexError, MergeOptions};
use crate::utils::retry::conflict_backoff;
use crate::validation::{errmsg, path, ValidationError};

/// Writes events into the index according to the resource registry.
pub struct Projector {
    client: Arc<dyn IndexClient>,
    layout: IndexLayout,
    create_policy: CreatePolicy,
    conflict_retry: ConflictRetryConfig,
}

impl Projector {
    pub fn new(client: Arc<dyn IndexClient>, config: &IndexConfig) -> Self {
        Self {
            client,
            layout: config.layout.clone(),
            create_policy: config.create_policy,
            conflict_retry: config.conflict_retry.clone(),
        }
    }

    /// Physical index for `kind` under the configured layout.
    pub fn index_for(&self, kind: ResourceKind) -> &str {
        self.layout.index_for(kind)
    }

    /// Apply a Create event.
    #[tracing::instrument(name = "projection.create", skip_all, fields(resource = %event.resource, id = %event.id))]
    pub async fn create(&self, event: &Event) -> Result<()> {
        let mut body = event.payload.clone();
        if event.resource == ResourceKind::Submission {
            normalize::normalize_for_create(&mut body);
        }
        let index = self.index_for(event.resource);

        match event.resource.placement() {
            Placement::Root => self.write_new(index, &event.id, &body).await,
            Placement::Embedded {
                parent,
                field,
                foreign_key,
            } => {
                let parent_id = payload_reference(&body, foreign_key)?.to_string();
                self.write_new(index, &event.id, &body).await?;

                let record = embed::strip_resource(body);
                let dedupe = self.create_policy == CreatePolicy::Upsert;
                self.rewrite_embedded(parent, &parent_id, field, |list| {
                    embed::prepend(list, &record, dedupe)
                })
                .await?;
                info!(parent_id = %parent_id, field, "Embedded record into parent");
                Ok(())
            }
        }
    }

    /// Apply an Update event.
    #[tracing::instrument(name = "projection.update", skip_all, fields(resource = %event.resource, id = %event.id))]
    pub async fn update(&self, event: &Event) -> Result<()> {
        let mut body = event.payload.clone();
        if event.resource == ResourceKind::Submission {
            normalize::normalize_for_update(&mut body);
        }
        let index = self.index_for(event.resource);

        self.client
            .upsert_merge(index, &event.id, &body, MergeOptions::existing())
            .await?;
        debug!(index, "Merged update into document");

        let Placement::Embedded {
            parent,
            field,
            foreign_key,
        } = event.resource.placement()
        else {
            return Ok(());
        };

        // The stored document is authoritative for the parent reference.
        let current = self.client.get_by_id(index, &event.id).await?;
        let parent_id = self.parent_reference(parent, &event.id, &current.source, foreign_key)?;

        let patch = embed::strip_resource(body);
        let fallback = embed::strip_resource(current.source);
        self.rewrite_embedded(parent, &parent_id, field, |list| {
            embed::merge_entry(list, &event.id, &patch, &fallback)
        })
        .await?;
        info!(parent_id = %parent_id, field, "Updated embedded record");
        Ok(())
    }

    /// Apply a Delete event.
    #[tracing::instrument(name = "projection.delete", skip_all, fields(resource = %event.resource, id = %event.id))]
    pub async fn delete(&self, event: &Event) -> Result<()> {
        let index = self.index_for(event.resource);

        if let Placement::Embedded {
            parent,
            field,
            foreign_key,
        } = event.resource.placement()
        {
            match self.detach(index, &event.id, parent, field, foreign_key).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    warn!(error = %err, "Parent list not updated, deleting document anyway");
                }
                Err(err) => return Err(err),
            }
        }

        self.client.delete_by_id(index, &event.id).await?;
        debug!(index, "Deleted document");
        Ok(())
    }

    /// Remove the embedded copy of a sub-record from its parent.
    async fn detach(
        &self,
        index: &str,
        id: &str,
        parent: ResourceKind,
        field: &str,
        foreign_key: &str,
    ) -> Result<()> {
        let current = self.client.get_by_id(index, id).await?;
        let parent_id = self.parent_reference(parent, id, &current.source, foreign_key)?;
        self.rewrite_embedded(parent, &parent_id, field, |list| {
            embed::remove_entry(list, id)
        })
        .await?;
        info!(parent_id = %parent_id, field, "Removed embedded record");
        Ok(())
    }

    /// Parent id stored on a top-level sub-record.
    ///
    /// A record without one has no parent to find and reports `NotFound`
    /// against the parent index, naming the field and the child.
    fn parent_reference(
        &self,
        parent: ResourceKind,
        child_id: &str,
        source: &Map<String, Value>,
        field: &str,
    ) -> Result<String> {
        source
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProcessorError::NotFound {
                index: self.index_for(parent).to_string(),
                id: format!("<{field} of {child_id}>"),
            })
    }

    /// Create a top-level document according to the create policy.
    async fn write_new(&self, index: &str, id: &str, body: &Map<String, Value>) -> Result<()> {
        match self.create_policy {
            CreatePolicy::Strict => self.client.create_by_id(index, id, body).await?,
            CreatePolicy::Upsert => {
                self.client
                    .upsert_merge(index, id, body, MergeOptions::upsert())
                    .await?
            }
        }
        debug!(index, id, policy = ?self.create_policy, "Wrote document");
        Ok(())
    }

    /// Replace a parent's list field with `rewrite(current list)`.
    ///
    /// The write only succeeds against the version that was read; on a
    /// version conflict the cycle restarts from the read.
    async fn rewrite_embedded<F>(
        &self,
        parent: ResourceKind,
        parent_id: &str,
        field: &str,
        rewrite: F,
    ) -> Result<()>
    where
        F: Fn(Vec<Value>) -> Vec<Value>,
    {
        let client = &self.client;
        let index = self.index_for(parent);
        let rewrite = &rewrite;

        let attempt = move || async move {
            let document = client.get_by_id(index, parent_id).await?;
            let list = rewrite(embed::embedded_list(&document.source, field));

            let mut partial = Map::new();
            partial.insert(field.to_string(), Value::Array(list));
            client
                .upsert_merge(
                    index,
                    parent_id,
                    &partial,
                    MergeOptions::conditional(document.version),
                )
                .await
        };

        attempt
            .retry(conflict_backoff(&self.conflict_retry))
            .when(IndexError::is_version_conflict)
            .notify(|err: &IndexError, dur: Duration| {
                warn!(parent_id, error = %err, delay = ?dur, "Parent changed concurrently, retrying");
            })
            .await
            .map_err(ProcessorError::from)
    }
}

/// Parent reference carried in an inbound payload.
fn payload_reference<'a>(
    payload: &'a Map<String, Value>,
    field: &str,
) -> std::result::Result<&'a str, ValidationError> {
    let field_path = format!("{}.{}", path::PAYLOAD, field);
    match payload.get(field) {
        Some(Value::String(s)) => Ok(s.as_str()),
        None | Some(Value::Null) => Err(ValidationError::new(field_path, errmsg::REQUIRED)),
        Some(_) => Err(ValidationError::new(field_path, errmsg::NOT_A_STRING)),
    }
}
