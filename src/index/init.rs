//! Index initialization.
//!
//! Creates every configured physical index that does not exist yet. With
//! `force`, each index is deleted first (a missing index is not an error).

use tracing::info;

use super::{IndexClient, Result};

/// What happened to one physical index during initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// The index was already present and left untouched.
    Existing(String),
    /// The index was created.
    Created(String),
}

/// Ensure each index exists, optionally recreating it.
pub async fn initialize(
    client: &dyn IndexClient,
    indices: &[String],
    force: bool,
) -> Result<Vec<InitOutcome>> {
    let mut outcomes = Vec::with_capacity(indices.len());

    for index in indices {
        if force {
            info!(index = %index, "Delete index if any");
            if let Err(e) = client.delete_index(index).await {
                info!(index = %index, error = %e, "Index not deleted");
            }
        }

        if client.index_exists(index).await? {
            info!(index = %index, "The index exists");
            outcomes.push(InitOutcome::Existing(index.clone()));
        } else {
            info!(index = %index, "The index will be created");
            client.create_index(index).await?;
            outcomes.push(InitOutcome::Created(index.clone()));
        }
    }

    Ok(outcomes)
}
