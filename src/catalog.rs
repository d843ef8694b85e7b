//! Model catalog.
//!
//! Lists the generative models the provider can serve, in the order the
//! service reports them. There is no default model: if the catalog cannot
//! be read, selection cannot proceed.

use tracing::debug;

use crate::error::{RagError, Result};
use crate::provider::ModelProvider;

/// Query the provider's catalog.
///
/// Any failure is reported as [`RagError::ServiceUnavailable`].
pub async fn list_models(provider: &dyn ModelProvider) -> Result<Vec<String>> {
    let models = provider.list_models().await.map_err(|e| match e {
        RagError::ServiceUnavailable(_) => e,
        other => RagError::service(other),
    })?;
    debug!(provider = provider.name(), count = models.len(), "model catalog");
    Ok(models)
}
