//! Running several classification calls against one classifier

use crate::classifier::{Classifier, ClassifyRequest};
use crate::Result;
use futures::stream::{self, StreamExt};
use newsroll_core::{ClassificationResult, WorkItem};
use tracing::info;

/// Split items into chunks of at most `batch_size` (0 means one chunk)
pub fn split_batches(items: Vec<WorkItem>, batch_size: usize) -> Vec<Vec<WorkItem>> {
    if items.is_empty() {
        return Vec::new();
    }
    if batch_size == 0 || items.len() <= batch_size {
        return vec![items];
    }

    let mut batches = Vec::with_capacity(items.len().div_ceil(batch_size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(batch_size).collect());
    }
    batches
}

/// Classify requests with at most `concurrency` calls in flight
///
/// Results come back in request order. All calls share the classifier's
/// decoding mode, so a schema rejection seen by one applies to the rest.
pub async fn classify_batches(
    classifier: &Classifier,
    requests: Vec<ClassifyRequest>,
    concurrency: usize,
) -> Vec<Result<ClassificationResult>> {
    let total = requests.len();
    info!(
        "Classifying {} batches with concurrency {}",
        total,
        concurrency.max(1)
    );

    stream::iter(requests)
        .map(|request| async move { classifier.classify(&request).await })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
