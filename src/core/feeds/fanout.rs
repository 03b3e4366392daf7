use super::feed_models::{DeliveryOutcome, DeliveryReport, Destination, FeedItem};
use super::watcher::FeedGateway;
use futures::future::join_all;
use std::collections::BTreeSet;

/// Send `item` to every destination at once.
///
/// Each send stands alone: a failure is written to the report and logged, and
/// the remaining destinations are still attempted.
pub async fn deliver<P: Sync>(
    gateway: &dyn FeedGateway<P>,
    item: &FeedItem<P>,
    destinations: &BTreeSet<Destination>,
) -> DeliveryReport {
    let sends = destinations.iter().map(|destination| async move {
        let outcome = match gateway.send(destination, item).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(err) => {
                tracing::warn!(
                    item_id = %item.id,
                    guild_id = destination.guild_id,
                    channel_id = destination.channel_id,
                    error = %err,
                    "Failed to deliver feed item"
                );
                DeliveryOutcome::Failed(err)
            }
        };
        (*destination, outcome)
    });

    let mut report = DeliveryReport::new(item.id.clone());
    for (destination, outcome) in join_all(sends).await {
        report.record(destination, outcome);
    }
    report
}
