/// Applies sends published by other instances to this instance's hubs
use super::Backplane;
use crate::arguments::is_debug_backplane_enabled;
use crate::errors::RelayResult;
use crate::hub::{Frame, Hub};
use crate::logger::{self, LogTag};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Subscribe and spawn the apply loop; the task ends on cancellation or when the
/// subscription closes.
pub async fn spawn_listener(
    backplane: Arc<dyn Backplane>,
    hubs: Vec<Arc<Hub>>,
    cancel: CancellationToken,
) -> RelayResult<JoinHandle<()>> {
    let mut subscription = backplane.subscribe(cancel.clone()).await?;
    let instance_id = backplane.instance_id().to_string();

    logger::info(
        LogTag::Backplane,
        &format!(
            "Listening on {} backplane channel '{}' as {}",
            backplane.name(),
            backplane.channel(),
            instance_id
        ),
    );

    Ok(tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = subscription.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            if message.origin == instance_id {
                continue;
            }

            let Some(hub) = hubs.iter().find(|hub| hub.kind() == message.hub) else {
                continue;
            };

            let frame: Frame = Arc::from(message.frame);
            let report = hub.apply_remote(&message.scope, &frame);

            if is_debug_backplane_enabled() {
                logger::debug(
                    LogTag::Backplane,
                    &format!(
                        "Applied {} send from {} to {} (delivered={})",
                        message.hub, message.origin, message.scope, report.delivered
                    ),
                );
            }
        }

        logger::info(LogTag::Backplane, "Backplane listener stopped");
    }))
}
