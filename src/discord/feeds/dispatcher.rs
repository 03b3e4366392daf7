use super::embeds::FeedEmbed;
use crate::core::feeds::{DeliveryError, Destination, FeedGateway, FeedItem};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Whether the Discord connection can currently take messages.
/// Flipped by the event handler on `Ready` and shard stage changes.
#[derive(Debug, Clone, Default)]
pub struct GatewayStatus(Arc<AtomicBool>);

impl GatewayStatus {
    pub fn set_ready(&self, ready: bool) {
        let was = self.0.swap(ready, Ordering::SeqCst);
        if was != ready {
            tracing::info!(ready, "Discord gateway readiness changed");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Posts feed items through Discord's HTTP API. One instance serves every feed.
pub struct SerenityGateway {
    http: Arc<serenity::Http>,
    status: GatewayStatus,
}

impl SerenityGateway {
    pub fn new(http: Arc<serenity::Http>, status: GatewayStatus) -> Self {
        Self { http, status }
    }
}

#[async_trait]
impl<P> FeedGateway<P> for SerenityGateway
where
    P: FeedEmbed + Send + Sync,
{
    fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    async fn send(&self, destination: &Destination, item: &FeedItem<P>) -> Result<(), DeliveryError> {
        if !self.status.is_ready() {
            return Err(DeliveryError::NotReady);
        }

        let channel_id = serenity::ChannelId::new(destination.channel_id);
        let message = serenity::CreateMessage::new().embed(item.payload.embed());

        channel_id
            .send_message(&self.http, message)
            .await
            .map_err(|err| delivery_error(destination.channel_id, err))?;
        Ok(())
    }
}

fn delivery_error(channel_id: u64, err: serenity::Error) -> DeliveryError {
    if let serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) = &err {
        match response.status_code.as_u16() {
            403 => return DeliveryError::Forbidden { channel_id },
            404 => return DeliveryError::Unreachable { channel_id },
            429 => return DeliveryError::RateLimited { channel_id },
            _ => {}
        }
    }

    DeliveryError::Send {
        channel_id,
        message: err.to_string(),
    }
}
