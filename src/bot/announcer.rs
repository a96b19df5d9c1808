use serenity::{async_trait, http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::error;

use crate::{audio::announcer::Announcer, sources::TrackRef};

/// Publica los avisos de la cola en el canal de texto de la guild
pub struct ChannelAnnouncer {
    http: Arc<Http>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn send(&self, channel_id: ChannelId, content: String) {
        if let Err(e) = channel_id.say(&self.http, content).await {
            error!("Error al enviar mensaje a {}: {:?}", channel_id, e);
        }
    }
}

#[async_trait]
impl Announcer for ChannelAnnouncer {
    async fn now_playing(&self, channel_id: ChannelId, track: &TrackRef) {
        self.send(channel_id, format!("▶️ Now playing: {}", track)).await;
    }

    async fn track_failed(&self, channel_id: ChannelId, track: &TrackRef, reason: &str) {
        self.send(channel_id, format!("⚠️ Could not play {}: {}", track, reason))
            .await;
    }
}
