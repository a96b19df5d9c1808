use async_trait::async_trait;
use serenity::model::id::ChannelId;

use crate::sources::TrackRef;

/// Avisos al canal de texto desde el que se creó la cola
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn now_playing(&self, channel_id: ChannelId, track: &TrackRef);

    async fn track_failed(&self, channel_id: ChannelId, track: &TrackRef, reason: &str);
}
