use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::audio::queue::GuildQueue;

/// Casilla de una guild en el registro.
///
/// `queue` es `None` mientras la conexión de voz se está creando. Una casilla
/// retirada ya no está en el registro; quien la tenga bloqueada debe volver a
/// buscarla.
#[derive(Default)]
pub struct GuildSlot {
    pub queue: Option<GuildQueue>,
    retired: bool,
}

impl GuildSlot {
    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

pub type SharedSlot = Arc<Mutex<GuildSlot>>;

/// Registro de colas por guild. Cada operación sobre una guild bloquea su
/// casilla de principio a fin; guilds distintas no comparten locks.
#[derive(Clone, Default)]
pub struct GuildRegistry {
    slots: Arc<DashMap<GuildId, SharedSlot>>,
}

impl GuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SharedSlot> {
        self.slots.get(&guild_id).map(|slot| slot.clone())
    }

    pub fn get_or_insert(&self, guild_id: GuildId) -> SharedSlot {
        self.slots.entry(guild_id).or_default().clone()
    }

    /// Retira la casilla bloqueada `guard` y la quita del registro si sigue
    /// siendo la registrada para la guild.
    pub fn retire(&self, guild_id: GuildId, slot: &SharedSlot, guard: &mut GuildSlot) {
        guard.queue = None;
        guard.retired = true;
        self.slots
            .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, slot));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.slots.contains_key(&guild_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_insert_reuses_slot() {
        let registry = GuildRegistry::new();
        let a = registry.get_or_insert(GuildId::new(1));
        let b = registry.get_or_insert(GuildId::new(1));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(GuildId::new(2)).is_none());
    }

    #[tokio::test]
    async fn test_retire_removes_only_matching_slot() {
        let registry = GuildRegistry::new();
        let guild = GuildId::new(1);

        let old = registry.get_or_insert(guild);
        {
            let mut guard = old.lock().await;
            registry.retire(guild, &old, &mut guard);
            assert!(guard.is_retired());
        }
        assert!(!registry.contains(guild));

        // Una casilla nueva no se ve afectada por retirar otra vez la vieja
        let new = registry.get_or_insert(guild);
        {
            let mut guard = old.lock().await;
            registry.retire(guild, &old, &mut guard);
        }
        assert!(registry.contains(guild));
        assert!(!new.lock().await.is_retired());
    }
}
