use rand::seq::SliceRandom;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::track::Track;

/// FIFO queue of tracks. The head is the track currently playing.
///
/// Owned and mutated only by its session. `peek`/`dequeue` return `None`
/// on an empty queue; callers check [`TrackQueue::is_empty`] first.
#[derive(Debug, Default, Clone)]
pub struct TrackQueue {
    items: VecDeque<Track>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final de la cola
    pub fn enqueue(&mut self, track: Track) {
        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
    }

    /// Quita el primer elemento (FIFO)
    pub fn dequeue(&mut self) -> Option<Track> {
        let item = self.items.pop_front();
        if let Some(ref track) = item {
            debug!("➡️ Sale de la cola: {}", track.title());
        }
        item
    }

    pub fn peek(&self) -> Option<&Track> {
        self.items.front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Quita el último elemento (deshace un `enqueue`)
    pub(crate) fn pop_back(&mut self) -> Option<Track> {
        self.items.pop_back()
    }

    /// Fisher–Yates over every element, the playing head included.
    /// Callers shuffling during playback must peek again afterwards.
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada ({} canciones)", self.items.len());
    }

    /// Vacía la cola en orden y devuelve cuántos elementos se quitaron
    pub fn clear(&mut self) -> usize {
        let mut removed = 0;
        while self.dequeue().is_some() {
            removed += 1;
        }
        if removed > 0 {
            info!("🗑️ Cola limpiada ({} canciones)", removed);
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().map(Track::duration).sum()
    }
}
