//! Canonical in-memory bullet records.
//!
//! The store is a plain value: it does no locking of its own. The
//! [`Playbook`](crate::Playbook) owns exactly one store behind a read/write
//! lock and is the only place that mutates it concurrently.

use std::collections::HashMap;

use chrono::Utc;

use super::types::{Bullet, BulletId};
use crate::error::{PlaybookError, Result};

/// Bullet store keyed by id, iterated in creation order.
#[derive(Debug, Clone, Default)]
pub struct BulletStore {
    /// Map of bullet ID to bullet.
    bullets: HashMap<BulletId, Bullet>,
    /// Bullet IDs in creation order.
    order: Vec<BulletId>,
    /// Next sequence number for generating IDs. Never decreases.
    next_sequence: u64,
}

impl BulletStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassembles a store from persisted records.
    ///
    /// `bullets` must be in creation order. `next_sequence` is raised if
    /// needed so that new ids can never collide with loaded ones.
    ///
    /// # Errors
    /// Returns `CorruptSnapshot` if two records share an id.
    pub fn from_parts(bullets: Vec<Bullet>, next_sequence: u64) -> Result<Self> {
        let mut store =
            Self { bullets: HashMap::with_capacity(bullets.len()), order: Vec::new(), next_sequence };

        for bullet in bullets {
            if store.bullets.contains_key(&bullet.id) {
                return Err(PlaybookError::CorruptSnapshot(format!(
                    "duplicate bullet id: {}",
                    bullet.id
                )));
            }
            store.order.push(bullet.id.clone());
            store.bullets.insert(bullet.id.clone(), bullet);
        }

        let floor = store.order.len() as u64;
        if store.next_sequence < floor {
            store.next_sequence = floor;
        }

        Ok(store)
    }

    /// The sequence number the last generated id used.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    fn generate_id(&mut self, section: &str) -> BulletId {
        loop {
            self.next_sequence += 1;
            let id = BulletId::for_section(section, self.next_sequence);
            // Seeded or imported ids may not follow the sequence.
            if !self.bullets.contains_key(&id) {
                return id;
            }
        }
    }

    /// Creates a new bullet with zeroed counters.
    pub fn create(&mut self, content: String, section: String, embedding: Vec<f32>) -> Bullet {
        let id = self.generate_id(&section);
        let bullet = Bullet::new(id.clone(), content, section, embedding);
        self.order.push(id.clone());
        self.bullets.insert(id, bullet.clone());
        bullet
    }

    /// Gets a bullet by ID.
    ///
    /// # Errors
    /// Returns `NotFound` if the id does not resolve.
    pub fn get(&self, id: &BulletId) -> Result<&Bullet> {
        self.bullets.get(id).ok_or_else(|| PlaybookError::NotFound(id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, id: &BulletId) -> Result<&mut Bullet> {
        self.bullets.get_mut(id).ok_or_else(|| PlaybookError::NotFound(id.to_string()))
    }

    /// Whether the id resolves.
    pub fn contains(&self, id: &BulletId) -> bool {
        self.bullets.contains_key(id)
    }

    /// Replaces a bullet's content and embedding.
    ///
    /// # Errors
    /// Returns `NotFound` if the id does not resolve.
    pub fn update_content(
        &mut self,
        id: &BulletId,
        content: String,
        embedding: Vec<f32>,
    ) -> Result<Bullet> {
        let bullet = self.get_mut(id)?;
        bullet.content = content;
        bullet.embedding = embedding;
        bullet.updated_at = Utc::now();
        Ok(bullet.clone())
    }

    /// Increments exactly one feedback counter.
    ///
    /// # Errors
    /// Returns `NotFound` if the id does not resolve.
    pub fn update_counters(&mut self, id: &BulletId, helpful: bool) -> Result<Bullet> {
        if helpful {
            self.add_counters(id, 1, 0)
        } else {
            self.add_counters(id, 0, 1)
        }
    }

    /// Adds to both counters at once; used by curation.
    pub(crate) fn add_counters(
        &mut self,
        id: &BulletId,
        helpful: u32,
        harmful: u32,
    ) -> Result<Bullet> {
        let bullet = self.get_mut(id)?;
        bullet.helpful_count = bullet.helpful_count.saturating_add(helpful);
        bullet.harmful_count = bullet.harmful_count.saturating_add(harmful);
        bullet.updated_at = Utc::now();
        Ok(bullet.clone())
    }

    /// Administrative reset of both counters to zero.
    ///
    /// This is the only operation that lowers a counter.
    ///
    /// # Errors
    /// Returns `NotFound` if the id does not resolve.
    pub fn reset_counters(&mut self, id: &BulletId) -> Result<Bullet> {
        let bullet = self.get_mut(id)?;
        bullet.helpful_count = 0;
        bullet.harmful_count = 0;
        bullet.updated_at = Utc::now();
        Ok(bullet.clone())
    }

    /// Removes a bullet. Its id is never handed out again.
    ///
    /// # Errors
    /// Returns `NotFound` if the id does not resolve.
    pub fn remove(&mut self, id: &BulletId) -> Result<Bullet> {
        let bullet = self.bullets.remove(id).ok_or_else(|| PlaybookError::NotFound(id.to_string()))?;
        self.order.retain(|existing| existing != id);
        Ok(bullet)
    }

    /// Lists bullets in creation order, optionally restricted to one section.
    ///
    /// # Errors
    /// Returns `NotFound` if a section filter matches no live bullet.
    pub fn list(&self, section: Option<&str>) -> Result<Vec<Bullet>> {
        let bullets: Vec<Bullet> = self
            .iter()
            .filter(|bullet| section.is_none_or(|s| bullet.section == s))
            .cloned()
            .collect();

        match section {
            Some(s) if bullets.is_empty() => Err(PlaybookError::NotFound(format!("section {}", s))),
            _ => Ok(bullets),
        }
    }

    /// Sections of live bullets, in first-seen order.
    pub fn sections(&self) -> Vec<String> {
        let mut sections: Vec<String> = Vec::new();
        for bullet in self.iter() {
            if !sections.contains(&bullet.section) {
                sections.push(bullet.section.clone());
            }
        }
        sections
    }

    /// Iterates bullets in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Bullet> {
        self.order.iter().filter_map(|id| self.bullets.get(id))
    }

    /// `(id, embedding)` pairs in creation order, for index rebuilds.
    pub fn embeddings(&self) -> Vec<(BulletId, Vec<f32>)> {
        self.iter().map(|bullet| (bullet.id.clone(), bullet.embedding.clone())).collect()
    }

    /// Number of live bullets.
    pub fn len(&self) -> usize {
        self.bullets.len()
    }

    /// Whether the store holds no bullets.
    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn store_with(contents: &[(&str, &str)]) -> BulletStore {
        let mut store = BulletStore::new();
        for (section, content) in contents {
            store.create((*content).to_string(), (*section).to_string(), vec![1.0, 0.0]);
        }
        store
    }

    #[test]
    fn test_create_assigns_unique_ids() {
        let mut store = BulletStore::new();
        let mut seen = HashSet::new();
        for i in 0..50 {
            let section = if i % 2 == 0 { "validation" } else { "errors" };
            let bullet = store.create(format!("bullet {}", i), section.to_string(), vec![1.0]);
            assert!(seen.insert(bullet.id.clone()), "duplicate id {}", bullet.id);
        }
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn test_ids_not_reused_after_remove() {
        let mut store = store_with(&[("general", "a"), ("general", "b")]);
        let last = store.list(None).unwrap().last().unwrap().id.clone();
        store.remove(&last).unwrap();

        let again = store.create("c".to_string(), "general".to_string(), vec![1.0]);
        assert_ne!(again.id, last);
        assert_eq!(again.id.as_str(), "general-00003");
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = BulletStore::new();
        let err = store.get(&BulletId::new("nope-00001")).unwrap_err();
        assert!(matches!(err, PlaybookError::NotFound(_)));
    }

    #[test]
    fn test_update_counters_increments_one() {
        let mut store = store_with(&[("general", "a")]);
        let id = store.list(None).unwrap()[0].id.clone();

        let bullet = store.update_counters(&id, true).unwrap();
        assert_eq!((bullet.helpful_count, bullet.harmful_count), (1, 0));
        let bullet = store.update_counters(&id, false).unwrap();
        assert_eq!((bullet.helpful_count, bullet.harmful_count), (1, 1));
        assert!(bullet.updated_at >= bullet.created_at);
    }

    #[test]
    fn test_reset_counters() {
        let mut store = store_with(&[("general", "a")]);
        let id = store.list(None).unwrap()[0].id.clone();
        store.add_counters(&id, 4, 2).unwrap();

        let bullet = store.reset_counters(&id).unwrap();
        assert_eq!((bullet.helpful_count, bullet.harmful_count), (0, 0));
    }

    #[test]
    fn test_update_content_replaces_embedding() {
        let mut store = store_with(&[("general", "a")]);
        let id = store.list(None).unwrap()[0].id.clone();

        let bullet = store.update_content(&id, "b".to_string(), vec![0.0, 1.0]).unwrap();
        assert_eq!(bullet.content, "b");
        assert_eq!(bullet.embedding, vec![0.0, 1.0]);
        assert!(store.update_content(&BulletId::new("x"), String::new(), vec![]).is_err());
    }

    #[test]
    fn test_list_section_filter() {
        let store = store_with(&[("validation", "a"), ("errors", "b"), ("validation", "c")]);

        let validation = store.list(Some("validation")).unwrap();
        assert_eq!(validation.len(), 2);
        assert_eq!(validation[0].content, "a");
        assert_eq!(validation[1].content, "c");

        assert!(matches!(store.list(Some("unknown")), Err(PlaybookError::NotFound(_))));
        assert!(BulletStore::new().list(None).unwrap().is_empty());
        assert_eq!(store.sections(), vec!["validation".to_string(), "errors".to_string()]);
    }

    #[test]
    fn test_from_parts_rejects_duplicates_and_raises_sequence() {
        let store = store_with(&[("general", "a"), ("general", "b")]);
        let bullets = store.list(None).unwrap();

        let reloaded = BulletStore::from_parts(bullets.clone(), 0).unwrap();
        assert_eq!(reloaded.next_sequence(), 2);
        assert_eq!(reloaded.list(None).unwrap(), bullets);

        let mut dup = bullets.clone();
        dup.push(bullets[0].clone());
        assert!(matches!(
            BulletStore::from_parts(dup, 2),
            Err(PlaybookError::CorruptSnapshot(_))
        ));
    }
}
