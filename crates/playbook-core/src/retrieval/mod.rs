//! Retrieval of relevant bullets for a query embedding.
//!
//! Ranking runs entirely against in-memory state and is called with the
//! playbook read lock held. Embedding the query happens before that, in the
//! [`Playbook`](crate::Playbook) facade.

use std::cmp::Ordering;
use std::fmt::Write;

use tracing::{debug, warn};

use crate::bullets::{Bullet, BulletStore};
use crate::error::Result;
use crate::index::VectorIndex;

/// A bullet together with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBullet {
    pub bullet: Bullet,
    pub similarity: f32,
}

/// Ranks index hits against the store.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalEngine {
    candidate_multiplier: usize,
}

impl RetrievalEngine {
    /// Creates an engine that over-fetches `candidate_multiplier * top_k`
    /// ids from the index. A multiplier of zero is treated as one.
    pub fn new(candidate_multiplier: usize) -> Self {
        Self { candidate_multiplier: candidate_multiplier.max(1) }
    }

    /// Nearest live bullets, with stale index ids dropped.
    ///
    /// No score filter is applied; the curator uses this to find candidates.
    ///
    /// # Errors
    /// Returns an index error if the query vector is rejected.
    pub fn nearest(
        &self,
        store: &BulletStore,
        index: &dyn VectorIndex,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredBullet>> {
        let k = limit.min(store.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let hits = index.query(query, k)?;
        let mut resolved = Vec::with_capacity(hits.len());
        for hit in hits {
            match store.get(&hit.id) {
                Ok(bullet) => {
                    resolved.push(ScoredBullet { bullet: bullet.clone(), similarity: hit.similarity });
                }
                Err(_) => {
                    warn!(bullet_id = %hit.id, "Index inconsistency: dropping id missing from store");
                }
            }
        }
        Ok(resolved)
    }

    /// Top `top_k` bullets for `query` with `net_score >= 0`.
    ///
    /// Ordered by similarity, then net score, then age (oldest first).
    /// Returns fewer than `top_k` if not enough bullets survive filtering.
    ///
    /// # Errors
    /// Returns an index error if the query vector is rejected.
    pub fn rank(
        &self,
        store: &BulletStore,
        index: &dyn VectorIndex,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredBullet>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let fetch = top_k.saturating_mul(self.candidate_multiplier);
        let candidates = self.nearest(store, index, query, fetch)?;
        let fetched = candidates.len();

        let mut ranked: Vec<ScoredBullet> =
            candidates.into_iter().filter(|c| c.bullet.net_score() >= 0).collect();
        ranked.sort_by(compare_ranked);
        ranked.truncate(top_k);

        debug!(top_k, fetched, returned = ranked.len(), "Ranked retrieval candidates");
        Ok(ranked)
    }
}

impl Default for RetrievalEngine {
    fn default() -> Self {
        Self::new(3)
    }
}

fn compare_ranked(a: &ScoredBullet, b: &ScoredBullet) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| b.bullet.net_score().cmp(&a.bullet.net_score()))
        .then_with(|| a.bullet.created_at.cmp(&b.bullet.created_at))
}

/// Renders bullets as a prompt block grouped by section.
///
/// Sections appear in the order they are first seen in `bullets`, so a
/// ranked list keeps its most relevant section on top.
pub fn format_context(bullets: &[Bullet]) -> String {
    if bullets.is_empty() {
        return String::new();
    }

    let mut sections: Vec<&str> = Vec::new();
    for bullet in bullets {
        if !sections.contains(&bullet.section.as_str()) {
            sections.push(&bullet.section);
        }
    }

    let mut context = String::from("# Playbook Strategies\n\n");
    for section in sections {
        let _ = writeln!(context, "## {}\n", section);
        for bullet in bullets.iter().filter(|b| b.section == section) {
            let counts = if bullet.helpful_count > 0 || bullet.harmful_count > 0 {
                format!(" (helpful={}, harmful={})", bullet.helpful_count, bullet.harmful_count)
            } else {
                String::new()
            };
            let _ = writeln!(context, "- [{}] {}{}", bullet.id, bullet.content, counts);
        }
        context.push('\n');
    }

    context.trim().to_string()
}
