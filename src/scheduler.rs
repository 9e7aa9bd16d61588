//! Rotating section scheduler
//!
//! The ordered symbol universe is cut into `total_sections` slices of
//! `section_size` symbols. Each sectioned run advances a persisted cursor and
//! processes the slice it lands on, so `total_sections` consecutive runs cover
//! the whole universe without the caller tracking position.
//!
//! Invocations are expected to be serialized by whatever schedules them; the
//! cursor update is transactional but two overlapping runs can still pick the
//! same section.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

/// Persistent home of the section cursor
#[async_trait::async_trait]
pub trait CursorStore: Send + Sync {
    /// Advance the cursor with [`next_section`], persist it, and return the
    /// section this run owns
    async fn advance_section(&self, total_sections: u32) -> Result<u32>;
}

/// `(last mod total) + 1`: cycles through `1..=total_sections`
pub fn next_section(last_section: u32, total_sections: u32) -> u32 {
    (last_section % total_sections.max(1)) + 1
}

/// The 1-based, inclusive index range one run processes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionPlan {
    pub section: u32,
    pub start_index: usize,
    pub end_index: usize,
}

impl SectionPlan {
    pub fn new(section: u32, section_size: usize, total_symbols: usize) -> Self {
        let section_idx = section.max(1) as usize;
        Self {
            section,
            start_index: (section_idx - 1) * section_size + 1,
            end_index: (section_idx * section_size).min(total_symbols),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_index > self.end_index
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.end_index - self.start_index + 1
        }
    }

    /// The part of `items` this section covers
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        if self.is_empty() {
            return &[];
        }
        let end = self.end_index.min(items.len());
        let start = (self.start_index - 1).min(end);
        &items[start..end]
    }
}

/// Claims the next section for a run
#[derive(Clone)]
pub struct SectionScheduler {
    cursor: Arc<dyn CursorStore>,
    section_size: usize,
    total_sections: u32,
}

impl SectionScheduler {
    pub fn new(cursor: Arc<dyn CursorStore>, section_size: usize, total_sections: u32) -> Self {
        Self { cursor, section_size, total_sections }
    }

    /// Advance the persisted cursor and compute this run's bounds.
    ///
    /// The cursor moves before any symbol is processed, so a crashed run's
    /// section is revisited on the next cycle rather than retried immediately.
    pub async fn claim_next(&self, total_symbols: usize) -> Result<SectionPlan> {
        let covered = self.section_size.saturating_mul(self.total_sections as usize);
        if covered < total_symbols {
            warn!(
                "⚠️ {} sections of {} cover only {} of {} symbols; the rest are never scheduled",
                self.total_sections, self.section_size, covered, total_symbols
            );
        }

        let section = self.cursor.advance_section(self.total_sections).await?;
        let plan = SectionPlan::new(section, self.section_size, total_symbols);

        info!(
            "🧭 Section {}/{}: symbols {}..={} of {}",
            plan.section, self.total_sections, plan.start_index, plan.end_index, total_symbols
        );
        Ok(plan)
    }
}
