//! Arena of overlay-handle slots with a stable-key index
//!
//! The rendering surface keeps one long-lived handle per [`OverlayKey`]. The arena
//! mirrors those handles: each commit creates, reuses or clears slots explicitly, and a
//! component may only write or retire keys it created itself.

use std::collections::HashMap;

use super::{reconcile::MarkerLayers, OverlayFrame, OverlayKey, OverlayPlan, OverlaySeries};

/// Component that created (and alone may retire) a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum OverlayOwner {
    Synthesizer,
    RangeExtractor,
    Reconciler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

#[derive(Debug, Clone)]
struct Slot {
    owner: OverlayOwner,
    series: OverlaySeries,
    pass: u64,
}

#[derive(Debug, Default)]
pub struct OverlayArena {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<OverlayKey, SlotId>,
    pass: u64,
}

impl OverlayArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Allocated slots, live or free
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of commits so far
    pub fn passes(&self) -> u64 {
        self.pass
    }

    pub fn get(&self, key: &OverlayKey) -> Option<&OverlaySeries> {
        self.slot(key).map(|s| &s.series)
    }

    pub fn owner(&self, key: &OverlayKey) -> Option<OverlayOwner> {
        self.slot(key).map(|s| s.owner)
    }

    /// Live keys, sorted
    pub fn keys(&self) -> Vec<&OverlayKey> {
        let mut keys: Vec<_> = self.index.keys().collect();
        keys.sort();
        keys
    }

    fn slot(&self, key: &OverlayKey) -> Option<&Slot> {
        let SlotId(idx) = *self.index.get(key)?;
        self.slots.get(idx).and_then(Option::as_ref)
    }

    /// Apply a whole plan. Nothing is observable until the returned frame exists.
    ///
    /// Stale keys are released after the pass's writes, so their slots serve new keys
    /// from the next pass on.
    pub fn commit(&mut self, plan: OverlayPlan) -> OverlayFrame {
        self.pass += 1;
        let (batches, markers, visible_base) = plan.into_batches();

        let mut series: Vec<OverlaySeries> = Vec::new();
        let mut positions: HashMap<OverlayKey, usize> = HashMap::new();
        let mut owners = Vec::with_capacity(batches.len());

        for (owner, batch) in batches {
            owners.push(owner);
            for desired in batch {
                let Some(written) = self.upsert(owner, desired) else {
                    continue;
                };
                match positions.get(&written.key) {
                    Some(&pos) => series[pos] = written,
                    None => {
                        positions.insert(written.key.clone(), series.len());
                        series.push(written);
                    }
                }
            }
        }

        let retired = self.retire_stale(&owners, &mut series);
        if !retired.is_empty() {
            tracing::debug!(pass = self.pass, retired = retired.len(), "retired overlay keys");
        }

        OverlayFrame {
            series,
            retired,
            markers,
            visible_base,
        }
    }

    /// Retire every live key and clear both marker layers.
    pub fn retire_all(&mut self) -> OverlayFrame {
        self.pass += 1;
        let mut series = Vec::new();
        let owners = [
            OverlayOwner::Synthesizer,
            OverlayOwner::RangeExtractor,
            OverlayOwner::Reconciler,
        ];
        let retired = self.retire_stale(&owners, &mut series);
        OverlayFrame {
            series,
            retired,
            markers: MarkerLayers::default(),
            visible_base: None,
        }
    }

    fn upsert(&mut self, owner: OverlayOwner, desired: OverlaySeries) -> Option<OverlaySeries> {
        let pass = self.pass;
        if let Some(&SlotId(idx)) = self.index.get(&desired.key) {
            if let Some(slot) = self.slots.get_mut(idx).and_then(Option::as_mut) {
                if slot.owner != owner {
                    tracing::warn!(
                        key = %desired.key,
                        ?owner,
                        existing = ?slot.owner,
                        "ignoring write to overlay key owned by another component"
                    );
                    return None;
                }
                slot.series = desired;
                slot.pass = pass;
                return Some(slot.series.clone());
            }
        }

        let written = desired.clone();
        let slot = Slot {
            owner,
            series: desired,
            pass,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.index.insert(written.key.clone(), SlotId(idx));
        Some(written)
    }

    /// Empty and release every slot of `owners` not written in the current pass.
    fn retire_stale(
        &mut self,
        owners: &[OverlayOwner],
        series: &mut Vec<OverlaySeries>,
    ) -> Vec<OverlayKey> {
        let pass = self.pass;
        let mut stale: Vec<(OverlayKey, usize)> = self
            .index
            .iter()
            .filter_map(|(key, &SlotId(idx))| {
                let slot = self.slots.get(idx)?.as_ref()?;
                (slot.pass != pass && owners.contains(&slot.owner)).then(|| (key.clone(), idx))
            })
            .collect();
        stale.sort();

        let mut retired = Vec::with_capacity(stale.len());
        for (key, idx) in stale {
            self.index.remove(&key);
            if let Some(slot) = self.slots.get_mut(idx).and_then(Option::take) {
                series.push(slot.series.retired());
            }
            self.free.push(idx);
            retired.push(key);
        }
        retired
    }
}
