//! Signal graph - single-binding ownership of audio sources with stage fan-out
//!
//! An [`AudioSource`] may be bound to a processing graph at most once for its
//! whole lifetime. Binding creates a slot in the graph arena and returns an
//! opaque [`GraphHandle`]. Stages attached to the handle are connected in
//! parallel: every block dispatched to the handle reaches every stage, and
//! detaching one stage never disturbs the others.
//!
//! `dispatch`, `detach_stage` and `release` serialize on the arena lock, so
//! once a detach or release returns no further block reaches the removed
//! stages.

pub mod analyzer;
mod stage;

pub use analyzer::{AnalyzerStage, AnalyzerTap, MagnitudeSnapshot, SpectrumAnalyzer};
pub use stage::{Stage, StageRef};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::error::{log_graph_error, GraphError};
use stage::same_stage;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// A playable or recordable stream
///
/// Owned by the caller (player, recorder, engine). The graph only keeps a
/// weak reference plus the `bound` flag stored here.
#[derive(Debug)]
pub struct AudioSource {
    id: u64,
    sample_rate: u32,
    bound: AtomicBool,
}

impl AudioSource {
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            sample_rate,
            bound: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Whether a graph has ever been bound to this source
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    /// Set the bound flag; false if it was already set
    fn mark_bound(&self) -> bool {
        !self.bound.swap(true, Ordering::AcqRel)
    }
}

/// Opaque reference to one binding in a [`SignalGraph`]
///
/// Handles are invalidated by `release`; a stale handle never aliases a
/// newer binding that reuses the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphHandle {
    slot: usize,
    generation: u64,
}

impl GraphHandle {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct Binding {
    source: Weak<AudioSource>,
    source_id: u64,
    sample_rate: u32,
    stages: Vec<StageRef>,
}

struct Slot {
    generation: u64,
    binding: Option<Binding>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Arena {
    fn binding(&self, handle: GraphHandle) -> Option<&Binding> {
        self.slots
            .get(handle.slot)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.binding.as_ref())
    }

    fn binding_mut(&mut self, handle: GraphHandle) -> Option<&mut Binding> {
        self.slots
            .get_mut(handle.slot)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.binding.as_mut())
    }
}

/// Arena of source bindings and their attached stages
#[derive(Default)]
pub struct SignalGraph {
    arena: Mutex<Arena>,
}

impl SignalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn arena(&self) -> MutexGuard<'_, Arena> {
        match self.arena.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::error!("[SignalGraph] Arena lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Bind a source and create its shared tap point
    ///
    /// Fails with [`GraphError::AlreadyBound`] if the source has ever been
    /// bound, even if that binding was released since. The error is never
    /// worth retrying.
    pub fn bind(&self, source: &Arc<AudioSource>) -> Result<GraphHandle, GraphError> {
        if !source.mark_bound() {
            let err = GraphError::AlreadyBound {
                source_id: source.id(),
            };
            log_graph_error(&err, "bind");
            return Err(err);
        }

        let binding = Binding {
            source: Arc::downgrade(source),
            source_id: source.id(),
            sample_rate: source.sample_rate(),
            stages: Vec::new(),
        };

        let mut arena = self.arena();
        let handle = match arena.free.pop() {
            Some(index) => {
                let slot = &mut arena.slots[index];
                slot.binding = Some(binding);
                GraphHandle {
                    slot: index,
                    generation: slot.generation,
                }
            }
            None => {
                arena.slots.push(Slot {
                    generation: 0,
                    binding: Some(binding),
                });
                GraphHandle {
                    slot: arena.slots.len() - 1,
                    generation: 0,
                }
            }
        };

        log::info!(
            "[SignalGraph] Bound source {} ({} Hz) to slot {}",
            source.id(),
            source.sample_rate(),
            handle.slot
        );
        Ok(handle)
    }

    /// Connect a stage to the handle's tap
    ///
    /// Attaching a stage that is already attached is a no-op. Attaching to
    /// a released handle is a caller bug and fails with
    /// [`GraphError::Released`].
    pub fn attach_stage(&self, handle: GraphHandle, stage: StageRef) -> Result<(), GraphError> {
        let mut arena = self.arena();
        let Some(binding) = arena.binding_mut(handle) else {
            let err = GraphError::Released { slot: handle.slot };
            log_graph_error(&err, "attach_stage");
            return Err(err);
        };

        if binding.stages.iter().any(|s| same_stage(s, &stage)) {
            return Ok(());
        }

        let name = match stage.lock() {
            Ok(mut s) => {
                s.on_attach(binding.sample_rate);
                s.name()
            }
            Err(poisoned) => poisoned.into_inner().name(),
        };
        binding.stages.push(stage);
        log::debug!(
            "[SignalGraph] Attached stage '{}' to source {} ({} stages)",
            name,
            binding.source_id,
            binding.stages.len()
        );
        Ok(())
    }

    /// Disconnect exactly this stage; returns whether it was attached
    pub fn detach_stage(&self, handle: GraphHandle, stage: &StageRef) -> bool {
        let mut arena = self.arena();
        let Some(binding) = arena.binding_mut(handle) else {
            return false;
        };

        let Some(index) = binding.stages.iter().position(|s| same_stage(s, stage)) else {
            return false;
        };

        let removed = binding.stages.remove(index);
        if let Ok(mut s) = removed.lock() {
            s.on_detach();
            log::debug!("[SignalGraph] Detached stage '{}'", s.name());
        }
        true
    }

    /// Disconnect every stage and invalidate the handle
    ///
    /// Returns false if the handle was already released. The source stays
    /// marked bound.
    pub fn release(&self, handle: GraphHandle) -> bool {
        let mut arena = self.arena();
        let Some(slot) = arena
            .slots
            .get_mut(handle.slot)
            .filter(|slot| slot.generation == handle.generation)
        else {
            return false;
        };
        let Some(binding) = slot.binding.take() else {
            return false;
        };
        slot.generation += 1;
        arena.free.push(handle.slot);

        for stage in &binding.stages {
            if let Ok(mut s) = stage.lock() {
                s.on_detach();
            }
        }

        log::info!(
            "[SignalGraph] Released source {} ({} stages disconnected)",
            binding.source_id,
            binding.stages.len()
        );
        true
    }

    /// Deliver one block to every attached stage
    ///
    /// Returns the number of stages that processed the block. A stage whose
    /// lock is poisoned is skipped; the others still run.
    pub fn dispatch(&self, handle: GraphHandle, block: &[f32]) -> Result<usize, GraphError> {
        let arena = self.arena();
        let binding = arena
            .binding(handle)
            .ok_or(GraphError::Released { slot: handle.slot })?;

        if binding.source.strong_count() == 0 {
            return Err(GraphError::SourceDropped);
        }

        let mut delivered = 0;
        for stage in &binding.stages {
            match stage.lock() {
                Ok(mut s) => {
                    s.process(block);
                    delivered += 1;
                }
                Err(_) => {
                    log::error!("[SignalGraph] Stage lock poisoned, skipping block");
                }
            }
        }
        Ok(delivered)
    }

    pub fn is_live(&self, handle: GraphHandle) -> bool {
        self.arena().binding(handle).is_some()
    }

    pub fn is_attached(&self, handle: GraphHandle, stage: &StageRef) -> bool {
        self.arena()
            .binding(handle)
            .map(|b| b.stages.iter().any(|s| same_stage(s, stage)))
            .unwrap_or(false)
    }

    /// Number of stages attached to the handle (0 once released)
    pub fn stage_count(&self, handle: GraphHandle) -> usize {
        self.arena()
            .binding(handle)
            .map(|b| b.stages.len())
            .unwrap_or(0)
    }

    /// Number of live bindings
    pub fn live_count(&self) -> usize {
        self.arena()
            .slots
            .iter()
            .filter(|slot| slot.binding.is_some())
            .count()
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
