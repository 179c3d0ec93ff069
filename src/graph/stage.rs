//! Stage trait - the unified interface for graph consumers

use std::sync::{Arc, Mutex};

/// A consumer attached to a source's fan-out tap
///
/// Stages receive every block as a shared read-only slice. A stage that
/// needs to keep or transform samples copies them into its own buffers.
pub trait Stage: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Consume one block of mono samples
    fn process(&mut self, block: &[f32]);

    /// Called when the stage is connected to a source
    fn on_attach(&mut self, _sample_rate: u32) {}

    /// Called when the stage is disconnected (detach or release)
    fn on_detach(&mut self) {}
}

/// Shared handle to an attached stage
///
/// Callers keep a typed `Arc<Mutex<S>>` for configuration and hand a clone
/// to the graph; both refer to the same stage instance.
pub type StageRef = Arc<Mutex<dyn Stage>>;

/// Identity comparison ignoring vtable pointers
pub(crate) fn same_stage(a: &StageRef, b: &StageRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl Stage for Nop {
        fn name(&self) -> &'static str {
            "nop"
        }

        fn process(&mut self, _block: &[f32]) {}
    }

    #[test]
    fn test_same_stage_uses_instance_identity() {
        let a: StageRef = Arc::new(Mutex::new(Nop));
        let a2 = Arc::clone(&a);
        let b: StageRef = Arc::new(Mutex::new(Nop));

        assert!(same_stage(&a, &a2));
        assert!(!same_stage(&a, &b));
    }
}
