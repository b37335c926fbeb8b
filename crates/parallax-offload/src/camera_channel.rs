//! Shared camera slots.
//!
//! Seven `f32` slots (position xyz, orientation xyzw) stored as bit patterns in
//! atomics. The control side writes them at most once per frame; the render
//! loop reads them once per frame. There is no lock and no cross-slot
//! ordering: a reader may observe a mix of two consecutive writes. That
//! mismatch lasts at most one frame and is accepted.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use glam::Quat;
use parallax_engine::scene::CameraPose;

const SLOTS: usize = CameraPose::SLOTS;

#[derive(Debug, Default)]
struct Slots {
    values: [AtomicU32; SLOTS],
    written: AtomicBool,
}

/// Creates the single writer and single reader of a fresh channel.
pub fn camera_channel() -> (CameraWriter, CameraReader) {
    let slots = Arc::new(Slots::default());
    (
        CameraWriter {
            slots: slots.clone(),
        },
        CameraReader { slots },
    )
}

/// Control-side half. Not cloneable: there is exactly one writer.
#[derive(Debug)]
pub struct CameraWriter {
    slots: Arc<Slots>,
}

impl CameraWriter {
    pub fn write(&self, pose: &CameraPose) {
        for (slot, value) in self.slots.values.iter().zip(pose.to_slots()) {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
        self.slots.written.store(true, Ordering::Release);
    }
}

/// Render-side half. Not cloneable: there is exactly one reader.
#[derive(Debug)]
pub struct CameraReader {
    slots: Arc<Slots>,
}

impl CameraReader {
    /// Latest pose, or `None` until the writer has written once.
    pub fn read(&self) -> Option<CameraPose> {
        if !self.slots.written.load(Ordering::Acquire) {
            return None;
        }
        let mut raw = [0.0f32; SLOTS];
        for (out, slot) in raw.iter_mut().zip(&self.slots.values) {
            *out = f32::from_bits(slot.load(Ordering::Relaxed));
        }
        let mut pose = CameraPose::from_slots(raw);
        // A torn read can mix two orientations.
        let len = pose.orientation.length();
        pose.orientation = if len.is_finite() && len > f32::EPSILON {
            pose.orientation.normalize()
        } else {
            Quat::IDENTITY
        };
        Some(pose)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use glam::Vec3;

    use super::*;

    #[test]
    fn nothing_before_first_write() {
        let (_writer, reader) = camera_channel();
        assert_eq!(reader.read(), None);
    }

    #[test]
    fn reader_sees_latest_write() {
        let (writer, reader) = camera_channel();
        for z in 1..=5 {
            writer.write(&CameraPose {
                position: Vec3::new(0.0, 1.0, z as f32),
                orientation: Quat::from_rotation_y(0.5),
            });
        }
        let pose = reader.read().unwrap();
        assert_eq!(pose.position, Vec3::new(0.0, 1.0, 5.0));
        assert!(pose.orientation.abs_diff_eq(Quat::from_rotation_y(0.5), 1e-6));
    }

    #[test]
    fn halves_work_across_threads() {
        let (writer, reader) = camera_channel();
        let handle = thread::spawn(move || {
            writer.write(&CameraPose {
                position: Vec3::splat(2.0),
                orientation: Quat::IDENTITY,
            });
        });
        handle.join().unwrap();
        assert_eq!(reader.read().map(|p| p.position), Some(Vec3::splat(2.0)));
    }
}
