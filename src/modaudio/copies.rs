// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Overlapping sample copies and their deferred reclamation.
//!
//! A copy finishes on the engine's thread, but its sound may only be torn
//! down on the main thread. The completion callback moves the copy from its
//! owner's active list to the pending list under one mutex; the main thread
//! detaches the pending list once per frame and drops the copies after
//! releasing the mutex. No engine call is ever made while the mutex is held.
use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::handle::AudioHandle;
use crate::audio::{EngineError, Sound, SoundFlags};

/// Which list a copy currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CopyLink {
    Unlinked,
    Active(AudioHandle),
    Pending,
}

/// An independent instance of a sample, playing alongside its base sound.
pub(crate) struct SampleCopy {
    id: u64,
    link: CopyLink,
    sound: Arc<dyn Sound>,
}

impl SampleCopy {
    pub fn sound(&self) -> &dyn Sound {
        self.sound.as_ref()
    }

    fn unlink(&mut self) {
        self.link = CopyLink::Unlinked;
    }
}

#[derive(Default)]
struct CopyLists {
    /// Copies still playing, per owning sample, oldest first.
    active: HashMap<AudioHandle, Vec<SampleCopy>>,
    /// Finished copies awaiting teardown, in completion order.
    pending: Vec<SampleCopy>,
}

/// Shared between the subsystem and every completion callback.
#[derive(Default)]
pub(crate) struct Reclaimer {
    lists: Mutex<CopyLists>,
    next_id: AtomicU64,
}

impl Reclaimer {
    /// Duplicates `base` and links the copy at the tail of `owner`'s active list.
    /// The returned sound is not yet started.
    pub fn spawn_copy(
        self: &Arc<Self>,
        owner: AudioHandle,
        base: &dyn Sound,
    ) -> Result<Arc<dyn Sound>, EngineError> {
        let sound: Arc<dyn Sound> = Arc::from(base.duplicate(SoundFlags::SAMPLE)?);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let reclaimer = Arc::downgrade(self);
        sound.set_end_callback(Box::new(move || {
            if let Some(reclaimer) = reclaimer.upgrade() {
                reclaimer.on_copy_finished(owner, id);
            }
        }));

        self.lists
            .lock()
            .active
            .entry(owner)
            .or_default()
            .push(SampleCopy {
                id,
                link: CopyLink::Active(owner),
                sound: sound.clone(),
            });
        debug!(copy = id, owner = %owner, "Sample copy started");
        Ok(sound)
    }

    /// Completion notification, called from the engine's thread.
    /// A copy that was already reclaimed eagerly is ignored.
    fn on_copy_finished(&self, owner: AudioHandle, id: u64) {
        let mut lists = self.lists.lock();
        let Some(copies) = lists.active.get_mut(&owner) else {
            return;
        };
        let Some(position) = copies.iter().position(|copy| copy.id == id) else {
            return;
        };
        let mut copy = copies.remove(position);
        if copies.is_empty() {
            lists.active.remove(&owner);
        }
        copy.link = CopyLink::Pending;
        lists.pending.push(copy);
    }

    /// Detaches every active copy of `owner`. The caller tears them down
    /// after this returns, outside the lock.
    pub fn take_active(&self, owner: AudioHandle) -> Vec<SampleCopy> {
        let mut copies = self.lists.lock().active.remove(&owner).unwrap_or_default();
        for copy in copies.iter_mut() {
            copy.unlink();
        }
        copies
    }

    /// Tears down every finished copy. `scratch` is swapped with the pending
    /// list so its allocation is reused across frames. Returns how many were
    /// reclaimed.
    pub fn drain_pending(&self, scratch: &mut Vec<SampleCopy>) -> usize {
        {
            let mut lists = self.lists.lock();
            if lists.pending.is_empty() {
                return 0;
            }
            mem::swap(&mut lists.pending, scratch);
        }

        let count = scratch.len();
        for copy in scratch.iter_mut() {
            copy.unlink();
        }
        scratch.clear();
        count
    }

    pub fn active_count(&self, owner: AudioHandle) -> usize {
        self.lists.lock().active.get(&owner).map_or(0, Vec::len)
    }

    #[cfg(test)]
    pub fn total_active(&self) -> usize {
        self.lists.lock().active.values().map(Vec::len).sum()
    }

    pub fn pending_count(&self) -> usize {
        self.lists.lock().pending.len()
    }

    /// Panics if any copy is in the wrong list, linked twice, or an empty list is kept.
    #[cfg(test)]
    pub fn check_integrity(&self) {
        let lists = self.lists.lock();
        let mut seen = std::collections::HashSet::new();
        for (owner, copies) in lists.active.iter() {
            assert!(!copies.is_empty(), "empty active list kept for {owner}");
            for copy in copies {
                assert_eq!(copy.link, CopyLink::Active(*owner));
                assert!(seen.insert(copy.id), "copy {} linked twice", copy.id);
            }
        }
        for copy in lists.pending.iter() {
            assert_eq!(copy.link, CopyLink::Pending);
            assert!(seen.insert(copy.id), "copy {} linked twice", copy.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{mock, Engine as _};
    use crate::modaudio::pool::Pool;

    struct Fixture {
        _dir: tempfile::TempDir,
        engine: mock::Engine,
        base: Box<dyn Sound>,
        owner: AudioHandle,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hit.ogg");
        std::fs::write(&path, b"OggS").unwrap();
        let engine = mock::Engine::new("mock");
        let base = engine.load(&path, SoundFlags::SAMPLE).unwrap();
        let mut pool = Pool::new();
        let owner = AudioHandle::new(pool.allocate(()));
        Fixture {
            _dir: dir,
            engine,
            base,
            owner,
        }
    }

    #[test]
    fn test_finished_copy_moves_to_pending() {
        let f = fixture();
        let reclaimer = Arc::new(Reclaimer::default());
        let copy = reclaimer.spawn_copy(f.owner, f.base.as_ref()).unwrap();
        copy.start();
        drop(copy);
        assert_eq!(reclaimer.active_count(f.owner), 1);

        assert_eq!(f.engine.finish_playing(), 1);
        assert_eq!(reclaimer.active_count(f.owner), 0);
        assert_eq!(reclaimer.pending_count(), 1);
        reclaimer.check_integrity();
        assert_eq!(f.engine.live_sounds(), 2);

        let mut scratch = Vec::new();
        assert_eq!(reclaimer.drain_pending(&mut scratch), 1);
        assert_eq!(reclaimer.drain_pending(&mut scratch), 0);
        assert_eq!(f.engine.live_sounds(), 1);
        assert_eq!(f.engine.uninitialized(), vec![2]);
    }

    #[test]
    fn test_late_callback_after_take_is_ignored() {
        let f = fixture();
        let reclaimer = Arc::new(Reclaimer::default());
        let copy = reclaimer.spawn_copy(f.owner, f.base.as_ref()).unwrap();
        copy.start();
        drop(copy);

        let taken = reclaimer.take_active(f.owner);
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].link, CopyLink::Unlinked);
        reclaimer.on_copy_finished(f.owner, taken[0].id);
        assert_eq!(reclaimer.pending_count(), 0);
        drop(taken);
        assert_eq!(f.engine.uninitialized(), vec![2]);
    }

    #[test]
    fn test_copies_stay_in_start_order() {
        let f = fixture();
        let reclaimer = Arc::new(Reclaimer::default());
        for _ in 0..3 {
            reclaimer.spawn_copy(f.owner, f.base.as_ref()).unwrap().start();
        }
        assert_eq!(reclaimer.total_active(), 3);

        // Copy ids are 0, 1, 2; finish the middle one.
        reclaimer.on_copy_finished(f.owner, 1);
        let taken = reclaimer.take_active(f.owner);
        let ids: Vec<u64> = taken.iter().map(|copy| copy.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(reclaimer.pending_count(), 1);
    }

    #[test]
    fn test_callback_after_reclaimer_dropped() {
        let f = fixture();
        let reclaimer = Arc::new(Reclaimer::default());
        let copy = reclaimer.spawn_copy(f.owner, f.base.as_ref()).unwrap();
        copy.start();
        let mut taken = reclaimer.take_active(f.owner);
        drop(reclaimer);
        assert_eq!(f.engine.finish_playing(), 1);
        taken.clear();
        drop(copy);
        assert_eq!(f.engine.live_sounds(), 1);
    }
}
