// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! OS-wide named mutexes keyed by (kind, device index).
//!
//! Realized as flock'd files: the kernel drops the lock when the holding
//! process dies, so a crashed holder never wedges the device. Queue pointers
//! are written word-by-word, so the post-crash state is usable as-is and no
//! explicit recovery step is needed.
//!
//! The flock is per open file description, not per thread; a process-local
//! mutex in front of it serializes threads sharing the handle.

use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;

use crate::error::PlatformError;

const LOCK_DIR: &str = "/tmp/tenstorrent";

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum MutexKind {
    ArcMsg,
    RemoteArcMsg,
    NonMmio,
    MemBarrier,
    Tlb(u32),
}

impl MutexKind {
    fn file_stem(&self) -> String {
        match self {
            MutexKind::ArcMsg => "arc_msg".to_string(),
            MutexKind::RemoteArcMsg => "remote_arc_msg".to_string(),
            MutexKind::NonMmio => "non_mmio".to_string(),
            MutexKind::MemBarrier => "mem_barrier".to_string(),
            MutexKind::Tlb(index) => format!("tlb_{index}"),
        }
    }
}

pub struct NamedMutex {
    file: std::fs::File,
    local: Mutex<()>,
}

pub struct NamedMutexGuard<'a> {
    file: &'a std::fs::File,
    _local: MutexGuard<'a, ()>,
}

impl Drop for NamedMutexGuard<'_> {
    fn drop(&mut self) {
        let _ = nix::fcntl::flock(self.file.as_raw_fd(), nix::fcntl::FlockArg::Unlock);
    }
}

impl NamedMutex {
    fn open(kind: MutexKind, device_index: usize) -> Result<Self, PlatformError> {
        std::fs::create_dir_all(LOCK_DIR).map_err(|e| {
            PlatformError::MutexOwnerDead(format!("cannot create lock directory {LOCK_DIR}: {e}"))
        })?;

        let path = format!("{LOCK_DIR}/{}_{device_index}.lock", kind.file_stem());
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| {
                PlatformError::MutexOwnerDead(format!("cannot open lock file {path}: {e}"))
            })?;

        Ok(Self {
            file,
            local: Mutex::new(()),
        })
    }

    pub fn lock(&self) -> Result<NamedMutexGuard<'_>, PlatformError> {
        // A poisoned local mutex means a thread died while holding the lock;
        // the same assume-consistent recovery as for a dead process applies.
        let local = self.local.lock().unwrap_or_else(|poison| poison.into_inner());

        loop {
            match nix::fcntl::flock(
                self.file.as_raw_fd(),
                nix::fcntl::FlockArg::LockExclusive,
            ) {
                Ok(()) => break,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(err) => {
                    return Err(PlatformError::MutexOwnerDead(format!(
                        "flock failed with {err}"
                    )));
                }
            }
        }

        Ok(NamedMutexGuard {
            file: &self.file,
            _local: local,
        })
    }
}

// One handle per (kind, device) for the life of the process; other processes
// coordinate through the file, not this map.
static REGISTRY: Lazy<Mutex<HashMap<(MutexKind, usize), Arc<NamedMutex>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub struct LockManager;

impl LockManager {
    pub fn get(kind: MutexKind, device_index: usize) -> Result<Arc<NamedMutex>, PlatformError> {
        let mut registry = REGISTRY.lock().unwrap_or_else(|poison| poison.into_inner());

        if let Some(existing) = registry.get(&(kind, device_index)) {
            return Ok(existing.clone());
        }

        let mutex = Arc::new(NamedMutex::open(kind, device_index)?);
        registry.insert((kind, device_index), mutex.clone());
        Ok(mutex)
    }

    /// Create the standard per-device mutexes ahead of first use.
    pub fn initialize_for_device(device_index: usize) -> Result<(), PlatformError> {
        for kind in [
            MutexKind::ArcMsg,
            MutexKind::RemoteArcMsg,
            MutexKind::NonMmio,
            MutexKind::MemBarrier,
        ] {
            Self::get(kind, device_index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_reentrant_across_acquisitions() {
        let mutex = LockManager::get(MutexKind::Tlb(999), usize::MAX - 1).unwrap();
        {
            let _guard = mutex.lock().unwrap();
        }
        // Released on drop, second acquisition succeeds.
        let _guard = mutex.lock().unwrap();
    }

    #[test]
    fn registry_hands_out_one_handle_per_key() {
        let a = LockManager::get(MutexKind::NonMmio, usize::MAX - 2).unwrap();
        let b = LockManager::get(MutexKind::NonMmio, usize::MAX - 2).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
