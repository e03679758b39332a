//! Secondary copies of the frame buffer that other threads or processes can
//! read and write.
//!
//! Single elements become visible to other readers as they are stored, but a
//! whole-buffer copy is not atomic. `publish` brackets its stores with a
//! sequence counter: the generation is odd while a publish is in progress and
//! moves to the next even value once it is done. A reader that wants a
//! consistent frame reads the generation, copies the elements, reads the
//! generation again and retries if it was odd or moved. Plain `store` calls
//! outside a publish do not touch the counter.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::MirrorError;

/// Fixed-size byte array shared outside the driver
pub trait Mirror: Send + Sync {
    fn len(&self) -> usize;

    fn load(&self, index: usize) -> Result<u8, MirrorError>;

    fn store(&self, index: usize, value: u8) -> Result<(), MirrorError>;

    /// Sequence counter: twice the number of completed publishes, plus one
    /// while a publish is in progress
    fn generation(&self) -> u64;

    /// Move the generation to the next odd value. Only one writer may
    /// publish at a time.
    fn begin_write(&self) -> Result<(), MirrorError>;

    /// Move the generation from odd to the next even value
    fn end_write(&self) -> Result<(), MirrorError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `frame` into the mirror element by element inside a
    /// `begin_write`/`end_write` bracket
    fn publish(&self, frame: &[u8]) -> Result<(), MirrorError> {
        self.begin_write()?;
        let stored = frame
            .iter()
            .enumerate()
            .try_for_each(|(index, &value)| self.store(index, value));
        // The counter must return to even even when a store failed
        let ended = self.end_write();
        stored.and(ended)
    }

    /// Copy the mirror into `frame` element by element
    fn fetch(&self, frame: &mut [u8]) -> Result<(), MirrorError> {
        for (index, value) in frame.iter_mut().enumerate() {
            *value = self.load(index)?;
        }
        Ok(())
    }

    /// Copy the mirror into `frame` once. Returns `Ok(false)` when a publish
    /// was in progress or completed during the copy, in which case `frame`
    /// may be torn and the caller should retry.
    fn try_fetch(&self, frame: &mut [u8]) -> Result<bool, MirrorError> {
        let before = self.generation();
        if before % 2 == 1 {
            return Ok(false);
        }
        self.fetch(frame)?;
        Ok(self.generation() == before)
    }
}

/// In-process mirror backed by atomics. Clones share storage.
#[derive(Debug, Clone)]
pub struct SharedMirror {
    cells: Arc<[AtomicU8]>,
    generation: Arc<AtomicU64>,
}

impl SharedMirror {
    pub fn new(len: usize) -> Self {
        SharedMirror {
            cells: (0..len).map(|_| AtomicU8::new(0)).collect(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Read the whole mirror once, or `None` when a publish overlapped the
    /// read
    pub fn try_snapshot(&self) -> Option<Vec<u8>> {
        let before = self.generation.load(Ordering::Acquire);
        if before % 2 == 1 {
            return None;
        }
        let data: Vec<u8> = self
            .cells
            .iter()
            .map(|cell| cell.load(Ordering::Acquire))
            .collect();
        (self.generation.load(Ordering::Acquire) == before).then_some(data)
    }

    /// Read the whole mirror, retrying until no publish overlapped the read
    #[allow(dead_code)]
    pub fn snapshot(&self) -> Vec<u8> {
        loop {
            if let Some(data) = self.try_snapshot() {
                return data;
            }
            std::thread::yield_now();
        }
    }

    fn cell(&self, index: usize) -> Result<&AtomicU8, MirrorError> {
        self.cells.get(index).ok_or(MirrorError::OutOfBounds {
            index,
            len: self.cells.len(),
        })
    }
}

impl Mirror for SharedMirror {
    fn len(&self) -> usize {
        self.cells.len()
    }

    fn load(&self, index: usize) -> Result<u8, MirrorError> {
        Ok(self.cell(index)?.load(Ordering::Acquire))
    }

    fn store(&self, index: usize, value: u8) -> Result<(), MirrorError> {
        self.cell(index)?.store(value, Ordering::Release);
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn begin_write(&self) -> Result<(), MirrorError> {
        let previous = self.generation.fetch_add(1, Ordering::AcqRel);
        debug_assert!(previous % 2 == 0, "publish already in progress");
        Ok(())
    }

    fn end_write(&self) -> Result<(), MirrorError> {
        let previous = self.generation.fetch_add(1, Ordering::AcqRel);
        debug_assert!(previous % 2 == 1, "no publish in progress");
        Ok(())
    }
}

#[cfg(unix)]
pub use file::FileMirror;

#[cfg(unix)]
mod file {
    use std::fs::{File, OpenOptions};
    use std::os::unix::fs::FileExt;
    use std::path::{Path, PathBuf};

    use super::Mirror;
    use crate::error::MirrorError;

    const HEADER_LEN: u64 = 8;

    /// Mirror kept in a file, typically on tmpfs (`/dev/shm`), so separate
    /// processes can open the same path.
    ///
    /// Layout: little-endian `u64` generation, then the buffer bytes. The
    /// header is plain file data, so only one process may publish.
    #[derive(Debug)]
    pub struct FileMirror {
        path: PathBuf,
        file: File,
        len: usize,
    }

    impl FileMirror {
        /// Create (or truncate) the mirror file with room for `len` bytes
        pub fn create(path: impl AsRef<Path>, len: usize) -> Result<Self, MirrorError> {
            let path = path.as_ref().to_path_buf();
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .map_err(|source| MirrorError::Io {
                    path: path.clone(),
                    source,
                })?;
            file.set_len(HEADER_LEN + len as u64)
                .map_err(|source| MirrorError::Io {
                    path: path.clone(),
                    source,
                })?;
            Ok(FileMirror { path, file, len })
        }

        /// Attach to a mirror file another process created
        #[allow(dead_code)]
        pub fn open(path: impl AsRef<Path>) -> Result<Self, MirrorError> {
            let path = path.as_ref().to_path_buf();
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|source| MirrorError::Io {
                    path: path.clone(),
                    source,
                })?;
            let size = file
                .metadata()
                .map_err(|source| MirrorError::Io {
                    path: path.clone(),
                    source,
                })?
                .len();
            if size < HEADER_LEN {
                return Err(MirrorError::Truncated { path });
            }
            let len = (size - HEADER_LEN) as usize;
            Ok(FileMirror { path, file, len })
        }

        fn io(&self, source: std::io::Error) -> MirrorError {
            MirrorError::Io {
                path: self.path.clone(),
                source,
            }
        }

        fn check(&self, index: usize) -> Result<u64, MirrorError> {
            if index >= self.len {
                return Err(MirrorError::OutOfBounds {
                    index,
                    len: self.len,
                });
            }
            Ok(HEADER_LEN + index as u64)
        }

        fn read_generation(&self) -> Result<u64, MirrorError> {
            let mut header = [0u8; HEADER_LEN as usize];
            self.file
                .read_exact_at(&mut header, 0)
                .map_err(|e| self.io(e))?;
            Ok(u64::from_le_bytes(header))
        }

        fn set_generation(&self, generation: u64) -> Result<(), MirrorError> {
            self.file
                .write_all_at(&generation.to_le_bytes(), 0)
                .map_err(|e| self.io(e))
        }
    }

    impl Mirror for FileMirror {
        fn len(&self) -> usize {
            self.len
        }

        fn load(&self, index: usize) -> Result<u8, MirrorError> {
            let offset = self.check(index)?;
            let mut byte = [0u8; 1];
            self.file
                .read_exact_at(&mut byte, offset)
                .map_err(|e| self.io(e))?;
            Ok(byte[0])
        }

        fn store(&self, index: usize, value: u8) -> Result<(), MirrorError> {
            let offset = self.check(index)?;
            self.file.write_all_at(&[value], offset).map_err(|e| self.io(e))
        }

        fn generation(&self) -> u64 {
            match self.read_generation() {
                Ok(generation) => generation,
                Err(e) => {
                    // Odd, so readers treat the frame as unsettled and retry
                    log::warn!("{}", e);
                    1
                }
            }
        }

        fn begin_write(&self) -> Result<(), MirrorError> {
            self.set_generation(self.read_generation()? | 1)
        }

        fn end_write(&self) -> Result<(), MirrorError> {
            let current = self.read_generation()?;
            self.set_generation((current | 1).wrapping_add(1))
        }

        // One positioned write instead of a syscall per byte
        fn publish(&self, frame: &[u8]) -> Result<(), MirrorError> {
            if frame.len() > self.len {
                return Err(MirrorError::OutOfBounds {
                    index: frame.len() - 1,
                    len: self.len,
                });
            }
            self.begin_write()?;
            let written = self
                .file
                .write_all_at(frame, HEADER_LEN)
                .map_err(|e| self.io(e));
            let ended = self.end_write();
            written.and(ended)
        }

        fn fetch(&self, frame: &mut [u8]) -> Result<(), MirrorError> {
            if frame.len() > self.len {
                return Err(MirrorError::OutOfBounds {
                    index: frame.len() - 1,
                    len: self.len,
                });
            }
            self.file
                .read_exact_at(frame, HEADER_LEN)
                .map_err(|e| self.io(e))
        }
    }
}
