use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to a value that several pipeline threads touch.
///
/// Cloning the handle clones the `Arc`, not the value. Resident chunks sit in the world
/// map behind one of these: the render thread and the neighbourhood builders read them
/// concurrently, an edit or a remesh takes the write guard.
///
/// Never acquire the world map lock while a guard from this handle is alive.
///
/// ```
/// use voxel_stream::core::MtResource;
///
/// let chunk_count = MtResource::new(0usize);
/// let worker_view = chunk_count.clone();
///
/// std::thread::spawn(move || *worker_view.get_mut() += 3)
///     .join()
///     .unwrap();
///
/// assert_eq!(*chunk_count.get(), 3);
/// ```
pub struct MtResource<T: Send + Sync> {
    inner: Arc<RwLock<T>>,
}

impl<T: Send + Sync + 'static> MtResource<T> {
    pub fn new(value: T) -> Self {
        MtResource {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    /// Shared read access. Blocks while a writer holds the value.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Exclusive access. The lock does not poison; a panicking holder simply releases it.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Whether both handles refer to the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        MtResource {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync> fmt::Debug for MtResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MtResource")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}
