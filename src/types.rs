use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Logical page id handed out by the disk manager. Negative values are
/// sentinels, see `config::INVALID_PAGE_ID`.
pub type PageId = i32;

/// Index of a frame in the buffer pool.
pub type FrameId = usize;

pub type TableId = u32;
pub type IndexId = u32;

// Type alias, not a new type, cannot define methods on it
pub type Pod<T> = Arc<RwLock<T>>;

pub fn pod<T>(v: T) -> Pod<T> {
    Arc::new(RwLock::new(v))
}

/// copy from https://github.com/tikv/tikv/blob/b15ea3b1cd766375cb52019e35c195ed797124df/components/tikv_util/src/lib.rs#L171-L186
///
/// A handy shortcut to replace `RwLock` write/read().unwrap() pattern
/// to shortcut wl and rl.
pub trait HandyRwLock<T: ?Sized> {
    fn wl(&self) -> RwLockWriteGuard<'_, T>;
    fn rl(&self) -> RwLockReadGuard<'_, T>;
}

impl<T: ?Sized> HandyRwLock<T> for RwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap()
    }

    fn rl(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap()
    }
}
