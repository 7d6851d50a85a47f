//! Output location and artifact naming

pub mod locator;

pub use locator::{ensure_subdir, timestamp, MountedRoots, StorageLocator, PHOTO_DIR, VIDEO_DIR};
