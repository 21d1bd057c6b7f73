//! Block storage devices

pub mod ramdisk;

pub use ramdisk::RamDisk;
