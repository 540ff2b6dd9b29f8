//! FAT32 on-disk structures: boot sector, cluster addressing, directory slots and long names.

pub mod bpb;
pub mod dir_entry;
pub mod fat;
pub mod fat_error;
pub mod fat_type;
pub mod lab_image;
pub mod lfn;
