pub mod disk_drive;
pub mod drive;
pub mod file_service;
pub mod memory_drive;
