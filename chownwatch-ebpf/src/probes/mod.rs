pub mod chown;
pub mod kernel;
pub mod syscall_types;
