pub mod device;
pub mod field;
pub mod file;
pub mod subject;

pub use device::*;
pub use field::*;
pub use file::*;
pub use subject::*;
