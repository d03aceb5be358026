//! Field storage
//!
//! [`FieldStore`] is the persistence seam; [`MemoryFieldStore`] keeps
//! everything in process.

pub mod memory;
pub mod traits;

pub use memory::MemoryFieldStore;
pub use traits::FieldStore;
