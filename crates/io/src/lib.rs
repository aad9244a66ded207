// Sheet persistence.

pub mod native;

pub use native::{load, load_file, save, save_file, LoadError, SaveError};
