pub mod store;

pub use store::FileStagingStore;
