mod watchers;

pub use watchers::StoreWatchers;
