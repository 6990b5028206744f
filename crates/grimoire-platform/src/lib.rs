mod paths;

pub use paths::{AppPaths, AppPathsError, default_library_root};
