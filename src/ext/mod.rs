mod best_effort_path_ext;
mod system_time_ext;

pub use best_effort_path_ext::{BestEffortPathExt, best_effort_absolute};
pub use system_time_ext::SystemTimeExt;
