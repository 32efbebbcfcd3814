mod analyze;
mod helpers;
mod summary;

pub(crate) use analyze::cmd_analyze;
pub(crate) use summary::{cmd_history, cmd_stats, cmd_today, cmd_week};
