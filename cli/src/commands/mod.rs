mod auth;
mod calendar;
mod daily;
mod exercise;
mod helpers;
mod log;
mod meal;

use anyhow::Result;

use crate::config::Config;
use crate::remote_client::HttpRemote;
use fitlog_core::cache::FileCache;
use fitlog_core::reconciler::{DailyLogSession, Reconciler, Remote};

use helpers::print_notices;

pub(crate) use auth::{cmd_login, cmd_logout, cmd_whoami};
pub(crate) use calendar::cmd_calendar;
pub(crate) use daily::{DailyFields, cmd_daily_set, cmd_daily_show};
pub(crate) use exercise::{
    ExerciseFields, cmd_exercise_add, cmd_exercise_delete, cmd_exercise_update,
};
pub(crate) use log::cmd_log_show;
pub(crate) use meal::{MealFields, cmd_meal_add, cmd_meal_delete, cmd_meal_update};

pub(crate) type AppReconciler = Reconciler<FileCache, HttpRemote>;

/// The cache plus, when signed in, the HTTP remote for the stored session.
pub(crate) fn build_reconciler(config: &Config) -> Result<AppReconciler> {
    let remote = match config.session()? {
        Some(session) => {
            let store = HttpRemote::new(&session.server, session.api_key, config.timeout)?;
            Some(Remote::new(store, session.user_id))
        }
        None => None,
    };
    Ok(Reconciler::new(FileCache::new(&config.cache_path), remote).with_policy(config.policy))
}

/// Open `date` for editing and report any load notice.
pub(super) async fn open_session<'r>(
    reconciler: &'r AppReconciler,
    config: &Config,
    date: &str,
) -> Result<DailyLogSession<'r, FileCache, HttpRemote>> {
    let mut session = reconciler.session(config.save_mode);
    session.open(date).await?;
    print_notices(session.take_notices());
    Ok(session)
}

/// Persist anything a batched session still holds, then report notices.
pub(super) async fn finish_session(
    session: &mut DailyLogSession<'_, FileCache, HttpRemote>,
) -> Result<()> {
    if session.is_dirty() {
        session.save().await?;
    }
    print_notices(session.take_notices());
    Ok(())
}
