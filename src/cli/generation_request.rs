//! `quizforge generation-request clean --older-than <duration>` (spec §6)
//! — expires stale requests on demand, independent of the sweeper's
//! interval.

use crate::tracker::RequestTracker;

pub async fn clean(tracker: &RequestTracker, older_than: chrono::DateTime<chrono::Utc>) -> anyhow::Result<()> {
    let expired = tracker.expire_stale(older_than).await?;
    println!("generation-request clean: expired {expired} request(s) started before {older_than}");
    Ok(())
}
