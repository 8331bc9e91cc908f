//! `quizforge problem purge --older-than <duration> --topic <tag> --force`
//! (spec §6).

use crate::storage::StorageGateway;

pub async fn purge(
    storage: &dyn StorageGateway,
    older_than: chrono::DateTime<chrono::Utc>,
    topic: Option<&str>,
    force: bool,
) -> anyhow::Result<()> {
    if !force {
        println!("refusing to purge problems without --force (dry run only)");
        return Ok(());
    }
    let removed = storage.purge_problems_older_than(older_than, topic).await?;
    println!("problem purge: removed {removed} problem(s) older than {older_than}");
    Ok(())
}
