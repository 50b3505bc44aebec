use conductor_storage::KnowledgeStore;

use super::App;

pub async fn read(topic: &str) -> anyhow::Result<()> {
    let app = App::open()?;
    let sync = app.synchronizer();

    let enriched = sync.read(topic)?;
    match &enriched.item {
        Some(item) => {
            if item.best_practice {
                println!("[best practice] {}", item.topic);
            } else {
                println!("{}", item.topic);
            }
            println!("{}", item.content);
            if !item.linked_spans.is_empty() {
                println!("linked spans: {}", item.linked_spans.join(", "));
            }
        }
        None => println!("No knowledge recorded for '{}'.", topic),
    }

    if let Some(stats) = &enriched.stats {
        println!();
        println!(
            "Recent executions: {} ({:.0}% success)",
            stats.total,
            stats.success_rate * 100.0
        );
    }
    if let Some(warning) = &enriched.warning {
        println!("WARNING: {}", warning);
    }
    Ok(())
}

pub async fn proposals() -> anyhow::Result<()> {
    let app = App::open()?;

    let pending = app.knowledge.pending_proposals()?;
    if pending.is_empty() {
        println!("No pending proposals.");
        return Ok(());
    }
    for p in pending {
        println!("{}  {}  {}", p.proposal_id, p.created_at, p.item.topic);
        println!("  {}", p.item.content);
    }
    Ok(())
}

pub async fn confirm(proposal_id: &str) -> anyhow::Result<()> {
    let app = App::open()?;

    let item = app.knowledge.confirm(proposal_id)?;
    println!("Confirmed '{}' into the knowledge store.", item.topic);
    Ok(())
}

pub async fn reject(proposal_id: &str) -> anyhow::Result<()> {
    let app = App::open()?;

    app.knowledge.reject(proposal_id)?;
    println!("Rejected proposal {}.", proposal_id);
    Ok(())
}
