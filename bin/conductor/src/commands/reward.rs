use super::App;

pub async fn run(span_id: &str, value: f64, metadata: Option<String>) -> anyhow::Result<()> {
    let app = App::open()?;
    let conductor = app.conductor();

    let metadata = match metadata {
        Some(raw) => serde_json::from_str(&raw)?,
        None => serde_json::Value::Null,
    };

    let proposal = conductor.emit_reward(span_id, value, metadata)?;
    println!("Reward {:.2} recorded for {}", value, span_id);

    if let Some(p) = proposal {
        println!();
        println!(
            "Strategy '{}' is on a winning streak for '{}'.",
            p.strategy, p.topic
        );
        println!(
            "Confirm the best-practice proposal with `conductor knowledge confirm {}`.",
            p.proposal_id
        );
    }
    Ok(())
}
