use conductor_storage::TraceStore;

use super::App;

pub async fn recent(task_type: &str, limit: usize) -> anyhow::Result<()> {
    let app = App::open()?;

    let spans = app.trace.recent(task_type, limit)?;
    if spans.is_empty() {
        println!("No spans for '{}'.", task_type);
        return Ok(());
    }
    for span in spans {
        let reward = span
            .reward
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {:<10} reward {}  [{}]",
            span.span_id,
            span.timestamp.format("%Y-%m-%d %H:%M:%S"),
            span.outcome,
            reward,
            span.selected_capabilities.join(", ")
        );
    }
    Ok(())
}

pub async fn stats(task_type: &str) -> anyhow::Result<()> {
    let app = App::open()?;

    let stats = app.trace.stats(task_type)?;
    println!("Task type: {}", task_type);
    println!("Spans:     {}", stats.total);
    println!("Success:   {:.0}%", stats.success_rate * 100.0);
    println!("Failure:   {:.0}%", stats.failure_rate * 100.0);
    Ok(())
}
