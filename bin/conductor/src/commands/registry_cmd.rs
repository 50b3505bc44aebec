use super::App;

pub async fn list() -> anyhow::Result<()> {
    let app = App::open()?;

    println!("{:<22} {:<10} {:<24} triggers", "id", "kind", "domains");
    for cap in app.registry.list_capabilities() {
        let domains: Vec<&str> = cap.domain_tags.iter().map(|s| s.as_str()).collect();
        println!(
            "{:<22} {:<10} {:<24} {}",
            cap.id,
            cap.kind.as_str(),
            domains.join(","),
            cap.trigger_patterns.join(", ")
        );
    }
    println!();
    println!("{} capabilities, fallback: {}", app.registry.len(), app.registry.fallback().id);
    Ok(())
}
