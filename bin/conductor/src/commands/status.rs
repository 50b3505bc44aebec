use conductor_core::{Config, Paths};
use conductor_registry::CapabilityRegistry;

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("conductor status");
    println!("================");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (not found)" }
    );

    let catalog_path = paths.catalog_file();
    println!(
        "Catalog:   {} {}",
        catalog_path.display(),
        if catalog_path.exists() {
            "✓"
        } else {
            "✗ (using built-in)"
        }
    );

    println!(
        "Trace db:  {} {}",
        paths.trace_db().display(),
        if paths.trace_db().exists() { "✓" } else { "✗" }
    );
    println!(
        "Knowledge: {} {}",
        paths.knowledge_db().display(),
        if paths.knowledge_db().exists() { "✓" } else { "✗" }
    );

    if !config_exists {
        println!();
        println!("Run `conductor onboard` to initialize.");
        return Ok(());
    }

    let config = Config::load(&config_path)?;
    let registry =
        CapabilityRegistry::load_or_builtin(&catalog_path, &config.router.fallback_capability)?;

    println!();
    println!("Capabilities: {}", registry.len());
    println!("Fallback:     {}", registry.fallback().id);
    println!(
        "Router:       epsilon {:.2}, band {:.2}, half-life {} days",
        config.router.ambiguity_epsilon,
        config.router.selection_band,
        config.router.recency_half_life_days
    );
    println!(
        "Workflow:     retry cap {}, min orchestration agents {}",
        config.workflow.verification_retry_cap, config.workflow.min_orchestration_agents
    );
    Ok(())
}
