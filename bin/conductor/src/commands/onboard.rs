use conductor_core::{Config, Paths};
use conductor_registry::builtin_capabilities;

pub async fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;

    let config_path = paths.config_file();
    if config_path.exists() && !force {
        println!("Config already exists at {}", config_path.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }

    let config = Config::default();
    config.save(&config_path)?;
    println!("Wrote config:  {}", config_path.display());

    let catalog_path = paths.catalog_file();
    if !catalog_path.exists() || force {
        let yaml = serde_yaml::to_string(&builtin_capabilities())?;
        std::fs::write(&catalog_path, yaml)?;
        println!("Wrote catalog: {}", catalog_path.display());
    }

    println!("Data dir:      {}", paths.data_dir().display());
    println!();
    println!("Try: conductor route \"Add dark mode to existing app\"");
    Ok(())
}
