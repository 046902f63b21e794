pub mod cast;
pub mod combat;
mod config;
pub mod effects;
pub mod engine;
pub mod entities;
pub mod events;
pub mod spells;
pub mod telemetry;
pub mod world;

pub use config::{AppConfig, EngineTuning};
pub use engine::{CastOutcome, SpellEngine};
pub use events::{InterruptReason, WorldEvent};

pub fn run(args: &[String]) -> Result<(), String> {
    let config = config::AppConfig::from_args(args)?;
    telemetry::logging::init(&config.root)?;

    let mut library = spells::library::SpellLibrary::new();
    let spell_dir = config.root.join("spells");
    let loaded = library.load_dir(&spell_dir)?;
    let findings = library.validate();

    println!("daybreak: spell library");
    println!("- root: {}", config.root.display());
    println!("- spells loaded: {}", loaded);
    println!("- validate findings: {}", findings.len());
    for finding in &findings {
        eprintln!("daybreak: validate {}", finding);
    }
    println!("- max stage length: {} ms", config.tuning.max_stage_len_ms);
    println!("- los timeout: {} ms", config.tuning.los_timeout_ms);
    println!(
        "- range check interval: {} ms",
        config.tuning.range_check_interval_ms
    );

    let mut engine = engine::SpellEngine::new(library, config.tuning);
    engine.add_region(world::region::RegionId(1));
    telemetry::logging::log_game(&format!(
        "engine ready: {} spells, region 1 online",
        loaded
    ));
    Ok(())
}
