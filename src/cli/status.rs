use crate::models::GateConfig;
use crate::store::{load_record, JsonFileStore, RecordKeys};
use crate::Result;
use chrono::Utc;
use colored::Colorize;

pub async fn run(config: &GateConfig, json: bool) -> Result<()> {
    let path = config.storage_path()?;
    let store = JsonFileStore::new(&path);
    let keys: RecordKeys = config.storage.clone().into();
    let now = Utc::now().timestamp_millis();
    let ttl = config.timing.timings().record_ttl;

    let record = load_record(&store, &keys, now);
    let fresh = record.map_or(false, |r| r.is_fresh(now, ttl));

    if json {
        let output = serde_json::json!({
            "store": path.display().to_string(),
            "record": record,
            "age_secs": record.map(|r| r.age(now).as_secs()),
            "skips_gate": fresh,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", "Gate status".cyan().bold());
    println!();
    println!("   Store:     {}", path.display());

    let Some(record) = record else {
        println!("   Decision:  {}", "none".bright_black());
        println!();
        println!("{}", "⚠ Next page load shows the gate".yellow());
        return Ok(());
    };

    println!(
        "   Started:   {}",
        if record.started {
            "yes".green()
        } else {
            "no".red()
        }
    );
    if let Some(at) = record.recorded_at() {
        println!("   Recorded:  {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("   Age:       {}m", record.age(now).as_secs() / 60);

    println!();
    if fresh {
        let remaining = ttl.saturating_sub(record.age(now));
        println!(
            "{}",
            format!(
                "✓ Gate skipped for another {}m",
                remaining.as_secs().div_ceil(60)
            )
            .green()
        );
    } else {
        println!("{}", "⚠ Decision expired, next page load shows the gate".yellow());
    }

    Ok(())
}
