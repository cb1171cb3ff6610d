//! Environment readiness check.

use anyhow::Result;

use crate::config::Config;
use crate::renderer::chromium::find_chromium;

/// Check Chromium availability and the data and screenshot locations.
pub async fn run(config: &Config) -> Result<()> {
    println!("Feargreed Doctor");
    println!("================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!("URL:  {}", config.target_url);
    println!();

    let chromium_path = find_chromium();
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Install Chrome or set FEARGREED_CHROMIUM_PATH."),
    }

    let data = &config.data_path;
    if data.exists() {
        match std::fs::read_to_string(data)
            .ok()
            .and_then(|s| serde_json::from_str::<feargreed::HistoryLog>(&s).ok())
        {
            Some(log) => println!(
                "[OK] Data file {} parses ({} entries)",
                data.display(),
                log.len()
            ),
            None => println!(
                "[!!] Data file {} is corrupt; next run starts a fresh history",
                data.display()
            ),
        }
    } else {
        println!("[--] Data file {} not created yet", data.display());
    }

    println!("[--] Screenshot path: {}", config.screenshot_path.display());

    println!();
    if chromium_path.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}
