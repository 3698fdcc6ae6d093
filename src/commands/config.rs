//! Show (and optionally persist) the effective configuration.

use crate::config::Config;
use crate::error::Result;

pub fn run(config: &Config, save: bool) -> Result<()> {
    println!("{}", config);
    if save {
        let path = config.save_to_file(None)?;
        println!("💾 Configuration saved to {}", path.display());
    }
    Ok(())
}
