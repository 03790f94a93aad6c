use anyhow::Result;

use crate::config::Config;

/// Grounded on the teacher's `src/main.rs` (`simple_logger::init_with_level`);
/// kept as its own module so the binary and any integration test harness can
/// initialize logging identically.
pub fn init(config: &Config) -> Result<()> {
    simple_logger::init_with_level(config.log.level.as_level())?;
    Ok(())
}
