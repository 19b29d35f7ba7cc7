use eyre::Result;

use crate::telemetry::SessionId;

/// Print a fresh session id, for hosts that want to share one across `emit` calls
pub fn run() -> Result<()> {
    println!("{}", SessionId::generate());
    Ok(())
}
