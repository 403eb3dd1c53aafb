//! Status command implementation

use anyhow::Result;

use crate::commands::Session;
use crate::output::{broker_hint, format_state, print_warning};

/// Show the reconciled toggle state
pub async fn status_command(session: &Session) -> Result<()> {
    let state = session.wait_reconciled().await?;

    println!("{}", format_state(&state));
    if let Some(hint) = broker_hint(&state) {
        print_warning(hint);
    }

    Ok(())
}
