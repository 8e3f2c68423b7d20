pub mod compact;
pub mod extract;
pub mod patch;

use std::io::{BufRead, Write};

/// Asks the user for confirmation before an in-place world modification.
/// Declining, or answering something unintelligible, exits the process.
pub fn confirm() {
    print!(
        "WARNING: This will modify your world in-place. You should make a backup before proceeding.\n\n\
         Proceed? (y/N): "
    );
    let _ = std::io::stdout().flush();

    let mut response = String::new();
    if std::io::stdin().lock().read_line(&mut response).is_err() || response.is_empty() {
        log::info!("Exiting.");
        std::process::exit(1);
    }
    match response.trim().to_lowercase().as_str() {
        "y" | "yes" => {}
        "n" | "no" | "" => {
            log::info!("Exiting.");
            std::process::exit(1);
        }
        other => {
            log::error!("Invalid response: {other:?}, expected Y or N. Exiting.");
            std::process::exit(1);
        }
    }
}
