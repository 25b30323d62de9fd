//! # photo-catalog CLI
//!
//! Command-line interface for the photo catalog.
//!
//! ## Usage
//! ```bash
//! photo-catalog scan --config scan_targets.yaml --group personal
//! photo-catalog classify /photos/lib /mnt/backup --output json
//! ```

mod cli;

use photo_catalog::Result;

fn main() -> Result<()> {
    cli::run()
}
