use crate::cli::{display, EndpointArgs};
use crate::error::Result;
use crate::status::StatusCell;

/// Print the worker status, or `absent` when no record exists.
pub fn run_status(endpoint: &EndpointArgs, verbose: bool) -> Result<()> {
    let config = endpoint.resolve()?;
    let cell = StatusCell::open(config.status_path());

    match cell.record()? {
        Some(record) if verbose => println!(
            "{} (pid {}, updated {}, record {})",
            record.status,
            record.pid,
            record.updated_at.format("%Y-%m-%d %H:%M:%S"),
            display(cell.path()),
        ),
        Some(record) => println!("{}", record.status),
        None => println!("absent"),
    }
    Ok(())
}
