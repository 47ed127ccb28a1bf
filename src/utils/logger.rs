use std::io::Write;

use chrono::Utc;
use log::info;

/// Inizializza il logger con il formato del progetto:
/// `[YYYY-MM-DD HH:MM:SS UTC] [LEVEL] [file:line] message`.
/// `RUST_LOG` still wins over `level` when it is set.
pub fn init(level: &str) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}:{}] {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init()?;

    info!("Logger initialized (level: {})", level);
    Ok(())
}
