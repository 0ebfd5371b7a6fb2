//! Log output for the threaded tests.

use std::{io, sync::Once, thread, time::Instant};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use log::LevelFilter;

static LOGGER_INIT: Once = Once::new();

/// Install a `fern` dispatcher printing every record at `level` and above to stdout, stamped with the
/// seconds elapsed since it was installed. Only the first call in a test binary has an effect.
pub(crate) fn setup_logger(level: LevelFilter) {
    LOGGER_INIT.call_once(|| {
        let installed_at = Instant::now();
        fern::Dispatch::new()
            .format(move |out, message, record| {
                out.finish(format_args!(
                    "[{:>8.3}][{:?}][{}] {}",
                    installed_at.elapsed().as_secs_f64(),
                    thread::current().id(),
                    record.level(),
                    message
                ))
            })
            .level(level)
            .chain(io::stdout())
            .apply()
            .unwrap();
    })
}

/// Log `message` on behalf of the replica whose verifying key is `replica`, or of the test itself.
/// Replicas are named by the first seven Base64 characters of their key, as in the library's own logs.
pub(crate) fn log_replica(replica: Option<&[u8]>, message: &str) {
    match replica {
        Some(replica) => {
            let encoded = STANDARD_NO_PAD.encode(replica);
            let name = encoded.get(0..7).unwrap_or(&encoded);
            log::info!("[{}] {}", name, message)
        }
        None => log::info!("[test] {}", message),
    }
}
