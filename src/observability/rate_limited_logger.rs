use std::time::Duration;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::Level;

const PRUNE_THRESHOLD: usize = 1024;

/// Drops repeats of the same (level, message) pair inside `window`.
///
/// Purely a log-volume control. A line emitted after a suppressed run carries
/// the number of repeats that were swallowed.
pub struct RateLimitedLogger {
    window: Duration,
    last_emitted: DashMap<(Level, String), DedupState>,
}

struct DedupState {
    emitted_at: Instant,
    suppressed: u64,
}

impl RateLimitedLogger {
    pub fn new(window: Duration) -> Self {
        RateLimitedLogger {
            window,
            last_emitted: DashMap::new(),
        }
    }

    /// Returns `true` when the line was written.
    pub fn log(&self, level: Level, message: &str) -> bool {
        let now = Instant::now();

        let suppressed = match self.last_emitted.entry((level, message.to_owned())) {
            Entry::Occupied(mut entry) => {
                let state = entry.get_mut();
                if now.duration_since(state.emitted_at) < self.window {
                    state.suppressed += 1;
                    return false;
                }
                let suppressed = state.suppressed;
                *state = DedupState { emitted_at: now, suppressed: 0 };
                suppressed
            }
            Entry::Vacant(entry) => {
                entry.insert(DedupState { emitted_at: now, suppressed: 0 });
                0
            }
        };

        if suppressed > 0 {
            emit(level, &format!("{} (suppressed {} repeats)", message, suppressed));
        } else {
            emit(level, message);
        }

        if self.last_emitted.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }
        true
    }

    pub fn error(&self, message: &str) -> bool {
        self.log(Level::ERROR, message)
    }

    pub fn warn(&self, message: &str) -> bool {
        self.log(Level::WARN, message)
    }

    fn prune(&self, now: Instant) {
        self.last_emitted
            .retain(|_, state| now.duration_since(state.emitted_at) < self.window);
    }
}

fn emit(level: Level, message: &str) {
    match level {
        Level::ERROR => tracing::error!("{}", message),
        Level::WARN => tracing::warn!("{}", message),
        Level::INFO => tracing::info!("{}", message),
        Level::DEBUG => tracing::debug!("{}", message),
        _ => tracing::trace!("{}", message),
    }
}
