use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

pub const DEFAULT_LOG_FILTER: &str = "info,dehla_session=debug";

/// Set to `json` for one JSON object per line instead of the text format.
pub const ENV_LOG_FORMAT: &str = "DEHLA_LOG_FORMAT";

/// Install the process-wide fmt subscriber. `RUST_LOG` overrides
/// [`DEFAULT_LOG_FILTER`].
pub fn init_logging() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let json = std::env::var(ENV_LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}

/// One registry log line, reduced to the fields room events carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomLogLine {
    pub level: Level,
    pub message: String,
    pub room_id: Option<String>,
    pub player_id: Option<String>,
    /// Stable error code of a rejected transition.
    pub code: Option<String>,
}

impl RoomLogLine {
    pub fn is_rejection(&self) -> bool {
        self.level == Level::WARN && self.code.is_some()
    }
}

/// Collects registry log lines while a closure runs, for assertions in tests.
#[derive(Debug, Clone, Default)]
pub struct RoomLogCapture {
    lines: Arc<Mutex<Vec<RoomLogLine>>>,
}

impl RoomLogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with this capture as the thread's default subscriber.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = Registry::default().with(self.clone());
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn lines(&self) -> Vec<RoomLogLine> {
        self.lock().clone()
    }

    pub fn for_room(&self, room_id: &str) -> Vec<RoomLogLine> {
        self.lock()
            .iter()
            .filter(|line| line.room_id.as_deref() == Some(room_id))
            .cloned()
            .collect()
    }

    /// Warnings logged for transitions the registry refused.
    pub fn rejections(&self) -> Vec<RoomLogLine> {
        self.lock()
            .iter()
            .filter(|line| line.is_rejection())
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RoomLogLine>> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: Subscriber> Layer<S> for RoomLogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut line = RoomLogLine {
            level: *event.metadata().level(),
            message: String::new(),
            room_id: None,
            player_id: None,
            code: None,
        };
        event.record(&mut LineVisitor(&mut line));
        self.lock().push(line);
    }
}

struct LineVisitor<'a>(&'a mut RoomLogLine);

impl Visit for LineVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        let slot = match field.name() {
            "message" => {
                self.0.message = value.to_string();
                return;
            }
            "room_id" => &mut self.0.room_id,
            "player_id" => &mut self.0.player_id,
            "code" => &mut self.0.code,
            _ => return,
        };
        *slot = Some(value.to_string());
    }

    // `%` fields and the formatted message arrive here.
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{info, warn};

    #[test]
    fn room_fields_are_recorded_without_quoting() {
        let capture = RoomLogCapture::new();
        let room_id = String::from("4821");
        capture.capture(|| {
            info!(room_id = %room_id, player_id = "ana", seats = 2, "player joined");
        });

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].level, Level::INFO);
        assert_eq!(lines[0].message, "player joined");
        assert_eq!(lines[0].room_id.as_deref(), Some("4821"));
        assert_eq!(lines[0].player_id.as_deref(), Some("ana"));
        assert_eq!(lines[0].code, None);
    }

    #[test]
    fn only_coded_warnings_count_as_rejections() {
        let capture = RoomLogCapture::new();
        capture.capture(|| {
            warn!(room_id = "1000", player_id = "ben", "hand abandoned");
            warn!(
                room_id = "1000",
                player_id = "cy",
                code = "not_your_turn",
                "rejected transition: {}",
                "out of turn"
            );
            info!(room_id = "2000", "room created");
        });

        let rejections = capture.rejections();
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].player_id.as_deref(), Some("cy"));
        assert_eq!(rejections[0].code.as_deref(), Some("not_your_turn"));
        assert_eq!(rejections[0].message, "rejected transition: out of turn");
        assert_eq!(capture.for_room("1000").len(), 2);
        assert_eq!(capture.for_room("2000").len(), 1);
    }

    #[test]
    fn nothing_is_captured_outside_the_closure() {
        let capture = RoomLogCapture::new();
        info!(room_id = "3000", "room created");
        assert!(capture.lines().is_empty());
    }

    #[test]
    fn default_filter_parses() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
