use std::{io::Write, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Local};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::{
    storage::activity_storage::ActivityStore,
    tracking::{
        activity::Activity,
        live_display::{DisplaySink, LiveDisplay, DEFAULT_REFRESH_INTERVAL},
    },
    utils::clock::Clock,
};

pub const PROMPT: &str = "> ";
pub const NAME_PROMPT: &str = "Enter the activity name: ";
pub const UNKNOWN_COMMAND: &str = "Unknown command. Please use 'start [activity_name]' or 'quit'.";
pub const GOODBYE: &str = "Goodbye!";

/// How long a stopped live display gets to finish before it's aborted.
const DISPLAY_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Creates a fresh sink for every session's live display.
pub type SinkFactory = Box<dyn Fn() -> Box<dyn DisplaySink> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Quit,
    Unknown,
}

impl Command {
    /// Matching ignores case but not surrounding whitespace.
    fn parse(input: &str) -> Self {
        match input.to_lowercase().as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "quit" => Command::Quit,
            _ => Command::Unknown,
        }
    }
}

/// The single in-flight session. Dropping it cancels its display.
struct Session {
    name: String,
    started_at: DateTime<Local>,
    start: Instant,
    display: JoinHandle<()>,
    display_guard: DropGuard,
}

enum State {
    Idle,
    Tracking(Session),
    Terminated,
}

/// Reads commands line by line and drives sessions from `start` to `stop`. Only one
/// session exists at a time and it is saved exactly once, after its display has stopped.
pub struct CommandLoop<I, O> {
    input: I,
    output: O,
    store: Box<dyn ActivityStore>,
    time_provider: Arc<dyn Clock>,
    sink_factory: SinkFactory,
    shutdown: CancellationToken,
}

impl<I: AsyncBufRead + Unpin, O: Write> CommandLoop<I, O> {
    pub fn new(
        input: I,
        output: O,
        store: Box<dyn ActivityStore>,
        time_provider: Arc<dyn Clock>,
        sink_factory: SinkFactory,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            input,
            output,
            store,
            time_provider,
            sink_factory,
            shutdown,
        }
    }

    /// Executes the command loop until `quit`, end of input or shutdown.
    pub async fn run(mut self) -> Result<()> {
        self.print_welcome()?;

        let mut state = State::Idle;
        loop {
            state = match state {
                State::Idle => self.idle().await?,
                State::Tracking(session) => self.tracking(session).await?,
                State::Terminated => return Ok(()),
            };
        }
    }

    fn print_welcome(&mut self) -> Result<()> {
        writeln!(self.output, "Welcome to the Time Tracker CLI!")?;
        writeln!(self.output, "Commands:")?;
        writeln!(self.output, "  start [activity_name] - Start tracking an activity.")?;
        writeln!(self.output, "  quit                  - Exit the application.")?;
        Ok(())
    }

    /// Returns the next line without its terminator, or `None` once input is closed or
    /// shutdown was requested. Bytes that aren't valid UTF-8 are replaced, never rejected.
    async fn next_input(&mut self) -> Result<Option<String>> {
        let mut buffer = vec![];
        let read = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(None),
            read = self.input.read_until(b'\n', &mut buffer) => read?,
        };
        if read == 0 {
            return Ok(None);
        }

        if buffer.last() == Some(&b'\n') {
            buffer.pop();
            if buffer.last() == Some(&b'\r') {
                buffer.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
    }

    async fn idle(&mut self) -> Result<State> {
        write!(self.output, "\n{PROMPT}")?;
        self.output.flush()?;

        let Some(input) = self.next_input().await? else {
            debug!("Input closed while idle");
            return Ok(State::Terminated);
        };

        match Command::parse(&input) {
            Command::Quit => {
                writeln!(self.output, "{GOODBYE}")?;
                Ok(State::Terminated)
            }
            Command::Start => self.start_session().await,
            Command::Stop | Command::Unknown => {
                debug!("Unknown command {input:?}");
                writeln!(self.output, "{UNKNOWN_COMMAND}")?;
                Ok(State::Idle)
            }
        }
    }

    async fn start_session(&mut self) -> Result<State> {
        write!(self.output, "{NAME_PROMPT}")?;
        self.output.flush()?;

        let Some(name) = self.next_input().await? else {
            debug!("Input closed before an activity name was given");
            return Ok(State::Terminated);
        };

        let started_at = self.time_provider.time();
        let start = self.time_provider.instant();
        writeln!(
            self.output,
            "Started tracking: {name}. Type 'stop' to stop tracking."
        )?;
        self.output.flush()?;

        let token = self.shutdown.child_token();
        let display = LiveDisplay::new(
            start,
            (self.sink_factory)(),
            token.clone(),
            DEFAULT_REFRESH_INTERVAL,
            self.time_provider.clone(),
        );
        info!("Started tracking {name:?}");

        Ok(State::Tracking(Session {
            name,
            started_at,
            start,
            display: tokio::spawn(display.run()),
            display_guard: token.drop_guard(),
        }))
    }

    async fn tracking(&mut self, session: Session) -> Result<State> {
        match self.next_input().await? {
            Some(input) if Command::parse(&input) == Command::Stop => {
                self.finish_session(session).await?;
                Ok(State::Idle)
            }
            Some(input) => {
                debug!("Ignoring {input:?} while tracking");
                Ok(State::Tracking(session))
            }
            None => {
                warn!("Input closed while tracking {:?}, saving it", session.name);
                self.finish_session(session).await?;
                Ok(State::Terminated)
            }
        }
    }

    async fn finish_session(&mut self, session: Session) -> Result<()> {
        let Session {
            name,
            started_at,
            start,
            mut display,
            display_guard,
        } = session;
        let duration = self.time_provider.instant().saturating_duration_since(start);

        // The display has to be gone before anything is saved.
        drop(display_guard);
        match tokio::time::timeout(DISPLAY_STOP_TIMEOUT, &mut display).await {
            Ok(Ok(())) => (),
            Ok(Err(e)) => error!("Live display failed {e:?}"),
            Err(_) => {
                warn!("Live display didn't stop in {DISPLAY_STOP_TIMEOUT:?}, aborting it");
                display.abort();
            }
        }

        let activity = Activity::new(name, duration, started_at);
        let summary = activity.summary();
        let name = activity.name.clone();
        match self.store.append(activity).await {
            Ok(()) => {
                info!("{summary}");
                writeln!(self.output, "{summary}")?;
            }
            Err(e) => {
                error!("Failed to save activity {name:?}: {e:?}");
                writeln!(self.output, "Failed to save activity '{name}': {e}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Write},
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Local, TimeZone};
    use tempfile::tempdir;
    use tokio::{
        io::{AsyncWriteExt, BufReader, DuplexStream},
        time::Instant,
    };
    use tokio_util::sync::CancellationToken;

    use crate::{
        storage::{
            activity_storage::{create_store, ActivityStore, MockActivityStore, StorageFormat},
            entities::ActivityRecord,
            error::StoreError,
        },
        tracking::live_display::DisplaySink,
        utils::{clock::Clock, logging::TEST_LOGGING},
    };

    use super::{Command, CommandLoop, GOODBYE, UNKNOWN_COMMAND};

    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Local>,
        reference: Instant,
    }

    impl TestClock {
        fn new() -> Self {
            Self {
                start_time: Local.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(),
                reference: Instant::now(),
            }
        }
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Local> {
            self.start_time + self.reference.elapsed()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, instant: tokio::time::Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    /// Collects everything printed by the loop.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Records renders into an event log shared with the store, to check ordering.
    #[derive(Clone, Default)]
    struct EventLog(Arc<Mutex<Vec<String>>>);

    impl EventLog {
        fn push(&self, event: impl Into<String>) {
            self.0.lock().unwrap().push(event.into());
        }

        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct LoggingSink(EventLog);

    impl DisplaySink for LoggingSink {
        fn render_elapsed(&mut self, elapsed: Duration) {
            self.0.push(format!("render {}", elapsed.as_secs()));
        }

        fn finish(&mut self) {
            self.0.push("finish");
        }
    }

    fn create_loop(
        input: DuplexStream,
        output: SharedBuffer,
        store: Box<dyn ActivityStore>,
        log: EventLog,
        shutdown: CancellationToken,
    ) -> CommandLoop<BufReader<DuplexStream>, SharedBuffer> {
        CommandLoop::new(
            BufReader::new(input),
            output,
            store,
            Arc::new(TestClock::new()),
            Box::new(move || Box::new(LoggingSink(log.clone())) as Box<dyn DisplaySink>),
            shutdown,
        )
    }

    async fn send(client: &mut DuplexStream, line: &str) {
        client
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("start"), Command::Start);
        assert_eq!(Command::parse("START"), Command::Start);
        assert_eq!(Command::parse("Stop"), Command::Stop);
        assert_eq!(Command::parse("qUiT"), Command::Quit);
        assert_eq!(Command::parse(" quit"), Command::Unknown);
        assert_eq!(Command::parse("stop "), Command::Unknown);
        assert_eq!(Command::parse("start Writing"), Command::Unknown);
        assert_eq!(Command::parse(""), Command::Unknown);
    }

    #[tokio::test]
    async fn test_quit_first_creates_no_file() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let path = dir.path().join("activity_log.csv");
        let output = SharedBuffer::default();
        let (mut client, server) = tokio::io::duplex(1024);

        send(&mut client, "quit").await;
        create_loop(
            server,
            output.clone(),
            create_store(StorageFormat::Csv, Some(path.clone())),
            EventLog::default(),
            CancellationToken::new(),
        )
        .run()
        .await?;

        assert!(output.contents().starts_with("Welcome to the Time Tracker CLI!\n"));
        assert!(output.contents().ends_with("\n> Goodbye!\n"));
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_session_is_saved_to_csv() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("activity_log.csv");
        let output = SharedBuffer::default();
        let (mut client, server) = tokio::io::duplex(1024);
        let command_loop = create_loop(
            server,
            output.clone(),
            create_store(StorageFormat::Csv, Some(path.clone())),
            EventLog::default(),
            CancellationToken::new(),
        );

        let (result, ()) = tokio::join!(command_loop.run(), async move {
            send(&mut client, "start").await;
            send(&mut client, "Writing").await;
            tokio::time::sleep(Duration::from_secs(2)).await;
            send(&mut client, "stop").await;
            send(&mut client, "quit").await;
        });
        result?;

        assert_eq!(
            std::fs::read_to_string(&path)?,
            "Activity Name,Duration,Date\nWriting,2s,2024-06-15 12:00:00\n"
        );
        let printed = output.contents();
        assert!(printed.contains("Enter the activity name: Started tracking: Writing."));
        assert!(printed.contains("Tracked activity 'Writing' for 2s on 2024-06-15.\n"));
        assert!(printed.ends_with(&format!("{GOODBYE}\n")));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_sessions_are_saved_in_order_to_json() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("output.json");
        let (mut client, server) = tokio::io::duplex(1024);
        let command_loop = create_loop(
            server,
            SharedBuffer::default(),
            create_store(StorageFormat::Json, Some(path.clone())),
            EventLog::default(),
            CancellationToken::new(),
        );

        let (result, ()) = tokio::join!(command_loop.run(), async move {
            send(&mut client, "start").await;
            send(&mut client, "first").await;
            tokio::time::sleep(Duration::from_secs(1)).await;
            send(&mut client, "stop").await;
            send(&mut client, "Start").await;
            send(&mut client, "second").await;
            tokio::time::sleep(Duration::from_secs(3)).await;
            send(&mut client, "STOP").await;
            send(&mut client, "quit").await;
        });
        result?;

        let records: Vec<ActivityRecord> = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(
            records,
            vec![
                ActivityRecord {
                    name: "first".into(),
                    duration: "1s".into(),
                    date: "2024-06-15 12:00:00".into(),
                },
                ActivityRecord {
                    name: "second".into(),
                    duration: "3s".into(),
                    date: "2024-06-15 12:00:01".into(),
                },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_commands_never_persist() -> Result<()> {
        let mut store = MockActivityStore::new();
        store.expect_append().never();
        let output = SharedBuffer::default();
        let (mut client, server) = tokio::io::duplex(1024);

        for line in ["hello", "STOP", " quit", "quit "] {
            send(&mut client, line).await;
        }
        drop(client);

        create_loop(
            server,
            output.clone(),
            Box::new(store),
            EventLog::default(),
            CancellationToken::new(),
        )
        .run()
        .await?;

        let printed = output.contents();
        assert_eq!(printed.matches(UNKNOWN_COMMAND).count(), 4);
        assert!(!printed.contains(GOODBYE));
        Ok(())
    }

    #[tokio::test]
    async fn test_tracking_ignores_everything_but_stop() -> Result<()> {
        let mut store = MockActivityStore::new();
        store
            .expect_append()
            .withf(|activity| activity.name.is_empty())
            .times(1)
            .returning(|_| Ok(()));
        let output = SharedBuffer::default();
        let (mut client, server) = tokio::io::duplex(1024);

        // An empty name is accepted, and `quit` doesn't end a running session.
        for line in ["start", "", "foo", "stop ", "quit", "start", "sToP", "quit"] {
            send(&mut client, line).await;
        }

        create_loop(
            server,
            output.clone(),
            Box::new(store),
            EventLog::default(),
            CancellationToken::new(),
        )
        .run()
        .await?;

        let printed = output.contents();
        assert!(!printed.contains(UNKNOWN_COMMAND));
        assert!(printed.contains("Tracked activity '' for 0s"));
        assert!(printed.ends_with(&format!("{GOODBYE}\n")));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_stops_before_activity_is_saved() -> Result<()> {
        let log = EventLog::default();
        let mut store = MockActivityStore::new();
        let store_log = log.clone();
        store.expect_append().times(1).returning(move |activity| {
            store_log.push(format!("append {}", activity.duration.as_secs()));
            Ok(())
        });
        let (mut client, server) = tokio::io::duplex(1024);
        let command_loop = create_loop(
            server,
            SharedBuffer::default(),
            Box::new(store),
            log.clone(),
            CancellationToken::new(),
        );

        let (result, ()) = tokio::join!(command_loop.run(), async move {
            send(&mut client, "start").await;
            send(&mut client, "Reading").await;
            tokio::time::sleep(Duration::from_millis(2500)).await;
            send(&mut client, "stop").await;
            send(&mut client, "quit").await;
        });
        result?;

        // Give a leftover display the chance to print.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            log.events(),
            ["render 0", "render 1", "render 2", "finish", "append 2"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_save_is_reported_and_loop_continues() -> Result<()> {
        let mut store = MockActivityStore::new();
        store.expect_append().times(2).returning(|_| {
            Err(StoreError::Io {
                path: "activity_log.csv".into(),
                source: io::Error::other("disk full"),
            })
        });
        let output = SharedBuffer::default();
        let (mut client, server) = tokio::io::duplex(1024);
        for line in ["start", "a", "stop", "start", "b", "stop", "quit"] {
            send(&mut client, line).await;
        }

        create_loop(
            server,
            output.clone(),
            Box::new(store),
            EventLog::default(),
            CancellationToken::new(),
        )
        .run()
        .await?;

        let printed = output.contents();
        assert!(printed.contains("Failed to save activity 'a': I/O error"));
        assert!(printed.contains("Failed to save activity 'b': I/O error"));
        assert!(!printed.contains("Tracked activity"));
        assert!(printed.ends_with(&format!("{GOODBYE}\n")));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_utf8_input_is_not_fatal() -> Result<()> {
        let mut store = MockActivityStore::new();
        store
            .expect_append()
            .withf(|activity| activity.name == "caf\u{FFFD}")
            .times(1)
            .returning(|_| Ok(()));
        let output = SharedBuffer::default();
        let (mut client, server) = tokio::io::duplex(1024);

        client.write_all(b"\xff\xfe\n").await?;
        send(&mut client, "start").await;
        client.write_all(b"caf\xe9\r\n").await?;
        client.write_all(b"\xff\xfe\n").await?;
        send(&mut client, "stop").await;
        send(&mut client, "quit").await;

        create_loop(
            server,
            output.clone(),
            Box::new(store),
            EventLog::default(),
            CancellationToken::new(),
        )
        .run()
        .await?;

        let printed = output.contents();
        assert_eq!(printed.matches(UNKNOWN_COMMAND).count(), 1);
        assert!(printed.contains("Tracked activity 'caf\u{FFFD}' for 0s"));
        assert!(printed.ends_with(&format!("{GOODBYE}\n")));
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_input_while_tracking_saves_session() -> Result<()> {
        let mut store = MockActivityStore::new();
        store
            .expect_append()
            .withf(|activity| activity.name == "late night")
            .times(1)
            .returning(|_| Ok(()));
        let (mut client, server) = tokio::io::duplex(1024);
        send(&mut client, "start").await;
        send(&mut client, "late night").await;
        drop(client);

        create_loop(
            server,
            SharedBuffer::default(),
            Box::new(store),
            EventLog::default(),
            CancellationToken::new(),
        )
        .run()
        .await?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_tracking_saves_session() -> Result<()> {
        let mut store = MockActivityStore::new();
        store
            .expect_append()
            .withf(|activity| activity.duration == Duration::from_secs(5))
            .times(1)
            .returning(|_| Ok(()));
        let shutdown = CancellationToken::new();
        let (mut client, server) = tokio::io::duplex(1024);
        let command_loop = create_loop(
            server,
            SharedBuffer::default(),
            Box::new(store),
            EventLog::default(),
            shutdown.clone(),
        );

        let (result, ()) = tokio::join!(command_loop.run(), async move {
            send(&mut client, "start").await;
            send(&mut client, "interrupted").await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            shutdown.cancel();
            // The client stays open, only the shutdown ends the loop.
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(client);
        });
        result?;
        Ok(())
    }
}
