use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use colored::Colorize;
use cuecast::prelude::*;
use cuecast::schedule_file;
use cuecast::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    // It assumes `logo.log` is in the root of the `rdx-cueshell` crate.
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );

    println!("{}", "-----------------------------------------------------------------------------------------------".dimmed());

    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";

    println!("{}", version_string);
    println!("{}", license_blurb.dimmed());

    println!("{}", "-----------------------------------------------------------------------------------------------".dimmed());
}

/// Plays the part of the presentation surface: prints what would be on screen.
async fn spawn_presenter(engine: &SchedulerEngine, show_countdown: Arc<AtomicBool>) {
    engine
        .bus()
        .on_notification(move |notification| match notification {
            Notification::PhaseChanged { phase, .. } => match phase {
                Phase::Playing { event } => println!(
                    "\n<-- [ON AIR] {} '{}' ({})\n>> ",
                    event.id,
                    event.title(),
                    event.media_ref()
                ),
                other => println!("\n<-- [SCREEN] {}\n>> ", other),
            },
            Notification::Countdown { event_id, remaining } => {
                if show_countdown.load(Ordering::Relaxed) {
                    println!("<-- [COUNTDOWN] {} in {}s", event_id, remaining.num_seconds());
                }
            }
            Notification::PlaybackEnded { id, outcome } => {
                println!("\n<-- [PLAYBACK] {} {:?}\n>> ", id, outcome)
            }
            Notification::EventsChanged { .. } | Notification::System(_) => {}
        })
        .await;
}

/// Shell state kept between commands.
struct Session {
    engine: SchedulerEngine,
    schedule_path: Option<PathBuf>,
    show_countdown: Arc<AtomicBool>,
    autosave: bool,
    autosave_observer: Option<ObserverId>,
}

impl Session {
    async fn execute(&mut self, args: &[&str]) -> Result<()> {
        let Some(command) = args.first() else {
            return Ok(());
        };
        match *command {
            "list" => self.list().await,
            "status" => {
                let state = self.engine.state().await;
                println!("Phase:       {}", state.phase);
                match state.last_fired {
                    Some(id) => println!("Last fired:  {}", id),
                    None => println!("Last fired:  -"),
                }
                if let Some(started) = state.started_at {
                    println!("On air:      {}", started.format("%Y-%m-%d %H:%M:%S"));
                }
                println!("Clock:       {}", self.engine.now().format("%Y-%m-%d %H:%M:%S"));
            }
            "add" => self.add(&args[1..]).await?,
            "remove" => {
                let id = parse_id(args.get(1), "remove <ID>")?;
                let removed = self.engine.store().remove(id).await?;
                println!("--> Removed {} '{}'.", id, removed.title());
            }
            "set" => self.set(&args[1..]).await?,
            "trigger" => {
                let id = parse_id(args.get(1), "trigger <ID>")?;
                self.engine.trigger_now(id).await?;
            }
            "done" => {
                let id = parse_id(args.get(1), "done <ID>")?;
                if !self.engine.playback_completed(id).await {
                    println!("--> {} is not on air.", id);
                }
            }
            "fail" => {
                let id = parse_id(args.get(1), "fail <ID>")?;
                if !self.engine.playback_failed(id).await {
                    println!("--> {} is not on air.", id);
                }
            }
            "save" => {
                let path = match args.get(1) {
                    Some(path) => PathBuf::from(path),
                    None => self
                        .schedule_path
                        .clone()
                        .context("Usage: save <PATH> (no schedule file loaded)")?,
                };
                schedule_file::save(&path, &self.engine.store().export_all().await)?;
                println!("--> Saved to {}.", path.display());
                self.use_schedule_path(path).await;
            }
            "load" => {
                let path = PathBuf::from(args.get(1).context("Usage: load <PATH>")?);
                let fields = schedule_file::load(&path, self.engine.now().date())?;
                self.use_schedule_path(path.clone()).await;
                let ids = self.engine.store().import_fields(fields).await;
                println!("--> Loaded {} events from {}.", ids.len(), path.display());
            }
            "watch" => match args.get(1) {
                Some(&"on") => {
                    self.show_countdown.store(true, Ordering::Relaxed);
                    println!("--> Started printing the countdown.");
                }
                Some(&"off") => {
                    self.show_countdown.store(false, Ordering::Relaxed);
                    println!("--> Stopped printing the countdown.");
                }
                _ => println!("Usage: watch on|off"),
            },
            "help" => print_help(),
            _ => println!("Unknown command: '{}'. Type 'help'.", args.join(" ")),
        }
        Ok(())
    }

    /// Makes `path` the current schedule file and points autosave at it.
    async fn use_schedule_path(&mut self, path: PathBuf) {
        if self.schedule_path.as_ref() == Some(&path) && self.autosave_observer.is_some() {
            return;
        }
        if self.autosave {
            if let Some(previous) = self.autosave_observer.take() {
                self.engine.bus().remove_observer(previous).await;
            }
            let id = schedule_file::autosave(self.engine.bus(), path.clone()).await;
            self.autosave_observer = Some(id);
        }
        self.schedule_path = Some(path);
    }

    async fn list(&self) {
        let events = self.engine.store().ordered_view().await;
        let on_air = self.engine.phase().await.playing().map(|e| e.id);
        println!("Events ({}):", events.len());
        for event in events {
            let when = event
                .scheduled_at()
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "Unscheduled".to_string());
            let marker = if Some(event.id) == on_air { "*" } else { " " };
            println!(
                " {}{:>5}  {:<19}  {:<24}  {}  ({})",
                marker,
                event.id.to_string(),
                when,
                event.title(),
                event.fields.description.dimmed(),
                event.media_ref()
            );
        }
    }

    /// `add <DATE|today> <TIME|-> <MEDIA> <TITLE> | <DESCRIPTION>`
    async fn add(&self, args: &[&str]) -> Result<()> {
        const USAGE: &str = "Usage: add <DATE|today> <TIME|-> <MEDIA> <TITLE> | <DESCRIPTION>";
        if args.len() < 4 {
            bail!(USAGE);
        }
        let date = if args[0] == "today" { "" } else { args[0] };
        let time = if args[1] == "-" { "" } else { args[1] };
        let scheduled_at = schedule_file::parse_timestamp(0, date, time, self.engine.now().date())?;
        let text = args[3..].join(" ");
        let (title, description) = text.split_once('|').unwrap_or((text.as_str(), ""));

        let id = self
            .engine
            .store()
            .create(EventFields::new(
                scheduled_at,
                args[2],
                title.trim(),
                description.trim(),
            ))
            .await;
        println!("--> Added event {}.", id);
        Ok(())
    }

    /// `set <ID> <date|time|media|title|description|unschedule> [VALUE]`
    async fn set(&self, args: &[&str]) -> Result<()> {
        const USAGE: &str = "Usage: set <ID> <date|time|media|title|description|unschedule> [VALUE]";
        let id = parse_id(args.first(), USAGE)?;
        let field = *args.get(1).context(USAGE)?;
        let value = args.get(2..).map(|rest| rest.join(" ")).unwrap_or_default();
        let current = self
            .engine
            .store()
            .get(id)
            .await
            .ok_or(StoreError::NotFound(id))?;
        let today = self.engine.now().date();

        let mut patch = EventPatch::default();
        match field {
            "date" => {
                let time = current
                    .scheduled_at()
                    .map(|at| at.time())
                    .unwrap_or_else(|| self.engine.now().time());
                let day = schedule_file::parse_timestamp(0, &value, "00:00:00", today)?
                    .map(|at| at.date())
                    .context("date required")?;
                patch.scheduled_at = Some(Some(NaiveDateTime::new(day, time)));
            }
            "time" => {
                let day = current.scheduled_at().map(|at| at.date()).unwrap_or(today);
                let at = schedule_file::parse_timestamp(0, "", &value, day)?.context("time required")?;
                patch.scheduled_at = Some(Some(at));
            }
            "unschedule" => patch.scheduled_at = Some(None),
            "media" => patch.media_ref = Some(value),
            "title" => patch.title = Some(value),
            "description" => patch.description = Some(value),
            _ => bail!(USAGE),
        }
        let updated = self.engine.store().update(id, patch).await?;
        println!("--> Updated {} '{}'.", updated.id, updated.title());
        Ok(())
    }
}

fn parse_id(arg: Option<&&str>, usage: &str) -> Result<EventId> {
    let raw = arg.with_context(|| format!("Usage: {}", usage))?;
    raw.parse::<EventId>()
        .with_context(|| format!("'{}' is not a valid event id.", raw))
}

fn print_help() {
    println!("Available commands:");
    println!("  list                          - Shows all events in schedule order.");
    println!("  status                        - Shows the current phase and clock.");
    println!("  add <D> <T> <MEDIA> <TITLE> | <DESC>");
    println!("                                - Adds an event. D may be 'today', T may be '-'.");
    println!("  remove <ID>                   - Removes an event.");
    println!("  set <ID> <FIELD> [VALUE]      - Edits date, time, media, title, description or unschedule.");
    println!("  trigger <ID>                  - Puts an event on air now.");
    println!("  done <ID> / fail <ID>         - Reports that playback finished or failed.");
    println!("  save [PATH] / load <PATH>     - Writes or reads the CSV schedule.");
    println!("  watch on|off                  - Toggles printing the countdown.");
    println!("  exit                          - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let config = CuecastConfig::load(None)?;
    let schedule_path = env::args_os().nth(1).map(PathBuf::from).or_else(|| config.schedule.path.clone());
    let autosave = config.schedule.autosave;
    let engine = SchedulerEngine::new(config, SystemClock);

    if let Some(path) = &schedule_path {
        let fields = schedule_file::load(path, engine.now().date())?;
        engine.store().import_fields(fields).await;
    }

    let show_countdown = Arc::new(AtomicBool::new(false));
    spawn_presenter(&engine, show_countdown.clone()).await;

    let engine_handle = engine.clone();
    info!("Spawning {} in the background...", ENGINE_NAME);
    tokio::spawn(async move {
        if let Err(e) = engine.run().await {
            eprintln!("\nEngine stopped with an error: {}", e);
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut session = Session {
        engine: engine_handle,
        schedule_path: None,
        show_countdown,
        autosave,
        autosave_observer: None,
    };
    if let Some(path) = schedule_path {
        session.use_schedule_path(path).await;
    }

    let mut rl = Editor::new()?;
    let helper = MyHighlighter {};
    rl.set_helper(Some(helper));

    println!("{} is running. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();
                if args.first() == Some(&"exit") {
                    break;
                }
                if let Err(e) = session.execute(&args).await {
                    println!("Error: {}", e);
                }
            }
            Err(_) => {
                println!("Exiting cueshell...");
                break;
            }
        }
    }

    Ok(())
}
