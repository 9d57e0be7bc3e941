//! Reading and writing the flat CSV schedule.
//!
//! The file has the columns `Date, Time, Video, Title, Description`. A row
//! with an empty `Time` is an unscheduled event; a row with a time but no
//! date is scheduled for `today`. Timestamps are validated here, before any
//! record reaches the store.

use crate::bus::NotificationBus;
use crate::common::ObserverId;
use crate::error::ScheduleFileError;
use crate::event::{Event, EventFields};
use crate::notification::Notification;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const HEADER: [&str; 5] = ["Date", "Time", "Video", "Title", "Description"];

/// One raw row of the schedule file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    #[serde(rename = "Date", default)]
    pub date: String,
    #[serde(rename = "Time", default)]
    pub time: String,
    #[serde(rename = "Video", default)]
    pub video: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Description", default)]
    pub description: String,
}

impl ScheduleRecord {
    pub fn from_event(event: &Event) -> Self {
        let (date, time) = match event.scheduled_at() {
            Some(at) => (
                at.format(DATE_FORMAT).to_string(),
                at.format(TIME_FORMAT).to_string(),
            ),
            None => (String::new(), String::new()),
        };
        Self {
            date,
            time,
            video: event.fields.media_ref.clone(),
            title: event.fields.title.clone(),
            description: event.fields.description.clone(),
        }
    }

    /// Validates the row and turns it into event fields. `row` is 1-based and
    /// only used for error messages.
    pub fn into_fields(self, row: usize, today: NaiveDate) -> Result<EventFields, ScheduleFileError> {
        if self.title.is_empty() {
            return Err(ScheduleFileError::MissingField { row, field: "Title" });
        }
        if self.description.is_empty() {
            return Err(ScheduleFileError::MissingField {
                row,
                field: "Description",
            });
        }
        let scheduled_at = parse_timestamp(row, &self.date, &self.time, today)?;
        Ok(EventFields {
            scheduled_at,
            media_ref: self.video,
            title: self.title,
            description: self.description,
        })
    }
}

/// Combines the date and time columns. An empty time means unscheduled.
pub fn parse_timestamp(
    row: usize,
    date: &str,
    time: &str,
    today: NaiveDate,
) -> Result<Option<NaiveDateTime>, ScheduleFileError> {
    let (date, time) = (date.trim(), time.trim());
    if time.is_empty() {
        return Ok(None);
    }
    let day = if date.is_empty() {
        today
    } else {
        NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|_| ScheduleFileError::invalid_timestamp(row, "date", date))?
    };
    let clock = NaiveTime::parse_from_str(time, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .map_err(|_| ScheduleFileError::invalid_timestamp(row, "time", time))?;
    Ok(Some(day.and_time(clock)))
}

pub fn read_records<R: io::Read>(reader: R) -> Result<Vec<ScheduleRecord>, ScheduleFileError> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

pub fn write_records<W: io::Write>(writer: W, records: &[ScheduleRecord]) -> Result<(), ScheduleFileError> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Parses a whole schedule from `reader`.
pub fn parse<R: io::Read>(reader: R, today: NaiveDate) -> Result<Vec<EventFields>, ScheduleFileError> {
    read_records(reader)?
        .into_iter()
        .enumerate()
        .map(|(index, record)| record.into_fields(index + 1, today))
        .collect()
}

/// Loads the schedule at `path`. A missing file is an empty schedule.
pub fn load(path: &Path, today: NaiveDate) -> Result<Vec<EventFields>, ScheduleFileError> {
    if !path.exists() {
        info!("Schedule {} does not exist yet; starting empty.", path.display());
        return Ok(Vec::new());
    }
    let fields = parse(File::open(path)?, today)?;
    info!("Loaded {} events from {}.", fields.len(), path.display());
    Ok(fields)
}

/// Writes `events` to `path`, creating the parent directory if needed.
pub fn save(path: &Path, events: &[Event]) -> Result<(), ScheduleFileError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let records: Vec<ScheduleRecord> = events.iter().map(ScheduleRecord::from_event).collect();
    write_records(File::create(path)?, &records)?;
    info!("Saved {} events to {}.", records.len(), path.display());
    Ok(())
}

/// Writes the schedule to `path` after every store change published on `bus`.
///
/// Saves run on the blocking pool, one at a time and in publication order.
/// When changes pile up behind a slow disk only the newest list is written.
/// Removing the returned observer stops the writer.
pub async fn autosave(bus: &NotificationBus, path: PathBuf) -> ObserverId {
    let (tx, mut rx) = mpsc::unbounded_channel::<Arc<[Event]>>();
    info!("Autosave enabled for {}.", path.display());

    tokio::spawn(async move {
        while let Some(mut events) = rx.recv().await {
            while let Ok(newer) = rx.try_recv() {
                events = newer;
            }
            let target = path.clone();
            match tokio::task::spawn_blocking(move || save(&target, &events)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Autosave to {} failed: {}", path.display(), e),
                Err(e) => error!("Autosave writer for {} panicked: {}", path.display(), e),
            }
        }
    });

    bus.on_notification_where(
        |n| matches!(n, Notification::EventsChanged { .. }),
        move |notification| {
            if let Notification::EventsChanged { events, .. } = notification {
                tx.send(events).ok();
            }
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EventId;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 4).unwrap()
    }

    #[test]
    fn parses_scheduled_dateless_and_unscheduled_rows() {
        let csv = "\
Date,Time,Video,Title,Description
2025-05-05,18:30:00,intro.mp4,Intro,Opening titles
,09:15,news.mp4,News,Morning bulletin
,,standby.mp4,Standby,Technical difficulties
";
        let fields = parse(csv.as_bytes(), today()).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(
            fields[0].scheduled_at,
            NaiveDate::from_ymd_opt(2025, 5, 5).unwrap().and_hms_opt(18, 30, 0)
        );
        assert_eq!(fields[1].scheduled_at, today().and_hms_opt(9, 15, 0));
        assert_eq!(fields[2].scheduled_at, None);
        assert_eq!(fields[2].media_ref, "standby.mp4");
    }

    #[test]
    fn rejects_bad_timestamps_and_missing_text() {
        let bad_date = "Date,Time,Video,Title,Description\n2025-13-01,10:00:00,a.mp4,A,B\n";
        assert!(matches!(
            parse(bad_date.as_bytes(), today()),
            Err(ScheduleFileError::InvalidTimestamp { row: 1, field: "date", .. })
        ));

        let bad_time = "Date,Time,Video,Title,Description\n,25:99,a.mp4,A,B\n";
        assert!(matches!(
            parse(bad_time.as_bytes(), today()),
            Err(ScheduleFileError::InvalidTimestamp { row: 1, field: "time", .. })
        ));

        let no_title = "Date,Time,Video,Title,Description\n,10:00,a.mp4,A,B\n,,b.mp4,,B\n";
        assert!(matches!(
            parse(no_title.as_bytes(), today()),
            Err(ScheduleFileError::MissingField { row: 2, field: "Title" })
        ));
    }

    #[test]
    fn save_then_load_keeps_the_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("schedule.csv");
        let events = vec![
            Event::new(
                EventId(0),
                EventFields::new(today().and_hms_opt(20, 0, 0), "a, b.mp4", "Show", "Prime \"time\""),
            ),
            Event::new(EventId(1), EventFields::new(None, "idle.mp4", "Idle", "Loop")),
        ];

        save(&path, &events).unwrap();
        let loaded = load(&path, today()).unwrap();
        let expected: Vec<EventFields> = events.into_iter().map(|e| e.fields).collect();
        assert_eq!(loaded, expected);
    }

    #[test]
    fn missing_file_is_an_empty_schedule() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("none.csv"), today()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn autosave_writes_the_latest_schedule_after_each_edit() {
        use crate::store::EventStore;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auto.csv");
        let bus = NotificationBus::default();
        let store = EventStore::with_bus(bus.clone());
        autosave(&bus, path.clone()).await;

        let first = store
            .create(EventFields::new(today().and_hms_opt(9, 0, 0), "a.mp4", "A", "first"))
            .await;
        store
            .create(EventFields::new(None, "b.mp4", "B", "second"))
            .await;
        store.remove(first).await.unwrap();

        let expected = vec![EventFields::new(None, "b.mp4", "B", "second")];
        let saved = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(fields) = load(&path, today()) {
                    if fields == expected {
                        return fields;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(saved, expected);
    }
}
