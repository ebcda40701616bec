use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime};
use serde::Deserialize;
use crate::models::{Schedule, TimeSlot};
use crate::utils::session::{extract_cdata, Session, SCHEDULE_URL};

// The calendar widget parses its bounds from this exact shape and only looks
// at the day part.
const BOUND_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Deserialize)]
struct EventFeed {
    events: Vec<Event>,
}

// One calendar event as the portal emits it. title/start/end are present on
// every event; room and rendering class travel through when supplied.
#[derive(Deserialize)]
struct Event {
    title: String,
    start: String,
    end: String,
    #[serde(rename = "className", default)]
    class_name: Option<String>,
    #[serde(default, alias = "salle")]
    room: Option<String>,
}

// Returns every time slot between the two days, in the order the portal
// lists them. A time-of-day in the bounds is accepted but the portal answers
// with whole days regardless.
pub fn get_schedule(session: &Session, start: NaiveDateTime, end: NaiveDateTime) -> Result<Schedule> {
    // Open the planning view first; the update request is only honored
    // inside an existing view.
    session.get(SCHEDULE_URL)?;

    let start_bound = format_bound(start);
    let end_bound = format_bound(end);
    let body = session.post_form(SCHEDULE_URL, &[
        ("javax.faces.partial.ajax", "true"),
        ("javax.faces.partial.render", "mainFormPlanning:edt"),
        ("mainFormPlanning:edt", "mainFormPlanning:edt"),
        ("mainFormPlanning:edt_start", start_bound.as_str()),
        ("mainFormPlanning:edt_end", end_bound.as_str()),
    ])?;
    decode_schedule(&body, start, end)
}

// All slots of the given day.
pub fn get_schedule_of_day(session: &Session, day: NaiveDateTime) -> Result<Schedule> {
    get_schedule(session, day, day)
}

// Monday through Sunday of the week the given day falls in.
pub fn get_schedule_of_week(session: &Session, day: NaiveDateTime) -> Result<Schedule> {
    let monday = day - Duration::days(day.weekday().num_days_from_monday() as i64);
    get_schedule(session, monday, monday + Duration::days(6))
}

fn format_bound(bound: NaiveDateTime) -> String {
    bound.format(BOUND_FORMAT).to_string()
}

// Decodes the embedded event feed into a schedule. Any missing piece fails
// the whole call; there is no partial schedule.
fn decode_schedule(body: &str, start: NaiveDateTime, end: NaiveDateTime) -> Result<Schedule> {
    let json = extract_cdata(body)?;
    let feed: EventFeed = serde_json::from_str(json)
        .context("Calendar payload has no usable events array")?;
    let slots = feed.events.into_iter()
        .map(into_slot)
        .collect::<Result<Vec<TimeSlot>>>()?;
    Ok(Schedule { start, end, slots })
}

fn into_slot(event: Event) -> Result<TimeSlot> {
    Ok(TimeSlot {
        start: parse_instant(&event.start)?,
        end: parse_instant(&event.end)?,
        subject: event.title,
        room: event.room,
        kind: event.class_name,
    })
}

// Event instants come with or without a numeric UTC offset.
fn parse_instant(text: &str) -> Result<NaiveDateTime> {
    if let Ok(with_offset) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%z") {
        return Ok(with_offset.naive_local());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .with_context(|| format!("Unreadable event instant {:?}", text))
}
