use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// One node of the grade tree. Children keep the portal's display order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum GradeEntry {
    Aggregate {
        name: String,
        coefficient: f64,
        children: Vec<GradeEntry>,
    },
    Assessment {
        name: String,
        coefficient: f64,
        children: Vec<GradeEntry>,
    },
    Score {
        grade: f64,
        max_grade: f64,
        coefficient: f64,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Schedule {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub slots: Vec<TimeSlot>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub subject: String,
    pub room: Option<String>,
    pub kind: Option<String>,
}
